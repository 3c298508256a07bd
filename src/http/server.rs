//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the query handler
//! - Wire up middleware (request ID, tracing, time-to-first-byte bound)
//! - Build the forwarding client from the upstream configuration
//! - Serve plain or TLS listeners with graceful shutdown

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::ProxyConfig;
use crate::error::ProxyResult;
use crate::http::client::ForwardingClient;
use crate::http::handler::{self, QueryHandlerState};
use crate::http::service::ProxyQueryService;
use crate::query::{CompilerMappings, DialectMappings};

/// Time allowed for in-flight streams after shutdown is triggered on a TLS listener.
const TLS_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP server for the query proxy.
pub struct HttpServer {
    router: Router,
    config: ProxyConfig,
}

impl HttpServer {
    /// Create a server forwarding to the configured upstream.
    pub fn new(
        config: ProxyConfig,
        compilers: CompilerMappings,
        dialects: DialectMappings,
    ) -> ProxyResult<Self> {
        let client = ForwardingClient::new(&config.upstream, &config.timeouts)?;
        Ok(Self::with_service(config, Arc::new(client), compilers, dialects))
    }

    /// Create a server with a custom query service.
    pub fn with_service(
        config: ProxyConfig,
        service: Arc<dyn ProxyQueryService>,
        compilers: CompilerMappings,
        dialects: DialectMappings,
    ) -> Self {
        tracing::debug!(
            compilers = ?compilers.tags(),
            dialects = ?dialects.tags(),
            "Registered query variants"
        );

        let state = QueryHandlerState {
            service,
            compilers: Arc::new(compilers),
            dialects: Arc::new(dialects),
            limits: config.limits.clone(),
        };

        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(config: &ProxyConfig, state: QueryHandlerState) -> Router {
        // Bounds the wait for the first body byte; the forwarding client's own timeouts fire
        // first in every normal case.
        let first_byte_secs = config.timeouts.connect_secs
            + config.timeouts.request_secs
            + config.timeouts.idle_secs;

        handler::routes(state).layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TimeoutLayer::new(Duration::from_secs(first_byte_secs))),
        )
    }

    /// Run the server on `listener` until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTP server starting"
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// Run the server with TLS termination until `shutdown` resolves.
    pub async fn run_tls<F>(
        self,
        addr: SocketAddr,
        tls: RustlsConfig,
        shutdown: F,
    ) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(
            address = %addr,
            upstream = %self.config.upstream.address,
            "HTTPS server starting"
        );

        let handle = axum_server::Handle::new();
        let drain = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            drain.graceful_shutdown(Some(TLS_DRAIN_TIMEOUT));
        });

        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(self.router.into_make_service())
            .await?;

        tracing::info!("HTTPS server stopped");
        Ok(())
    }

    /// The fully layered router, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}
