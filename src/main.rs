//! Query proxy.
//!
//! Accepts proxied query requests over HTTP and forwards them to a remote query backend,
//! streaming the encoded result back to the caller.
//!
//! ```text
//!     caller ──POST /api/v2/queryproxysvc──▶ handler ──▶ forwarding client ──POST──▶ backend
//!     caller ◀──────── streamed body ─────── handler ◀── sink ◀──── streamed body ── backend
//! ```

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;

use query_proxy::config::{load_config, loader, ProxyConfig};
use query_proxy::config::validation::validate_config;
use query_proxy::http::HttpServer;
use query_proxy::lifecycle::{signals, Shutdown};
use query_proxy::net::tls::load_tls_config;
use query_proxy::observability::{logging, metrics};
use query_proxy::query::builtin::{default_compiler_mappings, default_dialect_mappings};

#[derive(Parser)]
#[command(name = "query-proxy")]
#[command(about = "Forwards query requests to a remote query backend", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override `listener.bind_address`.
    #[arg(short, long)]
    bind: Option<String>,

    /// Override `upstream.address`.
    #[arg(short, long)]
    upstream: Option<String>,
}

fn resolve_config(cli: &Cli) -> Result<ProxyConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => {
            let mut config = ProxyConfig::default();
            loader::apply_env_overrides(&mut config);
            config
        }
    };

    if let Some(bind) = &cli.bind {
        config.listener.bind_address = bind.clone();
    }
    if let Some(upstream) = &cli.upstream {
        config.upstream.address = upstream.clone();
    }

    validate_config(&config).map_err(loader::ConfigError::Validation)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = resolve_config(&cli)?;

    logging::init(&config.observability);

    tracing::info!("query-proxy v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        insecure_skip_verify = config.upstream.insecure_skip_verify,
        request_timeout_secs = config.timeouts.request_secs,
        idle_timeout_secs = config.timeouts.idle_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    let shutdown = Shutdown::new();
    signals::spawn_signal_listener(shutdown.clone());

    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config, default_compiler_mappings(), default_dialect_mappings())?;

    match tls {
        Some(tls) => {
            let tls_config = load_tls_config(&tls).await?;
            let addr: SocketAddr = bind_address.parse()?;
            server.run_tls(addr, tls_config, shutdown.wait()).await?;
        }
        None => {
            let listener = TcpListener::bind(&bind_address).await?;
            server.run(listener, shutdown.wait()).await?;
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
