//! The proxied request envelope and its wire form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DecodeError;
use crate::query::{Compiler, CompilerMappings, Dialect, DialectMappings};

#[derive(Debug, Serialize, Deserialize)]
struct RequestWire {
    #[serde(default)]
    organization_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    authorization: Option<Value>,
    compiler_type: String,
    #[serde(default)]
    compiler: Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ProxyRequestWire {
    request: RequestWire,
    dialect_type: String,
    #[serde(default)]
    dialect: Value,
}

/// A query addressed to an organization, with its compiler.
#[derive(Debug)]
pub struct Request {
    organization_id: String,
    /// Carried verbatim; the proxy never inspects it.
    authorization: Option<Value>,
    compiler: Box<dyn Compiler>,
}

impl Request {
    pub fn new(organization_id: impl Into<String>, compiler: Box<dyn Compiler>) -> Self {
        Self {
            organization_id: organization_id.into(),
            authorization: None,
            compiler,
        }
    }

    pub fn with_authorization(mut self, authorization: Value) -> Self {
        self.authorization = Some(authorization);
        self
    }

    pub fn organization_id(&self) -> &str {
        &self.organization_id
    }

    pub fn authorization(&self) -> Option<&Value> {
        self.authorization.as_ref()
    }

    pub fn compiler(&self) -> &dyn Compiler {
        self.compiler.as_ref()
    }
}

/// A query request plus the dialect its results are encoded in.
///
/// Immutable once decoded.
#[derive(Debug)]
pub struct ProxyRequest {
    request: Request,
    dialect: Box<dyn Dialect>,
}

impl ProxyRequest {
    pub fn new(request: Request, dialect: Box<dyn Dialect>) -> Self {
        Self { request, dialect }
    }

    /// Decode a JSON envelope, resolving both type tags through the mappings.
    pub fn decode(
        body: &[u8],
        compilers: &CompilerMappings,
        dialects: &DialectMappings,
    ) -> Result<Self, DecodeError> {
        let wire: ProxyRequestWire = serde_json::from_slice(body)?;

        let compiler = compilers.resolve(&wire.request.compiler_type, wire.request.compiler)?;
        let dialect = dialects.resolve(&wire.dialect_type, wire.dialect)?;

        Ok(Self {
            request: Request {
                organization_id: wire.request.organization_id,
                authorization: wire.request.authorization,
                compiler,
            },
            dialect,
        })
    }

    /// Serialize to the JSON envelope sent to the remote backend.
    pub fn to_wire(&self) -> serde_json::Result<Vec<u8>> {
        let wire = ProxyRequestWire {
            request: RequestWire {
                organization_id: self.request.organization_id.clone(),
                authorization: self.request.authorization.clone(),
                compiler_type: self.request.compiler.compiler_type().to_string(),
                compiler: self.request.compiler.to_json()?,
            },
            dialect_type: self.dialect.dialect_type().to_string(),
            dialect: self.dialect.to_json()?,
        };
        serde_json::to_vec(&wire)
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VariantKind;
    use crate::query::builtin::{default_compiler_mappings, default_dialect_mappings};
    use serde_json::json;

    fn decode(body: Value) -> Result<ProxyRequest, DecodeError> {
        ProxyRequest::decode(
            body.to_string().as_bytes(),
            &default_compiler_mappings(),
            &default_dialect_mappings(),
        )
    }

    fn valid_body() -> Value {
        json!({
            "request": {
                "organization_id": "0000000000000001",
                "compiler_type": "flux",
                "compiler": { "query": "from(bucket: \"telegraf\") |> range(start: -1h)" }
            },
            "dialect_type": "csv",
            "dialect": { "header": true, "delimiter": ",", "annotations": ["datatype"] }
        })
    }

    #[test]
    fn test_decode_valid_request() {
        let req = decode(valid_body()).unwrap();
        assert_eq!(req.request().organization_id(), "0000000000000001");
        assert_eq!(req.request().compiler().compiler_type(), "flux");
        assert_eq!(req.dialect().dialect_type(), "csv");
        assert!(req.request().authorization().is_none());
    }

    #[test]
    fn test_unknown_compiler_tag() {
        let mut body = valid_body();
        body["request"]["compiler_type"] = json!("sql");
        let err = decode(body).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedVariant { kind: VariantKind::Compiler, ref tag } if tag == "sql"
        ));
    }

    #[test]
    fn test_unknown_dialect_tag() {
        let mut body = valid_body();
        body["dialect_type"] = json!("arrow");
        let err = decode(body).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedVariant { kind: VariantKind::Dialect, .. }
        ));
    }

    #[test]
    fn test_malformed_body() {
        let err = ProxyRequest::decode(
            b"{\"request\": ",
            &default_compiler_mappings(),
            &default_dialect_mappings(),
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }

    #[test]
    fn test_missing_compiler_payload_is_invalid() {
        let mut body = valid_body();
        body["request"].as_object_mut().unwrap().remove("compiler");
        assert!(matches!(decode(body).unwrap_err(), DecodeError::Invalid { .. }));
    }

    #[test]
    fn test_wire_form_keeps_tags_and_payloads() {
        let mut body = valid_body();
        body["request"]["authorization"] = json!({ "id": "0a1b", "status": "active" });
        let req = decode(body.clone()).unwrap();

        let encoded: Value = serde_json::from_slice(&req.to_wire().unwrap()).unwrap();
        assert_eq!(encoded["request"]["compiler_type"], "flux");
        assert_eq!(encoded["request"]["compiler"]["query"], body["request"]["compiler"]["query"]);
        assert_eq!(encoded["request"]["authorization"]["id"], "0a1b");
        assert_eq!(encoded["dialect_type"], "csv");
        assert_eq!(encoded["dialect"]["annotations"], json!(["datatype"]));
    }
}
