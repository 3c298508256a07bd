//! Variants registered by the binary out of the box.

use axum::http::{header, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::query::{Compiler, CompilerMappings, Dialect, DialectMappings, HttpDialect};

pub const FLUX_COMPILER_TYPE: &str = "flux";
pub const CSV_DIALECT_TYPE: &str = "csv";

/// A Flux script, compiled by the remote backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FluxCompiler {
    pub query: String,
    /// Optional RFC 3339 timestamp the remote evaluates `now()` as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub now: Option<String>,
}

impl Compiler for FluxCompiler {
    fn compiler_type(&self) -> &str {
        FLUX_COMPILER_TYPE
    }

    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        Ok(())
    }
}

const CSV_ANNOTATIONS: &[&str] = &["group", "datatype", "default"];

/// Annotated CSV output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvDialect {
    pub header: bool,
    pub delimiter: String,
    pub annotations: Vec<String>,
}

impl Default for CsvDialect {
    fn default() -> Self {
        Self {
            header: true,
            delimiter: ",".to_string(),
            annotations: Vec::new(),
        }
    }
}

impl Dialect for CsvDialect {
    fn dialect_type(&self) -> &str {
        CSV_DIALECT_TYPE
    }

    fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    fn validate(&self) -> Result<(), String> {
        if self.delimiter.chars().count() != 1 {
            return Err(format!("delimiter must be a single character, got {:?}", self.delimiter));
        }
        if let Some(bad) = self
            .annotations
            .iter()
            .find(|a| !CSV_ANNOTATIONS.contains(&a.as_str()))
        {
            return Err(format!("unknown annotation {:?}", bad));
        }
        Ok(())
    }

    fn as_http(&self) -> Option<&dyn HttpDialect> {
        Some(self)
    }
}

impl HttpDialect for CsvDialect {
    fn set_headers(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/csv; charset=utf-8"),
        );
    }
}

/// Mappings containing every built-in compiler.
pub fn default_compiler_mappings() -> CompilerMappings {
    let mut mappings = CompilerMappings::new();
    mappings.register_type::<FluxCompiler>(FLUX_COMPILER_TYPE);
    mappings
}

/// Mappings containing every built-in dialect.
pub fn default_dialect_mappings() -> DialectMappings {
    let mut mappings = DialectMappings::new();
    mappings.register_type::<CsvDialect>(CSV_DIALECT_TYPE);
    mappings
}
