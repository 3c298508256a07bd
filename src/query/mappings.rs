//! Registries resolving wire type tags to concrete variants.

use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{DecodeError, VariantKind};
use crate::query::{Compiler, Dialect};

type Factory<T> = Arc<dyn Fn(Value) -> Result<Box<T>, DecodeError> + Send + Sync>;

/// Maps a string discriminator to a factory building the tagged variant from its raw payload.
///
/// Populated once at startup and shared read-only afterwards.
pub struct TypeMappings<T: ?Sized> {
    kind: VariantKind,
    factories: HashMap<String, Factory<T>>,
}

pub type CompilerMappings = TypeMappings<dyn Compiler>;
pub type DialectMappings = TypeMappings<dyn Dialect>;

impl<T: ?Sized> TypeMappings<T> {
    fn empty(kind: VariantKind) -> Self {
        Self {
            kind,
            factories: HashMap::new(),
        }
    }

    /// Register a raw factory under `tag`, replacing any previous registration.
    pub fn register<F>(&mut self, tag: impl Into<String>, factory: F)
    where
        F: Fn(Value) -> Result<Box<T>, DecodeError> + Send + Sync + 'static,
    {
        self.factories.insert(tag.into(), Arc::new(factory));
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.factories.contains_key(tag)
    }

    /// Registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }

    /// Resolve `tag` and build the variant from `payload`.
    pub fn resolve(&self, tag: &str, payload: Value) -> Result<Box<T>, DecodeError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| DecodeError::UnsupportedVariant {
                kind: self.kind,
                tag: tag.to_string(),
            })?;
        factory(payload)
    }
}

impl<T: ?Sized> Clone for TypeMappings<T> {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            factories: self.factories.clone(),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for TypeMappings<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeMappings")
            .field("kind", &self.kind)
            .field("tags", &self.tags())
            .finish()
    }
}

fn invalid(kind: VariantKind, tag: &str, reason: impl ToString) -> DecodeError {
    DecodeError::Invalid {
        kind,
        tag: tag.to_string(),
        reason: reason.to_string(),
    }
}

impl TypeMappings<dyn Compiler> {
    pub fn new() -> Self {
        Self::empty(VariantKind::Compiler)
    }

    /// Register a serde-decodable compiler under `tag`.
    pub fn register_type<C>(&mut self, tag: &str)
    where
        C: Compiler + DeserializeOwned + 'static,
    {
        let owned = tag.to_string();
        self.register(tag, move |payload| {
            let compiler: C = serde_json::from_value(payload)
                .map_err(|e| invalid(VariantKind::Compiler, &owned, e))?;
            compiler
                .validate()
                .map_err(|reason| invalid(VariantKind::Compiler, &owned, reason))?;
            Ok(Box::new(compiler) as Box<dyn Compiler>)
        });
    }
}

impl Default for TypeMappings<dyn Compiler> {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeMappings<dyn Dialect> {
    pub fn new() -> Self {
        Self::empty(VariantKind::Dialect)
    }

    /// Register a serde-decodable dialect under `tag`.
    pub fn register_type<D>(&mut self, tag: &str)
    where
        D: Dialect + DeserializeOwned + 'static,
    {
        let owned = tag.to_string();
        self.register(tag, move |payload| {
            let dialect: D = serde_json::from_value(payload)
                .map_err(|e| invalid(VariantKind::Dialect, &owned, e))?;
            dialect
                .validate()
                .map_err(|reason| invalid(VariantKind::Dialect, &owned, reason))?;
            Ok(Box::new(dialect) as Box<dyn Dialect>)
        });
    }
}

impl Default for TypeMappings<dyn Dialect> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::builtin::{CsvDialect, FluxCompiler};
    use serde_json::json;

    #[test]
    fn test_resolve_registered_compiler() {
        let mut mappings = CompilerMappings::new();
        mappings.register_type::<FluxCompiler>("flux");

        let compiler = mappings
            .resolve("flux", json!({ "query": "from(bucket: \"b\")" }))
            .unwrap();
        assert_eq!(compiler.compiler_type(), "flux");
    }

    #[test]
    fn test_unknown_tag_is_unsupported() {
        let mappings = DialectMappings::new();
        let err = mappings.resolve("csv", json!({})).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::UnsupportedVariant { kind: VariantKind::Dialect, ref tag } if tag == "csv"
        ));
    }

    #[test]
    fn test_payload_rejected_by_validate() {
        let mut mappings = CompilerMappings::new();
        mappings.register_type::<FluxCompiler>("flux");

        let err = mappings.resolve("flux", json!({ "query": "   " })).unwrap_err();
        assert!(matches!(err, DecodeError::Invalid { kind: VariantKind::Compiler, .. }));
    }

    #[test]
    fn test_custom_factory_and_tags() {
        let mut mappings = DialectMappings::new();
        mappings.register_type::<CsvDialect>("csv");
        mappings.register("csv-default", |_| Ok(Box::new(CsvDialect::default()) as Box<dyn Dialect>));

        assert!(mappings.contains("csv-default"));
        assert_eq!(mappings.tags(), vec!["csv", "csv-default"]);
        let dialect = mappings.resolve("csv-default", Value::Null).unwrap();
        assert_eq!(dialect.dialect_type(), "csv");
    }
}
