//! Dialect service lookup.
//!
//! Implementations of each engine capability are registered per dialect at
//! startup and resolved by `(capability, dialect)`. This keeps the model,
//! generator, and fetcher contracts free of compile-time coupling to any one
//! dialect while still failing loudly for an unsupported one.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::GraphPgError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Reflection,
    SqlBuild,
    Fetch,
    Cdc,
}

/// Dialect tag from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize)]
pub enum DatabaseType {
    #[serde(rename = "POSTGRES", alias = "postgres")]
    Postgres,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseType::Postgres => "POSTGRES",
        }
    }
}

#[derive(Default)]
pub struct ServiceRegistry {
    entries: HashMap<(Capability, DatabaseType), Arc<dyn Any + Send + Sync>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Send + Sync + 'static>(
        &mut self,
        capability: Capability,
        dialect: DatabaseType,
        service: Arc<T>,
    ) {
        self.entries.insert((capability, dialect), service);
    }

    pub fn lookup<T: Send + Sync + 'static>(
        &self,
        capability: Capability,
        dialect: DatabaseType,
    ) -> Result<Arc<T>, GraphPgError> {
        self.entries
            .get(&(capability, dialect))
            .and_then(|service| service.clone().downcast::<T>().ok())
            .ok_or_else(|| GraphPgError::DialectUnsupported {
                dialect: dialect.as_str().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct FakeReflector {
        schema: &'static str,
    }

    #[test]
    fn registered_services_resolve_by_capability_and_dialect() {
        let mut registry = ServiceRegistry::new();
        registry.register(
            Capability::Reflection,
            DatabaseType::Postgres,
            Arc::new(FakeReflector { schema: "public" }),
        );

        let service = registry
            .lookup::<FakeReflector>(Capability::Reflection, DatabaseType::Postgres)
            .unwrap();
        assert_eq!(service.schema, "public");
    }

    #[test]
    fn missing_dialect_is_an_unsupported_error() {
        let registry = ServiceRegistry::new();
        let err = registry
            .lookup::<FakeReflector>(Capability::Fetch, DatabaseType::Postgres)
            .unwrap_err();
        assert_eq!(err.kind(), "DIALECT_UNSUPPORTED");
        assert!(err.to_string().contains("POSTGRES"));
    }

    #[test]
    fn wrong_type_parameter_does_not_resolve() {
        let mut registry = ServiceRegistry::new();
        registry.register(
            Capability::Reflection,
            DatabaseType::Postgres,
            Arc::new(FakeReflector { schema: "public" }),
        );

        assert!(
            registry
                .lookup::<String>(Capability::Reflection, DatabaseType::Postgres)
                .is_err()
        );
    }
}
