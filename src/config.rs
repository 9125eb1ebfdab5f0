use std::time::Duration;

use async_graphql::dynamic::SchemaBuilder;
use serde::Deserialize;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::{debug, info};

use crate::registry::DatabaseType;

/// Load configuration from a TOML file
pub fn load_config(config_path: &str) -> anyhow::Result<GraphPgConfig> {
    debug!("Loading config from: {}", config_path);

    if std::path::Path::new(config_path).exists() {
        info!("Config file found, loading from: {}", config_path);

        let config_content = std::fs::read_to_string(config_path).map_err(|e| {
            debug!("Failed to read config file: {}", e);
            e
        })?;

        let config: GraphPgConfig = toml::from_str(&config_content).map_err(|e| {
            debug!("Failed to parse config file: {}", e);
            e
        })?;

        debug!("Config loaded successfully");
        return Ok(config);
    }

    Err(anyhow::anyhow!("Unable to load config"))
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct GraphPgConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub graphql: GraphQLConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub reflection: ReflectionConfig,
    #[serde(default)]
    pub cdc: CdcConfig,
}

impl GraphPgConfig {
    pub fn from_path(path: &str) -> async_graphql::Result<Self> {
        Ok(load_config(path)?)
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct GraphQLConfig {
    pub enable_uploading: Option<bool>,
    pub enable_playground: Option<bool>,
    pub limit_depth: Option<usize>,
    pub limit_complexity: Option<usize>,
    pub limit_recursive_depth: Option<usize>,
    pub limit_directives: Option<usize>,
    pub disable_suggestions: Option<bool>,
    pub disable_introspection: Option<bool>,
    pub introspection_only: Option<bool>,
    pub enable_federation: Option<bool>,
}

impl GraphQLConfig {
    pub fn apply(&self, mut schema: SchemaBuilder) -> SchemaBuilder {
        if self.enable_uploading.unwrap_or(true) {
            schema = schema.enable_uploading();
        }

        if let Some(complexity) = self.limit_complexity {
            schema = schema.limit_complexity(complexity);
        }

        if let Some(depth) = self.limit_depth {
            schema = schema.limit_depth(depth);
        }

        if let Some(depth) = self.limit_recursive_depth {
            schema = schema.limit_recursive_depth(depth);
        }

        if let Some(directives) = self.limit_directives {
            schema = schema.limit_directives(directives);
        }

        if self.disable_suggestions.unwrap_or(false) {
            schema = schema.disable_suggestions();
        }

        if self.disable_introspection.unwrap_or(false) {
            schema = schema.disable_introspection();
        }

        if self.introspection_only.unwrap_or(false) {
            schema = schema.introspection_only();
        }

        if self.enable_federation.unwrap_or(false) {
            schema = schema.enable_federation();
        }

        schema
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DatabaseConfig {
    pub use_env: Option<bool>,
    pub database_url: Option<String>,
    #[serde(default = "DatabaseConfig::default_database_type")]
    pub database_type: DatabaseType,
    pub postgres: Option<PostgresConfig>,
}

impl DatabaseConfig {
    fn default_database_type() -> DatabaseType {
        DatabaseType::Postgres
    }

    pub async fn create_connection(&self) -> sqlx::Result<PgPool> {
        if let Some(postgres) = &self.postgres {
            let options = postgres.connect_options();
            return postgres.pool_options().connect_with(options).await;
        }

        if self.use_env.unwrap_or(true) {
            if let Ok(url) = std::env::var("DATABASE_URL") {
                return PgPool::connect(&url).await;
            }
        }

        if let Some(db_url) = &self.database_url {
            return PgPool::connect(db_url).await;
        }

        PgPool::connect("postgres://localhost/postgres").await
    }
}

#[derive(Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub application_name: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
    pub acquire_timeout: Option<u64>, // in seconds
    pub statement_cache_capacity: Option<usize>,
}

impl PostgresConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(self.host.as_deref().unwrap_or("localhost"))
            .port(self.port.unwrap_or(5432))
            .statement_cache_capacity(self.statement_cache_capacity.unwrap_or(100));

        if let Some(username) = &self.username {
            options = options.username(username);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        if let Some(database) = &self.database {
            options = options.database(database);
        }
        if let Some(application_name) = &self.application_name {
            options = options.application_name(application_name);
        }

        options
    }

    pub fn pool_options(&self) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(self.max_connections.unwrap_or(10))
            .min_connections(self.min_connections.unwrap_or(0))
            .acquire_timeout(Duration::from_secs(self.acquire_timeout.unwrap_or(30)))
    }
}

#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct ReflectionConfig {
    /// Schema whose catalog is reflected.
    pub allowed_schema: Option<String>,
    /// Model cache TTL in seconds.
    pub ttl_secs: Option<u64>,
}

impl ReflectionConfig {
    pub fn schema(&self) -> &str {
        self.allowed_schema.as_deref().unwrap_or("public")
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs.unwrap_or(60))
    }
}

#[derive(Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct CdcConfig {
    /// Per-table stream buffer; oldest events are dropped past this.
    pub buffer_size: Option<usize>,
}

impl CdcConfig {
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.unwrap_or(crate::cdc::DEFAULT_BUFFER_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config: GraphPgConfig = toml::from_str(
            r#"
            [server]
            host = "0.0.0.0"
            port = 8000

            [database]
            database-url = "postgres://localhost/app"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 8000);
        assert_eq!(config.database.database_type, DatabaseType::Postgres);
        assert_eq!(config.reflection.schema(), "public");
        assert_eq!(config.reflection.ttl(), Duration::from_secs(60));
        assert_eq!(config.cdc.buffer_size(), crate::cdc::DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn reflection_and_cdc_sections_override_defaults() {
        let config: GraphPgConfig = toml::from_str(
            r#"
            [server]
            host = "127.0.0.1"
            port = 4000

            [database]
            database-type = "POSTGRES"

            [reflection]
            allowed-schema = "sales"
            ttl-secs = 5

            [cdc]
            buffer-size = 64
            "#,
        )
        .unwrap();

        assert_eq!(config.reflection.schema(), "sales");
        assert_eq!(config.reflection.ttl(), Duration::from_secs(5));
        assert_eq!(config.cdc.buffer_size(), 64);
    }
}
