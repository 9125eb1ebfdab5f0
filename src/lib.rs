use std::sync::Arc;

use async_graphql::dynamic::SchemaBuilder;
use async_graphql::http::GraphiQLSource;
use async_graphql_axum::{GraphQL, GraphQLSubscription};
use axum::{Router, response::Html};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tracing::info;

use crate::cdc::CdcBus;
use crate::config::GraphPgConfig;
use crate::error::GraphPgError;
use crate::reflect::{Model, Reflector};
use crate::registry::{Capability, ServiceRegistry};

pub mod cdc;
pub mod coerce;
pub mod config;
pub mod cursor;
pub mod error;
pub mod generate;
pub mod loader;
pub mod pgtype;
pub mod reflect;
pub mod registry;
pub mod resolvers;
pub mod sqlgen;
pub mod utils;

/// The engine services for one database, resolved per dialect through the
/// registry.
pub struct Engine {
    pub registry: ServiceRegistry,
    pub reflector: Arc<Reflector>,
    pub cdc: Arc<CdcBus>,
}

pub struct GraphPg {
    config: GraphPgConfig,
}

impl GraphPg {
    pub fn new(config: GraphPgConfig) -> Self {
        Self { config }
    }

    /// Assemble the dialect service set for a pool: the reflector for the
    /// allowed schema and the CDC bus, registered and resolved through the
    /// service registry.
    pub fn engine(&self, pool: &PgPool) -> Result<Engine, GraphPgError> {
        let dialect = self.config.database.database_type;

        let mut registry = ServiceRegistry::new();
        registry.register(
            Capability::Reflection,
            dialect,
            Arc::new(Reflector::new(
                pool.clone(),
                self.config.reflection.schema(),
                self.config.reflection.ttl(),
            )),
        );
        registry.register(
            Capability::Cdc,
            dialect,
            Arc::new(CdcBus::new(self.config.cdc.buffer_size())),
        );

        let reflector = registry.lookup::<Reflector>(Capability::Reflection, dialect)?;
        let cdc = registry.lookup::<CdcBus>(Capability::Cdc, dialect)?;

        Ok(Engine {
            registry,
            reflector,
            cdc,
        })
    }

    pub async fn reflect(&self, engine: &Engine) -> Result<Arc<Model>, GraphPgError> {
        info!(schema = engine.reflector.schema(), "reflecting database schema");
        engine.reflector.reflect().await
    }

    pub fn build_schema(&self, model: &Arc<Model>) -> Result<SchemaBuilder, GraphPgError> {
        let builder = generate::generate(model)?;
        Ok(self.config.graphql.apply(builder))
    }

    /// Reflect, generate, and wire the HTTP surface.
    pub async fn build(
        &self,
        pool: &PgPool,
    ) -> async_graphql::Result<(Router, TcpListener, Engine)> {
        let engine = self.engine(pool)?;
        let model = self.reflect(&engine).await?;
        let builder = self.build_schema(&model)?;

        let schema = builder
            .data(pool.clone())
            .data(engine.cdc.clone())
            .finish()?;

        let mut router = Router::new();

        if self.config.graphql.enable_playground.unwrap_or(true) {
            router = router.route(
                "/",
                axum::routing::get(|| async move {
                    Html(
                        GraphiQLSource::build()
                            .endpoint("/")
                            .subscription_endpoint("/ws")
                            .finish(),
                    )
                })
                .post_service(GraphQL::new(schema.clone())),
            );
        } else {
            router = router.route(
                "/",
                axum::routing::post_service(GraphQL::new(schema.clone())),
            );
        }

        router = router.route_service("/ws", GraphQLSubscription::new(schema));

        let listener = TcpListener::bind(format!(
            "{}:{}",
            self.config.server.host, self.config.server.port
        ))
        .await?;

        Ok((router, listener, engine))
    }
}
