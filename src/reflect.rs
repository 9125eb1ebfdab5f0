//! Catalog reflection: queries the PostgreSQL catalog for the allowed schema
//! and produces an immutable [`Model`] snapshot. Snapshots are cached with a
//! TTL; concurrent callers past expiry coalesce on a single in-flight refresh
//! and all observe the same result. A failed refresh falls back to the stale
//! snapshot when one exists.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sqlx::PgPool;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::error::GraphPgError;

/// Immutable snapshot of the reflected catalog.
#[derive(Debug, Clone, Default)]
pub struct Model {
    pub tables: BTreeMap<String, TableInfo>,
    pub custom_types: BTreeMap<String, CustomType>,
}

#[derive(Debug, Clone)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<ColumnInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
    pub is_view: bool,
}

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    /// Canonical textual type as `format_type` renders it, precision and
    /// array suffix included (`numeric(10,2)`, `integer[]`).
    pub sql_type: String,
    pub primary_key: bool,
    pub nullable: bool,
    pub has_default: bool,
}

/// One foreign-key constraint. Composite keys keep their column pairs
/// grouped; `columns` is ordered by constraint ordinality.
#[derive(Debug, Clone)]
pub struct ForeignKeyInfo {
    pub constraint_name: String,
    pub referenced_table: String,
    pub columns: Vec<(String, String)>,
}

impl ForeignKeyInfo {
    /// Single-column FKs drive relationship generation; composite ones are
    /// reflected but produce no relationship fields.
    pub fn single_column(&self) -> Option<(&str, &str)> {
        match self.columns.as_slice() {
            [(col, referenced)] => Some((col.as_str(), referenced.as_str())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum CustomType {
    Enum {
        name: String,
        values: Vec<String>,
    },
    Composite {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Domain {
        name: String,
        base_type: String,
    },
}

impl CustomType {
    pub fn name(&self) -> &str {
        match self {
            CustomType::Enum { name, .. }
            | CustomType::Composite { name, .. }
            | CustomType::Domain { name, .. } => name,
        }
    }
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|col| col.name == name)
    }

    pub fn primary_key_columns(&self) -> Vec<&ColumnInfo> {
        self.columns.iter().filter(|col| col.primary_key).collect()
    }

    /// Foreign key whose owning column matches `column`, single-column only.
    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKeyInfo> {
        self.foreign_keys
            .iter()
            .find(|fk| matches!(fk.single_column(), Some((col, _)) if col == column))
    }
}

impl Model {
    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Resolve a column type through domain indirection to the type the
    /// classifier should see. Enum and composite names pass through.
    pub fn resolve_sql_type<'a>(&'a self, sql_type: &'a str) -> &'a str {
        match self.custom_types.get(crate::pgtype::base_type(sql_type).as_str()) {
            Some(CustomType::Domain { base_type, .. }) => base_type,
            _ => sql_type,
        }
    }

    pub fn enum_type(&self, sql_type: &str) -> Option<(&str, &[String])> {
        match self.custom_types.get(crate::pgtype::base_type(sql_type).as_str()) {
            Some(CustomType::Enum { name, values }) => Some((name.as_str(), values.as_slice())),
            _ => None,
        }
    }

    pub fn composite_type(&self, sql_type: &str) -> Option<(&str, &[(String, String)])> {
        match self.custom_types.get(crate::pgtype::base_type(sql_type).as_str()) {
            Some(CustomType::Composite { name, attributes }) => {
                Some((name.as_str(), attributes.as_slice()))
            }
            _ => None,
        }
    }
}

struct CachedModel {
    model: Arc<Model>,
    refreshed_at: Instant,
}

/// TTL-cached catalog reflector for one schema.
pub struct Reflector {
    pool: PgPool,
    schema: String,
    ttl: Duration,
    cached: RwLock<Option<CachedModel>>,
    refresh: Mutex<()>,
}

impl Reflector {
    pub fn new(pool: PgPool, schema: impl Into<String>, ttl: Duration) -> Self {
        Self {
            pool,
            schema: schema.into(),
            ttl,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Current model, refreshing from the catalog when the TTL has expired.
    pub async fn reflect(&self) -> Result<Arc<Model>, GraphPgError> {
        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.refreshed_at.elapsed() < self.ttl {
                return Ok(cached.model.clone());
            }
        }

        // Single-flight: one task runs the catalog pass, latecomers re-check
        // the cache once they acquire the guard.
        let _guard = self.refresh.lock().await;

        if let Some(cached) = self.cached.read().await.as_ref() {
            if cached.refreshed_at.elapsed() < self.ttl {
                return Ok(cached.model.clone());
            }
        }

        match self.read_catalog().await {
            Ok(model) => {
                let model = Arc::new(model);
                info!(
                    schema = %self.schema,
                    tables = model.tables.len(),
                    custom_types = model.custom_types.len(),
                    "reflected catalog"
                );
                *self.cached.write().await = Some(CachedModel {
                    model: model.clone(),
                    refreshed_at: Instant::now(),
                });
                Ok(model)
            }
            Err(err) => {
                let stale = self
                    .cached
                    .read()
                    .await
                    .as_ref()
                    .map(|cached| cached.model.clone());
                match stale {
                    Some(model) => {
                        warn!(schema = %self.schema, error = %err, "catalog refresh failed, serving stale model");
                        Ok(model)
                    }
                    None => Err(GraphPgError::Reflection(err)),
                }
            }
        }
    }

    /// Drop the cached snapshot; the next `reflect` call re-reads the catalog.
    pub async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    async fn read_catalog(&self) -> Result<Model, sqlx::Error> {
        debug!(schema = %self.schema, "reading catalog");

        let mut tables: BTreeMap<String, TableInfo> = BTreeMap::new();

        let relations = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT c.relname, c.relkind::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relkind IN ('r', 'p', 'v', 'm')
            ORDER BY c.relname
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (name, relkind) in relations {
            tables.insert(
                name.clone(),
                TableInfo {
                    name,
                    columns: Vec::new(),
                    foreign_keys: Vec::new(),
                    is_view: matches!(relkind.as_str(), "v" | "m"),
                },
            );
        }

        let columns = sqlx::query_as::<_, (String, String, String, bool, bool)>(
            r#"
            SELECT c.relname,
                   a.attname,
                   pg_catalog.format_type(a.atttypid, a.atttypmod),
                   NOT a.attnotnull,
                   a.atthasdef OR a.attidentity IN ('a', 'd')
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN ('r', 'p', 'v', 'm')
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY c.relname, a.attnum
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (table, column, sql_type, nullable, has_default) in columns {
            if let Some(info) = tables.get_mut(&table) {
                info.columns.push(ColumnInfo {
                    name: column,
                    sql_type,
                    primary_key: false,
                    nullable,
                    has_default,
                });
            }
        }

        let primary_keys = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT c.relname, a.attname
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN LATERAL unnest(con.conkey) AS k(attnum) ON true
            JOIN pg_catalog.pg_attribute a
              ON a.attrelid = c.oid AND a.attnum = k.attnum
            WHERE n.nspname = $1 AND con.contype = 'p'
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (table, column) in primary_keys {
            if let Some(info) = tables.get_mut(&table) {
                // Views never carry primary-key markers.
                if info.is_view {
                    continue;
                }
                if let Some(col) = info.columns.iter_mut().find(|col| col.name == column) {
                    col.primary_key = true;
                }
            }
        }

        let foreign_keys = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT con.conname,
                   src.relname,
                   ref.relname,
                   a.attname,
                   ra.attname
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class src ON src.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = src.relnamespace
            JOIN pg_catalog.pg_class ref ON ref.oid = con.confrelid
            JOIN LATERAL unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord) ON true
            JOIN LATERAL unnest(con.confkey) WITH ORDINALITY AS rk(attnum, ord)
              ON rk.ord = k.ord
            JOIN pg_catalog.pg_attribute a
              ON a.attrelid = src.oid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra
              ON ra.attrelid = ref.oid AND ra.attnum = rk.attnum
            WHERE n.nspname = $1 AND con.contype = 'f'
            ORDER BY src.relname, con.conname, k.ord
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (constraint, table, referenced_table, column, referenced_column) in foreign_keys {
            if let Some(info) = tables.get_mut(&table) {
                match info
                    .foreign_keys
                    .iter_mut()
                    .find(|fk| fk.constraint_name == constraint)
                {
                    Some(fk) => fk.columns.push((column, referenced_column)),
                    None => info.foreign_keys.push(ForeignKeyInfo {
                        constraint_name: constraint,
                        referenced_table,
                        columns: vec![(column, referenced_column)],
                    }),
                }
            }
        }

        let mut custom_types: BTreeMap<String, CustomType> = BTreeMap::new();

        let enum_values = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT t.typname, e.enumlabel
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_enum e ON e.enumtypid = t.oid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1
            ORDER BY t.typname, e.enumsortorder
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (name, label) in enum_values {
            match custom_types.get_mut(&name) {
                Some(CustomType::Enum { values, .. }) => values.push(label),
                _ => {
                    custom_types.insert(
                        name.clone(),
                        CustomType::Enum {
                            name,
                            values: vec![label],
                        },
                    );
                }
            }
        }

        let composite_attrs = sqlx::query_as::<_, (String, String, String)>(
            r#"
            SELECT t.typname,
                   a.attname,
                   pg_catalog.format_type(a.atttypid, a.atttypmod)
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_class c ON c.oid = t.typrelid AND c.relkind = 'c'
            JOIN pg_catalog.pg_attribute a
              ON a.attrelid = c.oid AND a.attnum > 0 AND NOT a.attisdropped
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1
            ORDER BY t.typname, a.attnum
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (name, attr, sql_type) in composite_attrs {
            match custom_types.get_mut(&name) {
                Some(CustomType::Composite { attributes, .. }) => {
                    attributes.push((attr, sql_type))
                }
                _ => {
                    custom_types.insert(
                        name.clone(),
                        CustomType::Composite {
                            name,
                            attributes: vec![(attr, sql_type)],
                        },
                    );
                }
            }
        }

        let domains = sqlx::query_as::<_, (String, String)>(
            r#"
            SELECT t.typname,
                   pg_catalog.format_type(t.typbasetype, t.typtypmod)
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_namespace n ON n.oid = t.typnamespace
            WHERE n.nspname = $1 AND t.typtype = 'd'
            ORDER BY t.typname
            "#,
        )
        .bind(&self.schema)
        .fetch_all(&self.pool)
        .await?;

        for (name, base_type) in domains {
            custom_types.insert(name.clone(), CustomType::Domain { name, base_type });
        }

        Ok(Model {
            tables,
            custom_types,
        })
    }
}
