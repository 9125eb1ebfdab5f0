//! Per-request relationship preloading.
//!
//! Before relationship resolvers run, the parent fetcher plans one batch
//! query per selected relationship, executes it, and parks the results in a
//! [`BatchContext`] keyed by the join-column value. Relationship resolvers
//! then perform map lookups only, so a page of N parents costs exactly two
//! round-trips per relationship.

use std::collections::HashMap;

use async_graphql::Value as GqlValue;
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::debug;

use crate::error::GraphPgError;
use crate::reflect::{Model, TableInfo};
use crate::sqlgen;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipKind {
    /// FK on the parent table pointing at one referenced row.
    Forward,
    /// FK on another table pointing back at the parent; resolves to a list.
    Reverse,
}

/// One planned batch fetch, derived from the client selection set.
#[derive(Debug, Clone)]
pub struct RelationshipPlan {
    /// GraphQL field name on the parent object.
    pub field_name: String,
    /// Table the batch query runs against.
    pub target_table: String,
    /// Column on the parent rows whose values seed the IN list.
    pub local_column: String,
    /// Column on the target table matched by the IN list.
    pub remote_column: String,
    pub kind: RelationshipKind,
    /// Columns to project on the target table.
    pub projection: Vec<String>,
}

/// Preloaded relationship records for one request.
#[derive(Debug, Default)]
pub struct BatchContext {
    /// `field_name → {join value → record}`
    forward: HashMap<String, HashMap<String, JsonValue>>,
    /// `field_name → {join value → records}`
    reverse: HashMap<String, HashMap<String, Vec<JsonValue>>>,
}

impl BatchContext {
    pub fn lookup_forward(&self, field: &str, key: &JsonValue) -> Option<&JsonValue> {
        let key = join_key(key)?;
        self.forward.get(field)?.get(&key)
    }

    pub fn lookup_reverse(&self, field: &str, key: &JsonValue) -> Option<&[JsonValue]> {
        let key = join_key(key)?;
        self.reverse
            .get(field)
            .and_then(|map| map.get(&key))
            .map(|records| records.as_slice())
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.forward.contains_key(field) || self.reverse.contains_key(field)
    }
}

/// Canonical map key for a join-column value. NULLs never join.
fn join_key(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

/// The selection of one field: its name plus the names of its sub-fields.
pub type FieldSelection = (String, Vec<String>);

/// Derive the batch plans for a parent query from the client selection set.
/// Relationships with no sub-selection, unknown target tables, and composite
/// foreign keys are skipped.
pub fn plan_relationships(
    model: &Model,
    table: &TableInfo,
    selections: &[FieldSelection],
) -> Vec<RelationshipPlan> {
    let mut plans = Vec::new();

    for fk in &table.foreign_keys {
        let Some((local, remote)) = fk.single_column() else {
            continue;
        };
        let field_name = fk.referenced_table.to_lowercase();
        let Some((_, subfields)) = selections
            .iter()
            .find(|(name, subs)| *name == field_name && !subs.is_empty())
        else {
            continue;
        };
        let Some(target) = model.table(&fk.referenced_table) else {
            continue;
        };

        plans.push(RelationshipPlan {
            field_name,
            target_table: target.name.clone(),
            local_column: local.to_string(),
            remote_column: remote.to_string(),
            kind: RelationshipKind::Forward,
            projection: target_projection(target, subfields, remote),
        });
    }

    // Reverse relationships: other tables whose FK references this one.
    for source in model.tables.values() {
        if source.is_view || source.name == table.name {
            continue;
        }
        for fk in &source.foreign_keys {
            if fk.referenced_table != table.name {
                continue;
            }
            let Some((remote, local)) = fk.single_column() else {
                continue;
            };
            let field_name = source.name.to_lowercase();
            let Some((_, subfields)) = selections
                .iter()
                .find(|(name, subs)| *name == field_name && !subs.is_empty())
            else {
                continue;
            };

            plans.push(RelationshipPlan {
                field_name,
                target_table: source.name.clone(),
                local_column: local.to_string(),
                remote_column: remote.to_string(),
                kind: RelationshipKind::Reverse,
                projection: target_projection(source, subfields, remote),
            });
        }
    }

    plans
}

/// Selected fields restricted to real columns, plus the join column and
/// primary key the engine always needs.
fn target_projection(target: &TableInfo, subfields: &[String], remote_column: &str) -> Vec<String> {
    let mut projection: Vec<String> = Vec::new();

    let mut push = |projection: &mut Vec<String>, name: &str| {
        if target.column(name).is_some() && !projection.iter().any(|existing| existing == name) {
            projection.push(name.to_string());
        }
    };

    for field in subfields {
        push(&mut projection, field);
    }
    push(&mut projection, remote_column);
    for pk in target.primary_key_columns() {
        push(&mut projection, &pk.name);
    }
    // Join columns for one nested level of relationship fields.
    for fk in &target.foreign_keys {
        if let Some((local, _)) = fk.single_column() {
            if subfields
                .iter()
                .any(|field| *field == fk.referenced_table.to_lowercase())
            {
                push(&mut projection, local);
            }
        }
    }

    projection
}

/// Collect the distinct non-null values of `column` across the parent rows,
/// as GraphQL literals ready for binding.
fn collect_keys(rows: &[JsonValue], column: &str) -> Vec<GqlValue> {
    let mut seen = Vec::new();
    let mut keys = Vec::new();

    for row in rows {
        let Some(value) = row.get(column) else {
            continue;
        };
        let Some(canonical) = join_key(value) else {
            continue;
        };
        if seen.contains(&canonical) {
            continue;
        }
        seen.push(canonical);
        if let Ok(literal) = GqlValue::from_json(value.clone()) {
            keys.push(literal);
        }
    }

    keys
}

/// Execute the batch plans against the pool and build the request's batch
/// context. Plans whose key set turns out empty are skipped silently.
pub async fn preload(
    pool: &PgPool,
    model: &Model,
    plans: &[RelationshipPlan],
    parent_rows: &[JsonValue],
) -> Result<BatchContext, GraphPgError> {
    let mut context = BatchContext::default();

    for plan in plans {
        let keys = collect_keys(parent_rows, &plan.local_column);
        if keys.is_empty() {
            continue;
        }
        let Some(target) = model.table(&plan.target_table) else {
            continue;
        };

        let query = sqlgen::build_batch_select(
            model,
            target,
            &plan.remote_column,
            &keys,
            &plan.projection,
        )?;
        debug!(
            table = %plan.target_table,
            field = %plan.field_name,
            keys = keys.len(),
            "preloading relationship batch"
        );

        let rows: Vec<(JsonValue,)> = sqlx::query_as_with(&query.sql, query.values)
            .fetch_all(pool)
            .await
            .map_err(GraphPgError::DataFetch)?;

        match plan.kind {
            RelationshipKind::Forward => {
                let map = context.forward.entry(plan.field_name.clone()).or_default();
                for (row,) in rows {
                    if let Some(key) = row.get(&plan.remote_column).and_then(join_key) {
                        map.insert(key, row);
                    }
                }
            }
            RelationshipKind::Reverse => {
                let map = context.reverse.entry(plan.field_name.clone()).or_default();
                for (row,) in rows {
                    if let Some(key) = row.get(&plan.remote_column).and_then(join_key) {
                        map.entry(key).or_default().push(row);
                    }
                }
            }
        }
    }

    Ok(context)
}
