//! Field resolvers. Each generated GraphQL field closes over the reflected
//! model and delegates here; the functions translate arguments and selection
//! sets into SQL via [`crate::sqlgen`], execute it on the pool from the
//! schema context, and hand materialized JSON rows (plus the per-request
//! batch context) down the resolver tree as owned payloads.

use std::sync::Arc;

use async_graphql::Value as GqlValue;
use async_graphql::dynamic::{FieldFuture, FieldValue, ObjectAccessor, ResolverContext};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use tracing::{debug, warn};

use crate::cursor;
use crate::error::GraphPgError;
use crate::loader::{self, BatchContext, FieldSelection, RelationshipKind};
use crate::reflect::{Model, TableInfo};
use crate::sqlgen::{
    self, AggregateSelection, FilterClause, FilterOp, Filters, KeysetBound, KeysetDirection,
    OrderDirection, OrderSpec, SelectParams,
};

/// One materialized row travelling down the resolver tree.
pub struct Node {
    pub table: String,
    pub row: JsonValue,
    pub batch: Arc<BatchContext>,
}

pub struct ConnectionValue {
    pub table: String,
    pub rows: Vec<JsonValue>,
    pub cursors: Vec<String>,
    pub has_next: bool,
    pub has_previous: bool,
    pub total_count: Option<i64>,
    pub batch: Arc<BatchContext>,
}

pub struct EdgeValue {
    pub table: String,
    pub row: JsonValue,
    pub cursor: String,
    pub batch: Arc<BatchContext>,
}

pub struct PageInfoValue {
    pub has_next: bool,
    pub has_previous: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

pub struct AggregateRow {
    pub row: JsonValue,
}

pub struct AggregateSection {
    pub row: JsonValue,
    pub prefix: &'static str,
}

fn gql<T>(result: Result<T, GraphPgError>) -> async_graphql::Result<T> {
    result.map_err(GraphPgError::into_graphql)
}

async fn fetch_json_rows(
    pool: &PgPool,
    query: sqlgen::BuiltQuery,
) -> Result<Vec<JsonValue>, GraphPgError> {
    debug!(sql = %query.sql, "executing query");
    let rows: Vec<(JsonValue,)> = sqlx::query_as_with(&query.sql, query.values)
        .fetch_all(pool)
        .await
        .map_err(GraphPgError::DataFetch)?;
    Ok(rows.into_iter().map(|(row,)| row).collect())
}

/// Names of the immediate sub-fields of the current field.
fn field_selections(ctx: &ResolverContext<'_>) -> Vec<FieldSelection> {
    ctx.field()
        .selection_set()
        .map(|field| {
            (
                field.name().to_string(),
                field
                    .selection_set()
                    .map(|sub| sub.name().to_string())
                    .collect(),
            )
        })
        .collect()
}

/// Sub-fields of `edges { node { … } }` for connection queries.
fn connection_node_selections(ctx: &ResolverContext<'_>) -> Vec<FieldSelection> {
    for field in ctx.field().selection_set() {
        if field.name() != "edges" {
            continue;
        }
        for edge_field in field.selection_set() {
            if edge_field.name() != "node" {
                continue;
            }
            return edge_field
                .selection_set()
                .map(|sub| {
                    (
                        sub.name().to_string(),
                        sub.selection_set()
                            .map(|leaf| leaf.name().to_string())
                            .collect(),
                    )
                })
                .collect();
        }
    }
    Vec::new()
}

fn selection_names(selections: &[FieldSelection]) -> Vec<String> {
    selections.iter().map(|(name, _)| name.clone()).collect()
}

/// Columns to project: the selected column fields, the primary key, the join
/// columns of selected relationships, and any extra columns the caller needs
/// (ordering columns for cursor pages).
fn projection_for(
    table: &TableInfo,
    selections: &[FieldSelection],
    extra: &[String],
) -> Vec<String> {
    let selected = selection_names(selections);
    let mut projection: Vec<String> = Vec::new();

    fn push(projection: &mut Vec<String>, name: &str) {
        if !projection.iter().any(|existing| existing == name) {
            projection.push(name.to_string());
        }
    }

    for column in &table.columns {
        if selected.iter().any(|name| *name == column.name) {
            push(&mut projection, &column.name);
        }
    }
    for column in table.primary_key_columns() {
        push(&mut projection, &column.name);
    }
    for fk in &table.foreign_keys {
        if let Some((local, _)) = fk.single_column() {
            if selected
                .iter()
                .any(|name| *name == fk.referenced_table.to_lowercase())
            {
                push(&mut projection, local);
            }
        }
    }
    for column in extra {
        if table.column(column).is_some() {
            push(&mut projection, column);
        }
    }

    // A projection can never be empty; fall back to every column.
    if projection.is_empty() {
        for column in &table.columns {
            push(&mut projection, &column.name);
        }
    }

    projection
}

const RESERVED_ARGS: &[&str] = &[
    "limit", "offset", "first", "after", "last", "before", "orderBy", "where", "or",
];

/// Pagination arguments of a list or connection field.
#[derive(Debug, Default)]
struct PageArgs {
    limit: Option<u64>,
    offset: Option<u64>,
    first: Option<u64>,
    after: Option<String>,
    last: Option<u64>,
    before: Option<String>,
}

fn accessor_value(accessor: &async_graphql::dynamic::ValueAccessor<'_>) -> GqlValue {
    accessor.deserialize::<GqlValue>().unwrap_or(GqlValue::Null)
}

/// Split the flat argument list into filters and paging, honoring the
/// `<col>`, `<col>_<op>`, `where`, and `or` forms.
fn parse_args(
    table: &TableInfo,
    args: &ObjectAccessor<'_>,
) -> async_graphql::Result<(Filters, Option<OrderSpec>, PageArgs)> {
    let mut filters = Filters::default();
    let mut order = None;
    let mut page = PageArgs::default();

    for (name, accessor) in args.iter() {
        let name = name.as_str();
        match name {
            "limit" => page.limit = Some(accessor.u64()?),
            "offset" => page.offset = Some(accessor.u64()?),
            "first" => page.first = Some(accessor.u64()?),
            "last" => page.last = Some(accessor.u64()?),
            "after" => page.after = Some(accessor.string()?.to_string()),
            "before" => page.before = Some(accessor.string()?.to_string()),
            "orderBy" => order = Some(parse_order_by(&accessor.object()?)?),
            "where" => parse_filter_object(table, &accessor.object()?, &mut filters.conjuncts)?,
            "or" => {
                for item in accessor.list()?.iter() {
                    let mut group = Vec::new();
                    parse_filter_object(table, &item.object()?, &mut group)?;
                    filters.or_groups.push(group);
                }
            }
            _ => parse_flat_filter(table, name, accessor_value(&accessor), &mut filters)?,
        }
    }

    Ok((filters, order, page))
}

fn parse_flat_filter(
    table: &TableInfo,
    name: &str,
    value: GqlValue,
    filters: &mut Filters,
) -> async_graphql::Result<()> {
    if RESERVED_ARGS.contains(&name) {
        return Ok(());
    }

    if table.column(name).is_some() {
        filters.conjuncts.push(FilterClause {
            column: name.to_string(),
            op: FilterOp::Eq,
            value,
        });
        return Ok(());
    }

    if let Some((column, suffix)) = name.rsplit_once('_') {
        if table.column(column).is_some() {
            if let Some(op) = FilterOp::from_suffix(suffix) {
                filters.conjuncts.push(FilterClause {
                    column: column.to_string(),
                    op,
                    value,
                });
                return Ok(());
            }
        }
    }

    // Unknown arguments never reach here through a validated schema.
    warn!(argument = name, table = %table.name, "ignoring unknown filter argument");
    Ok(())
}

/// `where: {col: {op: value, …}, …}` into clauses.
fn parse_filter_object(
    table: &TableInfo,
    object: &ObjectAccessor<'_>,
    clauses: &mut Vec<FilterClause>,
) -> async_graphql::Result<()> {
    for (column, operators) in object.iter() {
        let column = column.as_str();
        if table.column(column).is_none() {
            continue;
        }
        for (op_name, value) in operators.object()?.iter() {
            let Some(op) = FilterOp::from_suffix(op_name.as_str()) else {
                continue;
            };
            clauses.push(FilterClause {
                column: column.to_string(),
                op,
                value: accessor_value(&value),
            });
        }
    }
    Ok(())
}

fn parse_order_by(object: &ObjectAccessor<'_>) -> async_graphql::Result<OrderSpec> {
    let mut spec = OrderSpec::default();
    for (column, direction) in object.iter() {
        let direction = match direction.enum_name()? {
            "DESC" => OrderDirection::Desc,
            _ => OrderDirection::Asc,
        };
        spec.columns.push((column.to_string(), direction));
    }
    Ok(spec)
}

fn render_cursor_value(value: &JsonValue) -> String {
    match value {
        JsonValue::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn cursor_for_row(row: &JsonValue, order: &OrderSpec) -> String {
    let parts: Vec<(String, String)> = order
        .columns
        .iter()
        .map(|(column, _)| {
            (
                column.clone(),
                render_cursor_value(row.get(column).unwrap_or(&JsonValue::Null)),
            )
        })
        .collect();
    cursor::encode(&parts)
}

fn node_value(table: &str, row: JsonValue, batch: &Arc<BatchContext>) -> FieldValue<'static> {
    FieldValue::owned_any(Node {
        table: table.to_string(),
        row,
        batch: batch.clone(),
    })
}

/// Resolver of the root list field (`<name>`).
pub fn list_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let (filters, order, page) = parse_args(table, &ctx.args)?;
        let order = order.unwrap_or_default();
        let selections = field_selections(&ctx);
        let projection = projection_for(table, &selections, &order.column_names());

        let query = gql(sqlgen::build_select(
            &model,
            table,
            &SelectParams {
                projection: &projection,
                filters: &filters,
                order: &order,
                limit: page.limit,
                offset: page.offset,
                keyset: None,
                reverse_scan: false,
            },
        ))?;

        let rows = gql(fetch_json_rows(pool, query).await)?;

        let plans = loader::plan_relationships(&model, table, &selections);
        let batch = Arc::new(gql(loader::preload(pool, &model, &plans, &rows).await)?);

        debug!(table = %table_name, rows = rows.len(), "list query resolved");

        Ok(Some(FieldValue::list(
            rows.into_iter()
                .map(|row| node_value(&table_name, row, &batch)),
        )))
    })
}

/// Resolver of the `<name>Connection` field: keyset/offset pagination with
/// Relay-style edges.
pub fn connection_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let (filters, order, page) = parse_args(table, &ctx.args)?;

        if page.first.is_some() && page.last.is_some() {
            return Err(async_graphql::Error::new(
                "'first' and 'last' cannot be combined in one query",
            ));
        }

        let order = match order {
            Some(order) if !order.is_empty() => order,
            _ => {
                // Cursor pagination needs a total order; fall back to the
                // primary key so the emitted cursors stay valid.
                warn!(table = %table_name, "connection query without orderBy, defaulting to primary key");
                OrderSpec::primary_key_asc(table)
            }
        };

        let keyset = match (&page.after, &page.before) {
            (Some(after), _) => Some(KeysetBound {
                values: gql(cursor::decode("after", after, &order.column_names()))?,
                direction: KeysetDirection::After,
            }),
            (None, Some(before)) => Some(KeysetBound {
                values: gql(cursor::decode("before", before, &order.column_names()))?,
                direction: KeysetDirection::Before,
            }),
            (None, None) => None,
        };

        let backwards = page.last.is_some();
        let requested = page.first.or(page.last);
        // One surplus row answers hasNextPage without a second query.
        let fetch_limit = requested.map(|count| count + 1);

        let selections = connection_node_selections(&ctx);
        let projection = projection_for(table, &selections, &order.column_names());

        let query = gql(sqlgen::build_select(
            &model,
            table,
            &SelectParams {
                projection: &projection,
                filters: &filters,
                order: &order,
                limit: fetch_limit,
                offset: page.offset,
                keyset: keyset.as_ref(),
                reverse_scan: backwards,
            },
        ))?;

        let mut rows = gql(fetch_json_rows(pool, query).await)?;

        let mut has_more = false;
        if let Some(count) = requested {
            if rows.len() as u64 > count {
                rows.truncate(count as usize);
                has_more = true;
            }
        }
        if backwards {
            rows.reverse();
        }

        let (has_next, has_previous) = if backwards {
            (page.before.is_some(), has_more)
        } else {
            (
                has_more,
                page.after.is_some() || page.offset.unwrap_or(0) > 0,
            )
        };

        let total_count = if ctx
            .field()
            .selection_set()
            .any(|field| field.name() == "totalCount")
        {
            let count_query = gql(sqlgen::build_count(&model, table, &filters))?;
            let count: (i64,) = sqlx::query_as_with(&count_query.sql, count_query.values)
                .fetch_one(pool)
                .await
                .map_err(|err| GraphPgError::DataFetch(err).into_graphql())?;
            Some(count.0)
        } else {
            None
        };

        let cursors: Vec<String> = rows.iter().map(|row| cursor_for_row(row, &order)).collect();

        let plans = loader::plan_relationships(&model, table, &selections);
        let batch = Arc::new(gql(loader::preload(pool, &model, &plans, &rows).await)?);

        Ok(Some(FieldValue::owned_any(ConnectionValue {
            table: table_name,
            rows,
            cursors,
            has_next,
            has_previous,
            total_count,
            batch,
        })))
    })
}

/// `edges` on a connection object.
pub fn edges_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        let edges: Vec<FieldValue> = connection
            .rows
            .iter()
            .zip(&connection.cursors)
            .map(|(row, cursor)| {
                FieldValue::owned_any(EdgeValue {
                    table: connection.table.clone(),
                    row: row.clone(),
                    cursor: cursor.clone(),
                    batch: connection.batch.clone(),
                })
            })
            .collect();
        Ok(Some(FieldValue::list(edges)))
    })
}

pub fn edge_node_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let edge = ctx.parent_value.try_downcast_ref::<EdgeValue>()?;
        Ok(Some(node_value(&edge.table, edge.row.clone(), &edge.batch)))
    })
}

pub fn edge_cursor_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let edge = ctx.parent_value.try_downcast_ref::<EdgeValue>()?;
        Ok(Some(FieldValue::value(edge.cursor.clone())))
    })
}

pub fn page_info_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::owned_any(PageInfoValue {
            has_next: connection.has_next,
            has_previous: connection.has_previous,
            start_cursor: connection.cursors.first().cloned(),
            end_cursor: connection.cursors.last().cloned(),
        })))
    })
}

pub fn page_info_field_resolver<'a>(field: &'static str, ctx: ResolverContext<'a>) -> FieldFuture<'a> {
    FieldFuture::new(async move {
        let info = ctx.parent_value.try_downcast_ref::<PageInfoValue>()?;
        let value = match field {
            "hasNextPage" => GqlValue::Boolean(info.has_next),
            "hasPreviousPage" => GqlValue::Boolean(info.has_previous),
            "startCursor" => info
                .start_cursor
                .clone()
                .map(GqlValue::String)
                .unwrap_or(GqlValue::Null),
            _ => info
                .end_cursor
                .clone()
                .map(GqlValue::String)
                .unwrap_or(GqlValue::Null),
        };
        Ok(Some(FieldValue::value(value)))
    })
}

pub fn total_count_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let connection = ctx.parent_value.try_downcast_ref::<ConnectionValue>()?;
        Ok(Some(FieldValue::value(GqlValue::from(
            connection.total_count.unwrap_or_default(),
        ))))
    })
}

/// Plain column field on a table object.
pub fn column_resolver(column: String, ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let node = ctx.parent_value.try_downcast_ref::<Node>()?;
        let value = node.row.get(&column).cloned().unwrap_or(JsonValue::Null);
        Ok(Some(FieldValue::value(GqlValue::from_json(value)?)))
    })
}

/// Attribute field on a composite-type object; the parent is the JSON object
/// `row_to_json` produced for the composite column.
pub fn composite_attr_resolver(attribute: String, ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let parent = ctx
            .parent_value
            .as_value()
            .cloned()
            .unwrap_or(GqlValue::Null);
        let value = match parent {
            GqlValue::Object(map) => map
                .get(attribute.as_str())
                .cloned()
                .unwrap_or(GqlValue::Null),
            _ => GqlValue::Null,
        };
        Ok(Some(FieldValue::value(value)))
    })
}

/// Relationship field. Preloaded pages resolve with a map lookup; nodes that
/// were not part of a preloaded page (nested levels) fall back to one query.
pub fn relationship_resolver(
    model: Arc<Model>,
    field_name: String,
    kind: RelationshipKind,
    local_column: String,
    target_table: String,
    remote_column: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let node = ctx.parent_value.try_downcast_ref::<Node>()?;
        let key = node
            .row
            .get(&local_column)
            .cloned()
            .unwrap_or(JsonValue::Null);
        if key.is_null() {
            return Ok(match kind {
                RelationshipKind::Forward => None,
                RelationshipKind::Reverse => Some(FieldValue::list(Vec::<FieldValue>::new())),
            });
        }

        if node.batch.has_field(&field_name) {
            return Ok(match kind {
                RelationshipKind::Forward => node
                    .batch
                    .lookup_forward(&field_name, &key)
                    .map(|row| node_value(&target_table, row.clone(), &node.batch)),
                RelationshipKind::Reverse => {
                    let rows = node
                        .batch
                        .lookup_reverse(&field_name, &key)
                        .unwrap_or_default();
                    Some(FieldValue::list(
                        rows.iter()
                            .map(|row| node_value(&target_table, row.clone(), &node.batch)),
                    ))
                }
            });
        }

        // Not preloaded: one direct query against the referenced table.
        let pool = ctx.data::<PgPool>()?;
        let target = model
            .table(&target_table)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let selections = field_selections(&ctx);
        let projection = projection_for(target, &selections, &[remote_column.clone()]);
        let filters = Filters {
            conjuncts: vec![FilterClause {
                column: remote_column,
                op: FilterOp::Eq,
                value: GqlValue::from_json(key).unwrap_or(GqlValue::Null),
            }],
            or_groups: vec![],
        };

        let query = gql(sqlgen::build_select(
            &model,
            target,
            &SelectParams {
                projection: &projection,
                filters: &filters,
                order: &OrderSpec::default(),
                limit: None,
                offset: None,
                keyset: None,
                reverse_scan: false,
            },
        ))?;
        let rows = gql(fetch_json_rows(pool, query).await)?;

        let plans = loader::plan_relationships(&model, target, &selections);
        let batch = Arc::new(gql(loader::preload(pool, &model, &plans, &rows).await)?);

        Ok(match kind {
            RelationshipKind::Forward => rows
                .into_iter()
                .next()
                .map(|row| node_value(&target_table, row, &batch)),
            RelationshipKind::Reverse => Some(FieldValue::list(
                rows.into_iter()
                    .map(|row| node_value(&target_table, row, &batch)),
            )),
        })
    })
}

/// `<name>Aggregate`: one SQL query computing the selected aggregates.
pub fn aggregate_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let (filters, _, _) = parse_args(table, &ctx.args)?;

        let mut selection = AggregateSelection::default();
        for field in ctx.field().selection_set() {
            let columns: Vec<String> = field
                .selection_set()
                .map(|sub| sub.name().to_string())
                .collect();
            match field.name() {
                "count" => selection.count = true,
                "sum" => selection.sum = columns,
                "avg" => selection.avg = columns,
                "min" => selection.min = columns,
                "max" => selection.max = columns,
                _ => {}
            }
        }
        if selection.is_empty() {
            selection.count = true;
        }

        let query = gql(sqlgen::build_aggregate(&model, table, &filters, &selection))?;
        let rows = gql(fetch_json_rows(pool, query).await)?;
        let row = rows.into_iter().next().unwrap_or(JsonValue::Null);

        Ok(Some(FieldValue::owned_any(AggregateRow { row })))
    })
}

pub fn aggregate_count_resolver(ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let aggregate = ctx.parent_value.try_downcast_ref::<AggregateRow>()?;
        let count = aggregate
            .row
            .get("count")
            .cloned()
            .unwrap_or(JsonValue::from(0));
        Ok(Some(FieldValue::value(GqlValue::from_json(count)?)))
    })
}

pub fn aggregate_section_resolver<'a>(
    prefix: &'static str,
    ctx: ResolverContext<'a>,
) -> FieldFuture<'a> {
    FieldFuture::new(async move {
        let aggregate = ctx.parent_value.try_downcast_ref::<AggregateRow>()?;
        Ok(Some(FieldValue::owned_any(AggregateSection {
            row: aggregate.row.clone(),
            prefix,
        })))
    })
}

pub fn aggregate_column_resolver(column: String, ctx: ResolverContext<'_>) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let section = ctx.parent_value.try_downcast_ref::<AggregateSection>()?;
        let value = section
            .row
            .get(format!("{}_{column}", section.prefix))
            .cloned()
            .unwrap_or(JsonValue::Null);
        Ok(Some(FieldValue::value(GqlValue::from_json(value)?)))
    })
}

fn input_pairs(object: &ObjectAccessor<'_>) -> Vec<(String, GqlValue)> {
    object
        .iter()
        .map(|(name, value)| (name.to_string(), accessor_value(&value)))
        .collect()
}

async fn insert_row(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    model: &Model,
    table: &TableInfo,
    input: &[(String, GqlValue)],
) -> Result<JsonValue, GraphPgError> {
    let query = sqlgen::build_insert(model, table, input)?;
    debug!(sql = %query.sql, table = %table.name, "executing insert");
    let (row,): (JsonValue,) = sqlx::query_as_with(&query.sql, query.values)
        .fetch_one(&mut **tx)
        .await
        .map_err(GraphPgError::DataFetch)?;
    Ok(row)
}

/// `create<Name>` mutation: one row, one transaction.
pub fn create_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;
        let input = input_pairs(&ctx.args.try_get("input")?.object()?);

        let mut tx = gql(pool.begin().await.map_err(GraphPgError::DataFetch))?;
        let row = gql(insert_row(&mut tx, &model, table, &input).await)?;
        gql(tx.commit().await.map_err(GraphPgError::DataFetch))?;

        Ok(Some(node_value(
            &table_name,
            row,
            &Arc::new(BatchContext::default()),
        )))
    })
}

/// `createMany<Name>s` mutation: all rows in one transaction; any failure
/// rolls back the lot.
pub fn create_many_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let inputs: Vec<Vec<(String, GqlValue)>> = ctx
            .args
            .try_get("inputs")?
            .list()?
            .iter()
            .map(|item| item.object().map(|object| input_pairs(&object)))
            .collect::<Result<_, _>>()?;

        let mut tx = gql(pool.begin().await.map_err(GraphPgError::DataFetch))?;
        let mut rows = Vec::with_capacity(inputs.len());
        for input in &inputs {
            rows.push(gql(insert_row(&mut tx, &model, table, input).await)?);
        }
        gql(tx.commit().await.map_err(GraphPgError::DataFetch))?;

        let batch = Arc::new(BatchContext::default());
        Ok(Some(FieldValue::list(
            rows.into_iter()
                .map(|row| node_value(&table_name, row, &batch)),
        )))
    })
}

/// `update<Name>` mutation: primary-key fields select the row, the rest are
/// applied as changes.
pub fn update_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;
        let input = input_pairs(&ctx.args.try_get("input")?.object()?);

        let mut key = Vec::new();
        let mut changes = Vec::new();
        for (name, value) in input {
            let is_pk = table
                .column(&name)
                .map(|column| column.primary_key)
                .unwrap_or(false);
            if is_pk {
                key.push((name, value));
            } else {
                changes.push((name, value));
            }
        }

        if key.is_empty() {
            return Err(GraphPgError::MutationValidation(format!(
                "primary key required to update '{table_name}'"
            ))
            .into_graphql());
        }

        let query = gql(sqlgen::build_update(&model, table, &key, &changes))?;
        let mut tx = gql(pool.begin().await.map_err(GraphPgError::DataFetch))?;
        let (row,): (JsonValue,) = sqlx::query_as_with(&query.sql, query.values)
            .fetch_one(&mut *tx)
            .await
            .map_err(|err| GraphPgError::DataFetch(err).into_graphql())?;
        gql(tx.commit().await.map_err(GraphPgError::DataFetch))?;

        Ok(Some(node_value(
            &table_name,
            row,
            &Arc::new(BatchContext::default()),
        )))
    })
}

/// `delete<Name>` mutation; resolves to whether a row was removed.
pub fn delete_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;

        let pk_columns = table.primary_key_columns();
        let mut key = Vec::new();
        if pk_columns.len() == 1 {
            key.push((
                pk_columns[0].name.clone(),
                accessor_value(&ctx.args.try_get("id")?),
            ));
        } else {
            for column in &pk_columns {
                key.push((
                    column.name.clone(),
                    accessor_value(&ctx.args.try_get(&column.name)?),
                ));
            }
        }

        let query = gql(sqlgen::build_delete(&model, table, &key))?;
        let mut tx = gql(pool.begin().await.map_err(GraphPgError::DataFetch))?;
        let result = sqlx::query_with(&query.sql, query.values)
            .execute(&mut *tx)
            .await
            .map_err(|err| GraphPgError::DataFetch(err).into_graphql())?;
        gql(tx.commit().await.map_err(GraphPgError::DataFetch))?;

        debug!(table = %table_name, rows = result.rows_affected(), "delete completed");

        Ok(Some(FieldValue::value(GqlValue::Boolean(
            result.rows_affected() > 0,
        ))))
    })
}

/// `create<Name>WithRelations`: connect/create referenced rows, insert the
/// row, then create dependents, all in one transaction.
pub fn create_with_relations_resolver(
    model: Arc<Model>,
    table_name: String,
    ctx: ResolverContext<'_>,
) -> FieldFuture<'_> {
    FieldFuture::new(async move {
        let pool = ctx.data::<PgPool>()?;
        let table = model
            .table(&table_name)
            .ok_or_else(|| async_graphql::Error::new("unknown table"))?;
        let raw_input = input_pairs(&ctx.args.try_get("input")?.object()?);

        let mut own_columns: Vec<(String, GqlValue)> = Vec::new();
        let mut connects: Vec<(String, GqlValue)> = Vec::new();
        let mut creates: Vec<(String, GqlValue)> = Vec::new();
        let mut create_manys: Vec<(String, GqlValue)> = Vec::new();

        for (name, value) in raw_input {
            if let Some(prefix) = name.strip_suffix("_connect") {
                connects.push((prefix.to_string(), value));
            } else if let Some(prefix) = name.strip_suffix("_createMany") {
                create_manys.push((prefix.to_string(), value));
            } else if let Some(prefix) = name.strip_suffix("_create") {
                creates.push((prefix.to_string(), value));
            } else {
                own_columns.push((name, value));
            }
        }

        let mut tx = gql(pool.begin().await.map_err(GraphPgError::DataFetch))?;

        // Referenced rows first so the FK columns can be filled in.
        for (referenced, value) in connects {
            let (local, remote) = table
                .foreign_keys
                .iter()
                .find(|fk| fk.referenced_table == referenced)
                .and_then(|fk| fk.single_column())
                .ok_or_else(|| {
                    GraphPgError::MutationValidation(format!(
                        "'{table_name}' has no relationship to '{referenced}'"
                    ))
                })
                .map_err(GraphPgError::into_graphql)?;
            let key = match &value {
                GqlValue::Object(map) => map
                    .get(remote)
                    .cloned()
                    .ok_or_else(|| {
                        GraphPgError::MutationValidation(format!(
                            "connect input for '{referenced}' must supply '{remote}'"
                        ))
                    })
                    .map_err(GraphPgError::into_graphql)?,
                other => other.clone(),
            };
            own_columns.push((local.to_string(), key));
        }

        for (referenced, value) in creates {
            let (local, remote) = table
                .foreign_keys
                .iter()
                .find(|fk| fk.referenced_table == referenced)
                .and_then(|fk| fk.single_column())
                .ok_or_else(|| {
                    GraphPgError::MutationValidation(format!(
                        "'{table_name}' has no relationship to '{referenced}'"
                    ))
                })
                .map_err(GraphPgError::into_graphql)?;
            let referenced_table = model
                .table(&referenced)
                .ok_or_else(|| {
                    GraphPgError::MutationValidation(format!("unknown table '{referenced}'"))
                })
                .map_err(GraphPgError::into_graphql)?;
            let GqlValue::Object(map) = value else {
                return Err(GraphPgError::MutationValidation(format!(
                    "create input for '{referenced}' must be an object"
                ))
                .into_graphql());
            };
            let nested: Vec<(String, GqlValue)> = map
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect();
            let created = gql(insert_row(&mut tx, &model, referenced_table, &nested).await)?;
            let key = created.get(remote).cloned().unwrap_or(JsonValue::Null);
            own_columns.push((local.to_string(), GqlValue::from_json(key)?));
        }

        let row = gql(insert_row(&mut tx, &model, table, &own_columns).await)?;

        // Dependents last; their FK points at the row just created.
        for (dependent, value) in create_manys {
            let dependent_table = model
                .table(&dependent)
                .ok_or_else(|| {
                    GraphPgError::MutationValidation(format!("unknown table '{dependent}'"))
                })
                .map_err(GraphPgError::into_graphql)?;
            let (remote_fk, local_key) = dependent_table
                .foreign_keys
                .iter()
                .find(|fk| fk.referenced_table == table_name)
                .and_then(|fk| fk.single_column())
                .ok_or_else(|| {
                    GraphPgError::MutationValidation(format!(
                        "'{dependent}' has no relationship to '{table_name}'"
                    ))
                })
                .map_err(GraphPgError::into_graphql)?;
            let parent_key = row.get(local_key).cloned().unwrap_or(JsonValue::Null);

            let GqlValue::List(items) = value else {
                return Err(GraphPgError::MutationValidation(format!(
                    "createMany input for '{dependent}' must be a list"
                ))
                .into_graphql());
            };
            for item in items {
                let GqlValue::Object(map) = item else {
                    return Err(GraphPgError::MutationValidation(format!(
                        "createMany input for '{dependent}' must contain objects"
                    ))
                    .into_graphql());
                };
                let mut nested: Vec<(String, GqlValue)> = map
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect();
                nested.retain(|(name, _)| name != remote_fk);
                nested.push((
                    remote_fk.to_string(),
                    GqlValue::from_json(parent_key.clone())?,
                ));
                gql(insert_row(&mut tx, &model, dependent_table, &nested).await)?;
            }
        }

        gql(tx.commit().await.map_err(GraphPgError::DataFetch))?;

        Ok(Some(node_value(
            &table_name,
            row,
            &Arc::new(BatchContext::default()),
        )))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cursor_for_row_uses_order_columns_in_order() {
        let order = OrderSpec {
            columns: vec![
                ("created_at".into(), OrderDirection::Desc),
                ("id".into(), OrderDirection::Asc),
            ],
        };
        let row = json!({"id": 7, "created_at": "2024-01-02", "name": "x"});

        let token = cursor_for_row(&row, &order);
        let decoded = cursor::decode(
            "after",
            &token,
            &["created_at".to_string(), "id".to_string()],
        )
        .unwrap();
        assert_eq!(decoded[0].1, "2024-01-02");
        assert_eq!(decoded[1].1, "7");
    }

    #[test]
    fn render_cursor_value_keeps_database_renderings() {
        assert_eq!(render_cursor_value(&json!("abc")), "abc");
        assert_eq!(render_cursor_value(&json!(42)), "42");
        assert_eq!(render_cursor_value(&json!(true)), "true");
        assert_eq!(render_cursor_value(&json!(null)), "null");
    }

    #[test]
    fn projection_includes_pk_and_selected_fk_columns() {
        use crate::reflect::{ColumnInfo, ForeignKeyInfo};

        let table = TableInfo {
            name: "posts".into(),
            columns: vec![
                ColumnInfo {
                    name: "id".into(),
                    sql_type: "integer".into(),
                    primary_key: true,
                    nullable: false,
                    has_default: true,
                },
                ColumnInfo {
                    name: "title".into(),
                    sql_type: "text".into(),
                    primary_key: false,
                    nullable: true,
                    has_default: false,
                },
                ColumnInfo {
                    name: "author_id".into(),
                    sql_type: "integer".into(),
                    primary_key: false,
                    nullable: true,
                    has_default: false,
                },
            ],
            foreign_keys: vec![ForeignKeyInfo {
                constraint_name: "posts_author_id_fkey".into(),
                referenced_table: "users".into(),
                columns: vec![("author_id".into(), "id".into())],
            }],
            is_view: false,
        };

        let selections = vec![
            ("title".to_string(), vec![]),
            ("users".to_string(), vec!["name".to_string()]),
        ];
        let projection = projection_for(&table, &selections, &[]);

        assert!(projection.contains(&"title".to_string()));
        assert!(projection.contains(&"id".to_string()));
        assert!(projection.contains(&"author_id".to_string()));
        // The relationship field itself is not a column.
        assert!(!projection.contains(&"users".to_string()));
    }
}
