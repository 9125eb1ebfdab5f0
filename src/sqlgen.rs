//! Parameterized SQL construction. Every statement is composed with
//! sea-query and bound through sea-query-binder; no client value is ever
//! rendered into the SQL text. Generated SELECTs are wrapped in
//! `row_to_json` so rows come back as uniform JSON regardless of the column
//! types involved.

use async_graphql::Value as GqlValue;
use sea_query::{
    Alias, Asterisk, BinOper, Cond, Expr, Func, Order, PostgresQueryBuilder, Query,
    SelectStatement, SimpleExpr,
};
use sea_query_binder::{SqlxBinder, SqlxValues};

use crate::coerce::{coerce_list, coerce_value};
use crate::error::GraphPgError;
use crate::pgtype::{self, TypeCategory};
use crate::reflect::{Model, TableInfo};

/// One filter predicate against a column.
#[derive(Debug, Clone)]
pub struct FilterClause {
    pub column: String,
    pub op: FilterOp,
    pub value: GqlValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    IsNull,
    IsNotNull,
    HasKey,
    HasKeys,
    Path,
}

impl FilterOp {
    /// Operator for an argument-name suffix (`_gt`, `_contains`, …).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        Some(match suffix {
            "eq" => FilterOp::Eq,
            "neq" => FilterOp::Neq,
            "gt" => FilterOp::Gt,
            "gte" => FilterOp::Gte,
            "lt" => FilterOp::Lt,
            "lte" => FilterOp::Lte,
            "in" => FilterOp::In,
            "contains" => FilterOp::Contains,
            "startsWith" => FilterOp::StartsWith,
            "endsWith" => FilterOp::EndsWith,
            "isNull" => FilterOp::IsNull,
            "isNotNull" => FilterOp::IsNotNull,
            "hasKey" => FilterOp::HasKey,
            "hasKeys" => FilterOp::HasKeys,
            "path" => FilterOp::Path,
            _ => return None,
        })
    }
}

/// The WHERE input of one query: AND-combined clauses plus an optional
/// OR-combined list of clause groups.
#[derive(Debug, Clone, Default)]
pub struct Filters {
    pub conjuncts: Vec<FilterClause>,
    pub or_groups: Vec<Vec<FilterClause>>,
}

impl Filters {
    pub fn is_empty(&self) -> bool {
        self.conjuncts.is_empty() && self.or_groups.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

impl OrderDirection {
    fn to_sea(self) -> Order {
        match self {
            OrderDirection::Asc => Order::Asc,
            OrderDirection::Desc => Order::Desc,
        }
    }
}

/// Ordering of a result set; field order is preserved from the client input.
#[derive(Debug, Clone, Default)]
pub struct OrderSpec {
    pub columns: Vec<(String, OrderDirection)>,
}

impl OrderSpec {
    pub fn primary_key_asc(table: &TableInfo) -> Self {
        OrderSpec {
            columns: table
                .primary_key_columns()
                .iter()
                .map(|col| (col.name.clone(), OrderDirection::Asc))
                .collect(),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|(name, _)| name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A decoded cursor bound: the ordering-column values of the boundary row
/// plus the direction the page extends from it.
#[derive(Debug, Clone)]
pub struct KeysetBound {
    pub values: Vec<(String, String)>,
    pub direction: KeysetDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeysetDirection {
    After,
    Before,
}

/// A built, bindable statement.
#[derive(Debug)]
pub struct BuiltQuery {
    pub sql: String,
    pub values: SqlxValues,
}

/// `col IN (…)` over already-coerced expressions.
fn in_expr(column: &str, items: Vec<SimpleExpr>) -> SimpleExpr {
    let col: SimpleExpr = Expr::col(Alias::new(column.to_string())).into();
    col.binary(BinOper::In, SimpleExpr::Tuple(items))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn column_sql_type<'a>(table: &'a TableInfo, column: &str) -> Result<&'a str, GraphPgError> {
    table
        .column(column)
        .map(|col| col.sql_type.as_str())
        .ok_or_else(|| {
            GraphPgError::MutationValidation(format!(
                "unknown column '{column}' on '{}'",
                table.name
            ))
        })
}

fn expect_filter_string(clause: &FilterClause, sql_type: &str) -> Result<String, GraphPgError> {
    match &clause.value {
        GqlValue::String(text) => Ok(text.clone()),
        other => Err(GraphPgError::coercion(&clause.column, sql_type, other)),
    }
}

/// Escape LIKE metacharacters in a user pattern fragment.
fn escape_like(fragment: &str) -> String {
    fragment
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn clause_expr(
    model: &Model,
    table: &TableInfo,
    clause: &FilterClause,
) -> Result<SimpleExpr, GraphPgError> {
    let sql_type = column_sql_type(table, &clause.column)?;
    let resolved = model.resolve_sql_type(sql_type);
    let col = Expr::col(Alias::new(clause.column.clone()));
    let quoted = quote_ident(&clause.column);
    let category = pgtype::classify(resolved);

    let expr = match clause.op {
        FilterOp::Eq => col.eq(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::Neq => col.ne(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::Gt => col.gt(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::Gte => col.gte(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::Lt => col.lt(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::Lte => col.lte(coerce_value(model, &clause.column, sql_type, &clause.value)?),
        FilterOp::In => {
            let items = coerce_list(model, &clause.column, sql_type, &clause.value)?;
            if items.is_empty() {
                // IN () is invalid SQL; an empty list matches nothing.
                Expr::cust("FALSE").into()
            } else {
                in_expr(&clause.column, items)
            }
        }
        FilterOp::Contains => {
            if category == TypeCategory::Json {
                let json = match &clause.value {
                    GqlValue::Object(_) | GqlValue::List(_) => clause
                        .value
                        .clone()
                        .into_json()
                        .map_err(|_| {
                            GraphPgError::coercion(&clause.column, resolved, &clause.value)
                        })?
                        .to_string(),
                    GqlValue::String(text) => serde_json::from_str::<serde_json::Value>(text)
                        .map_err(|_| GraphPgError::coercion(&clause.column, resolved, text))?
                        .to_string(),
                    other => {
                        return Err(GraphPgError::coercion(&clause.column, resolved, other));
                    }
                };
                Expr::cust_with_values(format!("{quoted} @> CAST(? AS jsonb)"), [json]).into()
            } else {
                let text = expect_filter_string(clause, resolved)?;
                col.like(format!("%{}%", escape_like(&text)))
            }
        }
        FilterOp::StartsWith => {
            let text = expect_filter_string(clause, resolved)?;
            col.like(format!("{}%", escape_like(&text)))
        }
        FilterOp::EndsWith => {
            let text = expect_filter_string(clause, resolved)?;
            col.like(format!("%{}", escape_like(&text)))
        }
        FilterOp::IsNull => match clause.value {
            GqlValue::Boolean(true) | GqlValue::Null => col.is_null(),
            GqlValue::Boolean(false) => col.is_not_null(),
            ref other => {
                return Err(GraphPgError::coercion(&clause.column, resolved, other));
            }
        },
        FilterOp::IsNotNull => match clause.value {
            GqlValue::Boolean(true) | GqlValue::Null => col.is_not_null(),
            GqlValue::Boolean(false) => col.is_null(),
            ref other => {
                return Err(GraphPgError::coercion(&clause.column, resolved, other));
            }
        },
        FilterOp::HasKey => {
            let key = expect_filter_string(clause, resolved)?;
            // `??` renders as the literal `?` jsonb operator.
            Expr::cust_with_values(format!("{quoted} ?? ?"), [key]).into()
        }
        FilterOp::HasKeys => {
            let keys = string_array_literal(&clause.column, resolved, &clause.value)?;
            Expr::cust_with_values(format!("{quoted} ??& CAST(? AS text[])"), [keys]).into()
        }
        FilterOp::Path => {
            let path = string_array_literal(&clause.column, resolved, &clause.value)?;
            Expr::cust_with_values(
                format!("{quoted} #> CAST(? AS text[]) IS NOT NULL"),
                [path],
            )
            .into()
        }
    };

    Ok(expr)
}

fn string_array_literal(
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<String, GraphPgError> {
    let items = match value {
        GqlValue::List(items) => items.clone(),
        GqlValue::String(single) => vec![GqlValue::String(single.clone())],
        other => return Err(GraphPgError::coercion(column, sql_type, other)),
    };

    let mut tokens = Vec::with_capacity(items.len());
    for item in &items {
        match item {
            GqlValue::String(text) => tokens.push(format!(
                "\"{}\"",
                text.replace('\\', "\\\\").replace('"', "\\\"")
            )),
            other => return Err(GraphPgError::coercion(column, sql_type, other)),
        }
    }
    Ok(format!("{{{}}}", tokens.join(",")))
}

fn filters_condition(
    model: &Model,
    table: &TableInfo,
    filters: &Filters,
) -> Result<Cond, GraphPgError> {
    let mut cond = Cond::all();

    for clause in &filters.conjuncts {
        cond = cond.add(clause_expr(model, table, clause)?);
    }

    if !filters.or_groups.is_empty() {
        let mut any = Cond::any();
        for group in &filters.or_groups {
            let mut all = Cond::all();
            for clause in group {
                all = all.add(clause_expr(model, table, clause)?);
            }
            any = any.add(all);
        }
        cond = cond.add(any);
    }

    Ok(cond)
}

/// Keyset predicate for a cursor bound under a (possibly mixed-direction)
/// ordering: rows strictly beyond the boundary row.
fn keyset_condition(
    model: &Model,
    table: &TableInfo,
    order: &OrderSpec,
    bound: &KeysetBound,
) -> Result<Cond, GraphPgError> {
    let mut any = Cond::any();

    for pivot in 0..order.columns.len() {
        let mut all = Cond::all();

        for (idx, (column, direction)) in order.columns.iter().take(pivot + 1).enumerate() {
            let sql_type = column_sql_type(table, column)?;
            let value = GqlValue::String(bound.values[idx].1.clone());
            let coerced = coerce_value(model, column, sql_type, &value)?;
            let col = Expr::col(Alias::new(column.clone()));

            if idx < pivot {
                all = all.add(col.eq(coerced));
            } else {
                let forward = matches!(direction, OrderDirection::Asc);
                let ahead = match bound.direction {
                    KeysetDirection::After => forward,
                    KeysetDirection::Before => !forward,
                };
                all = all.add(if ahead {
                    col.gt(coerced)
                } else {
                    col.lt(coerced)
                });
            }
        }

        any = any.add(all);
    }

    Ok(any)
}

fn apply_order(stmt: &mut SelectStatement, order: &OrderSpec, reversed: bool) {
    for (column, direction) in &order.columns {
        let direction = if reversed {
            match direction {
                OrderDirection::Asc => OrderDirection::Desc,
                OrderDirection::Desc => OrderDirection::Asc,
            }
        } else {
            *direction
        };
        stmt.order_by(Alias::new(column.clone()), direction.to_sea());
    }
}

/// Parameters of one SELECT against a single table.
pub struct SelectParams<'a> {
    pub projection: &'a [String],
    pub filters: &'a Filters,
    pub order: &'a OrderSpec,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub keyset: Option<&'a KeysetBound>,
    /// `last`-style pages scan backwards; the fetcher re-reverses rows.
    pub reverse_scan: bool,
}

fn select_statement(
    model: &Model,
    table: &TableInfo,
    params: &SelectParams<'_>,
) -> Result<SelectStatement, GraphPgError> {
    let mut stmt = Query::select();
    stmt.from(Alias::new(table.name.clone()));

    for column in params.projection {
        stmt.column(Alias::new(column.clone()));
    }

    let mut cond = filters_condition(model, table, params.filters)?;
    if let Some(bound) = params.keyset {
        cond = cond.add(keyset_condition(model, table, params.order, bound)?);
    }
    stmt.cond_where(cond);

    apply_order(&mut stmt, params.order, params.reverse_scan);

    if let Some(limit) = params.limit {
        stmt.limit(limit);
    }
    if let Some(offset) = params.offset {
        stmt.offset(offset);
    }

    Ok(stmt)
}

/// SELECT returning one JSON object per row.
pub fn build_select(
    model: &Model,
    table: &TableInfo,
    params: &SelectParams<'_>,
) -> Result<BuiltQuery, GraphPgError> {
    let stmt = select_statement(model, table, params)?;
    let (inner, values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery {
        sql: format!("SELECT row_to_json(q) FROM ({inner}) AS q"),
        values,
    })
}

/// SELECT COUNT(*) under the same filters (for `totalCount`).
pub fn build_count(
    model: &Model,
    table: &TableInfo,
    filters: &Filters,
) -> Result<BuiltQuery, GraphPgError> {
    let mut stmt = Query::select();
    stmt.from(Alias::new(table.name.clone()))
        .expr(Func::count(Expr::col(Asterisk)));
    stmt.cond_where(filters_condition(model, table, filters)?);

    let (sql, values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery { sql, values })
}

/// One `SELECT … WHERE ref_col IN (…)` batch fetch for relationship
/// preloading.
pub fn build_batch_select(
    model: &Model,
    table: &TableInfo,
    key_column: &str,
    keys: &[GqlValue],
    projection: &[String],
) -> Result<BuiltQuery, GraphPgError> {
    let sql_type = column_sql_type(table, key_column)?;
    let mut items = Vec::with_capacity(keys.len());
    for key in keys {
        items.push(coerce_value(model, key_column, sql_type, key)?);
    }

    let mut stmt = Query::select();
    stmt.from(Alias::new(table.name.clone()));
    for column in projection {
        stmt.column(Alias::new(column.clone()));
    }
    stmt.and_where(in_expr(key_column, items));

    let (inner, values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery {
        sql: format!("SELECT row_to_json(q) FROM ({inner}) AS q"),
        values,
    })
}

/// Aggregate selections requested by the client, by aggregate function.
#[derive(Debug, Clone, Default)]
pub struct AggregateSelection {
    pub count: bool,
    pub sum: Vec<String>,
    pub avg: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl AggregateSelection {
    pub fn is_empty(&self) -> bool {
        !self.count
            && self.sum.is_empty()
            && self.avg.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }
}

/// One aggregate SELECT with aliased outputs (`count`, `sum_<col>`, …),
/// returned as a single JSON object.
pub fn build_aggregate(
    model: &Model,
    table: &TableInfo,
    filters: &Filters,
    selection: &AggregateSelection,
) -> Result<BuiltQuery, GraphPgError> {
    let mut stmt = Query::select();
    stmt.from(Alias::new(table.name.clone()));

    if selection.count {
        stmt.expr_as(Func::count(Expr::col(Asterisk)), Alias::new("count"));
    }
    for column in &selection.sum {
        column_sql_type(table, column)?;
        stmt.expr_as(
            Func::sum(Expr::col(Alias::new(column.clone()))),
            Alias::new(format!("sum_{column}")),
        );
    }
    for column in &selection.avg {
        column_sql_type(table, column)?;
        stmt.expr_as(
            Func::avg(Expr::col(Alias::new(column.clone()))),
            Alias::new(format!("avg_{column}")),
        );
    }
    for column in &selection.min {
        column_sql_type(table, column)?;
        stmt.expr_as(
            Func::min(Expr::col(Alias::new(column.clone()))),
            Alias::new(format!("min_{column}")),
        );
    }
    for column in &selection.max {
        column_sql_type(table, column)?;
        stmt.expr_as(
            Func::max(Expr::col(Alias::new(column.clone()))),
            Alias::new(format!("max_{column}")),
        );
    }

    stmt.cond_where(filters_condition(model, table, filters)?);

    let (inner, values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery {
        sql: format!("SELECT row_to_json(q) FROM ({inner}) AS q"),
        values,
    })
}

/// INSERT one row, returning the created row as JSON.
pub fn build_insert(
    model: &Model,
    table: &TableInfo,
    input: &[(String, GqlValue)],
) -> Result<BuiltQuery, GraphPgError> {
    validate_create_input(table, input)?;

    let mut columns = Vec::with_capacity(input.len());
    let mut values = Vec::with_capacity(input.len());
    for (column, value) in input {
        let sql_type = column_sql_type(table, column)?;
        columns.push(Alias::new(column.clone()));
        values.push(coerce_value(model, column, sql_type, value)?);
    }

    let mut stmt = Query::insert();
    stmt.into_table(Alias::new(table.name.clone()))
        .columns(columns);
    stmt.values(values)
        .map_err(|err| GraphPgError::MutationValidation(err.to_string()))?;
    stmt.returning(Query::returning().all());

    let (inner, bind_values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery {
        sql: format!("WITH ins AS ({inner}) SELECT row_to_json(ins) FROM ins"),
        values: bind_values,
    })
}

/// UPDATE by primary key, returning the updated row as JSON.
pub fn build_update(
    model: &Model,
    table: &TableInfo,
    key: &[(String, GqlValue)],
    changes: &[(String, GqlValue)],
) -> Result<BuiltQuery, GraphPgError> {
    if changes.is_empty() {
        return Err(GraphPgError::MutationValidation(
            "no columns to update".to_string(),
        ));
    }

    let mut stmt = Query::update();
    stmt.table(Alias::new(table.name.clone()));

    let mut assignments = Vec::with_capacity(changes.len());
    for (column, value) in changes {
        let sql_type = column_sql_type(table, column)?;
        assignments.push((
            Alias::new(column.clone()),
            coerce_value(model, column, sql_type, value)?,
        ));
    }
    stmt.values(assignments);

    for (column, value) in key {
        let sql_type = column_sql_type(table, column)?;
        stmt.and_where(
            Expr::col(Alias::new(column.clone()))
                .eq(coerce_value(model, column, sql_type, value)?),
        );
    }
    stmt.returning(Query::returning().all());

    let (inner, bind_values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery {
        sql: format!("WITH upd AS ({inner}) SELECT row_to_json(upd) FROM upd"),
        values: bind_values,
    })
}

/// DELETE by primary key.
pub fn build_delete(
    model: &Model,
    table: &TableInfo,
    key: &[(String, GqlValue)],
) -> Result<BuiltQuery, GraphPgError> {
    let mut stmt = Query::delete();
    stmt.from_table(Alias::new(table.name.clone()));
    for (column, value) in key {
        let sql_type = column_sql_type(table, column)?;
        stmt.and_where(
            Expr::col(Alias::new(column.clone()))
                .eq(coerce_value(model, column, sql_type, value)?),
        );
    }

    let (sql, values) = stmt.build_sqlx(PostgresQueryBuilder);
    Ok(BuiltQuery { sql, values })
}

fn validate_create_input(
    table: &TableInfo,
    input: &[(String, GqlValue)],
) -> Result<(), GraphPgError> {
    for (column, _) in input {
        if table.column(column).is_none() {
            return Err(GraphPgError::MutationValidation(format!(
                "unknown column '{column}' on '{}'",
                table.name
            )));
        }
    }

    for column in &table.columns {
        let provided = input
            .iter()
            .any(|(name, value)| name == &column.name && !matches!(value, GqlValue::Null));
        if !column.nullable && !column.has_default && !provided {
            return Err(GraphPgError::MutationValidation(format!(
                "column '{}' is required on '{}'",
                column.name, table.name
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reflect::{ColumnInfo, ForeignKeyInfo};
    use pretty_assertions::assert_eq;

    fn column(name: &str, sql_type: &str, pk: bool, nullable: bool) -> ColumnInfo {
        ColumnInfo {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            primary_key: pk,
            nullable,
            has_default: pk,
        }
    }

    fn customer() -> TableInfo {
        TableInfo {
            name: "customer".into(),
            columns: vec![
                column("id", "integer", true, false),
                column("first_name", "text", false, true),
                column("active", "boolean", false, true),
            ],
            foreign_keys: vec![],
            is_view: false,
        }
    }

    fn model_with(table: TableInfo) -> Model {
        let mut model = Model::default();
        model.tables.insert(table.name.clone(), table);
        model
    }

    fn eq_filter(column: &str, value: GqlValue) -> Filters {
        Filters {
            conjuncts: vec![FilterClause {
                column: column.into(),
                op: FilterOp::Eq,
                value,
            }],
            or_groups: vec![],
        }
    }

    #[test]
    fn select_with_eq_filter_binds_the_value() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let filters = eq_filter("first_name", GqlValue::String("MARY".into()));
        let order = OrderSpec::default();

        let built = build_select(
            &model,
            table,
            &SelectParams {
                projection: &["id".to_string()],
                filters: &filters,
                order: &order,
                limit: None,
                offset: None,
                keyset: None,
                reverse_scan: false,
            },
        )
        .unwrap();

        assert_eq!(
            built.sql,
            r#"SELECT row_to_json(q) FROM (SELECT "id" FROM "customer" WHERE "first_name" = $1) AS q"#
        );
        assert_eq!(
            built.values.0.0,
            vec![sea_query::Value::String(Some(Box::new("MARY".into())))]
        );
    }

    #[test]
    fn identical_inputs_build_identical_sql() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let filters = eq_filter("active", GqlValue::Boolean(true));
        let order = OrderSpec::primary_key_asc(table);

        let build = || {
            build_select(
                &model,
                table,
                &SelectParams {
                    projection: &["id".to_string(), "first_name".to_string()],
                    filters: &filters,
                    order: &order,
                    limit: Some(10),
                    offset: Some(5),
                    keyset: None,
                    reverse_scan: false,
                },
            )
            .unwrap()
        };

        let first = build();
        let second = build();
        assert_eq!(first.sql, second.sql);
        assert_eq!(first.values.0, second.values.0);
    }

    #[test]
    fn or_groups_combine_with_and_clauses() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let filters = Filters {
            conjuncts: vec![FilterClause {
                column: "active".into(),
                op: FilterOp::Eq,
                value: GqlValue::Boolean(true),
            }],
            or_groups: vec![
                vec![FilterClause {
                    column: "first_name".into(),
                    op: FilterOp::Eq,
                    value: GqlValue::String("MARY".into()),
                }],
                vec![FilterClause {
                    column: "first_name".into(),
                    op: FilterOp::Eq,
                    value: GqlValue::String("JOHN".into()),
                }],
            ],
        };

        let built = build_select(
            &model,
            table,
            &SelectParams {
                projection: &["id".to_string()],
                filters: &filters,
                order: &OrderSpec::default(),
                limit: None,
                offset: None,
                keyset: None,
                reverse_scan: false,
            },
        )
        .unwrap();

        assert!(built.sql.contains(r#""active" = $1 AND ("first_name" = $2 OR "first_name" = $3)"#));
    }

    #[test]
    fn keyset_after_ascending_pk_is_a_greater_than() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let order = OrderSpec {
            columns: vec![("id".into(), OrderDirection::Asc)],
        };
        let bound = KeysetBound {
            values: vec![("id".into(), "2".into())],
            direction: KeysetDirection::After,
        };

        let built = build_select(
            &model,
            table,
            &SelectParams {
                projection: &["id".to_string()],
                filters: &Filters::default(),
                order: &order,
                limit: Some(3),
                offset: None,
                keyset: Some(&bound),
                reverse_scan: false,
            },
        )
        .unwrap();

        assert!(built.sql.contains(r#""id" > $1"#), "sql: {}", built.sql);
        assert!(built.sql.contains(r#"ORDER BY "id" ASC"#));
        assert!(built.sql.contains("LIMIT $2"));
    }

    #[test]
    fn keyset_with_mixed_directions_expands_per_prefix() {
        let mut table = customer();
        table
            .columns
            .push(column("created_at", "timestamptz", false, true));
        let model = model_with(table);
        let table = model.table("customer").unwrap();

        let order = OrderSpec {
            columns: vec![
                ("created_at".into(), OrderDirection::Desc),
                ("id".into(), OrderDirection::Asc),
            ],
        };
        let bound = KeysetBound {
            values: vec![
                ("created_at".into(), "2024-01-01T00:00:00".into()),
                ("id".into(), "10".into()),
            ],
            direction: KeysetDirection::After,
        };

        let built = build_select(
            &model,
            table,
            &SelectParams {
                projection: &["id".to_string()],
                filters: &Filters::default(),
                order: &order,
                limit: None,
                offset: None,
                keyset: Some(&bound),
                reverse_scan: false,
            },
        )
        .unwrap();

        // DESC leading column pages with <, the tiebreaker with =/>.
        assert!(built.sql.contains("<"), "sql: {}", built.sql);
        assert!(built.sql.contains(r#""id" > "#), "sql: {}", built.sql);
    }

    #[test]
    fn in_with_empty_list_matches_nothing() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let filters = Filters {
            conjuncts: vec![FilterClause {
                column: "id".into(),
                op: FilterOp::In,
                value: GqlValue::List(vec![]),
            }],
            or_groups: vec![],
        };

        let built = build_select(
            &model,
            table,
            &SelectParams {
                projection: &["id".to_string()],
                filters: &filters,
                order: &OrderSpec::default(),
                limit: None,
                offset: None,
                keyset: None,
                reverse_scan: false,
            },
        )
        .unwrap();

        assert!(built.sql.contains("FALSE"));
    }

    #[test]
    fn aggregate_builds_aliased_functions() {
        let table = TableInfo {
            name: "transactions".into(),
            columns: vec![
                column("amount", "numeric(10,2)", false, true),
                column("status", "text", false, true),
            ],
            foreign_keys: vec![],
            is_view: false,
        };
        let model = model_with(table);
        let table = model.table("transactions").unwrap();

        let built = build_aggregate(
            &model,
            table,
            &eq_filter("status", GqlValue::String("c".into())),
            &AggregateSelection {
                count: true,
                sum: vec!["amount".into()],
                avg: vec!["amount".into()],
                min: vec!["amount".into()],
                max: vec!["amount".into()],
            },
        )
        .unwrap();

        for fragment in [
            r#"COUNT(*) AS "count""#,
            r#"SUM("amount") AS "sum_amount""#,
            r#"AVG("amount") AS "avg_amount""#,
            r#"MIN("amount") AS "min_amount""#,
            r#"MAX("amount") AS "max_amount""#,
            r#""status" = $1"#,
        ] {
            assert!(built.sql.contains(fragment), "missing {fragment} in {}", built.sql);
        }
    }

    #[test]
    fn insert_requires_non_null_columns() {
        let table = TableInfo {
            name: "users".into(),
            columns: vec![
                column("id", "serial", true, false),
                column("name", "text", false, false),
            ],
            foreign_keys: vec![],
            is_view: false,
        };
        let model = model_with(table);
        let table = model.table("users").unwrap();

        let err = build_insert(&model, table, &[]).unwrap_err();
        assert_eq!(err.kind(), "MUTATION_VALIDATION");
        assert!(err.to_string().contains("'name'"));

        let ok = build_insert(
            &model,
            table,
            &[("name".to_string(), GqlValue::String("ada".into()))],
        )
        .unwrap();
        assert!(ok.sql.starts_with("WITH ins AS (INSERT INTO \"users\""));
        assert!(ok.sql.contains("RETURNING *"));
    }

    #[test]
    fn unknown_column_is_rejected() {
        let model = model_with(customer());
        let table = model.table("customer").unwrap();
        let err = build_insert(
            &model,
            table,
            &[("nope".to_string(), GqlValue::String("x".into()))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown column 'nope'"));
    }

    #[test]
    fn batch_select_uses_in_on_the_key_column() {
        let users = TableInfo {
            name: "users".into(),
            columns: vec![
                column("id", "integer", true, false),
                column("name", "text", false, true),
            ],
            foreign_keys: vec![ForeignKeyInfo {
                constraint_name: "noop".into(),
                referenced_table: "orgs".into(),
                columns: vec![("org_id".into(), "id".into())],
            }],
            is_view: false,
        };
        let model = model_with(users);
        let table = model.table("users").unwrap();

        let keys = vec![
            GqlValue::Number(async_graphql::Number::from(1)),
            GqlValue::Number(async_graphql::Number::from(2)),
        ];
        let built = build_batch_select(
            &model,
            table,
            "id",
            &keys,
            &["id".to_string(), "name".to_string()],
        )
        .unwrap();

        assert!(built.sql.contains(r#""id" IN ($1, $2)"#), "sql: {}", built.sql);
        assert_eq!(built.values.0.0.len(), 2);
    }
}
