//! GraphQL schema generation. Maps a reflected [`Model`] into dynamic
//! async-graphql types: one object per table/view, Relay connection wrappers,
//! per-category filter inputs, order-by inputs, CRUD mutations, aggregate
//! result types, custom enums/composites, and CDC subscription fields.
//!
//! Generation is deterministic: the model's table map is ordered, so equal
//! models produce structurally equal schemas.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_graphql::dynamic::{
    Enum, EnumItem, Field, FieldFuture, FieldValue, InputObject, InputValue, Object, Scalar,
    Schema, SchemaBuilder, Subscription, SubscriptionField, SubscriptionFieldFuture, TypeRef,
};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::cdc::CdcBus;
use crate::error::GraphPgError;
use crate::loader::RelationshipKind;
use crate::pgtype::{self, TypeCategory};
use crate::reflect::{ColumnInfo, CustomType, Model, TableInfo};
use crate::resolvers;
use crate::utils;

const SCALAR_JSON: &str = "JSON";
const SCALAR_UUID: &str = "UUID";
const SCALAR_DATETIME: &str = "DateTime";

/// Leaf GraphQL type for a column's (element) type.
fn scalar_type_name(model: &Model, sql_type: &str) -> String {
    let resolved = model.resolve_sql_type(sql_type);
    let base = pgtype::base_type(resolved);

    if let Some((name, _)) = model.enum_type(&base) {
        return utils::sanitize_graphql_name(name);
    }
    if let Some((name, _)) = model.composite_type(&base) {
        return utils::sanitize_graphql_name(name);
    }

    match pgtype::classify(resolved) {
        TypeCategory::Integer => TypeRef::INT.to_string(),
        TypeCategory::FloatingPoint => TypeRef::FLOAT.to_string(),
        TypeCategory::Boolean => TypeRef::BOOLEAN.to_string(),
        TypeCategory::Json => SCALAR_JSON.to_string(),
        TypeCategory::Uuid => SCALAR_UUID.to_string(),
        TypeCategory::DateTime => SCALAR_DATETIME.to_string(),
        _ => TypeRef::STRING.to_string(),
    }
}

fn column_output_type(model: &Model, column: &ColumnInfo) -> TypeRef {
    let leaf = scalar_type_name(model, &column.sql_type);
    let non_null = !column.nullable || column.primary_key;

    if pgtype::is_array(model.resolve_sql_type(&column.sql_type)) {
        if non_null {
            TypeRef::named_nn_list_nn(leaf)
        } else {
            TypeRef::named_nn_list(leaf)
        }
    } else if non_null {
        TypeRef::named_nn(leaf)
    } else {
        TypeRef::named(leaf)
    }
}

fn column_input_type(model: &Model, column: &ColumnInfo, force_nullable: bool) -> TypeRef {
    let leaf = input_leaf_name(model, &column.sql_type);
    let required = !column.nullable && !column.has_default && !force_nullable;

    if pgtype::is_array(model.resolve_sql_type(&column.sql_type)) {
        if required {
            TypeRef::named_nn_list_nn(leaf)
        } else {
            TypeRef::named_nn_list(leaf)
        }
    } else if required {
        TypeRef::named_nn(leaf)
    } else {
        TypeRef::named(leaf)
    }
}

/// Input positions cannot reference output object types; composite columns
/// accept JSON there instead.
fn input_leaf_name(model: &Model, sql_type: &str) -> String {
    let base = pgtype::base_type(model.resolve_sql_type(sql_type));
    if model.composite_type(&base).is_some() {
        return SCALAR_JSON.to_string();
    }
    scalar_type_name(model, sql_type)
}

/// Name of the per-category filter input a column uses. Array columns filter
/// by their element type.
fn filter_input_for(model: &Model, sql_type: &str) -> &'static str {
    match pgtype::classify(model.resolve_sql_type(sql_type)) {
        TypeCategory::Integer => "IntFilter",
        TypeCategory::FloatingPoint => "FloatFilter",
        TypeCategory::Boolean => "BooleanFilter",
        TypeCategory::Json => "JsonFilter",
        TypeCategory::Uuid => "UuidFilter",
        TypeCategory::DateTime => "DateTimeFilter",
        _ => "StringFilter",
    }
}

fn comparable_operator_args(leaf: &str) -> Vec<(&'static str, TypeRef)> {
    vec![
        ("gt", TypeRef::named(leaf.to_string())),
        ("gte", TypeRef::named(leaf.to_string())),
        ("lt", TypeRef::named(leaf.to_string())),
        ("lte", TypeRef::named(leaf.to_string())),
        ("in", TypeRef::named_nn_list(leaf.to_string())),
    ]
}

/// Flat filter arguments for one column (`<col>`, `<col>_gt`, …).
fn column_filter_args(model: &Model, column: &ColumnInfo) -> Vec<(String, TypeRef)> {
    let leaf = input_leaf_name(model, &column.sql_type);
    let resolved = model.resolve_sql_type(&column.sql_type);
    let category = pgtype::classify(resolved);
    let name = &column.name;

    let mut args = vec![
        (name.clone(), TypeRef::named(leaf.clone())),
        (format!("{name}_eq"), TypeRef::named(leaf.clone())),
        (format!("{name}_neq"), TypeRef::named(leaf.clone())),
        (format!("{name}_isNull"), TypeRef::named(TypeRef::BOOLEAN)),
        (
            format!("{name}_isNotNull"),
            TypeRef::named(TypeRef::BOOLEAN),
        ),
    ];

    if category.is_comparable() {
        for (suffix, type_ref) in comparable_operator_args(&leaf) {
            args.push((format!("{name}_{suffix}"), type_ref));
        }
    }

    match category {
        TypeCategory::Text => {
            for suffix in ["contains", "startsWith", "endsWith"] {
                args.push((format!("{name}_{suffix}"), TypeRef::named(TypeRef::STRING)));
            }
        }
        TypeCategory::Json => {
            args.push((format!("{name}_contains"), TypeRef::named(SCALAR_JSON)));
            args.push((format!("{name}_hasKey"), TypeRef::named(TypeRef::STRING)));
            args.push((
                format!("{name}_hasKeys"),
                TypeRef::named_nn_list(TypeRef::STRING),
            ));
            args.push((
                format!("{name}_path"),
                TypeRef::named_nn_list(TypeRef::STRING),
            ));
        }
        _ => {}
    }

    args
}

fn filter_args_for_table(model: &Model, table: &TableInfo) -> Vec<(String, TypeRef)> {
    let mut args: Vec<(String, TypeRef)> = Vec::new();
    for column in &table.columns {
        args.extend(column_filter_args(model, column));
    }
    args.push((
        "where".to_string(),
        TypeRef::named(utils::filter_input_name(&table.name)),
    ));
    args.push((
        "or".to_string(),
        TypeRef::named_nn_list(utils::filter_input_name(&table.name)),
    ));
    args
}

fn apply_args(mut field: Field, args: Vec<(String, TypeRef)>) -> Field {
    for (name, type_ref) in args {
        field = field.argument(InputValue::new(name, type_ref));
    }
    field
}

/// The global per-category filter input objects.
fn category_filter_inputs() -> Vec<InputObject> {
    fn comparable(name: &str, leaf: &str) -> InputObject {
        let mut input = InputObject::new(name)
            .field(InputValue::new("eq", TypeRef::named(leaf.to_string())))
            .field(InputValue::new("neq", TypeRef::named(leaf.to_string())));
        for (suffix, type_ref) in comparable_operator_args(leaf) {
            input = input.field(InputValue::new(suffix, type_ref));
        }
        input
            .field(InputValue::new("isNull", TypeRef::named(TypeRef::BOOLEAN)))
            .field(InputValue::new(
                "isNotNull",
                TypeRef::named(TypeRef::BOOLEAN),
            ))
    }

    let string_filter = {
        let mut input = comparable("StringFilter", TypeRef::STRING);
        for op in ["contains", "startsWith", "endsWith"] {
            input = input.field(InputValue::new(op, TypeRef::named(TypeRef::STRING)));
        }
        input
    };

    let boolean_filter = InputObject::new("BooleanFilter")
        .field(InputValue::new("eq", TypeRef::named(TypeRef::BOOLEAN)))
        .field(InputValue::new("neq", TypeRef::named(TypeRef::BOOLEAN)))
        .field(InputValue::new("isNull", TypeRef::named(TypeRef::BOOLEAN)))
        .field(InputValue::new(
            "isNotNull",
            TypeRef::named(TypeRef::BOOLEAN),
        ));

    let json_filter = InputObject::new("JsonFilter")
        .field(InputValue::new("eq", TypeRef::named(SCALAR_JSON)))
        .field(InputValue::new("neq", TypeRef::named(SCALAR_JSON)))
        .field(InputValue::new("contains", TypeRef::named(SCALAR_JSON)))
        .field(InputValue::new("hasKey", TypeRef::named(TypeRef::STRING)))
        .field(InputValue::new(
            "hasKeys",
            TypeRef::named_nn_list(TypeRef::STRING),
        ))
        .field(InputValue::new(
            "path",
            TypeRef::named_nn_list(TypeRef::STRING),
        ))
        .field(InputValue::new("isNull", TypeRef::named(TypeRef::BOOLEAN)))
        .field(InputValue::new(
            "isNotNull",
            TypeRef::named(TypeRef::BOOLEAN),
        ));

    vec![
        comparable("IntFilter", TypeRef::INT),
        comparable("FloatFilter", TypeRef::FLOAT),
        string_filter,
        boolean_filter,
        comparable("UuidFilter", SCALAR_UUID),
        comparable("DateTimeFilter", SCALAR_DATETIME),
        json_filter,
    ]
}

fn page_info_object() -> Object {
    let mut object = Object::new("PageInfo");
    for (name, type_ref) in [
        ("hasNextPage", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("hasPreviousPage", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("startCursor", TypeRef::named(TypeRef::STRING)),
        ("endCursor", TypeRef::named(TypeRef::STRING)),
    ] {
        object = object.field(Field::new(name, type_ref, move |ctx| {
            resolvers::page_info_field_resolver(name, ctx)
        }));
    }
    object
}

fn change_event_object() -> Object {
    fn event_field(
        name: &str,
        type_ref: TypeRef,
        extract: fn(&crate::cdc::CdcEvent) -> async_graphql::Value,
    ) -> Field {
        Field::new(name, type_ref, move |ctx| {
            FieldFuture::new(async move {
                let event = ctx.parent_value.try_downcast_ref::<crate::cdc::CdcEvent>()?;
                Ok(Some(FieldValue::value(extract(event))))
            })
        })
    }

    Object::new("ChangeEvent")
        .field(event_field(
            "operation",
            TypeRef::named_nn(TypeRef::STRING),
            |event| event.operation_label.clone().into(),
        ))
        .field(event_field(
            "schema",
            TypeRef::named_nn(TypeRef::STRING),
            |event| event.schema.clone().into(),
        ))
        .field(event_field(
            "table",
            TypeRef::named_nn(TypeRef::STRING),
            |event| event.table.clone().into(),
        ))
        .field(event_field("data", TypeRef::named(SCALAR_JSON), |event| {
            async_graphql::Value::from_json(event.data_json.clone())
                .unwrap_or(async_graphql::Value::Null)
        }))
        .field(event_field(
            "lsn",
            TypeRef::named_nn(TypeRef::STRING),
            |event| event.lsn.clone().into(),
        ))
}

/// The table's object type: column fields plus relationship fields.
fn table_object(model: &Arc<Model>, table: &TableInfo) -> Object {
    let type_name = utils::sanitize_graphql_name(&table.name);
    let mut object = Object::new(&type_name);
    let mut used: BTreeSet<String> = BTreeSet::new();

    for column in &table.columns {
        let field_name = utils::sanitize_graphql_name(&column.name);
        used.insert(field_name.clone());
        let column_name = column.name.clone();
        object = object.field(Field::new(
            field_name,
            column_output_type(model, column),
            move |ctx| resolvers::column_resolver(column_name.clone(), ctx),
        ));
    }

    // Forward relationships: one field per single-column FK, named after the
    // referenced table.
    for fk in &table.foreign_keys {
        let Some((local, remote)) = fk.single_column() else {
            warn!(
                constraint = %fk.constraint_name,
                table = %table.name,
                "composite foreign key has no relationship field"
            );
            continue;
        };
        let field_name = fk.referenced_table.to_lowercase();
        if used.contains(&field_name) || model.table(&fk.referenced_table).is_none() {
            continue;
        }
        used.insert(field_name.clone());

        let nullable = table.column(local).map(|col| col.nullable).unwrap_or(true);
        let target_type = utils::sanitize_graphql_name(&fk.referenced_table);
        let type_ref = if nullable {
            TypeRef::named(target_type)
        } else {
            TypeRef::named_nn(utils::sanitize_graphql_name(&fk.referenced_table))
        };

        let model = model.clone();
        let field = field_name.clone();
        let local = local.to_string();
        let remote = remote.to_string();
        let target = fk.referenced_table.clone();
        object = object.field(Field::new(field_name, type_ref, move |ctx| {
            resolvers::relationship_resolver(
                model.clone(),
                field.clone(),
                RelationshipKind::Forward,
                local.clone(),
                target.clone(),
                remote.clone(),
                ctx,
            )
        }));
    }

    // Reverse relationships: lists of the tables referencing this one,
    // present only when the referencing side is not a view.
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
            if used.contains(&field_name) {
                continue;
            }
            used.insert(field_name.clone());

            let model = model.clone();
            let field = field_name.clone();
            let local = local.to_string();
            let remote = remote.to_string();
            let target = source.name.clone();
            object = object.field(Field::new(
                field_name,
                TypeRef::named_nn_list_nn(utils::sanitize_graphql_name(&source.name)),
                move |ctx| {
                    resolvers::relationship_resolver(
                        model.clone(),
                        field.clone(),
                        RelationshipKind::Reverse,
                        local.clone(),
                        target.clone(),
                        remote.clone(),
                        ctx,
                    )
                },
            ));
        }
    }

    object
}

fn edge_and_connection_objects(table: &TableInfo) -> (Object, Object) {
    let node_type = utils::sanitize_graphql_name(&table.name);

    let edge = Object::new(utils::edge_type_name(&table.name))
        .field(Field::new(
            "node",
            TypeRef::named_nn(node_type),
            resolvers::edge_node_resolver,
        ))
        .field(Field::new(
            "cursor",
            TypeRef::named_nn(TypeRef::STRING),
            resolvers::edge_cursor_resolver,
        ));

    let connection = Object::new(utils::connection_type_name(&table.name))
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn(utils::edge_type_name(&table.name)),
            resolvers::edges_resolver,
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn("PageInfo"),
            resolvers::page_info_resolver,
        ))
        .field(Field::new(
            "totalCount",
            TypeRef::named_nn(TypeRef::INT),
            resolvers::total_count_resolver,
        ));

    (edge, connection)
}

fn table_filter_input(model: &Model, table: &TableInfo) -> InputObject {
    let mut input = InputObject::new(utils::filter_input_name(&table.name));
    for column in &table.columns {
        input = input.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            TypeRef::named(filter_input_for(model, &column.sql_type)),
        ));
    }
    input
}

fn order_by_input(table: &TableInfo) -> InputObject {
    let mut input = InputObject::new(utils::order_by_input_name(&table.name));
    for column in &table.columns {
        input = input.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            TypeRef::named("OrderDirection"),
        ));
    }
    input
}

/// Aggregate result types for one table. Numeric aggregates share one object
/// (the section prefix picks sum vs avg at resolve time), comparable ones
/// another.
fn aggregate_objects(model: &Model, table: &TableInfo) -> Vec<Object> {
    let pascal = utils::pascal_name(&table.name);
    let numeric: Vec<&ColumnInfo> = table
        .columns
        .iter()
        .filter(|col| pgtype::classify(model.resolve_sql_type(&col.sql_type)).is_numeric())
        .collect();
    let comparable: Vec<&ColumnInfo> = table
        .columns
        .iter()
        .filter(|col| pgtype::classify(model.resolve_sql_type(&col.sql_type)).is_comparable())
        .collect();

    let mut result = Object::new(format!("{pascal}AggregateResult")).field(Field::new(
        "count",
        TypeRef::named_nn(TypeRef::INT),
        resolvers::aggregate_count_resolver,
    ));

    let mut objects = Vec::new();

    if !numeric.is_empty() {
        let mut numeric_object = Object::new(format!("{pascal}NumericAggregate"));
        for column in &numeric {
            let name = column.name.clone();
            numeric_object = numeric_object.field(Field::new(
                utils::sanitize_graphql_name(&column.name),
                TypeRef::named(TypeRef::FLOAT),
                move |ctx| resolvers::aggregate_column_resolver(name.clone(), ctx),
            ));
        }
        objects.push(numeric_object);

        for prefix in ["sum", "avg"] {
            result = result.field(Field::new(
                prefix,
                TypeRef::named(format!("{pascal}NumericAggregate")),
                move |ctx| resolvers::aggregate_section_resolver(prefix, ctx),
            ));
        }
    }

    if !comparable.is_empty() {
        let mut comparable_object = Object::new(format!("{pascal}ComparableAggregate"));
        for column in &comparable {
            let name = column.name.clone();
            comparable_object = comparable_object.field(Field::new(
                utils::sanitize_graphql_name(&column.name),
                TypeRef::named(scalar_type_name(model, &column.sql_type)),
                move |ctx| resolvers::aggregate_column_resolver(name.clone(), ctx),
            ));
        }
        objects.push(comparable_object);

        for prefix in ["min", "max"] {
            result = result.field(Field::new(
                prefix,
                TypeRef::named(format!("{pascal}ComparableAggregate")),
                move |ctx| resolvers::aggregate_section_resolver(prefix, ctx),
            ));
        }
    }

    objects.push(result);
    objects
}

fn mutation_inputs(model: &Model, table: &TableInfo) -> Vec<InputObject> {
    let pascal = utils::pascal_name(&table.name);

    let mut create = InputObject::new(format!("Create{pascal}Input"));
    for column in &table.columns {
        create = create.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            column_input_type(model, column, false),
        ));
    }

    let mut update = InputObject::new(format!("Update{pascal}Input"));
    for column in &table.columns {
        let type_ref = if column.primary_key {
            TypeRef::named_nn(input_leaf_name(model, &column.sql_type))
        } else {
            column_input_type(model, column, true)
        };
        update = update.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            type_ref,
        ));
    }

    // Relations input: own columns (FK columns optional since connect/create
    // sub-inputs can supply them) plus the relationship sub-inputs.
    let mut relations = InputObject::new(format!("Create{pascal}RelationsInput"));
    for column in &table.columns {
        let is_fk = table.foreign_key_for(&column.name).is_some();
        relations = relations.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            column_input_type(model, column, is_fk),
        ));
    }
    for fk in &table.foreign_keys {
        if fk.single_column().is_none() || model.table(&fk.referenced_table).is_none() {
            continue;
        }
        let ref_pascal = utils::pascal_name(&fk.referenced_table);
        relations = relations
            .field(InputValue::new(
                format!("{}_connect", fk.referenced_table),
                TypeRef::named(format!("Connect{ref_pascal}Input")),
            ))
            .field(InputValue::new(
                format!("{}_create", fk.referenced_table),
                TypeRef::named(format!("Create{ref_pascal}Input")),
            ));
    }
    for source in model.tables.values() {
        if source.is_view || source.name == table.name {
            continue;
        }
        let references_us = source.foreign_keys.iter().any(|fk| {
            fk.referenced_table == table.name && fk.single_column().is_some()
        });
        if references_us {
            relations = relations.field(InputValue::new(
                format!("{}_createMany", source.name),
                TypeRef::named_nn_list(format!(
                    "Create{}Input",
                    utils::pascal_name(&source.name)
                )),
            ));
        }
    }

    vec![create, update, relations]
}

fn connect_input(model: &Model, table: &TableInfo) -> InputObject {
    let mut input = InputObject::new(format!("Connect{}Input", utils::pascal_name(&table.name)));
    for column in table.primary_key_columns() {
        input = input.field(InputValue::new(
            utils::sanitize_graphql_name(&column.name),
            TypeRef::named_nn(input_leaf_name(model, &column.sql_type)),
        ));
    }
    input
}

fn mutation_fields(model: &Arc<Model>, table: &TableInfo) -> Vec<Field> {
    let pascal = utils::pascal_name(&table.name);
    let node_type = utils::sanitize_graphql_name(&table.name);
    let mut fields = Vec::new();

    {
        let model = model.clone();
        let name = table.name.clone();
        fields.push(
            Field::new(
                utils::create_mutation_name(&table.name),
                TypeRef::named_nn(&node_type),
                move |ctx| resolvers::create_resolver(model.clone(), name.clone(), ctx),
            )
            .argument(InputValue::new(
                "input",
                TypeRef::named_nn(format!("Create{pascal}Input")),
            )),
        );
    }

    {
        let model = model.clone();
        let name = table.name.clone();
        fields.push(
            Field::new(
                utils::update_mutation_name(&table.name),
                TypeRef::named_nn(&node_type),
                move |ctx| resolvers::update_resolver(model.clone(), name.clone(), ctx),
            )
            .argument(InputValue::new(
                "input",
                TypeRef::named_nn(format!("Update{pascal}Input")),
            )),
        );
    }

    {
        let resolver_model = model.clone();
        let name = table.name.clone();
        let mut field = Field::new(
            utils::delete_mutation_name(&table.name),
            TypeRef::named_nn(TypeRef::BOOLEAN),
            move |ctx| resolvers::delete_resolver(resolver_model.clone(), name.clone(), ctx),
        );
        let pk_columns = table.primary_key_columns();
        if pk_columns.len() == 1 {
            field = field.argument(InputValue::new(
                "id",
                TypeRef::named_nn(input_leaf_name(model, &pk_columns[0].sql_type)),
            ));
        } else {
            for column in pk_columns {
                field = field.argument(InputValue::new(
                    utils::sanitize_graphql_name(&column.name),
                    TypeRef::named_nn(input_leaf_name(model, &column.sql_type)),
                ));
            }
        }
        fields.push(field);
    }

    {
        let model = model.clone();
        let name = table.name.clone();
        fields.push(
            Field::new(
                utils::create_many_mutation_name(&table.name),
                TypeRef::named_nn_list_nn(&node_type),
                move |ctx| resolvers::create_many_resolver(model.clone(), name.clone(), ctx),
            )
            .argument(InputValue::new(
                "inputs",
                TypeRef::named_nn_list_nn(format!("Create{pascal}Input")),
            )),
        );
    }

    {
        let model = model.clone();
        let name = table.name.clone();
        fields.push(
            Field::new(
                utils::create_with_relations_mutation_name(&table.name),
                TypeRef::named_nn(&node_type),
                move |ctx| {
                    resolvers::create_with_relations_resolver(model.clone(), name.clone(), ctx)
                },
            )
            .argument(InputValue::new(
                "input",
                TypeRef::named_nn(format!("Create{pascal}RelationsInput")),
            )),
        );
    }

    fields
}

fn subscription_root(model: &Model) -> Subscription {
    let mut subscription = Subscription::new("Subscription");

    for table in model.tables.values() {
        let table_name = table.name.clone();
        let field_name = format!("{}Changed", utils::sanitize_graphql_name(&table.name));
        subscription = subscription.field(SubscriptionField::new(
            field_name,
            TypeRef::named_nn("ChangeEvent"),
            move |ctx| {
                let table_name = table_name.clone();
                SubscriptionFieldFuture::new(async move {
                    let bus = ctx.data::<Arc<CdcBus>>()?;
                    let stream = bus
                        .table_stream(&table_name)
                        .map(|event| Ok::<_, async_graphql::Error>(FieldValue::owned_any(event)));
                    Ok(stream)
                })
            },
        ));
    }

    subscription
}

/// Generate the full schema for a model. The returned builder still needs
/// the pool and CDC bus attached as data before `finish`.
pub fn generate(model: &Arc<Model>) -> Result<SchemaBuilder, GraphPgError> {
    if model.is_empty() {
        return Err(GraphPgError::SchemaEmpty);
    }

    info!(tables = model.tables.len(), "generating GraphQL schema");

    let mut query = Object::new("Query");
    let mut mutation = Object::new("Mutation");

    let mut objects: Vec<Object> = vec![page_info_object(), change_event_object()];
    let mut inputs: Vec<InputObject> = category_filter_inputs();
    let mut enums: Vec<Enum> = vec![
        Enum::new("OrderDirection")
            .item(EnumItem::new("ASC"))
            .item(EnumItem::new("DESC")),
    ];
    let scalars = vec![
        Scalar::new(SCALAR_JSON),
        Scalar::new(SCALAR_UUID),
        Scalar::new(SCALAR_DATETIME),
    ];

    for custom in model.custom_types.values() {
        match custom {
            CustomType::Enum { name, values } => {
                let mut gql_enum = Enum::new(utils::sanitize_graphql_name(name));
                for value in values {
                    gql_enum = gql_enum.item(EnumItem::new(utils::sanitize_graphql_name(value)));
                }
                enums.push(gql_enum);
            }
            CustomType::Composite { name, attributes } => {
                let mut object = Object::new(utils::sanitize_graphql_name(name));
                for (attribute, sql_type) in attributes {
                    let attr = attribute.clone();
                    object = object.field(Field::new(
                        utils::sanitize_graphql_name(attribute),
                        TypeRef::named(scalar_type_name(model, sql_type)),
                        move |ctx| resolvers::composite_attr_resolver(attr.clone(), ctx),
                    ));
                }
                objects.push(object);
            }
            // Domains surface as their base type; nothing to register.
            CustomType::Domain { .. } => {}
        }
    }

    let referenced_tables: BTreeSet<&str> = model
        .tables
        .values()
        .flat_map(|table| table.foreign_keys.iter())
        .filter(|fk| fk.single_column().is_some())
        .map(|fk| fk.referenced_table.as_str())
        .collect();

    for table in model.tables.values() {
        debug!(table = %table.name, is_view = table.is_view, "generating types");

        objects.push(table_object(model, table));
        let (edge, connection) = edge_and_connection_objects(table);
        objects.push(edge);
        objects.push(connection);
        objects.extend(aggregate_objects(model, table));
        inputs.push(table_filter_input(model, table));
        inputs.push(order_by_input(table));

        // Root list field.
        {
            let resolver_model = model.clone();
            let name = table.name.clone();
            let mut field = Field::new(
                utils::sanitize_graphql_name(&table.name),
                TypeRef::named_nn_list_nn(utils::sanitize_graphql_name(&table.name)),
                move |ctx| resolvers::list_resolver(resolver_model.clone(), name.clone(), ctx),
            );
            field = apply_args(field, filter_args_for_table(model, table));
            field = field
                .argument(InputValue::new("limit", TypeRef::named(TypeRef::INT)))
                .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)))
                .argument(InputValue::new(
                    "orderBy",
                    TypeRef::named(utils::order_by_input_name(&table.name)),
                ));
            query = query.field(field);
        }

        // Root connection field.
        {
            let resolver_model = model.clone();
            let name = table.name.clone();
            let mut field = Field::new(
                utils::connection_field_name(&table.name),
                TypeRef::named_nn(utils::connection_type_name(&table.name)),
                move |ctx| resolvers::connection_resolver(resolver_model.clone(), name.clone(), ctx),
            );
            field = apply_args(field, filter_args_for_table(model, table));
            field = field
                .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
                .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
                .argument(InputValue::new("last", TypeRef::named(TypeRef::INT)))
                .argument(InputValue::new("before", TypeRef::named(TypeRef::STRING)))
                .argument(InputValue::new("offset", TypeRef::named(TypeRef::INT)))
                .argument(InputValue::new(
                    "orderBy",
                    TypeRef::named(utils::order_by_input_name(&table.name)),
                ));
            query = query.field(field);
        }

        // Aggregate field.
        {
            let resolver_model = model.clone();
            let name = table.name.clone();
            let mut field = Field::new(
                utils::aggregate_field_name(&table.name),
                TypeRef::named_nn(format!("{}AggregateResult", utils::pascal_name(&table.name))),
                move |ctx| resolvers::aggregate_resolver(resolver_model.clone(), name.clone(), ctx),
            );
            field = apply_args(field, filter_args_for_table(model, table));
            query = query.field(field);
        }

        // Views expose no mutations.
        if !table.is_view {
            inputs.extend(mutation_inputs(model, table));
            if referenced_tables.contains(table.name.as_str()) {
                inputs.push(connect_input(model, table));
            }
            for field in mutation_fields(model, table) {
                mutation = mutation.field(field);
            }
        }
    }

    let subscription = subscription_root(model);

    let mut builder = Schema::build("Query", Some("Mutation"), Some("Subscription"))
        .register(query)
        .register(mutation)
        .register(subscription);

    for scalar in scalars {
        builder = builder.register(scalar);
    }
    for gql_enum in enums {
        builder = builder.register(gql_enum);
    }
    for object in objects {
        builder = builder.register(object);
    }
    for input in inputs {
        builder = builder.register(input);
    }

    info!("GraphQL schema generated");

    Ok(builder)
}
