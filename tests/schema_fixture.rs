//! End-to-end schema generation from a fixture model: the full type surface
//! a small commerce schema should produce, plus generator determinism.

use std::sync::Arc;

use graph_pg::generate;
use graph_pg::reflect::{ColumnInfo, CustomType, ForeignKeyInfo, Model, TableInfo};
use pretty_assertions::assert_eq;

fn column(name: &str, sql_type: &str, primary_key: bool, nullable: bool) -> ColumnInfo {
    ColumnInfo {
        name: name.to_string(),
        sql_type: sql_type.to_string(),
        primary_key,
        nullable,
        has_default: primary_key,
    }
}

fn fixture_model() -> Model {
    let customer = TableInfo {
        name: "customer".into(),
        columns: vec![
            column("id", "integer", true, false),
            column("first_name", "text", false, true),
            column("active", "boolean", false, false),
            column("shipping", "address", false, true),
            column("tags", "text[]", false, true),
        ],
        foreign_keys: vec![],
        is_view: false,
    };

    let orders = TableInfo {
        name: "orders".into(),
        columns: vec![
            column("id", "integer", true, false),
            column("customer_id", "integer", false, false),
            column("amount", "numeric(10,2)", false, true),
            column("status", "order_status", false, true),
            column("placed_at", "timestamptz", false, true),
            column("metadata", "jsonb", false, true),
        ],
        foreign_keys: vec![ForeignKeyInfo {
            constraint_name: "orders_customer_id_fkey".into(),
            referenced_table: "customer".into(),
            columns: vec![("customer_id".into(), "id".into())],
        }],
        is_view: false,
    };

    let customer_summary = TableInfo {
        name: "customer_summary".into(),
        columns: vec![
            column("id", "integer", false, true),
            column("order_count", "bigint", false, true),
        ],
        foreign_keys: vec![],
        is_view: true,
    };

    let mut model = Model::default();
    model.tables.insert("customer".into(), customer);
    model.tables.insert("orders".into(), orders);
    model
        .tables
        .insert("customer_summary".into(), customer_summary);

    model.custom_types.insert(
        "order_status".into(),
        CustomType::Enum {
            name: "order_status".into(),
            values: vec!["pending".into(), "completed".into()],
        },
    );
    model.custom_types.insert(
        "address".into(),
        CustomType::Composite {
            name: "address".into(),
            attributes: vec![
                ("street".into(), "text".into()),
                ("city".into(), "text".into()),
                ("zip".into(), "text".into()),
            ],
        },
    );

    model
}

fn generate_sdl(model: &Arc<Model>) -> String {
    generate::generate(model)
        .expect("schema generation must succeed")
        .finish()
        .expect("schema must finish")
        .sdl()
}

#[test]
fn object_types_cover_every_table_and_view() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    assert!(sdl.contains("type customer "), "missing customer object");
    assert!(sdl.contains("type orders "), "missing orders object");
    assert!(
        sdl.contains("type customer_summary "),
        "missing view object"
    );
}

#[test]
fn connection_and_edge_wrappers_are_generated() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    for type_name in [
        "CustomerConnection",
        "CustomerEdge",
        "OrdersConnection",
        "OrdersEdge",
        "CustomerSummaryConnection",
        "PageInfo",
    ] {
        assert!(sdl.contains(type_name), "missing {type_name}");
    }

    for field in ["hasNextPage", "hasPreviousPage", "startCursor", "endCursor", "totalCount"] {
        assert!(sdl.contains(field), "missing {field}");
    }

    assert!(sdl.contains("customerConnection"));
    assert!(sdl.contains("ordersConnection"));
}

#[test]
fn filter_and_order_arguments_follow_column_categories() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    // Text columns carry the pattern operators, comparables the range set.
    assert!(sdl.contains("first_name_contains"));
    assert!(sdl.contains("first_name_startsWith"));
    assert!(sdl.contains("first_name_endsWith"));
    assert!(sdl.contains("amount_gte"));
    assert!(sdl.contains("placed_at_lt"));
    assert!(sdl.contains("metadata_hasKey"));
    assert!(sdl.contains("metadata_path"));
    assert!(sdl.contains("id_isNull"));

    assert!(sdl.contains("CustomerFilter"));
    assert!(sdl.contains("OrdersOrderByInput"));
    assert!(sdl.contains("enum OrderDirection"));
    assert!(sdl.contains("ASC"));
    assert!(sdl.contains("DESC"));
}

#[test]
fn mutations_exist_for_tables_but_not_views() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    for mutation in [
        "createCustomer(",
        "updateCustomer(",
        "deleteCustomer(",
        "createManyCustomers(",
        "createCustomerWithRelations(",
        "createOrders(",
        "deleteOrders(",
    ] {
        assert!(sdl.contains(mutation), "missing {mutation}");
    }

    assert!(
        !sdl.contains("createCustomerSummary"),
        "views must not expose mutations"
    );
    assert!(!sdl.contains("deleteCustomerSummary"));
}

#[test]
fn relations_input_carries_connect_create_and_create_many() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    assert!(sdl.contains("CreateOrdersRelationsInput"));
    assert!(sdl.contains("customer_connect"));
    assert!(sdl.contains("customer_create"));
    assert!(sdl.contains("ConnectCustomerInput"));
    // customer side: dependents can be created alongside.
    assert!(sdl.contains("orders_createMany"));
}

#[test]
fn relationship_fields_are_symmetric_except_for_views() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    let customer_block = sdl
        .split("type customer ")
        .nth(1)
        .and_then(|rest| rest.split('}').next())
        .expect("customer type block");
    assert!(
        customer_block.contains("orders"),
        "customer must carry the reverse orders field"
    );

    let orders_block = sdl
        .split("type orders ")
        .nth(1)
        .and_then(|rest| rest.split('}').next())
        .expect("orders type block");
    assert!(
        orders_block.contains("customer"),
        "orders must carry the forward customer field"
    );
}

#[test]
fn aggregates_offer_numeric_and_comparable_sections() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    assert!(sdl.contains("customerAggregate"));
    assert!(sdl.contains("ordersAggregate"));
    assert!(sdl.contains("OrdersAggregateResult"));
    assert!(sdl.contains("OrdersNumericAggregate"));
    assert!(sdl.contains("OrdersComparableAggregate"));
    assert!(sdl.contains("count"));
}

#[test]
fn custom_enums_and_composites_become_graphql_types() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    assert!(sdl.contains("enum order_status"));
    assert!(sdl.contains("pending"));
    assert!(sdl.contains("completed"));

    // Composite attributes keep their catalog names.
    assert!(sdl.contains("type address"));
    assert!(sdl.contains("street"));
    assert!(sdl.contains("zip"));
}

#[test]
fn cdc_subscription_fields_exist_per_table() {
    let model = Arc::new(fixture_model());
    let sdl = generate_sdl(&model);

    assert!(sdl.contains("customerChanged"));
    assert!(sdl.contains("ordersChanged"));
    assert!(sdl.contains("type ChangeEvent"));
    assert!(sdl.contains("lsn"));
}

#[test]
fn generation_is_deterministic() {
    let model = Arc::new(fixture_model());
    let first = generate_sdl(&model);
    let second = generate_sdl(&model);
    assert_eq!(first, second);
}

#[test]
fn empty_model_is_rejected() {
    let model = Arc::new(Model::default());
    let err = generate::generate(&model).err().expect("must fail");
    assert_eq!(err.kind(), "SCHEMA_EMPTY");
}
