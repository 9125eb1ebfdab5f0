//! Coercion of GraphQL literals into bound SQL expressions.
//!
//! Every parameter the SQL builder binds goes through here first, so a bad
//! literal (a non-UUID string aimed at a uuid column, a word aimed at an
//! integer) fails with a [`GraphPgError::Coercion`] naming the column instead
//! of reaching the database. Types without a native binding (datetime,
//! network, interval, bit, enums, composites, arrays) are bound as text with
//! an explicit cast to the column type.

use async_graphql::Value as GqlValue;
use sea_query::{Expr, SimpleExpr};

use crate::error::GraphPgError;
use crate::pgtype::{self, TypeCategory};
use crate::reflect::Model;

/// Coerce one literal for the named column into a bindable expression.
pub fn coerce_value(
    model: &Model,
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<SimpleExpr, GraphPgError> {
    if matches!(value, GqlValue::Null) {
        return Ok(SimpleExpr::Value(sea_query::Value::String(None)));
    }

    let resolved = model.resolve_sql_type(sql_type);

    if pgtype::is_array(resolved) {
        return coerce_array(model, column, resolved, value);
    }

    if let Some((enum_name, labels)) = model.enum_type(resolved) {
        return coerce_enum(column, enum_name, labels, value);
    }

    if model.composite_type(resolved).is_some() {
        let text = expect_string(column, resolved, value)?;
        return Ok(cast_text(text, resolved));
    }

    match pgtype::classify(resolved) {
        TypeCategory::Integer => coerce_integer(column, resolved, value),
        TypeCategory::FloatingPoint => coerce_float(column, resolved, value),
        TypeCategory::Boolean => coerce_boolean(column, resolved, value),
        TypeCategory::Text => Ok(expect_string(column, resolved, value)?.into()),
        TypeCategory::Json => coerce_json(column, resolved, value),
        TypeCategory::Uuid => coerce_uuid(column, resolved, value),
        TypeCategory::DateTime
        | TypeCategory::Network
        | TypeCategory::Bit
        | TypeCategory::Binary
        | TypeCategory::Xml => {
            let text = expect_string(column, resolved, value)?;
            Ok(cast_text(text, resolved))
        }
        TypeCategory::Other => {
            let text = expect_string(column, resolved, value)?;
            Ok(cast_text(text, resolved))
        }
    }
}

/// Coerce every element of an `_in` list.
pub fn coerce_list(
    model: &Model,
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<Vec<SimpleExpr>, GraphPgError> {
    match value {
        GqlValue::List(items) => items
            .iter()
            .map(|item| coerce_value(model, column, sql_type, item))
            .collect(),
        other => Err(GraphPgError::coercion(column, sql_type, other)),
    }
}

fn coerce_enum(
    column: &str,
    enum_name: &str,
    labels: &[String],
    value: &GqlValue,
) -> Result<SimpleExpr, GraphPgError> {
    let text = expect_string(column, enum_name, value)?;
    // GraphQL enum values are sanitized catalog labels; bind the raw label.
    let label = labels
        .iter()
        .find(|label| {
            **label == text || crate::utils::sanitize_graphql_name(label) == text
        })
        .ok_or_else(|| GraphPgError::coercion(column, enum_name, &text))?;
    Ok(Expr::cust_with_values(format!("CAST(? AS \"{enum_name}\")"), [label.clone()]).into())
}

fn cast_text(text: String, sql_type: &str) -> SimpleExpr {
    // The cast target comes from the catalog, never from client input.
    Expr::cust_with_values(format!("CAST(? AS {sql_type})"), [text]).into()
}

fn expect_string(column: &str, sql_type: &str, value: &GqlValue) -> Result<String, GraphPgError> {
    match value {
        GqlValue::String(text) => Ok(text.clone()),
        GqlValue::Enum(name) => Ok(name.to_string()),
        other => Err(GraphPgError::coercion(column, sql_type, other)),
    }
}

fn coerce_integer(
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<SimpleExpr, GraphPgError> {
    match value {
        GqlValue::Number(num) => num
            .as_i64()
            .map(SimpleExpr::from)
            .ok_or_else(|| GraphPgError::coercion(column, sql_type, num)),
        GqlValue::String(text) => text
            .trim()
            .parse::<i64>()
            .map(SimpleExpr::from)
            .map_err(|_| GraphPgError::coercion(column, sql_type, text)),
        other => Err(GraphPgError::coercion(column, sql_type, other)),
    }
}

fn coerce_float(column: &str, sql_type: &str, value: &GqlValue) -> Result<SimpleExpr, GraphPgError> {
    // numeric/decimal bind as text with a cast so scale survives the trip;
    // binary floats bind natively.
    let exact = matches!(pgtype::base_type(sql_type).as_str(), "numeric" | "decimal");

    match value {
        GqlValue::Number(num) => {
            if exact {
                Ok(cast_text(num.to_string(), "numeric"))
            } else {
                num.as_f64()
                    .map(SimpleExpr::from)
                    .ok_or_else(|| GraphPgError::coercion(column, sql_type, num))
            }
        }
        GqlValue::String(text) => {
            if text.trim().parse::<f64>().is_err() {
                return Err(GraphPgError::coercion(column, sql_type, text));
            }
            if exact {
                Ok(cast_text(text.trim().to_string(), "numeric"))
            } else {
                Ok(SimpleExpr::from(text.trim().parse::<f64>().unwrap_or_default()))
            }
        }
        other => Err(GraphPgError::coercion(column, sql_type, other)),
    }
}

fn coerce_boolean(
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<SimpleExpr, GraphPgError> {
    match value {
        GqlValue::Boolean(flag) => Ok(SimpleExpr::from(*flag)),
        GqlValue::String(text) => match text.to_lowercase().as_str() {
            "true" => Ok(SimpleExpr::from(true)),
            "false" => Ok(SimpleExpr::from(false)),
            _ => Err(GraphPgError::coercion(column, sql_type, text)),
        },
        other => Err(GraphPgError::coercion(column, sql_type, other)),
    }
}

fn coerce_uuid(column: &str, sql_type: &str, value: &GqlValue) -> Result<SimpleExpr, GraphPgError> {
    let text = expect_string(column, sql_type, value)?;
    let parsed = uuid::Uuid::parse_str(text.trim())
        .map_err(|_| GraphPgError::coercion(column, sql_type, &text))?;
    Ok(SimpleExpr::from(parsed))
}

fn coerce_json(column: &str, sql_type: &str, value: &GqlValue) -> Result<SimpleExpr, GraphPgError> {
    let json = match value {
        GqlValue::Object(_) | GqlValue::List(_) => value
            .clone()
            .into_json()
            .map_err(|_| GraphPgError::coercion(column, sql_type, value))?,
        GqlValue::String(text) => serde_json::from_str::<serde_json::Value>(text)
            .map_err(|_| GraphPgError::coercion(column, sql_type, text))?,
        other => return Err(GraphPgError::coercion(column, sql_type, other)),
    };

    Ok(cast_text(json.to_string(), sql_type))
}

fn coerce_array(
    model: &Model,
    column: &str,
    sql_type: &str,
    value: &GqlValue,
) -> Result<SimpleExpr, GraphPgError> {
    let GqlValue::List(items) = value else {
        return Err(GraphPgError::coercion(column, sql_type, value));
    };

    let element_type = pgtype::base_type(sql_type);
    let mut tokens = Vec::with_capacity(items.len());
    for item in items {
        tokens.push(render_array_element(model, column, &element_type, item)?);
    }

    Ok(cast_text(format!("{{{}}}", tokens.join(",")), sql_type))
}

/// Render one element of a Postgres array literal, validating it against the
/// element category first.
fn render_array_element(
    model: &Model,
    column: &str,
    element_type: &str,
    value: &GqlValue,
) -> Result<String, GraphPgError> {
    if matches!(value, GqlValue::Null) {
        return Ok("NULL".to_string());
    }

    match pgtype::classify(model.resolve_sql_type(element_type)) {
        TypeCategory::Integer => match value {
            GqlValue::Number(num) if num.as_i64().is_some() => Ok(num.to_string()),
            GqlValue::String(text) if text.trim().parse::<i64>().is_ok() => {
                Ok(text.trim().to_string())
            }
            other => Err(GraphPgError::coercion(column, element_type, other)),
        },
        TypeCategory::FloatingPoint => match value {
            GqlValue::Number(num) => Ok(num.to_string()),
            GqlValue::String(text) if text.trim().parse::<f64>().is_ok() => {
                Ok(text.trim().to_string())
            }
            other => Err(GraphPgError::coercion(column, element_type, other)),
        },
        TypeCategory::Boolean => match value {
            GqlValue::Boolean(flag) => Ok(flag.to_string()),
            other => Err(GraphPgError::coercion(column, element_type, other)),
        },
        _ => {
            let text = expect_string(column, element_type, value)?;
            Ok(format!(
                "\"{}\"",
                text.replace('\\', "\\\\").replace('"', "\\\"")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_graphql::Number;

    fn model() -> Model {
        Model::default()
    }

    fn gql_str(text: &str) -> GqlValue {
        GqlValue::String(text.to_string())
    }

    #[test]
    fn integer_accepts_numbers_and_numeric_strings() {
        let m = model();
        assert!(coerce_value(&m, "id", "integer", &GqlValue::Number(Number::from(5))).is_ok());
        assert!(coerce_value(&m, "id", "integer", &gql_str("17")).is_ok());
        assert!(coerce_value(&m, "id", "integer", &gql_str("seventeen")).is_err());
        assert!(coerce_value(&m, "id", "integer", &GqlValue::Boolean(true)).is_err());
    }

    #[test]
    fn uuid_rejects_malformed_strings() {
        let m = model();
        assert!(
            coerce_value(
                &m,
                "id",
                "uuid",
                &gql_str("3e3a4b4e-9df3-41c8-ae6a-04b62e1a4d0b")
            )
            .is_ok()
        );
        let err = coerce_value(&m, "id", "uuid", &gql_str("not-a-uuid")).unwrap_err();
        assert_eq!(err.kind(), "COERCION_ERROR");
        assert!(err.to_string().contains("'id'"));
    }

    #[test]
    fn boolean_accepts_literal_strings() {
        let m = model();
        assert!(coerce_value(&m, "active", "boolean", &gql_str("true")).is_ok());
        assert!(coerce_value(&m, "active", "boolean", &gql_str("FALSE")).is_ok());
        assert!(coerce_value(&m, "active", "boolean", &gql_str("yes")).is_err());
    }

    #[test]
    fn json_accepts_objects_and_json_strings() {
        let m = model();
        let obj = GqlValue::from_json(serde_json::json!({"a": 1})).unwrap();
        assert!(coerce_value(&m, "meta", "jsonb", &obj).is_ok());
        assert!(coerce_value(&m, "meta", "jsonb", &gql_str("{\"a\":1}")).is_ok());
        assert!(coerce_value(&m, "meta", "jsonb", &gql_str("{broken")).is_err());
    }

    #[test]
    fn arrays_take_list_literals_only() {
        let m = model();
        let list = GqlValue::List(vec![
            GqlValue::Number(Number::from(1)),
            GqlValue::Number(Number::from(2)),
        ]);
        assert!(coerce_value(&m, "tags", "integer[]", &list).is_ok());
        assert!(coerce_value(&m, "tags", "integer[]", &gql_str("1")).is_err());

        let bad = GqlValue::List(vec![gql_str("x")]);
        assert!(coerce_value(&m, "tags", "integer[]", &bad).is_err());
    }

    #[test]
    fn enum_values_must_match_labels() {
        let mut m = model();
        m.custom_types.insert(
            "mood".into(),
            crate::reflect::CustomType::Enum {
                name: "mood".into(),
                values: vec!["happy".into(), "sad".into()],
            },
        );
        assert!(coerce_value(&m, "mood", "mood", &gql_str("happy")).is_ok());
        assert!(coerce_value(&m, "mood", "mood", &gql_str("angry")).is_err());
    }

    #[test]
    fn domains_coerce_as_their_base_type() {
        let mut m = model();
        m.custom_types.insert(
            "positive_int".into(),
            crate::reflect::CustomType::Domain {
                name: "positive_int".into(),
                base_type: "integer".into(),
            },
        );
        assert!(coerce_value(&m, "qty", "positive_int", &gql_str("3")).is_ok());
        assert!(coerce_value(&m, "qty", "positive_int", &gql_str("three")).is_err());
    }
}
