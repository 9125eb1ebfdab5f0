//! Naming helpers shared by the schema generator and the resolvers.

/// Validates that a string is a valid GraphQL identifier: a letter or
/// underscore first, then letters, digits, and underscores.
pub fn is_valid_graphql_identifier(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }

    let mut chars = name.chars();

    if let Some(first) = chars.next() {
        if !first.is_ascii_alphabetic() && first != '_' {
            return false;
        }
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Converts a database table/column name into a valid GraphQL identifier,
/// replacing invalid characters and prefixing a leading digit.
pub fn sanitize_graphql_name(name: &str) -> String {
    if name.is_empty() {
        return "_empty".to_string();
    }

    let mut result = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>();

    if let Some(first) = result.chars().next() {
        if first.is_ascii_digit() {
            result = format!("_{}", result);
        }
    }

    result
}

/// PascalCase form of a table name, used in mutation and wrapper-type names
/// (`order_items` → `OrderItems`).
pub fn pascal_name(table: &str) -> String {
    stringcase::pascal_case(&sanitize_graphql_name(table))
}

pub fn connection_type_name(table: &str) -> String {
    format!("{}Connection", pascal_name(table))
}

pub fn edge_type_name(table: &str) -> String {
    format!("{}Edge", pascal_name(table))
}

pub fn connection_field_name(table: &str) -> String {
    format!("{}Connection", sanitize_graphql_name(table))
}

pub fn aggregate_field_name(table: &str) -> String {
    format!("{}Aggregate", sanitize_graphql_name(table))
}

pub fn filter_input_name(table: &str) -> String {
    format!("{}Filter", pascal_name(table))
}

pub fn order_by_input_name(table: &str) -> String {
    format!("{}OrderByInput", pascal_name(table))
}

pub fn create_mutation_name(table: &str) -> String {
    format!("create{}", pascal_name(table))
}

pub fn update_mutation_name(table: &str) -> String {
    format!("update{}", pascal_name(table))
}

pub fn delete_mutation_name(table: &str) -> String {
    format!("delete{}", pascal_name(table))
}

pub fn create_many_mutation_name(table: &str) -> String {
    format!(
        "createMany{}",
        pluralizer::pluralize(&pascal_name(table), 2, false)
    )
}

pub fn create_with_relations_mutation_name(table: &str) -> String {
    format!("create{}WithRelations", pascal_name(table))
}
