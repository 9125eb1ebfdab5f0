use async_graphql::ErrorExtensions;
use thiserror::Error;

/// Error taxonomy for the engine. Every variant carries a stable machine
/// readable kind tag that is attached to the GraphQL field error extensions,
/// so clients can branch without parsing messages.
#[derive(Debug, Error)]
pub enum GraphPgError {
    #[error("Schema reflection failed: {0}")]
    Reflection(#[source] sqlx::Error),

    #[error("Cannot generate a GraphQL schema from an empty model")]
    SchemaEmpty,

    #[error("Invalid cursor format for '{argument}': {value}")]
    CursorFormat { argument: String, value: String },

    #[error("Cannot coerce value '{value}' for column '{column}' ({sql_type})")]
    Coercion {
        column: String,
        sql_type: String,
        value: String,
    },

    #[error("No implementation registered for dialect '{dialect}'")]
    DialectUnsupported { dialect: String },

    #[error("Query execution failed")]
    DataFetch(#[source] sqlx::Error),

    #[error("Invalid mutation input: {0}")]
    MutationValidation(String),
}

impl GraphPgError {
    pub fn kind(&self) -> &'static str {
        match self {
            GraphPgError::Reflection(_) => "REFLECTION_ERROR",
            GraphPgError::SchemaEmpty => "SCHEMA_EMPTY",
            GraphPgError::CursorFormat { .. } => "CURSOR_FORMAT",
            GraphPgError::Coercion { .. } => "COERCION_ERROR",
            GraphPgError::DialectUnsupported { .. } => "DIALECT_UNSUPPORTED",
            GraphPgError::DataFetch(_) => "DATA_FETCH_ERROR",
            GraphPgError::MutationValidation(_) => "MUTATION_VALIDATION",
        }
    }

    pub fn cursor_format(argument: &str, value: &str) -> Self {
        GraphPgError::CursorFormat {
            argument: argument.to_string(),
            value: value.to_string(),
        }
    }

    pub fn coercion(column: &str, sql_type: &str, value: impl ToString) -> Self {
        GraphPgError::Coercion {
            column: column.to_string(),
            sql_type: sql_type.to_string(),
            value: value.to_string(),
        }
    }
}

impl GraphPgError {
    /// Surface as a GraphQL field error with the machine-readable kind tag
    /// in the extensions. (async-graphql's blanket `From<impl Display>`
    /// would lose the tag, so the conversion is explicit.)
    pub fn into_graphql(self) -> async_graphql::Error {
        let kind = self.kind();
        async_graphql::Error::new(self.to_string()).extend_with(|_, e| e.set("kind", kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_error_message_names_the_argument() {
        let err = GraphPgError::cursor_format("after", "not-base64!");
        assert_eq!(
            err.to_string(),
            "Invalid cursor format for 'after': not-base64!"
        );
        assert_eq!(err.kind(), "CURSOR_FORMAT");
    }

    #[test]
    fn data_fetch_message_never_leaks_sql() {
        let err = GraphPgError::DataFetch(sqlx::Error::PoolClosed);
        assert_eq!(err.to_string(), "Query execution failed");
    }
}
