//! Classification of PostgreSQL type names into the categories the schema
//! generator and the value coercion layer care about.
//!
//! All predicates operate on the canonical textual type as the catalog
//! reports it, e.g. `varchar(255)`, `numeric(10,2)`, `timestamp with time
//! zone`, `int[]`. Matching is exact-token after normalization, never
//! substring: `interval` is a datetime, `point` is nothing at all, even
//! though both contain `int`.

/// Category of a column type. Mutually exclusive; arrays compose with the
/// category of their element type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCategory {
    Integer,
    FloatingPoint,
    Boolean,
    Text,
    Json,
    DateTime,
    Uuid,
    Network,
    Binary,
    Bit,
    Xml,
    Other,
}

const INTEGER_TYPES: &[&str] = &[
    "int",
    "integer",
    "bigint",
    "smallint",
    "int2",
    "int4",
    "int8",
    "serial",
    "bigserial",
    "smallserial",
    "serial2",
    "serial4",
    "serial8",
];

const FLOATING_TYPES: &[&str] = &[
    "numeric",
    "decimal",
    "real",
    "double precision",
    "float",
    "double",
    "float4",
    "float8",
];

const BOOLEAN_TYPES: &[&str] = &["boolean", "bool"];

const TEXT_TYPES: &[&str] = &[
    "text",
    "varchar",
    "character varying",
    "char",
    "character",
    "bpchar",
];

const JSON_TYPES: &[&str] = &["json", "jsonb"];

const DATETIME_TYPES: &[&str] = &[
    "timestamp",
    "timestamptz",
    "timestamp with time zone",
    "timestamp without time zone",
    "date",
    "time",
    "timetz",
    "time with time zone",
    "time without time zone",
    "interval",
];

const NETWORK_TYPES: &[&str] = &["inet", "cidr", "macaddr", "macaddr8"];

const BINARY_TYPES: &[&str] = &["bytea"];

const BIT_TYPES: &[&str] = &["bit", "bit varying", "varbit"];

const XML_TYPES: &[&str] = &["xml"];

/// Lowercase the type and strip one trailing parenthesized precision:
/// `varchar(255)` → `varchar`, `numeric(10,2)` → `numeric`. The array
/// suffix is left untouched; callers split it off with [`base_type`].
pub fn normalize(sql_type: &str) -> String {
    let lowered = sql_type.trim().to_lowercase();

    match (lowered.rfind('('), lowered.rfind(')')) {
        (Some(open), Some(close)) if open < close => {
            let mut stripped = String::with_capacity(lowered.len());
            stripped.push_str(lowered[..open].trim_end());
            stripped.push_str(lowered[close + 1..].trim_end());
            stripped
        }
        _ => lowered,
    }
}

/// True when the type carries a trailing `[]` array suffix.
pub fn is_array(sql_type: &str) -> bool {
    !sql_type.is_empty() && normalize(sql_type).ends_with("[]")
}

/// Element type of an array, or the type itself when it is not an array.
/// Nested arrays are not unwrapped further.
pub fn base_type(sql_type: &str) -> String {
    let normalized = normalize(sql_type);
    normalized
        .strip_suffix("[]")
        .map(|base| base.trim_end().to_string())
        .unwrap_or(normalized)
}

fn matches_token(sql_type: &str, members: &[&str]) -> bool {
    if sql_type.is_empty() {
        return false;
    }
    let base = base_type(sql_type);
    members.contains(&base.as_str())
}

pub fn is_integer(sql_type: &str) -> bool {
    matches_token(sql_type, INTEGER_TYPES)
}

pub fn is_floating_point(sql_type: &str) -> bool {
    matches_token(sql_type, FLOATING_TYPES)
}

pub fn is_boolean(sql_type: &str) -> bool {
    matches_token(sql_type, BOOLEAN_TYPES)
}

pub fn is_text(sql_type: &str) -> bool {
    matches_token(sql_type, TEXT_TYPES)
}

pub fn is_json(sql_type: &str) -> bool {
    matches_token(sql_type, JSON_TYPES)
}

pub fn is_datetime(sql_type: &str) -> bool {
    matches_token(sql_type, DATETIME_TYPES)
}

pub fn is_uuid(sql_type: &str) -> bool {
    matches_token(sql_type, &["uuid"])
}

pub fn is_network(sql_type: &str) -> bool {
    matches_token(sql_type, NETWORK_TYPES)
}

pub fn is_binary(sql_type: &str) -> bool {
    matches_token(sql_type, BINARY_TYPES)
}

pub fn is_bit(sql_type: &str) -> bool {
    matches_token(sql_type, BIT_TYPES)
}

pub fn is_xml(sql_type: &str) -> bool {
    matches_token(sql_type, XML_TYPES)
}

/// `serial` and friends are integers whose value the database assigns.
pub fn is_serial(sql_type: &str) -> bool {
    matches_token(
        sql_type,
        &[
            "serial",
            "bigserial",
            "smallserial",
            "serial2",
            "serial4",
            "serial8",
        ],
    )
}

/// Category of the element type (for arrays) or the type itself.
pub fn classify(sql_type: &str) -> TypeCategory {
    if sql_type.is_empty() {
        return TypeCategory::Other;
    }
    if is_integer(sql_type) {
        TypeCategory::Integer
    } else if is_floating_point(sql_type) {
        TypeCategory::FloatingPoint
    } else if is_boolean(sql_type) {
        TypeCategory::Boolean
    } else if is_json(sql_type) {
        TypeCategory::Json
    } else if is_datetime(sql_type) {
        TypeCategory::DateTime
    } else if is_uuid(sql_type) {
        TypeCategory::Uuid
    } else if is_network(sql_type) {
        TypeCategory::Network
    } else if is_binary(sql_type) {
        TypeCategory::Binary
    } else if is_bit(sql_type) {
        TypeCategory::Bit
    } else if is_xml(sql_type) {
        TypeCategory::Xml
    } else if is_text(sql_type) {
        TypeCategory::Text
    } else {
        TypeCategory::Other
    }
}

impl TypeCategory {
    /// Whether values of this category order meaningfully (gt/lt filters,
    /// min/max aggregates).
    pub fn is_comparable(self) -> bool {
        matches!(
            self,
            TypeCategory::Integer
                | TypeCategory::FloatingPoint
                | TypeCategory::Text
                | TypeCategory::DateTime
                | TypeCategory::Uuid
        )
    }

    /// Whether sum/avg aggregates apply.
    pub fn is_numeric(self) -> bool {
        matches!(self, TypeCategory::Integer | TypeCategory::FloatingPoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_strips_precision() {
        assert_eq!(normalize("varchar(255)"), "varchar");
        assert_eq!(normalize("numeric(10,2)"), "numeric");
        assert_eq!(normalize("NUMERIC(10, 2)"), "numeric");
        assert_eq!(normalize("character varying(64)"), "character varying");
        assert_eq!(normalize("bit varying(8)"), "bit varying");
        assert_eq!(normalize("text"), "text");
    }

    #[test]
    fn array_suffix_survives_precision_stripping() {
        assert_eq!(normalize("varchar(255)[]"), "varchar[]");
        assert!(is_array("varchar(255)[]"));
        assert_eq!(base_type("varchar(255)[]"), "varchar");
    }

    #[test]
    fn integer_membership_is_exact_token() {
        for t in [
            "int",
            "integer",
            "bigint",
            "smallint",
            "int2",
            "int4",
            "int8",
            "serial",
            "bigserial",
            "smallserial",
            "serial2",
            "serial4",
            "serial8",
        ] {
            assert!(is_integer(t), "{t} must classify as integer");
        }

        // Substrings of integer tokens must never match.
        assert!(!is_integer("interval"));
        assert!(!is_integer("point"));
        assert!(!is_integer("maintenance"));
        assert!(!is_integer("bigintish"));
    }

    #[test]
    fn interval_is_datetime_not_integer() {
        assert!(is_datetime("interval"));
        assert!(!is_integer("interval"));
    }

    #[test]
    fn categories_are_mutually_exclusive() {
        let samples = [
            "int",
            "serial8",
            "numeric(10,2)",
            "double precision",
            "bool",
            "text",
            "character varying(20)",
            "bpchar",
            "jsonb",
            "timestamptz",
            "interval",
            "uuid",
            "inet",
            "macaddr8",
            "bytea",
            "bit varying(4)",
            "xml",
            "geometry",
            "",
        ];

        for t in samples {
            let hits = [
                is_integer(t),
                is_floating_point(t),
                is_boolean(t),
                is_json(t),
                is_datetime(t),
                is_uuid(t),
                is_network(t),
                is_binary(t),
                is_bit(t),
                is_xml(t),
                is_text(t),
            ]
            .iter()
            .filter(|hit| **hit)
            .count();

            assert!(hits <= 1, "{t} matched {hits} categories");
        }

        assert_eq!(classify("geometry"), TypeCategory::Other);
        assert_eq!(classify(""), TypeCategory::Other);
    }

    #[test]
    fn arrays_compose_with_element_category() {
        assert!(is_array("int[]"));
        assert!(is_integer(&base_type("int[]")));
        assert_eq!(classify("int[]"), TypeCategory::Integer);
        assert_eq!(classify("text[]"), TypeCategory::Text);
        assert!(!is_array("int"));
    }

    #[test]
    fn empty_input_matches_nothing() {
        assert!(!is_integer(""));
        assert!(!is_text(""));
        assert!(!is_array(""));
    }

    #[test]
    fn serial_detection() {
        assert!(is_serial("serial"));
        assert!(is_serial("bigserial"));
        assert!(!is_serial("integer"));
    }
}
