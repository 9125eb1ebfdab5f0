//! Opaque pagination cursors.
//!
//! A cursor is `base64("col:value;col:value;...")` over the columns of the
//! active ordering, in order. Values are percent-encoded before joining so
//! data containing `:`, `;`, or `%` survives the round trip.

use base64::{Engine as _, engine::general_purpose};

use crate::error::GraphPgError;

/// Encode a cursor from `(column, rendered value)` pairs matching the active
/// ordering. Values are the literal strings the database returned.
pub fn encode(parts: &[(String, String)]) -> String {
    let payload = parts
        .iter()
        .map(|(col, value)| format!("{col}:{}", urlencoding::encode(value)))
        .collect::<Vec<_>>()
        .join(";");

    general_purpose::STANDARD.encode(payload)
}

/// Decode and validate a cursor against the columns of the active ordering.
/// Any decoding failure or column mismatch is a [`GraphPgError::CursorFormat`]
/// naming `argument` (`after` or `before`).
pub fn decode(
    argument: &str,
    cursor: &str,
    order_columns: &[String],
) -> Result<Vec<(String, String)>, GraphPgError> {
    let invalid = || GraphPgError::cursor_format(argument, cursor);

    let raw = general_purpose::STANDARD
        .decode(cursor)
        .map_err(|_| invalid())?;
    let payload = String::from_utf8(raw).map_err(|_| invalid())?;

    let mut parts = Vec::new();
    for segment in payload.split(';') {
        let (col, encoded_value) = segment.split_once(':').ok_or_else(invalid)?;
        if col.is_empty() {
            return Err(invalid());
        }
        let value = urlencoding::decode(encoded_value)
            .map_err(|_| invalid())?
            .into_owned();
        parts.push((col.to_string(), value));
    }

    // The cursor must carry exactly the ordering columns, in order; a cursor
    // minted under a different orderBy is unusable.
    if parts.len() != order_columns.len()
        || parts
            .iter()
            .zip(order_columns)
            .any(|((col, _), expected)| col != expected)
    {
        return Err(invalid());
    }

    Ok(parts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn round_trip_single_column() {
        let cursor = encode(&[("id".into(), "42".into())]);
        let decoded = decode("after", &cursor, &cols(&["id"])).unwrap();
        assert_eq!(decoded, vec![("id".to_string(), "42".to_string())]);
    }

    #[test]
    fn round_trip_multi_column_preserves_order() {
        let cursor = encode(&[
            ("created_at".into(), "2024-01-02T03:04:05".into()),
            ("id".into(), "7".into()),
        ]);
        let decoded = decode("before", &cursor, &cols(&["created_at", "id"])).unwrap();
        assert_eq!(decoded[0].1, "2024-01-02T03:04:05");
        assert_eq!(decoded[1].1, "7");
    }

    #[test]
    fn delimiters_in_values_survive() {
        let nasty = "a:b;c%d";
        let cursor = encode(&[("name".into(), nasty.into())]);
        let decoded = decode("after", &cursor, &cols(&["name"])).unwrap();
        assert_eq!(decoded[0].1, nasty);
    }

    #[test]
    fn invalid_base64_is_a_cursor_format_error() {
        let err = decode("after", "not-base64!", &cols(&["id"])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid cursor format for 'after': not-base64!"
        );
    }

    #[test]
    fn column_mismatch_is_rejected() {
        let cursor = encode(&[("id".into(), "1".into())]);
        assert!(decode("after", &cursor, &cols(&["name"])).is_err());
        assert!(decode("after", &cursor, &cols(&["id", "name"])).is_err());
    }

    #[test]
    fn missing_delimiter_is_rejected() {
        let cursor = general_purpose::STANDARD.encode("no-delimiter-here");
        assert!(decode("after", &cursor, &cols(&["id"])).is_err());
    }
}
