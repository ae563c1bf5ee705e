// Untyped remote documents and the change notifications live queries deliver

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::DocumentId;
use crate::error::DecodeError;

/// An untyped key/value record as stored remotely
pub type Document = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChange {
    pub document_id: DocumentId,
    pub kind: ChangeKind,
    /// Contents after the change; for `Removed`, the last known contents
    pub document: Document,
}

impl DocumentChange {
    pub fn new(document_id: impl Into<DocumentId>, kind: ChangeKind, document: Document) -> Self {
        Self {
            document_id: document_id.into(),
            kind,
            document,
        }
    }
}

/// Changes reported together by one live query. Applied as a unit.
pub type ChangeBatch = Vec<DocumentChange>;

/// Which documents of a collection a live query follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Documents whose array field contains the value
    ArrayContains { field: String, value: String },
    /// A single document by identity
    DocumentId(DocumentId),
}

impl QueryFilter {
    pub fn array_contains(field: &str, value: &str) -> Self {
        QueryFilter::ArrayContains {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn matches(&self, id: &DocumentId, document: &Document) -> bool {
        match self {
            QueryFilter::ArrayContains { field, value } => document
                .get(field)
                .and_then(Value::as_array)
                .map(|items| items.iter().any(|item| item.as_str() == Some(value.as_str())))
                .unwrap_or(false),
            QueryFilter::DocumentId(wanted) => wanted == id,
        }
    }
}

/// Encode an instant the way documents carry it
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339())
}

/// Accepts RFC 3339 strings and `{seconds, nanoseconds}` maps
pub fn parse_timestamp(field: &'static str, value: &Value) -> Result<DateTime<Utc>, DecodeError> {
    match value {
        Value::String(raw) => DateTime::parse_from_rfc3339(raw)
            .map(|at| at.with_timezone(&Utc))
            .map_err(|_| DecodeError::InvalidTimestamp(field)),
        Value::Object(map) => {
            let seconds = map
                .get("seconds")
                .and_then(Value::as_i64)
                .ok_or(DecodeError::InvalidTimestamp(field))?;
            let nanos = match map.get("nanoseconds") {
                None => 0,
                Some(n) => n
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or(DecodeError::InvalidTimestamp(field))?,
            };
            Utc.timestamp_opt(seconds, nanos)
                .single()
                .ok_or(DecodeError::InvalidTimestamp(field))
        }
        _ => Err(DecodeError::WrongType {
            field,
            expected: "a timestamp",
        }),
    }
}

pub(crate) fn required_str(document: &Document, field: &'static str) -> Result<String, DecodeError> {
    match document.get(field) {
        None | Some(Value::Null) => Err(DecodeError::MissingField(field)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DecodeError::WrongType {
            field,
            expected: "a string",
        }),
    }
}

pub(crate) fn optional_f64(document: &Document, field: &'static str) -> Result<Option<f64>, DecodeError> {
    match document.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or(DecodeError::WrongType {
            field,
            expected: "a number",
        }),
    }
}

pub(crate) fn string_list(document: &Document, field: &'static str) -> Result<Vec<String>, DecodeError> {
    let wrong_type = DecodeError::WrongType {
        field,
        expected: "an array of strings",
    };
    match document.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| item.as_str().map(str::to_string).ok_or_else(|| wrong_type.clone()))
            .collect(),
        Some(_) => Err(wrong_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn array_contains_only_matches_string_members() {
        let filter = QueryFilter::array_contains("attendees", "u1");
        let id = DocumentId::from("e1");
        assert!(filter.matches(&id, &doc(json!({"attendees": ["u0", "u1"]}))));
        assert!(!filter.matches(&id, &doc(json!({"attendees": ["u2"]}))));
        assert!(!filter.matches(&id, &doc(json!({"attendees": "u1"}))));
        assert!(!filter.matches(&id, &doc(json!({}))));
    }

    #[test]
    fn timestamps_accept_both_encodings() {
        let at = Utc.with_ymd_and_hms(2025, 4, 7, 18, 30, 0).unwrap();
        assert_eq!(parse_timestamp("dateTime", &timestamp_value(at)).unwrap(), at);
        let map = json!({"seconds": at.timestamp(), "nanoseconds": 0});
        assert_eq!(parse_timestamp("dateTime", &map).unwrap(), at);
        assert_eq!(
            parse_timestamp("dateTime", &json!("next tuesday")),
            Err(DecodeError::InvalidTimestamp("dateTime"))
        );
        assert!(matches!(
            parse_timestamp("dateTime", &json!(12)),
            Err(DecodeError::WrongType { .. })
        ));
    }

    #[test]
    fn string_lists_reject_mixed_arrays() {
        let d = doc(json!({"ok": ["a", "b"], "bad": ["a", 1]}));
        assert_eq!(string_list(&d, "ok").unwrap(), vec!["a", "b"]);
        assert!(string_list(&d, "bad").is_err());
        assert!(string_list(&d, "absent").unwrap().is_empty());
    }
}
