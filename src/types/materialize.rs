//! Typed reconstruction of stored snapshots
//!
//! Snapshots are stored type-erased. When a caller supplies the subject's
//! type declaration, values are coerced into the declared field kinds on a
//! best-effort basis; anything that does not coerce is kept as raw JSON.
//! Without a declaration the snapshot is returned in a generic form.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Serialize;
use serde_json::Value;

use super::Snapshot;
use crate::registry::{EntityTypeDef, FieldKind};

/// Type name reported for snapshots with no resolvable declaration
pub const GENERIC_TYPE_NAME: &str = "Generic";

/// A single coerced value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TypedValue {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Json(Value),
}

impl TypedValue {
    /// Natural mapping of a JSON value, used for undeclared fields
    pub fn untyped(value: &Value) -> Self {
        match value {
            Value::Null => TypedValue::Null,
            Value::Bool(b) => TypedValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => TypedValue::Integer(i),
                None => n
                    .as_f64()
                    .map(TypedValue::Float)
                    .unwrap_or_else(|| TypedValue::Json(value.clone())),
            },
            Value::String(s) => TypedValue::Text(s.clone()),
            other => TypedValue::Json(other.clone()),
        }
    }

    /// Coerce a stored value into `kind`, falling back to raw JSON
    pub fn coerce(value: &Value, kind: FieldKind) -> Self {
        if value.is_null() {
            return TypedValue::Null;
        }

        let coerced = match kind {
            FieldKind::Boolean => coerce_bool(value).map(TypedValue::Boolean),
            FieldKind::Integer => coerce_integer(value).map(TypedValue::Integer),
            FieldKind::Float => coerce_float(value).map(TypedValue::Float),
            FieldKind::String => coerce_text(value).map(TypedValue::Text),
            FieldKind::Timestamp => coerce_timestamp(value).map(TypedValue::Timestamp),
            FieldKind::Json => Some(TypedValue::Json(value.clone())),
        };

        coerced.unwrap_or_else(|| TypedValue::Json(value.clone()))
    }
}

/// A snapshot reconstructed against a type declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Materialized {
    #[serde(rename = "typeName")]
    pub type_name: String,
    /// False when no declaration was available
    pub typed: bool,
    pub fields: BTreeMap<String, TypedValue>,
}

impl Materialized {
    pub fn get(&self, field: &str) -> Option<&TypedValue> {
        self.fields.get(field)
    }
}

impl Snapshot {
    /// Reconstruct typed values using `descriptor`, or generically without one
    pub fn materialize(&self, descriptor: Option<&EntityTypeDef>) -> Materialized {
        match descriptor {
            Some(def) => Materialized {
                type_name: def.name.clone(),
                typed: true,
                fields: self
                    .iter()
                    .map(|(key, value)| {
                        let typed = match def.fields.get(key) {
                            Some(field) => TypedValue::coerce(value, field.kind),
                            None => TypedValue::untyped(value),
                        };
                        (key.clone(), typed)
                    })
                    .collect(),
            },
            None => Materialized {
                type_name: GENERIC_TYPE_NAME.to_string(),
                typed: false,
                fields: self
                    .iter()
                    .map(|(key, value)| (key.clone(), TypedValue::untyped(value)))
                    .collect(),
            },
        }
    }
}

fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Some(true),
            "false" | "f" | "0" | "no" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| {
            n.as_f64()
                .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                .map(|f| f as i64)
        }),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn coerce_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        Value::Number(n) => n.as_i64().and_then(|secs| Utc.timestamp_opt(secs, 0).single()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::FieldDef;
    use crate::types::snapshot::snap;
    use serde_json::json;

    fn order_def() -> EntityTypeDef {
        EntityTypeDef::new("Order")
            .field("status", FieldDef::new(FieldKind::String))
            .field("total", FieldDef::new(FieldKind::Integer))
            .field("paid", FieldDef::new(FieldKind::Boolean))
            .field("weight", FieldDef::new(FieldKind::Float))
            .field("shipped_at", FieldDef::new(FieldKind::Timestamp))
    }

    #[test]
    fn test_materialize_coerces_declared_fields() {
        let snapshot = snap(json!({
            "status": "shipped",
            "total": "100",
            "paid": "t",
            "weight": 2,
            "shipped_at": "2024-03-01 10:00:00",
            "extra": [1, 2]
        }));

        let typed = snapshot.materialize(Some(&order_def()));
        assert!(typed.typed);
        assert_eq!(typed.type_name, "Order");
        assert_eq!(typed.get("status"), Some(&TypedValue::Text("shipped".into())));
        assert_eq!(typed.get("total"), Some(&TypedValue::Integer(100)));
        assert_eq!(typed.get("paid"), Some(&TypedValue::Boolean(true)));
        assert_eq!(typed.get("weight"), Some(&TypedValue::Float(2.0)));
        assert_eq!(
            typed.get("shipped_at"),
            Some(&TypedValue::Timestamp(
                Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
            ))
        );
        assert_eq!(typed.get("extra"), Some(&TypedValue::Json(json!([1, 2]))));
    }

    #[test]
    fn test_uncoercible_value_kept_raw() {
        let snapshot = snap(json!({"total": "lots", "paid": null}));
        let typed = snapshot.materialize(Some(&order_def()));
        assert_eq!(typed.get("total"), Some(&TypedValue::Json(json!("lots"))));
        assert_eq!(typed.get("paid"), Some(&TypedValue::Null));
    }

    #[test]
    fn test_unknown_descriptor_is_generic() {
        let snapshot = snap(json!({"total": 100, "ratio": 0.5, "status": "x"}));
        let generic = snapshot.materialize(None);
        assert!(!generic.typed);
        assert_eq!(generic.type_name, GENERIC_TYPE_NAME);
        assert_eq!(generic.get("total"), Some(&TypedValue::Integer(100)));
        assert_eq!(generic.get("ratio"), Some(&TypedValue::Float(0.5)));
    }

    #[test]
    fn test_timestamp_rfc3339_and_epoch() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(
            TypedValue::coerce(&json!("2024-01-01T00:00:00Z"), FieldKind::Timestamp),
            TypedValue::Timestamp(expected)
        );
        assert_eq!(
            TypedValue::coerce(&json!(expected.timestamp()), FieldKind::Timestamp),
            TypedValue::Timestamp(expected)
        );
    }
}
