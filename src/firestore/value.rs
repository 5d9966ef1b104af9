//! Conversion between Firestore's typed REST values and plain JSON.

use super::models::{ArrayValue, MapValue, Value};
use super::FirestoreError;
use serde::de::Error;
use serde_json::map::Map;
use serde_json::{json, Value as SerdeValue};
use std::collections::HashMap;

/// Decodes a document body into a JSON object.
///
/// Keys are sorted so rendered output is stable between runs.
pub fn fields_to_json(fields: HashMap<String, Value>) -> Result<SerdeValue, FirestoreError> {
    let mut entries: Vec<_> = fields.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut map = Map::new();
    for (key, value) in entries {
        map.insert(key, value_to_json(value)?);
    }
    Ok(SerdeValue::Object(map))
}

pub fn value_to_json(value: Value) -> Result<SerdeValue, FirestoreError> {
    Ok(match value {
        Value::StringValue(s) => SerdeValue::String(s),
        Value::IntegerValue(s) => {
            let i: i64 = s.parse().map_err(|e| {
                serde_json::Error::custom(format!("Failed to parse integer string '{}': {}", s, e))
            })?;
            SerdeValue::Number(i.into())
        }
        Value::DoubleValue(d) => match serde_json::Number::from_f64(d) {
            Some(n) => SerdeValue::Number(n),
            // NaN and infinities have no JSON number form.
            None => SerdeValue::String(d.to_string()),
        },
        Value::BooleanValue(b) => SerdeValue::Bool(b),
        Value::MapValue(map_value) => fields_to_json(map_value.fields)?,
        Value::ArrayValue(array_value) => SerdeValue::Array(
            array_value
                .values
                .into_iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Value::NullValue(_) => SerdeValue::Null,
        Value::TimestampValue(s) => SerdeValue::String(s),
        Value::GeoPointValue(gp) => json!({ "latitude": gp.latitude, "longitude": gp.longitude }),
        Value::BytesValue(s) => SerdeValue::String(s),
        Value::ReferenceValue(s) => SerdeValue::String(s),
    })
}

/// Encodes a JSON value for use in a query filter.
pub fn json_to_value(value: SerdeValue) -> Result<Value, FirestoreError> {
    Ok(match value {
        SerdeValue::Null => Value::NullValue(None),
        SerdeValue::Bool(b) => Value::BooleanValue(b),
        SerdeValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::IntegerValue(i.to_string())
            } else if let Some(f) = n.as_f64() {
                Value::DoubleValue(f)
            } else {
                return Err(FirestoreError::SerializationError(serde_json::Error::custom(
                    format!("Unsupported number type: {}", n),
                )));
            }
        }
        SerdeValue::String(s) => Value::StringValue(s),
        SerdeValue::Array(a) => Value::ArrayValue(ArrayValue {
            values: a
                .into_iter()
                .map(json_to_value)
                .collect::<Result<Vec<_>, _>>()?,
        }),
        SerdeValue::Object(o) => {
            let mut fields = HashMap::new();
            for (k, v) in o {
                fields.insert(k, json_to_value(v)?);
            }
            Value::MapValue(MapValue { fields })
        }
    })
}
