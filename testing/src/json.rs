//! JSON encoding of configuration sections.
//!
//! Plain JSON has no duration or timestamp type, so those are written as
//! tagged single-key objects: `{"$duration_nanos": 1500000000}` and
//! `{"$time": "2024-01-01T00:00:00Z"}`. Integers that fit `i64` decode as
//! signed, larger ones as unsigned.

use chrono::{DateTime, Utc};
use configer::{ConfigDecoder, ConfigEncoder, Field, Section, Value};
use errors::{ConfigError, Result};
use serde_json::{Map, Number};
use std::time::Duration;

const DURATION_TAG: &str = "$duration_nanos";
const TIME_TAG: &str = "$time";

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl ConfigEncoder for JsonCodec {
    fn encode(&self, fields: &Section) -> Result<Vec<u8>> {
        let object = section_to_json(fields)?;
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(&object)
        } else {
            serde_json::to_vec(&object)
        };
        encoded.map_err(ConfigError::encode)
    }
}

impl ConfigDecoder for JsonCodec {
    fn decode(&self, bytes: &[u8]) -> Result<Section> {
        let parsed: serde_json::Value = serde_json::from_slice(bytes).map_err(ConfigError::decode)?;
        match parsed {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(key, value)| Ok((key, Field::classify(json_to_value(value)?))))
                .collect(),
            other => Err(ConfigError::decode(format!(
                "top level must be an object, got {}",
                json_type(&other)
            ))),
        }
    }
}

fn section_to_json(section: &Section) -> Result<serde_json::Value> {
    let mut map = Map::with_capacity(section.len());
    for (key, field) in section.iter() {
        map.insert(key.to_string(), field_to_json(field)?);
    }
    Ok(serde_json::Value::Object(map))
}

fn field_to_json(field: &Field) -> Result<serde_json::Value> {
    use serde_json::Value as J;
    Ok(match field {
        Field::String(s) => J::String(s.clone()),
        Field::StringList(items) => J::Array(items.iter().cloned().map(J::String).collect()),
        Field::Int { value, .. } => J::from(*value),
        Field::IntList(items) => J::Array(items.iter().map(|v| J::from(*v)).collect()),
        Field::Uint { value, .. } => J::from(*value),
        Field::UintList(items) => J::Array(items.iter().map(|v| J::from(*v)).collect()),
        Field::Bool(b) => J::Bool(*b),
        Field::BoolList(items) => J::Array(items.iter().map(|v| J::Bool(*v)).collect()),
        Field::Float { value, .. } => float(*value)?,
        Field::FloatList(items) => J::Array(items.iter().map(|v| float(*v)).collect::<Result<_>>()?),
        Field::Duration(d) => duration(*d)?,
        Field::Time(t) => time(t),
        Field::Section(section) => section_to_json(section)?,
        Field::Unknown(value) => value_to_json(value)?,
    })
}

fn value_to_json(value: &Value) -> Result<serde_json::Value> {
    use serde_json::Value as J;
    Ok(match value {
        Value::Null => J::Null,
        Value::Str(s) => J::String(s.clone()),
        Value::Bool(b) => J::Bool(*b),
        Value::I8(v) => J::from(*v),
        Value::I16(v) => J::from(*v),
        Value::I32(v) => J::from(*v),
        Value::I64(v) => J::from(*v),
        Value::U8(v) => J::from(*v),
        Value::U16(v) => J::from(*v),
        Value::U32(v) => J::from(*v),
        Value::U64(v) => J::from(*v),
        Value::F32(v) => float(f64::from(*v))?,
        Value::F64(v) => float(*v)?,
        Value::Duration(d) => duration(*d)?,
        Value::Time(t) => time(t),
        Value::Seq(items) => J::Array(items.iter().map(value_to_json).collect::<Result<_>>()?),
        Value::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(key.canonical_key(), value_to_json(value)?);
            }
            J::Object(map)
        }
        Value::Field(field) => field_to_json(field)?,
    })
}

fn json_to_value(json: serde_json::Value) -> Result<Value> {
    use serde_json::Value as J;
    Ok(match json {
        J::Null => Value::Null,
        J::Bool(b) => Value::Bool(b),
        J::Number(n) => number(&n)?,
        J::String(s) => Value::Str(s),
        J::Array(items) => Value::Seq(items.into_iter().map(json_to_value).collect::<Result<_>>()?),
        J::Object(map) => {
            if map.len() == 1 {
                if let Some(nanos) = map.get(DURATION_TAG) {
                    let nanos = nanos
                        .as_u64()
                        .ok_or_else(|| ConfigError::decode(format!("{} must be a non-negative integer", DURATION_TAG)))?;
                    return Ok(Value::Duration(Duration::from_nanos(nanos)));
                }
                if let Some(stamp) = map.get(TIME_TAG) {
                    let stamp = stamp
                        .as_str()
                        .ok_or_else(|| ConfigError::decode(format!("{} must be a string", TIME_TAG)))?;
                    let parsed = DateTime::parse_from_rfc3339(stamp)
                        .map_err(|e| ConfigError::decode(format!("invalid {} '{}': {}", TIME_TAG, stamp, e)))?;
                    return Ok(Value::Time(parsed.with_timezone(&Utc)));
                }
            }
            let mut entries = Vec::with_capacity(map.len());
            for (key, value) in map {
                entries.push((Value::Str(key), json_to_value(value)?));
            }
            Value::Map(entries)
        }
    })
}

fn number(n: &Number) -> Result<Value> {
    if let Some(v) = n.as_i64() {
        Ok(Value::I64(v))
    } else if let Some(v) = n.as_u64() {
        Ok(Value::U64(v))
    } else if let Some(v) = n.as_f64() {
        Ok(Value::F64(v))
    } else {
        Err(ConfigError::decode(format!("unrepresentable number {}", n)))
    }
}

fn float(value: f64) -> Result<serde_json::Value> {
    Number::from_f64(value)
        .map(serde_json::Value::Number)
        .ok_or_else(|| ConfigError::encode(format!("{} has no JSON representation", value)))
}

fn duration(d: Duration) -> Result<serde_json::Value> {
    let nanos = u64::try_from(d.as_nanos())
        .map_err(|_| ConfigError::encode(format!("duration {:?} overflows nanoseconds", d)))?;
    let mut map = Map::with_capacity(1);
    map.insert(DURATION_TAG.to_string(), serde_json::Value::from(nanos));
    Ok(serde_json::Value::Object(map))
}

fn time(t: &DateTime<Utc>) -> serde_json::Value {
    let mut map = Map::with_capacity(1);
    map.insert(TIME_TAG.to_string(), serde_json::Value::String(t.to_rfc3339()));
    serde_json::Value::Object(map)
}

fn json_type(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
