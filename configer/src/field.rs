//! # Field Model
//!
//! Classifies native values into a closed, tagged [`Field`] representation.
//!
//! Native input is first lifted into [`Value`] (via `From`), then
//! [`Field::classify`] pattern-matches over the fixed variant set. The
//! classification is total: shapes that have no matching kind become
//! [`Field::Unknown`], which still carries the original value.
//!
//! ## Rules
//! - Scalars keep their declared width (`i32` stays `Int(W32)`); `isize`,
//!   `usize` and width-less numbers normalize to 64 bits
//! - Homogeneous sequences become list kinds; signed/unsigned mixes collapse
//!   to `IntList` when every element fits `i64`, int/float mixes promote to
//!   `FloatList`, anything else is `Unknown`
//! - An empty sequence is an empty `StringList`
//! - Maps become sections; non-string keys are rendered to canonical strings
//! - `Option`/`Box` are unwrapped; `None` classifies as `Unknown`
//! - Classifying a `Field` returns it unchanged

use crate::section::Section;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, SystemTime};

/// Declared width of an integer field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntWidth {
    W8,
    W16,
    W32,
    W64,
}

impl IntWidth {
    pub fn bits(self) -> u32 {
        match self {
            Self::W8 => 8,
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Declared width of a float field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatWidth {
    F32,
    F64,
}

impl FloatWidth {
    pub fn bits(self) -> u32 {
        match self {
            Self::F32 => 32,
            Self::F64 => 64,
        }
    }
}

/// Classification tag of a [`Field`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    String,
    StringList,
    Int(IntWidth),
    IntList,
    Uint(IntWidth),
    UintList,
    Bool,
    BoolList,
    Float(FloatWidth),
    FloatList,
    Duration,
    Time,
    Section,
    Unknown,
}

impl Kind {
    pub fn is_list(self) -> bool {
        matches!(
            self,
            Self::StringList | Self::IntList | Self::UintList | Self::BoolList | Self::FloatList
        )
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Int(_) | Self::Uint(_) | Self::Float(_))
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String => f.write_str("string"),
            Self::StringList => f.write_str("string list"),
            Self::Int(w) => write!(f, "int{}", w.bits()),
            Self::IntList => f.write_str("int list"),
            Self::Uint(w) => write!(f, "uint{}", w.bits()),
            Self::UintList => f.write_str("uint list"),
            Self::Bool => f.write_str("bool"),
            Self::BoolList => f.write_str("bool list"),
            Self::Float(w) => write!(f, "float{}", w.bits()),
            Self::FloatList => f.write_str("float list"),
            Self::Duration => f.write_str("duration"),
            Self::Time => f.write_str("time"),
            Self::Section => f.write_str("section"),
            Self::Unknown => f.write_str("unknown"),
        }
    }
}

/// Native value, before classification.
///
/// Decoders produce these; `set` accepts anything convertible into one.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Str(String),
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Duration(Duration),
    Time(DateTime<Utc>),
    Seq(Vec<Value>),
    /// Arbitrary-key mapping; keys are canonicalized during classification.
    Map(Vec<(Value, Value)>),
    /// Already classified, passes through unchanged.
    Field(Field),
}

impl Value {
    /// Canonical string form used when a value appears as a map key.
    pub fn canonical_key(&self) -> String {
        match self {
            Self::Null => "null".to_string(),
            Self::Str(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::I8(v) => v.to_string(),
            Self::I16(v) => v.to_string(),
            Self::I32(v) => v.to_string(),
            Self::I64(v) => v.to_string(),
            Self::U8(v) => v.to_string(),
            Self::U16(v) => v.to_string(),
            Self::U32(v) => v.to_string(),
            Self::U64(v) => v.to_string(),
            Self::F32(v) => v.to_string(),
            Self::F64(v) => v.to_string(),
            Self::Duration(d) => format!("{:?}", d),
            Self::Time(t) => t.to_rfc3339(),
            Self::Field(field) => match field {
                Field::String(s) => s.clone(),
                Field::Bool(b) => b.to_string(),
                Field::Int { value, .. } => value.to_string(),
                Field::Uint { value, .. } => value.to_string(),
                Field::Float { value, .. } => value.to_string(),
                Field::Unknown(inner) => inner.canonical_key(),
                other => format!("{:?}", other),
            },
            Self::Seq(_) | Self::Map(_) => format!("{:?}", self),
        }
    }
}

/// A classified configuration value. The variant is the [`Kind`].
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    String(String),
    StringList(Vec<String>),
    Int { width: IntWidth, value: i64 },
    IntList(Vec<i64>),
    Uint { width: IntWidth, value: u64 },
    UintList(Vec<u64>),
    Bool(bool),
    BoolList(Vec<bool>),
    Float { width: FloatWidth, value: f64 },
    FloatList(Vec<f64>),
    Duration(Duration),
    Time(DateTime<Utc>),
    Section(Section),
    Unknown(Box<Value>),
}

impl Field {
    /// Classify any native value. Never fails.
    pub fn classify(value: Value) -> Self {
        match value {
            Value::Field(field) => field,
            Value::Null => Self::Unknown(Box::new(Value::Null)),
            Value::Str(s) => Self::String(s),
            Value::Bool(b) => Self::Bool(b),
            Value::I8(v) => Self::int(IntWidth::W8, v.into()),
            Value::I16(v) => Self::int(IntWidth::W16, v.into()),
            Value::I32(v) => Self::int(IntWidth::W32, v.into()),
            Value::I64(v) => Self::int(IntWidth::W64, v),
            Value::U8(v) => Self::uint(IntWidth::W8, v.into()),
            Value::U16(v) => Self::uint(IntWidth::W16, v.into()),
            Value::U32(v) => Self::uint(IntWidth::W32, v.into()),
            Value::U64(v) => Self::uint(IntWidth::W64, v),
            Value::F32(v) => Self::Float {
                width: FloatWidth::F32,
                value: v.into(),
            },
            Value::F64(v) => Self::Float {
                width: FloatWidth::F64,
                value: v,
            },
            Value::Duration(d) => Self::Duration(d),
            Value::Time(t) => Self::Time(t),
            Value::Seq(items) => classify_seq(items),
            Value::Map(entries) => Self::Section(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.canonical_key(), Self::classify(v)))
                    .collect(),
            ),
        }
    }

    fn int(width: IntWidth, value: i64) -> Self {
        Self::Int { width, value }
    }

    fn uint(width: IntWidth, value: u64) -> Self {
        Self::Uint { width, value }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Self::String(_) => Kind::String,
            Self::StringList(_) => Kind::StringList,
            Self::Int { width, .. } => Kind::Int(*width),
            Self::IntList(_) => Kind::IntList,
            Self::Uint { width, .. } => Kind::Uint(*width),
            Self::UintList(_) => Kind::UintList,
            Self::Bool(_) => Kind::Bool,
            Self::BoolList(_) => Kind::BoolList,
            Self::Float { width, .. } => Kind::Float(*width),
            Self::FloatList(_) => Kind::FloatList,
            Self::Duration(_) => Kind::Duration,
            Self::Time(_) => Kind::Time,
            Self::Section(_) => Kind::Section,
            Self::Unknown(_) => Kind::Unknown,
        }
    }

    pub fn as_section(&self) -> Option<&Section> {
        match self {
            Self::Section(section) => Some(section),
            _ => None,
        }
    }

    pub fn is_section(&self) -> bool {
        matches!(self, Self::Section(_))
    }

    /// Integer view across the signed and unsigned families.
    pub(crate) fn integer(&self) -> Option<i128> {
        match self {
            Self::Int { value, .. } => Some(i128::from(*value)),
            Self::Uint { value, .. } => Some(i128::from(*value)),
            _ => None,
        }
    }

    /// Float view; integers widen.
    pub(crate) fn number(&self) -> Option<f64> {
        match self {
            Self::Float { value, .. } => Some(*value),
            Self::Int { value, .. } => Some(*value as f64),
            Self::Uint { value, .. } => Some(*value as f64),
            _ => None,
        }
    }

    /// True for a list kind with no elements.
    pub(crate) fn is_empty_list(&self) -> bool {
        match self {
            Self::StringList(v) => v.is_empty(),
            Self::IntList(v) => v.is_empty(),
            Self::UintList(v) => v.is_empty(),
            Self::BoolList(v) => v.is_empty(),
            Self::FloatList(v) => v.is_empty(),
            _ => false,
        }
    }
}

/// Classify a native value. Shorthand for `Field::classify(value.into())`.
pub fn classify(value: impl Into<Value>) -> Field {
    Field::classify(value.into())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Family {
    Str,
    Bool,
    Int,
    Uint,
    Float,
}

fn family_of(field: &Field) -> Option<Family> {
    match field {
        Field::String(_) => Some(Family::Str),
        Field::Bool(_) => Some(Family::Bool),
        Field::Int { .. } => Some(Family::Int),
        Field::Uint { .. } => Some(Family::Uint),
        Field::Float { .. } => Some(Family::Float),
        _ => None,
    }
}

fn classify_seq(items: Vec<Value>) -> Field {
    let fields: Vec<Field> = items.into_iter().map(Field::classify).collect();
    if fields.is_empty() {
        return Field::StringList(Vec::new());
    }

    let families: Option<Vec<Family>> = fields.iter().map(family_of).collect();
    let Some(families) = families else {
        return unknown_seq(fields);
    };

    let has = |family: Family| families.contains(&family);
    let numeric_only = families
        .iter()
        .all(|f| matches!(f, Family::Int | Family::Uint | Family::Float));

    if families.iter().all(|&f| f == Family::Str) {
        return Field::StringList(
            fields
                .into_iter()
                .filter_map(|f| match f {
                    Field::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
        );
    }
    if families.iter().all(|&f| f == Family::Bool) {
        return Field::BoolList(
            fields
                .into_iter()
                .filter_map(|f| match f {
                    Field::Bool(b) => Some(b),
                    _ => None,
                })
                .collect(),
        );
    }
    if !numeric_only {
        return unknown_seq(fields);
    }
    if has(Family::Float) {
        return Field::FloatList(fields.iter().filter_map(Field::number).collect());
    }
    if !has(Family::Int) {
        return Field::UintList(
            fields
                .iter()
                .filter_map(|f| match f {
                    Field::Uint { value, .. } => Some(*value),
                    _ => None,
                })
                .collect(),
        );
    }

    let signed: Option<Vec<i64>> = fields
        .iter()
        .map(|f| f.integer().and_then(|v| i64::try_from(v).ok()))
        .collect();
    match signed {
        Some(values) => Field::IntList(values),
        None => unknown_seq(fields),
    }
}

fn unknown_seq(fields: Vec<Field>) -> Field {
    Field::Unknown(Box::new(Value::Seq(
        fields.into_iter().map(Value::Field).collect(),
    )))
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    f32 => F32,
    f64 => F64,
    String => Str,
    Duration => Duration,
    Field => Field,
}

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::I64(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::U64(v as u64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<SystemTime> for Value {
    fn from(v: SystemTime) -> Self {
        Value::Time(DateTime::<Utc>::from(v))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::Time(v.with_timezone(&Utc))
    }
}

impl From<Section> for Value {
    fn from(v: Section) -> Self {
        Value::Field(Field::Section(v))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Box<T>> for Value {
    fn from(v: Box<T>) -> Self {
        (*v).into()
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value> + Clone> From<&[T]> for Value {
    fn from(v: &[T]) -> Self {
        Value::Seq(v.iter().cloned().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::Seq(v.into_iter().map(Into::into).collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<HashMap<K, V>> for Value {
    fn from(v: HashMap<K, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K: Into<Value>, V: Into<Value>> From<BTreeMap<K, V>> for Value {
    fn from(v: BTreeMap<K, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
