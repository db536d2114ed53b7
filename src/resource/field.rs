//! Three-state desired attribute values
//!
//! A desired attribute is either left out of the configuration, explicitly
//! cleared, or set. Leaving it out keeps whatever the backend has; clearing
//! it removes the value on the next upsert.

use serde::de::{self, DeserializeOwned, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The literal configuration value that clears an attribute.
pub const ABSENT: &str = "absent";

/// A desired attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    /// Not specified: keep the prior value
    Unset,
    /// Explicitly cleared (`null` or `"absent"`)
    Absent,
    /// Specified
    Set(T),
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T> Field<T> {
    pub fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// The specified value, if any
    pub fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(v) => Some(v),
            _ => None,
        }
    }

    /// Like `map`, for conversions that can fail
    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Field<U>, E> {
        Ok(match self {
            Self::Unset => Field::Unset,
            Self::Absent => Field::Absent,
            Self::Set(v) => Field::Set(f(v)?),
        })
    }
}

impl<T: Clone> Field<T> {
    /// Resolve against the value currently on the backend.
    ///
    /// `Unset` keeps `prior`, `Absent` clears, `Set` wins.
    pub fn resolve(&self, prior: Option<&T>) -> Option<T> {
        match self {
            Self::Unset => prior.cloned(),
            Self::Absent => None,
            Self::Set(v) => Some(v.clone()),
        }
    }
}

impl<T: Blank> Field<T> {
    /// Treat an empty value as an explicit clear
    pub fn non_blank(self) -> Self {
        match self {
            Self::Set(v) if v.is_blank() => Self::Absent,
            other => other,
        }
    }
}

/// Missing keys fall back to `Unset` through `#[serde(default)]`.
///
/// The value is buffered first so the absent marker can be told apart from
/// a real value, and a type mismatch reports what was expected.
impl<'de, T: DeserializeOwned> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(Field::Absent),
            Value::String(s) if s == ABSENT => Ok(Field::Absent),
            value => serde_json::from_value(value)
                .map(Field::Set)
                .map_err(de::Error::custom),
        }
    }
}

/// Values that mean "not set" when empty or zero.
///
/// Sensu reports unset attributes as `""`, `[]`, `{}` or `0`.
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<T> Blank for Vec<T> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl<K, V> Blank for BTreeMap<K, V> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for Map<String, Value> {
    fn is_blank(&self) -> bool {
        self.is_empty()
    }
}

impl Blank for Value {
    fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.is_empty(),
            Self::Array(a) => a.is_empty(),
            Self::Object(o) => o.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

impl Blank for u16 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

impl Blank for u32 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

/// Deserialize an optional value, mapping `null` and blanks to `None`
pub fn non_blank<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Blank,
{
    Ok(Option::<T>::deserialize(deserializer)?.filter(|v| !v.is_blank()))
}

/// A number that may arrive as a string, as in `timeout = "5"`.
///
/// Booleans and floats are kept as text so validation can reject them with
/// the attribute's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LooseInteger {
    Int(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for LooseInteger {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct LooseIntegerVisitor;

        impl Visitor<'_> for LooseIntegerVisitor {
            type Value = LooseInteger;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("an integer or a numeric string")
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<LooseInteger, E> {
                Ok(LooseInteger::Int(v))
            }

            // Anything past i64 is out of range for every attribute anyway
            fn visit_u64<E: de::Error>(self, v: u64) -> Result<LooseInteger, E> {
                Ok(LooseInteger::Int(i64::try_from(v).unwrap_or(i64::MAX)))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<LooseInteger, E> {
                Ok(LooseInteger::Text(format!("{v:?}")))
            }

            fn visit_bool<E: de::Error>(self, v: bool) -> Result<LooseInteger, E> {
                Ok(LooseInteger::Text(v.to_string()))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<LooseInteger, E> {
                Ok(LooseInteger::Text(v.to_string()))
            }
        }

        deserializer.deserialize_any(LooseIntegerVisitor)
    }
}

impl LooseInteger {
    /// Parse to an integer, trimming surrounding whitespace from text
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}
