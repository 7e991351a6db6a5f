//! Conversions between variants and native Rust values.
//!
//! `serde_json::Value` is the crate's host-native dynamic value: JSON arrays
//! map to `Array`, objects to `Struct` (in document order), and numbers to
//! `Integer` when they fit an `i64`, otherwise `Float`. Any `Serialize` type
//! can be turned into a variant by going through that representation.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

use crate::error::{ConversionError, Result};
use crate::variant::{Variant, VariantKind};

impl Variant {
    /// Convert any serializable value into a variant.
    ///
    /// Fails with [`ConversionError::Unsupported`] naming `T` when serde
    /// cannot represent the value (for example maps with non-string keys),
    /// or [`ConversionError::IntegerOutOfRange`] for unsigned integers above
    /// `i64::MAX`.
    pub fn from_serialize<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value).map_err(|err| ConversionError::Unsupported {
            type_name: std::any::type_name::<T>(),
            reason: err.to_string(),
        })?;
        Variant::try_from(json)
    }

    /// Deserialize this variant into a native type.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(Value::from(self)).map_err(|err| ConversionError::Deserialize {
            type_name: std::any::type_name::<T>(),
            reason: err.to_string(),
        })
    }
}

impl TryFrom<Value> for Variant {
    type Error = ConversionError;

    fn try_from(value: Value) -> Result<Self> {
        Ok(match value {
            Value::Null => Variant::Void,
            Value::Bool(b) => Variant::Bool(b),
            Value::Number(n) => number_to_variant(&n)?,
            Value::String(s) => Variant::String(s),
            Value::Array(items) => Variant::Array(
                items
                    .into_iter()
                    .map(Variant::try_from)
                    .collect::<Result<_>>()?,
            ),
            Value::Object(map) => Variant::Struct(
                map.into_iter()
                    .map(|(k, v)| Ok((Variant::String(k), Variant::try_from(v)?)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

fn number_to_variant(n: &Number) -> Result<Variant> {
    if let Some(i) = n.as_i64() {
        return Ok(Variant::Integer(i));
    }
    if let Some(u) = n.as_u64() {
        return Err(ConversionError::IntegerOutOfRange { value: u });
    }
    n.as_f64()
        .map(Variant::Float)
        .ok_or_else(|| ConversionError::Unsupported {
            type_name: "serde_json::Number",
            reason: format!("number {n} is not representable as f64"),
        })
}

impl From<&Variant> for Value {
    /// Binary blobs become arrays of byte values, non-finite floats become
    /// `null`, and non-string struct keys are rendered as strings.
    fn from(variant: &Variant) -> Self {
        match variant {
            Variant::Void => Value::Null,
            Variant::Bool(b) => Value::Bool(*b),
            Variant::Integer(i) => Value::Number(Number::from(*i)),
            Variant::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            Variant::String(s) => Value::String(s.clone()),
            Variant::Binary(bytes) => {
                Value::Array(bytes.iter().map(|b| Value::Number(Number::from(*b))).collect())
            }
            Variant::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            Variant::Struct(entries) => {
                let mut map = Map::with_capacity(entries.len());
                for (key, value) in entries {
                    map.insert(key_to_string(key), Value::from(value));
                }
                Value::Object(map)
            }
        }
    }
}

impl From<Variant> for Value {
    fn from(variant: Variant) -> Self {
        Value::from(&variant)
    }
}

fn key_to_string(key: &Variant) -> String {
    match key {
        Variant::String(s) => s.clone(),
        Variant::Integer(i) => i.to_string(),
        Variant::Float(f) => f.to_string(),
        Variant::Bool(b) => b.to_string(),
        Variant::Void => String::new(),
        other => Value::from(other).to_string(),
    }
}

macro_rules! try_from_variant {
    ($target:ty, $kind:ident, $pattern:pat => $out:expr) => {
        impl TryFrom<Variant> for $target {
            type Error = ConversionError;

            fn try_from(variant: Variant) -> Result<Self> {
                match variant {
                    $pattern => Ok($out),
                    other => Err(ConversionError::Mismatch {
                        expected: VariantKind::$kind,
                        found: other.kind(),
                    }),
                }
            }
        }
    };
}

try_from_variant!(bool, Bool, Variant::Bool(b) => b);
try_from_variant!(i64, Integer, Variant::Integer(i) => i);
try_from_variant!(String, String, Variant::String(s) => s);
try_from_variant!(Vec<u8>, Binary, Variant::Binary(bytes) => bytes);
try_from_variant!(Vec<Variant>, Array, Variant::Array(items) => items);

impl TryFrom<Variant> for f64 {
    type Error = ConversionError;

    fn try_from(variant: Variant) -> Result<Self> {
        variant.as_f64().ok_or(ConversionError::Mismatch {
            expected: VariantKind::Float,
            found: variant.kind(),
        })
    }
}
