//! Typed datums
//!
//! Rust types that know their own schema and convert to and from `Value`.
//! User record types implement `Datum` by hand.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::error::{Result, ShardError};

use super::{Schema, Value};

/// A type that can describe itself and round-trip through `Value`
pub trait Datum: Sized {
    /// The descriptor for this type
    fn schema() -> Schema;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self>;
}

fn mismatch(expected: &str, got: &Value) -> ShardError {
    ShardError::SchemaMismatch(format!("expected {}, got {}", expected, got))
}

macro_rules! primitive_datum {
    ($ty:ty, $schema:ident, $variant:ident, $name:literal) => {
        impl Datum for $ty {
            fn schema() -> Schema {
                Schema::$schema
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }

            fn from_value(value: Value) -> Result<Self> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(mismatch($name, &other)),
                }
            }
        }
    };
}

primitive_datum!(bool, Boolean, Boolean, "boolean");
primitive_datum!(i32, Int, Int, "int");
primitive_datum!(i64, Long, Long, "long");
primitive_datum!(f32, Float, Float, "float");
primitive_datum!(f64, Double, Double, "double");
primitive_datum!(String, String, String, "string");

impl Datum for () {
    fn schema() -> Schema {
        Schema::Null
    }

    fn into_value(self) -> Value {
        Value::Null
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(()),
            other => Err(mismatch("null", &other)),
        }
    }
}

impl Datum for Bytes {
    fn schema() -> Schema {
        Schema::Bytes
    }

    fn into_value(self) -> Value {
        Value::Bytes(self.to_vec())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bytes(v) => Ok(Bytes::from(v)),
            other => Err(mismatch("bytes", &other)),
        }
    }
}

impl<T: Datum> Datum for Vec<T> {
    fn schema() -> Schema {
        Schema::array(T::schema())
    }

    fn into_value(self) -> Value {
        Value::Array(self.into_iter().map(Datum::into_value).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => items.into_iter().map(T::from_value).collect(),
            other => Err(mismatch("array", &other)),
        }
    }
}

impl<T: Datum> Datum for Option<T> {
    fn schema() -> Schema {
        Schema::optional(T::schema())
    }

    fn into_value(self) -> Value {
        match self {
            Some(v) => v.into_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

impl<T: Datum> Datum for BTreeMap<String, T> {
    fn schema() -> Schema {
        Schema::map(T::schema())
    }

    fn into_value(self) -> Value {
        Value::Map(self.into_iter().map(|(k, v)| (k, v.into_value())).collect())
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| T::from_value(v).map(|v| (k, v)))
                .collect(),
            other => Err(mismatch("map", &other)),
        }
    }
}
