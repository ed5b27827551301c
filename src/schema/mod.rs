//! Schema Module
//!
//! Descriptors for the logical type of shard keys and values.
//!
//! ## Responsibilities
//! - Describe field layout, names and types (`Schema`, `Field`)
//! - Structural comparison (two shards are lookup-compatible only if their
//!   key schemas are equal)
//! - Generic datum representation with a total order (`Value`)
//! - Schema resolution from a type's own descriptor or an explicit one
//!   (`Datum`, `SchemaSource`)

mod datum;
mod value;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use datum::Datum;
pub use value::Value;

/// Structural description of a key or value type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Schema {
    Null,
    Boolean,
    /// 32-bit signed integer
    Int,
    /// 64-bit signed integer
    Long,
    Float,
    Double,
    Bytes,
    String,
    Array(Box<Schema>),
    /// String-keyed map
    Map(Box<Schema>),
    /// Nullable value (`Value::Null` or a value of the inner schema)
    Optional(Box<Schema>),
    Record { name: String, fields: Vec<Field> },
}

/// A named field of a record schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub schema: Schema,
}

impl Field {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
        }
    }
}

impl Schema {
    pub fn array(items: Schema) -> Self {
        Schema::Array(Box::new(items))
    }

    pub fn map(values: Schema) -> Self {
        Schema::Map(Box::new(values))
    }

    pub fn optional(inner: Schema) -> Self {
        Schema::Optional(Box::new(inner))
    }

    pub fn record(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Schema::Record {
            name: name.into(),
            fields,
        }
    }

    /// Short type name used in error messages
    pub fn type_name(&self) -> &str {
        match self {
            Schema::Null => "null",
            Schema::Boolean => "boolean",
            Schema::Int => "int",
            Schema::Long => "long",
            Schema::Float => "float",
            Schema::Double => "double",
            Schema::Bytes => "bytes",
            Schema::String => "string",
            Schema::Array(_) => "array",
            Schema::Map(_) => "map",
            Schema::Optional(_) => "optional",
            Schema::Record { name, .. } => name,
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schema::Array(items) => write!(f, "array<{}>", items),
            Schema::Map(values) => write!(f, "map<{}>", values),
            Schema::Optional(inner) => write!(f, "optional<{}>", inner),
            Schema::Record { name, fields } => {
                write!(f, "{} {{", name)?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", field.name, field.schema)?;
                }
                write!(f, " }}")
            }
            other => f.write_str(other.type_name()),
        }
    }
}

/// Where a writer or reader gets its schema from
///
/// `Explicit` wins when the job was configured with a descriptor; otherwise
/// the datum type describes itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaSource {
    Explicit(Schema),
    #[default]
    Reflected,
}

impl SchemaSource {
    pub fn resolve<T: Datum>(&self) -> Schema {
        match self {
            SchemaSource::Explicit(schema) => schema.clone(),
            SchemaSource::Reflected => T::schema(),
        }
    }
}

impl From<Schema> for SchemaSource {
    fn from(schema: Schema) -> Self {
        SchemaSource::Explicit(schema)
    }
}
