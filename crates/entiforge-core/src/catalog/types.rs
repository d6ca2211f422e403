//! Field types and their physical column representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_STRING_LENGTH;

/// Abstract field type carried by a field node.
///
/// Stored in the catalog as its lower-case token. Tokens outside the known set
/// are kept verbatim in [`FieldType::Other`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldType {
    /// Bounded text.
    String,
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Floating point.
    Float,
    /// Arbitrary precision number.
    Numeric,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time of day.
    Time,
    /// Structured JSON document.
    Json,
    /// Raw bytes.
    Binary,
    /// Hashed password; stored like `String`.
    Password,
    /// E-mail address; stored like `String`.
    Email,
    /// URL-friendly identifier; stored like `String`.
    Slug,
    /// Unrecognized token.
    Other(String),
}

impl FieldType {
    /// Every known type, in declaration order.
    pub const KNOWN: [FieldType; 16] = [
        FieldType::String,
        FieldType::Text,
        FieldType::Integer,
        FieldType::BigInt,
        FieldType::SmallInt,
        FieldType::Float,
        FieldType::Numeric,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::DateTime,
        FieldType::Time,
        FieldType::Json,
        FieldType::Binary,
        FieldType::Password,
        FieldType::Email,
        FieldType::Slug,
    ];

    /// Parse a type token, case-insensitively.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "string" => FieldType::String,
            "text" => FieldType::Text,
            "integer" => FieldType::Integer,
            "bigint" => FieldType::BigInt,
            "smallint" => FieldType::SmallInt,
            "float" => FieldType::Float,
            "numeric" => FieldType::Numeric,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "datetime" => FieldType::DateTime,
            "time" => FieldType::Time,
            "json" => FieldType::Json,
            "binary" => FieldType::Binary,
            "password" => FieldType::Password,
            "email" => FieldType::Email,
            "slug" => FieldType::Slug,
            _ => FieldType::Other(token.to_string()),
        }
    }

    /// The catalog token for this type.
    pub fn as_str(&self) -> &str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::BigInt => "bigint",
            FieldType::SmallInt => "smallint",
            FieldType::Float => "float",
            FieldType::Numeric => "numeric",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "datetime",
            FieldType::Time => "time",
            FieldType::Json => "json",
            FieldType::Binary => "binary",
            FieldType::Password => "password",
            FieldType::Email => "email",
            FieldType::Slug => "slug",
            FieldType::Other(token) => token,
        }
    }

    /// Check if this is a JSON field.
    pub fn is_json(&self) -> bool {
        matches!(self, FieldType::Json)
    }

    /// Check if the token was recognized.
    pub fn is_known(&self) -> bool {
        !matches!(self, FieldType::Other(_))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(FieldType::parse(s))
    }
}

impl From<&str> for FieldType {
    fn from(token: &str) -> Self {
        FieldType::parse(token)
    }
}

impl Serialize for FieldType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Ok(FieldType::parse(&token))
    }
}

/// Physical column type in the target store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PhysicalType {
    /// Bounded text.
    VarChar {
        /// Maximum length.
        length: u32,
    },
    /// Unbounded text.
    Text,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    BigInt,
    /// 16-bit integer.
    SmallInt,
    /// Floating point.
    Float,
    /// Arbitrary precision number.
    Numeric,
    /// Boolean.
    Boolean,
    /// Calendar date.
    Date,
    /// Date and time.
    DateTime,
    /// Time of day.
    Time,
    /// Opaque structured document.
    Json,
    /// Raw bytes.
    Binary,
}

impl PhysicalType {
    /// SQL type name used in DDL.
    pub fn sql_type(&self) -> String {
        match self {
            PhysicalType::VarChar { length } => format!("VARCHAR({length})"),
            PhysicalType::Text => "TEXT".to_string(),
            PhysicalType::Integer => "INTEGER".to_string(),
            PhysicalType::BigInt => "BIGINT".to_string(),
            PhysicalType::SmallInt => "SMALLINT".to_string(),
            PhysicalType::Float => "FLOAT".to_string(),
            PhysicalType::Numeric => "NUMERIC".to_string(),
            PhysicalType::Boolean => "BOOLEAN".to_string(),
            PhysicalType::Date => "DATE".to_string(),
            PhysicalType::DateTime => "DATETIME".to_string(),
            PhysicalType::Time => "TIME".to_string(),
            PhysicalType::Json => "JSON".to_string(),
            PhysicalType::Binary => "BLOB".to_string(),
        }
    }

    /// Length of bounded text types.
    pub fn length(&self) -> Option<u32> {
        match self {
            PhysicalType::VarChar { length } => Some(*length),
            _ => None,
        }
    }
}

/// Maps abstract field types onto physical column types.
#[derive(Debug, Clone, Copy)]
pub struct TypeMapper {
    string_length: u32,
}

impl TypeMapper {
    /// Create a mapper using the given bounded text length.
    pub fn new(string_length: u32) -> Self {
        Self { string_length }
    }

    /// Resolve the physical type for a field type.
    ///
    /// Unknown tokens fall back to unbounded text.
    pub fn map(&self, field_type: &FieldType) -> PhysicalType {
        match field_type {
            FieldType::String | FieldType::Password | FieldType::Email | FieldType::Slug => {
                PhysicalType::VarChar {
                    length: self.string_length,
                }
            }
            FieldType::Text => PhysicalType::Text,
            FieldType::Integer => PhysicalType::Integer,
            FieldType::BigInt => PhysicalType::BigInt,
            FieldType::SmallInt => PhysicalType::SmallInt,
            FieldType::Float => PhysicalType::Float,
            FieldType::Numeric => PhysicalType::Numeric,
            FieldType::Boolean => PhysicalType::Boolean,
            FieldType::Date => PhysicalType::Date,
            FieldType::DateTime => PhysicalType::DateTime,
            FieldType::Time => PhysicalType::Time,
            FieldType::Json => PhysicalType::Json,
            FieldType::Binary => PhysicalType::Binary,
            FieldType::Other(_) => PhysicalType::Text,
        }
    }
}

impl Default for TypeMapper {
    fn default() -> Self {
        Self::new(DEFAULT_STRING_LENGTH)
    }
}
