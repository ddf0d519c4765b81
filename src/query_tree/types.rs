use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Static (storage) type of a canonical expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    Boolean,
    Byte,
    Int16,
    Int32,
    Int64,
    Single,
    Double,
    Decimal,
    Currency,
    String,
    DateTime,
    DateOnly,
    TimeOnly,
    TimeSpan,
    Guid,
    Binary,
    /// Host enum mapped onto an integral storage type.
    Enum {
        name: String,
        underlying: Box<SqlType>,
    },
}

impl SqlType {
    /// The type the dialect actually stores; enums collapse to their underlying type.
    pub fn storage(&self) -> &SqlType {
        match self {
            SqlType::Enum { underlying, .. } => underlying.storage(),
            other => other,
        }
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.storage(), SqlType::Boolean)
    }

    pub fn is_string(&self) -> bool {
        matches!(self.storage(), SqlType::String)
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self.storage(),
            SqlType::Byte | SqlType::Int16 | SqlType::Int32 | SqlType::Int64
        )
    }

    pub fn is_numeric(&self) -> bool {
        self.numeric_rank().is_some()
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self.storage(),
            SqlType::DateTime | SqlType::DateOnly | SqlType::TimeOnly
        )
    }

    /// Widening order used when two numeric operands meet.
    fn numeric_rank(&self) -> Option<u8> {
        match self.storage() {
            SqlType::Byte => Some(1),
            SqlType::Int16 => Some(2),
            SqlType::Int32 => Some(3),
            SqlType::Int64 => Some(4),
            SqlType::Currency => Some(5),
            SqlType::Decimal => Some(6),
            SqlType::Single => Some(7),
            SqlType::Double => Some(8),
            _ => None,
        }
    }

    /// Result type of an arithmetic/bitwise node whose operands have types `a` and `b`.
    pub fn promote(a: &SqlType, b: &SqlType) -> SqlType {
        if a == b {
            return a.clone();
        }
        if a.is_string() || b.is_string() {
            return SqlType::String;
        }
        if a.is_temporal() {
            return a.clone();
        }
        if b.is_temporal() {
            return b.clone();
        }
        match (a.numeric_rank(), b.numeric_rank()) {
            (Some(ra), Some(rb)) => {
                if ra >= rb {
                    a.storage().clone()
                } else {
                    b.storage().clone()
                }
            }
            (Some(_), None) => a.clone(),
            (None, Some(_)) => b.clone(),
            (None, None) => a.clone(),
        }
    }
}

/// Host-supplied value of a constant or parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Boolean(bool),
    Byte(u8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Single(f32),
    Double(f64),
    Decimal(Decimal),
    String(String),
    DateTime(NaiveDateTime),
    DateOnly(NaiveDate),
    TimeOnly(NaiveTime),
    /// Duration in 100ns ticks.
    TimeSpan(i64),
    Guid(Uuid),
    Binary(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integral view of the value, used for paging counts and constant folding.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Byte(v) => Some(i64::from(*v)),
            Value::Int16(v) => Some(i64::from(*v)),
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Natural type of a value when the host did not say otherwise.
    pub fn natural_type(&self) -> SqlType {
        match self {
            Value::Null => SqlType::Int32,
            Value::Boolean(_) => SqlType::Boolean,
            Value::Byte(_) => SqlType::Byte,
            Value::Int16(_) => SqlType::Int16,
            Value::Int32(_) => SqlType::Int32,
            Value::Int64(_) => SqlType::Int64,
            Value::Single(_) => SqlType::Single,
            Value::Double(_) => SqlType::Double,
            Value::Decimal(_) => SqlType::Decimal,
            Value::String(_) => SqlType::String,
            Value::DateTime(_) => SqlType::DateTime,
            Value::DateOnly(_) => SqlType::DateOnly,
            Value::TimeOnly(_) => SqlType::TimeOnly,
            Value::TimeSpan(_) => SqlType::TimeSpan,
            Value::Guid(_) => SqlType::Guid,
            Value::Binary(_) => SqlType::Binary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> SqlType {
        SqlType::Enum {
            name: "Rank".to_string(),
            underlying: Box::new(SqlType::Int32),
        }
    }

    #[test]
    fn test_enum_storage_is_underlying() {
        assert_eq!(status().storage(), &SqlType::Int32);
        assert!(status().is_integral());
    }

    #[test]
    fn test_promote_widens_numeric() {
        assert_eq!(SqlType::promote(&SqlType::Byte, &SqlType::Int32), SqlType::Int32);
        assert_eq!(SqlType::promote(&SqlType::Int64, &SqlType::Double), SqlType::Double);
        assert_eq!(SqlType::promote(&status(), &SqlType::Int16), SqlType::Int32);
        assert_eq!(SqlType::promote(&status(), &status()), status());
    }

    #[test]
    fn test_promote_string_wins() {
        assert_eq!(SqlType::promote(&SqlType::Int32, &SqlType::String), SqlType::String);
    }

    #[test]
    fn test_value_as_i64() {
        assert_eq!(Value::Int16(7).as_i64(), Some(7));
        assert_eq!(Value::String("7".into()).as_i64(), None);
    }
}
