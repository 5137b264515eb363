use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Column data types a field can be backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[serde(alias = "varchar")]
    String,
    Text,
    #[serde(alias = "int")]
    Integer,
    #[serde(rename = "bigint")]
    BigInteger,
    Float,
    Decimal,
    #[serde(alias = "bool")]
    Boolean,
    Date,
    Time,
    #[serde(alias = "timestamp")]
    DateTime,
    Uuid,
    #[serde(alias = "jsonb")]
    Json,
    Csv,
}

/// Every data type, in declaration order.
pub const ALL_TYPES: &[DataType] = &[
    DataType::String,
    DataType::Text,
    DataType::Integer,
    DataType::BigInteger,
    DataType::Float,
    DataType::Decimal,
    DataType::Boolean,
    DataType::Date,
    DataType::Time,
    DataType::DateTime,
    DataType::Uuid,
    DataType::Json,
    DataType::Csv,
];

/// Length used for `string` columns declared without one.
pub const DEFAULT_STRING_LENGTH: u32 = 255;

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::BigInteger => "bigint",
            Self::Float => "float",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::DateTime => "datetime",
            Self::Uuid => "uuid",
            Self::Json => "json",
            Self::Csv => "csv",
        }
    }

    /// Whether `max_length` is meaningful for this type.
    pub fn has_length(&self) -> bool {
        matches!(self, Self::String | Self::Csv)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::Integer | Self::BigInteger | Self::Float | Self::Decimal
        )
    }

    /// True when every value of `self` converts to `target` without loss.
    pub fn widens_to(&self, target: DataType) -> bool {
        use DataType::*;
        if *self == target {
            return true;
        }
        matches!(
            (self, target),
            (Integer, BigInteger)
                | (Integer, Float)
                | (Integer, Decimal)
                | (BigInteger, Decimal)
                | (Float, Decimal)
                | (String, Text)
                | (Csv, Text)
        )
    }

    /// Checks that a non-null JSON value can be stored in a column of this type.
    pub fn check_value(&self, value: &Value, max_length: Option<u32>) -> Result<(), String> {
        let ok = match self {
            Self::String | Self::Text => value.is_string(),
            Self::Csv => {
                value.is_string()
                    || value
                        .as_array()
                        .map_or(false, |items| items.iter().all(Value::is_string))
            }
            Self::Integer => value
                .as_i64()
                .map_or(false, |v| i32::try_from(v).is_ok()),
            Self::BigInteger => value.is_i64() || value.is_u64(),
            Self::Float => value.is_number(),
            Self::Decimal => {
                value.is_number()
                    || value
                        .as_str()
                        .map_or(false, |s| s.trim().parse::<f64>().is_ok())
            }
            Self::Boolean => value.is_boolean(),
            Self::Date => value
                .as_str()
                .map_or(false, |s| NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()),
            Self::Time => value.as_str().map_or(false, |s| {
                NaiveTime::parse_from_str(s, "%H:%M:%S").is_ok()
                    || NaiveTime::parse_from_str(s, "%H:%M").is_ok()
            }),
            Self::DateTime => value.as_str().map_or(false, |s| {
                DateTime::parse_from_rfc3339(s).is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").is_ok()
                    || NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
            }),
            Self::Uuid => value.as_str().map_or(false, |s| Uuid::parse_str(s).is_ok()),
            Self::Json => true,
        };
        if !ok {
            return Err(format!("value {} is not a valid {}", value, self));
        }

        if let (Some(limit), Some(text)) = (max_length, value.as_str()) {
            if self.has_length() && text.chars().count() > limit as usize {
                return Err(format!(
                    "value of length {} exceeds max length {}",
                    text.chars().count(),
                    limit
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "string" | "varchar" => Ok(Self::String),
            "text" => Ok(Self::Text),
            "integer" | "int" => Ok(Self::Integer),
            "bigint" => Ok(Self::BigInteger),
            "float" => Ok(Self::Float),
            "decimal" => Ok(Self::Decimal),
            "boolean" | "bool" => Ok(Self::Boolean),
            "date" => Ok(Self::Date),
            "time" => Ok(Self::Time),
            "datetime" | "timestamp" => Ok(Self::DateTime),
            "uuid" => Ok(Self::Uuid),
            "json" | "jsonb" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(format!("unknown data type '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn aliases_parse() {
        assert_eq!("varchar".parse::<DataType>().unwrap(), DataType::String);
        assert_eq!("TIMESTAMP".parse::<DataType>().unwrap(), DataType::DateTime);
        let parsed: DataType = serde_json::from_value(json!("jsonb")).unwrap();
        assert_eq!(parsed, DataType::Json);
        assert!("blob".parse::<DataType>().is_err());
    }

    #[test]
    fn widening_rules() {
        assert!(DataType::Integer.widens_to(DataType::BigInteger));
        assert!(DataType::String.widens_to(DataType::Text));
        assert!(!DataType::Text.widens_to(DataType::String));
        assert!(!DataType::BigInteger.widens_to(DataType::Integer));
        assert!(!DataType::Boolean.widens_to(DataType::Integer));
    }

    #[test]
    fn value_checks() {
        assert!(DataType::Integer.check_value(&json!(42), None).is_ok());
        assert!(DataType::Integer.check_value(&json!(1u64 << 40), None).is_err());
        assert!(DataType::String.check_value(&json!("abc"), Some(2)).is_err());
        assert!(DataType::Date.check_value(&json!("2024-02-29"), None).is_ok());
        assert!(DataType::Date.check_value(&json!("2024-02-30"), None).is_err());
        assert!(DataType::Uuid
            .check_value(&json!("not-a-uuid"), None)
            .is_err());
        assert!(DataType::Json.check_value(&json!({"a": [1]}), None).is_ok());
    }
}
