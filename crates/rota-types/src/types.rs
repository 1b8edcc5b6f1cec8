use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::TryFrom;
use std::fmt;

/// Dynamically typed value of a document field
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum FieldValue {
    /// String value
    String(String),
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// Array of `FieldValues` (child tables, multi-select fields)
    Array(Vec<FieldValue>),
    /// Object/map of string keys to `FieldValues`
    Object(HashMap<String, FieldValue>),
    /// UTC date/time value
    Date(DateTime<Utc>),
    /// Null value (unset field)
    Null,
}

// -------------------------------------------------------------------------------------------------
// Conversions between `FieldValue` and `serde_json::Value`.
// Host frameworks hand documents over as JSON; the cache layer stores JSON payloads.
// -------------------------------------------------------------------------------------------------

impl From<FieldValue> for serde_json::Value {
    fn from(value: FieldValue) -> Self {
        match value {
            FieldValue::String(s) => Self::String(s),
            FieldValue::Integer(i) => Self::Number(serde_json::Number::from(i)),
            FieldValue::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            FieldValue::Boolean(b) => Self::Bool(b),
            FieldValue::Array(arr) => {
                Self::Array(arr.into_iter().map(std::convert::Into::into).collect())
            }
            FieldValue::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect::<serde_json::Map<String, Self>>(),
            ),
            FieldValue::Date(dt) => Self::String(dt.to_rfc3339()),
            FieldValue::Null => Self::Null,
        }
    }
}

impl From<&FieldValue> for serde_json::Value {
    fn from(value: &FieldValue) -> Self {
        value.clone().into()
    }
}

impl TryFrom<&serde_json::Value> for FieldValue {
    type Error = anyhow::Error;

    fn try_from(value: &serde_json::Value) -> Result<Self, Self::Error> {
        Ok(match value {
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    return Err(anyhow!("Unsupported number value: {}", n));
                }
            }
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Array(arr) => {
                let inner = arr.iter().map(Self::try_from).collect::<Result<Vec<_>, _>>()?;
                Self::Array(inner)
            }
            serde_json::Value::Object(map) => {
                let mut inner = HashMap::with_capacity(map.len());
                for (k, v) in map {
                    inner.insert(k.clone(), Self::try_from(v)?);
                }
                Self::Object(inner)
            }
            serde_json::Value::Null => Self::Null,
        })
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl PartialOrd for FieldValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        use FieldValue::{Boolean, Date, Float, Integer, Null, String};
        match (self, other) {
            (String(a), String(b)) => a.partial_cmp(b),
            (Integer(a), Integer(b)) => a.partial_cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (Boolean(a), Boolean(b)) => a.partial_cmp(b),
            (Date(a), Date(b)) => a.partial_cmp(b),
            (Null, Null) => Some(std::cmp::Ordering::Equal),
            #[allow(clippy::cast_precision_loss)]
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Array(arr) => {
                write!(f, "[")?;
                for (i, item) in arr.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Object(obj) => {
                // Sorted so rendered descriptions are stable
                let mut keys: Vec<_> = obj.keys().collect();
                keys.sort();
                write!(f, "{{")?;
                for (i, key) in keys.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {}", obj[*key])?;
                }
                write!(f, "}}")
            }
            Self::Date(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Self::Null => Ok(()),
        }
    }
}

impl FieldValue {
    /// Check if this value is "truthy" for conditional logic
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Boolean(b) => *b,
            Self::Integer(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::String(s) => !s.is_empty(),
            Self::Array(arr) => !arr.is_empty(),
            Self::Object(obj) => !obj.is_empty(),
            Self::Date(_) => true,
            Self::Null => false,
        }
    }

    /// Get the type name as a string
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
            Self::Date(_) => "date",
            Self::Null => "null",
        }
    }

    /// Check whether the value is null
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Borrow the inner string, if this is a string value
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to convert to an integer
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            #[allow(clippy::cast_possible_truncation)]
            Self::Float(f) => Some(*f as i64),
            Self::Boolean(b) => Some(i64::from(*b)),
            Self::String(s) => s.trim().parse::<i64>().ok(),
            Self::Null => Some(0),
            _ => None,
        }
    }

    /// Try to convert to a float
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Integer(i) => Some(*i as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::String(s) => s.trim().parse::<f64>().ok(),
            Self::Null => Some(0.0),
            _ => None,
        }
    }

    /// Convert to a string, rendering non-string values with `Display`
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Interpret the value as a boolean flag (checkbox fields are stored as 0/1)
    #[must_use]
    pub fn as_flag(&self) -> bool {
        match self {
            Self::String(s) => matches!(s.trim(), "1" | "true" | "True" | "yes"),
            other => other.is_truthy(),
        }
    }

    /// Create a date from an ISO 8601 / RFC 3339 string or a plain `YYYY-MM-DD` date
    ///
    /// # Errors
    ///
    /// Returns an error if the string is neither a RFC 3339 timestamp nor a calendar date.
    pub fn date_from_iso(iso_string: &str) -> Result<Self> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(iso_string) {
            return Ok(Self::Date(dt.with_timezone(&Utc)));
        }
        let date = NaiveDate::parse_from_str(iso_string, "%Y-%m-%d")
            .map_err(|e| anyhow!("Invalid date '{}': {}", iso_string, e))?;
        let midnight = date.and_hms_opt(0, 0, 0).ok_or_else(|| anyhow!("Invalid date"))?;
        Ok(Self::Date(midnight.and_utc()))
    }

    /// Convenience accessor returning an `f64` when this value is numeric
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub const fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truthiness() {
        assert!(FieldValue::Integer(3).is_truthy());
        assert!(!FieldValue::Integer(0).is_truthy());
        assert!(!FieldValue::String(String::new()).is_truthy());
        assert!(!FieldValue::Null.is_truthy());
        assert!(FieldValue::Array(vec![FieldValue::Null]).is_truthy());
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"status": "Open", "priority": 3, "tags": ["a"]});
        let value = FieldValue::try_from(&json).unwrap();
        match &value {
            FieldValue::Object(map) => {
                assert_eq!(map["status"], FieldValue::String("Open".to_string()));
                assert_eq!(map["priority"], FieldValue::Integer(3));
            }
            other => panic!("Expected object, got {other:?}"),
        }
        let back: serde_json::Value = value.into();
        assert_eq!(back, json);
    }

    #[test]
    fn test_flag_interpretation() {
        assert!(FieldValue::Integer(1).as_flag());
        assert!(FieldValue::String("1".to_string()).as_flag());
        assert!(!FieldValue::String("0".to_string()).as_flag());
        assert!(!FieldValue::Null.as_flag());
    }

    #[test]
    fn test_plain_date_parsing() {
        let value = FieldValue::date_from_iso("2024-03-01").unwrap();
        assert_eq!(value.to_string(), "2024-03-01 00:00:00");
        assert!(FieldValue::date_from_iso("yesterday").is_err());
    }
}
