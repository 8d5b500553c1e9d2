use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value as JsonValue;
use std::fmt;

use crate::datatype::{PublishDate, Timestamp};

pub const DEFAULT_LIST_SEPARATOR: &str = ", ";
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// What resolvers return and functions consume.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    String(String),
    Number(f64),
    Date(DateTime<FixedOffset>),
    List(Vec<Value>),
}

impl Value {
    /// Null, the empty string, and the empty list.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            _ => false,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Dates pass through, numbers are epoch seconds, strings are RFC 3339.
    pub fn as_date(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Value::Date(d) => Some(*d),
            Value::Number(n) => DateTime::<Utc>::from_timestamp(*n as i64, 0).map(|d| d.fixed_offset()),
            Value::String(s) => DateTime::parse_from_rfc3339(s.trim()).ok(),
            _ => None,
        }
    }

    pub fn render(&self, list_separator: &str, date_format: &str) -> String {
        match self {
            Value::Null => String::new(),
            Value::String(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Date(d) => format_date(d, date_format).unwrap_or_else(|| d.to_rfc3339()),
            Value::List(items) => items
                .iter()
                .map(|v| v.render(list_separator, date_format))
                .collect::<Vec<_>>()
                .join(list_separator),
        }
    }
}

/// `None` when `pattern` is not a valid strftime pattern.
pub fn format_date(date: &DateTime<FixedOffset>, pattern: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(pattern).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    Some(date.format_with_items(items.into_iter()).to_string())
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.render(DEFAULT_LIST_SEPARATOR, DEFAULT_DATE_FORMAT))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}
impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}
impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}
impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}
impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::Date(d)
    }
}
impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Value::Date(d.fixed_offset())
    }
}
impl From<Timestamp> for Value {
    fn from(ts: Timestamp) -> Self {
        ts.to_datetime().into()
    }
}
impl From<PublishDate> for Value {
    fn from(pd: PublishDate) -> Self {
        match pd {
            PublishDate::Text(text) => Value::String(text),
            PublishDate::Timestamp(ts) => ts.into(),
        }
    }
}
impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(Value::Null)
    }
}
impl From<JsonValue> for Value {
    fn from(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(b) => Value::String(b.to_string()),
            JsonValue::Number(n) => n.as_f64().map(Value::Number).unwrap_or(Value::Null),
            JsonValue::String(s) => Value::String(s),
            JsonValue::Array(items) => Value::List(items.into_iter().map(Value::from).collect()),
            object @ JsonValue::Object(_) => Value::String(object.to_string()),
        }
    }
}
