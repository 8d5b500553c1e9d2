// used for persistence
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

// used for timestamps in the database
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

// used to print out readable forms of a data type
use std::fmt;
use std::str::FromStr;

// ------------- Timestamp --------------
/// A point in time with whole-second precision, which is what the store keeps.
#[derive(Eq, PartialEq, PartialOrd, Ord, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn from_seconds(seconds: i64) -> Self {
        Self(seconds)
    }
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }
    pub fn seconds(&self) -> i64 {
        self.0
    }
    pub fn to_datetime(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.0, 0).single().unwrap_or_default()
    }
    /// Strictly later than `previous`, but never earlier than the wall clock.
    pub fn after(previous: Timestamp) -> Self {
        Self(Self::now().0.max(previous.0.saturating_add(1)))
    }
}
impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }
}
impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_datetime().format("%Y-%m-%d %H:%M:%S"))
    }
}
impl ToSql for Timestamp {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.0))
    }
}
impl FromSql for Timestamp {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        value.as_i64().map(Timestamp)
    }
}

// ------------- PublishDate --------------
/// Publication dates are often vague ("circa 1850", "Spring 2001"), so either
/// free text or an exact timestamp is kept.
#[derive(Eq, PartialEq, Hash, Clone, Debug, Serialize, Deserialize)]
pub enum PublishDate {
    Text(String),
    Timestamp(Timestamp),
}

impl PublishDate {
    pub const TIMESTAMP_PREFIX: &'static str = "ts:";

    pub fn encode(&self) -> String {
        match self {
            PublishDate::Text(text) => text.clone(),
            PublishDate::Timestamp(ts) => format!("{}{}", Self::TIMESTAMP_PREFIX, ts.seconds()),
        }
    }
    /// Text wins whenever the prefix is absent or the remainder is not a number.
    pub fn decode(raw: &str) -> Self {
        match raw
            .strip_prefix(Self::TIMESTAMP_PREFIX)
            .and_then(|s| s.parse::<i64>().ok())
        {
            Some(seconds) => PublishDate::Timestamp(Timestamp(seconds)),
            None => PublishDate::Text(raw.to_string()),
        }
    }
}
impl fmt::Display for PublishDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PublishDate::Text(text) => write!(f, "{}", text),
            PublishDate::Timestamp(ts) => write!(f, "{}", ts.to_datetime().format("%Y-%m-%d")),
        }
    }
}

// ------------- Enumerations --------------
macro_rules! storable_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        #[derive(Eq, PartialEq, Hash, Clone, Copy, Debug, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $($variant),+
        }
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }
        impl FromStr for $name {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    other => Err(format!("'{}' is not a valid {}", other, stringify!($name))),
                }
            }
        }
        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }
        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }
        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

storable_enum!(PersonRelation {
    Author => "author",
    Editor => "editor",
    Translator => "translator",
});

storable_enum!(ObjectRole {
    Format => "format",
    Cover => "cover",
});

// ------------- FieldValue --------------
/// The in-memory side of a stored field, as seen by the entry layer and the
/// criteria algebra.
#[derive(PartialEq, Clone, Debug)]
pub enum FieldValue {
    Null,
    Text(String),
    Integer(i64),
    Boolean(bool),
    Timestamp(Timestamp),
    PublishDate(PublishDate),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Text(_) => "text",
            FieldValue::Integer(_) => "integer",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Timestamp(_) => "timestamp",
            FieldValue::PublishDate(_) => "publish date",
        }
    }
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}
impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::Text(s)
    }
}
impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}
impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}
impl From<Timestamp> for FieldValue {
    fn from(ts: Timestamp) -> Self {
        FieldValue::Timestamp(ts)
    }
}
impl From<PublishDate> for FieldValue {
    fn from(pd: PublishDate) -> Self {
        FieldValue::PublishDate(pd)
    }
}
impl From<PersonRelation> for FieldValue {
    fn from(r: PersonRelation) -> Self {
        FieldValue::Text(r.as_str().to_string())
    }
}
impl From<ObjectRole> for FieldValue {
    fn from(r: ObjectRole) -> Self {
        FieldValue::Text(r.as_str().to_string())
    }
}
impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(o: Option<T>) -> Self {
        o.map(Into::into).unwrap_or(FieldValue::Null)
    }
}
