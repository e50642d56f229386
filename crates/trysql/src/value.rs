//! Bound parameter values and conversions out of result columns.

use crate::error::{SqlResult, TrySqlError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::fmt;

/// A closed set of values that can be bound to a placeholder or read from a result column.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<Utc>),
}

impl Value {
    /// Runtime type name, as written to the SQL log next to each argument.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "i64",
            Value::UInt(_) => "u64",
            Value::Float(_) => "f64",
            Value::Text(_) => "String",
            Value::Bytes(_) => "bytes",
            Value::Date(_) => "NaiveDate",
            Value::Timestamp(_) => "NaiveDateTime",
            Value::TimestampTz(_) => "DateTime<Utc>",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether this is the "zero value" of its type: `NULL`, `false`, `0`, `0.0`, or an
    /// empty string / byte string. Dates and timestamps are never zero.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Int(i) => *i == 0,
            Value::UInt(u) => *u == 0,
            Value::Float(f) => *f == 0.0,
            Value::Text(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Date(_) | Value::Timestamp(_) | Value::TimestampTz(_) => false,
        }
    }

    /// `None` for a zero value, `Some(self)` otherwise.
    ///
    /// Feed the result to the `*_selective` builders to skip a clause whenever the value
    /// equals its type's zero value.
    pub fn non_zero(self) -> Option<Value> {
        if self.is_zero() { None } else { Some(self) }
    }
}

/// Literal SQL text of the value, used when substituting injected `${..}` tokens.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::UInt(u) => write!(f, "{u}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::Date(d) => write!(f, "{d}"),
            Value::Timestamp(ts) => write!(f, "{ts}"),
            Value::TimestampTz(ts) => write!(f, "{ts}"),
        }
    }
}

macro_rules! impl_from_signed {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

macro_rules! impl_from_unsigned {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Value {
            fn from(v: $ty) -> Self {
                Value::UInt(u64::from(v))
            }
        })*
    };
}

impl_from_signed!(i8, i16, i32, i64);
impl_from_unsigned!(u8, u16, u32, u64);

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::Timestamp(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::TimestampTz(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ==================== Column value -> Rust ====================

/// Conversion from a column [`Value`] into a primitive destination.
///
/// This is the scalar decoding capability: only primitive-like types implement it, so
/// asking for a record or collection through a scalar API fails to compile, and a column
/// whose runtime type cannot be converted fails with [`TrySqlError::TypeMismatch`].
pub trait FromValue: Sized {
    /// Name used in mismatch errors.
    const TYPE_NAME: &'static str;

    fn from_value(value: Value) -> SqlResult<Self>;
}

fn mismatch<T: FromValue>(value: &Value) -> TrySqlError {
    TrySqlError::type_mismatch(T::TYPE_NAME, value.type_name())
}

fn out_of_range<T: FromValue>() -> TrySqlError {
    TrySqlError::type_mismatch(T::TYPE_NAME, "out-of-range integer")
}

macro_rules! impl_from_value_int {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn from_value(value: Value) -> SqlResult<Self> {
                match value {
                    Value::Int(i) => <$ty>::try_from(i).map_err(|_| out_of_range::<$ty>()),
                    Value::UInt(u) => <$ty>::try_from(u).map_err(|_| out_of_range::<$ty>()),
                    Value::Bool(b) => Ok(<$ty>::from(b)),
                    Value::Text(ref s) => s.trim().parse::<$ty>().map_err(|_| mismatch::<$ty>(&value)),
                    other => Err(mismatch::<$ty>(&other)),
                }
            }
        })*
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

macro_rules! impl_from_value_float {
    ($($ty:ty),*) => {
        $(impl FromValue for $ty {
            const TYPE_NAME: &'static str = stringify!($ty);

            fn from_value(value: Value) -> SqlResult<Self> {
                match value {
                    Value::Float(f) => Ok(f as $ty),
                    Value::Int(i) => Ok(i as $ty),
                    Value::UInt(u) => Ok(u as $ty),
                    Value::Text(ref s) => s.trim().parse::<$ty>().map_err(|_| mismatch::<$ty>(&value)),
                    other => Err(mismatch::<$ty>(&other)),
                }
            }
        })*
    };
}

impl_from_value_float!(f32, f64);

impl FromValue for bool {
    const TYPE_NAME: &'static str = "bool";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Bool(b) => Ok(b),
            // MySQL reports BOOLEAN columns as TINYINT(1).
            Value::Int(i) => Ok(i != 0),
            Value::UInt(u) => Ok(u != 0),
            Value::Text(ref s) => match s.as_str() {
                "1" | "t" | "true" | "TRUE" => Ok(true),
                "0" | "f" | "false" | "FALSE" => Ok(false),
                _ => Err(mismatch::<bool>(&value)),
            },
            other => Err(mismatch::<bool>(&other)),
        }
    }
}

impl FromValue for String {
    const TYPE_NAME: &'static str = "String";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Text(s) => Ok(s),
            Value::Bytes(b) => String::from_utf8(b)
                .map_err(|_| TrySqlError::type_mismatch("String", "non-utf8 bytes")),
            Value::Null => Err(mismatch::<String>(&Value::Null)),
            other => Ok(other.to_string()),
        }
    }
}

impl FromValue for Vec<u8> {
    const TYPE_NAME: &'static str = "Vec<u8>";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::Text(s) => Ok(s.into_bytes()),
            other => Err(mismatch::<Vec<u8>>(&other)),
        }
    }
}

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

fn parse_naive_datetime(s: &str) -> Option<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
}

impl FromValue for NaiveDateTime {
    const TYPE_NAME: &'static str = "NaiveDateTime";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Timestamp(ts) => Ok(ts),
            Value::TimestampTz(ts) => Ok(ts.naive_utc()),
            Value::Date(d) => Ok(d.and_time(chrono::NaiveTime::MIN)),
            Value::Text(ref s) => parse_naive_datetime(s).ok_or_else(|| mismatch::<Self>(&value)),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    const TYPE_NAME: &'static str = "DateTime<Utc>";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::TimestampTz(ts) => Ok(ts),
            Value::Timestamp(ts) => Ok(ts.and_utc()),
            Value::Text(ref s) => DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| parse_naive_datetime(s).map(|ts| ts.and_utc()))
                .ok_or_else(|| mismatch::<Self>(&value)),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for NaiveDate {
    const TYPE_NAME: &'static str = "NaiveDate";

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Date(d) => Ok(d),
            Value::Timestamp(ts) => Ok(ts.date()),
            Value::TimestampTz(ts) => Ok(ts.date_naive()),
            Value::Text(ref s) => {
                NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| mismatch::<Self>(&value))
            }
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromValue for Value {
    const TYPE_NAME: &'static str = "Value";

    fn from_value(value: Value) -> SqlResult<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    const TYPE_NAME: &'static str = T::TYPE_NAME;

    fn from_value(value: Value) -> SqlResult<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

// ==================== Argument lists ====================

/// Conversion of a caller-supplied argument list into bound values.
///
/// Implemented for tuples (up to eight elements), arrays and vectors of anything that
/// converts into [`Value`]. `()` is the empty argument list.
pub trait IntoValues {
    fn into_values(self) -> Vec<Value>;
}

impl<V: Into<Value>> IntoValues for Vec<V> {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<V: Into<Value>, const N: usize> IntoValues for [V; N] {
    fn into_values(self) -> Vec<Value> {
        self.into_iter().map(Into::into).collect()
    }
}

impl IntoValues for () {
    fn into_values(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! impl_into_values_tuple {
    ($($name:ident),+) => {
        impl<$($name: Into<Value>),+> IntoValues for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_values(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into()),+]
            }
        }
    };
}

impl_into_values_tuple!(A);
impl_into_values_tuple!(A, B);
impl_into_values_tuple!(A, B, C);
impl_into_values_tuple!(A, B, C, D);
impl_into_values_tuple!(A, B, C, D, E);
impl_into_values_tuple!(A, B, C, D, E, F);
impl_into_values_tuple!(A, B, C, D, E, F, G);
impl_into_values_tuple!(A, B, C, D, E, F, G, H);

/// Build a `Vec<Value>` from heterogeneous expressions.
///
/// ```ignore
/// session.into_multi_values(vec![params![1, "a"], params![2, "b"]]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}
