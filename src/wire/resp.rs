use std::borrow::Cow;

use redis::{FromRedisValue, RedisError, RedisResult, Value};

use crate::wire::error::TransportError;

/// A server reply, RESP2 or RESP3, detached from the client library.
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    Nil,
    Simple(String),
    Error(String),
    Int(i64),
    Bulk(Vec<u8>),
    Array(Vec<RespValue>),
    Map(Vec<(RespValue, RespValue)>),
    Set(Vec<RespValue>),
    Double(f64),
    Bool(bool),
    BigNumber(String),
    Verbatim(String),
    Push(Vec<RespValue>),
}

impl RespValue {
    pub fn bulk(s: impl AsRef<[u8]>) -> Self {
        RespValue::Bulk(s.as_ref().to_vec())
    }

    pub fn simple(s: impl Into<String>) -> Self {
        RespValue::Simple(s.into())
    }

    /// Text view of string-like replies. Binary payloads decode lossily.
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            RespValue::Simple(s) | RespValue::Verbatim(s) | RespValue::BigNumber(s) => {
                Some(Cow::Borrowed(s))
            }
            RespValue::Bulk(b) => Some(String::from_utf8_lossy(b)),
            _ => None,
        }
    }

    /// Textual rendering of any scalar reply; `None` for nil, errors and aggregates.
    pub fn to_text(&self) -> Option<String> {
        match self {
            RespValue::Int(i) => Some(i.to_string()),
            RespValue::Double(d) => Some(d.to_string()),
            RespValue::Bool(b) => Some(b.to_string()),
            other => other.as_text().map(Cow::into_owned),
        }
    }

    /// Integer coercion: integers, integer-like text, and doubles (truncated).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            RespValue::Int(i) => Some(*i),
            RespValue::Double(d) if d.is_finite() => Some(d.trunc() as i64),
            other => {
                let text = other.as_text()?;
                let text = text.trim();
                text.parse::<i64>().ok().or_else(|| {
                    text.parse::<f64>()
                        .ok()
                        .filter(|d| d.is_finite())
                        .map(|d| d.trunc() as i64)
                })
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            RespValue::Double(d) => Some(*d),
            RespValue::Int(i) => Some(*i as f64),
            other => other.as_text()?.trim().parse::<f64>().ok(),
        }
    }

    /// Element view of array-shaped replies (arrays, sets, pushes).
    pub fn as_array(&self) -> Option<&[RespValue]> {
        match self {
            RespValue::Array(items) | RespValue::Set(items) | RespValue::Push(items) => {
                Some(items)
            }
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(RespValue, RespValue)]> {
        match self {
            RespValue::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Looks up a map entry whose key reads as `key`, whether sent as text or bytes.
    pub fn get(&self, key: &str) -> Option<&RespValue> {
        self.as_map()?
            .iter()
            .find(|(k, _)| k.as_text().is_some_and(|k| k == key))
            .map(|(_, v)| v)
    }

    pub fn text_eq_ignore_case(&self, other: &str) -> bool {
        self.as_text()
            .is_some_and(|text| text.eq_ignore_ascii_case(other))
    }
}

impl From<Value> for RespValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Nil => RespValue::Nil,
            Value::Int(i) => RespValue::Int(i),
            Value::BulkString(bytes) => RespValue::Bulk(bytes),
            Value::SimpleString(s) => RespValue::Simple(s),
            Value::Okay => RespValue::simple("OK"),
            Value::Array(items) => RespValue::Array(items.into_iter().map(Into::into).collect()),
            Value::Set(items) => RespValue::Set(items.into_iter().map(Into::into).collect()),
            Value::Map(entries) => RespValue::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            // attributes annotate the reply they wrap
            Value::Attribute { data, .. } => RespValue::from(*data),
            Value::Double(d) => RespValue::Double(d),
            Value::Boolean(b) => RespValue::Bool(b),
            Value::VerbatimString { text, .. } => RespValue::Verbatim(text),
            Value::Push { data, .. } => RespValue::Push(data.into_iter().map(Into::into).collect()),
            Value::ServerError(err) => RespValue::Error(match err.details() {
                Some(details) => format!("{} {details}", err.code()),
                None => err.code().to_string(),
            }),
            other => String::from_redis_value(other)
                .map(RespValue::BigNumber)
                .unwrap_or(RespValue::Nil),
        }
    }
}

/// Turns a client result into a reply. Error replies from the server stay
/// replies; only failures to talk to it become `Err`.
pub(crate) fn into_reply(result: RedisResult<Value>) -> Result<RespValue, TransportError> {
    match result {
        Ok(value) => Ok(value.into()),
        Err(err) => match server_message(&err) {
            Some(msg) => Ok(RespValue::Error(msg)),
            None => Err(err.into()),
        },
    }
}

fn server_message(err: &RedisError) -> Option<String> {
    let code = err.code()?;
    Some(match err.detail() {
        Some(detail) => format!("{code} {detail}"),
        None => code.to_string(),
    })
}
