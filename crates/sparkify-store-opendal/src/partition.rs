//! Hive-style partition directories (`<column>=<value>/`).

use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat};
use sparkify_core::table::{Column, ColumnType, Value};

use crate::{Error, Result};

/// Directory value standing in for a null (or empty) partition value.
pub const DEFAULT_PARTITION: &str = "__HIVE_DEFAULT_PARTITION__";

fn needs_escape(c: char) -> bool {
  matches!(
    c,
    '"' | '#' | '%' | '\'' | '*' | '/' | ':' | '=' | '?' | '\\' | '\u{7f}' | '{' | '[' | ']' | '^'
  ) || c < ' '
}

/// Percent-escape the characters that would break a path segment.
pub fn escape(value: &str) -> String {
  let mut out = String::with_capacity(value.len());
  for c in value.chars() {
    if needs_escape(c) {
      let _ = write!(out, "%{:02X}", c as u32);
    } else {
      out.push(c);
    }
  }
  out
}

/// Reverse [`escape`]. A `%` not followed by two hex digits is kept as is.
pub fn unescape(segment: &str) -> String {
  let mut out = String::with_capacity(segment.len());
  let mut rest = segment;
  while let Some(idx) = rest.find('%') {
    out.push_str(&rest[..idx]);
    let decoded = rest
      .get(idx + 1..idx + 3)
      .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
      .and_then(|hex| u8::from_str_radix(hex, 16).ok());
    match decoded {
      Some(byte) => {
        out.push(char::from(byte));
        rest = &rest[idx + 3..];
      }
      None => {
        out.push('%');
        rest = &rest[idx + 1..];
      }
    }
  }
  out.push_str(rest);
  out
}

/// Text of a cell as it appears in a directory name, before escaping.
fn display(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::Utf8(s) if s.is_empty() => None,
    Value::Utf8(s) => Some(s.clone()),
    Value::Int32(v) => Some(v.to_string()),
    Value::Int64(v) => Some(v.to_string()),
    Value::Float64(v) => Some(v.to_string()),
    Value::Timestamp(t) => Some(t.to_rfc3339_opts(SecondsFormat::Micros, true)),
  }
}

/// `name=value/` for each pair, outermost first. Empty for no pairs.
pub fn partition_dir<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a Value)>) -> String {
  let mut dir = String::new();
  for (name, value) in pairs {
    let text = display(value).map_or_else(|| DEFAULT_PARTITION.to_string(), |s| escape(&s));
    let _ = write!(dir, "{name}={text}/");
  }
  dir
}

/// Parse the value half of a directory segment back into a typed cell.
///
/// `path` and `segment` are only used for the error.
pub fn parse_value(raw: &str, column: &Column, path: &str, segment: &str) -> Result<Value> {
  if raw == DEFAULT_PARTITION {
    return Ok(Value::Null);
  }
  let text = unescape(raw);
  let invalid = || Error::Partition {
    path:    path.to_string(),
    segment: segment.to_string(),
  };
  Ok(match column.ty {
    ColumnType::Utf8 => Value::Utf8(text),
    ColumnType::Int32 => Value::Int32(text.parse().map_err(|_| invalid())?),
    ColumnType::Int64 => Value::Int64(text.parse().map_err(|_| invalid())?),
    ColumnType::Float64 => Value::Float64(text.parse().map_err(|_| invalid())?),
    ColumnType::Timestamp => Value::Timestamp(
      DateTime::parse_from_rfc3339(&text)
        .map_err(|_| invalid())?
        .to_utc(),
    ),
  })
}
