//! Input record schemas.
//!
//! Both sources are schema-on-read JSON. Every field is optional; a value of
//! the wrong JSON type is coerced when a lossless reading exists and becomes
//! `None` otherwise. No record is ever rejected at this boundary.

use serde::Deserialize;

// ─── Song catalog ────────────────────────────────────────────────────────────

/// One song from the catalog dataset (`song_data/`). Each source file holds
/// a single record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SongCatalogRecord {
  #[serde(deserialize_with = "lenient::string")]
  pub song_id:          Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub title:            Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub artist_id:        Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub artist_name:      Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub artist_location:  Option<String>,
  #[serde(deserialize_with = "lenient::float")]
  pub artist_latitude:  Option<f64>,
  #[serde(deserialize_with = "lenient::float")]
  pub artist_longitude: Option<f64>,
  /// Release year; the catalog uses `0` for unknown.
  #[serde(deserialize_with = "lenient::int")]
  pub year:             Option<i64>,
  /// Track length in seconds.
  #[serde(deserialize_with = "lenient::float")]
  pub duration:         Option<f64>,
}

// ─── Activity log ────────────────────────────────────────────────────────────

/// One event from the user activity logs (`log_data/`), one per line.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ActivityLogRecord {
  #[serde(deserialize_with = "lenient::string")]
  pub user_id:    Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub first_name: Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub last_name:  Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub gender:     Option<String>,
  /// Subscription level at the time of the event (`free` / `paid`).
  #[serde(deserialize_with = "lenient::string")]
  pub level:      Option<String>,
  /// Event type discriminator; playback events are `NextSong`.
  #[serde(deserialize_with = "lenient::string")]
  pub page:       Option<String>,
  /// Epoch milliseconds.
  #[serde(deserialize_with = "lenient::int")]
  pub ts:         Option<i64>,
  #[serde(deserialize_with = "lenient::string")]
  pub song:       Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub artist:     Option<String>,
  /// Played length in seconds.
  #[serde(deserialize_with = "lenient::float")]
  pub length:     Option<f64>,
  #[serde(deserialize_with = "lenient::int")]
  pub session_id: Option<i64>,
  #[serde(deserialize_with = "lenient::string")]
  pub location:   Option<String>,
  #[serde(deserialize_with = "lenient::string")]
  pub user_agent: Option<String>,
}

// ─── Coercions ───────────────────────────────────────────────────────────────

mod lenient {
  use serde::{Deserialize, Deserializer};
  use serde_json::{Number, Value};

  /// `n` as an integer when it has no fractional part.
  fn whole(n: &Number) -> Option<i64> {
    n.as_i64().or_else(|| {
      n.as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
    })
  }

  pub fn string<'de, D>(d: D) -> Result<Option<String>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Value::deserialize(d)? {
      Value::String(s) => Some(s),
      Value::Number(n) => Some(whole(&n).map_or_else(|| n.to_string(), |i| i.to_string())),
      Value::Bool(b) => Some(b.to_string()),
      _ => None,
    })
  }

  pub fn int<'de, D>(d: D) -> Result<Option<i64>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Value::deserialize(d)? {
      Value::Number(n) => whole(&n),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    })
  }

  pub fn float<'de, D>(d: D) -> Result<Option<f64>, D::Error>
  where
    D: Deserializer<'de>,
  {
    Ok(match Value::deserialize(d)? {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().parse().ok().filter(|f: &f64| f.is_finite()),
      _ => None,
    })
  }
}
