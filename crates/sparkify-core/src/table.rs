//! Output table schemas and row types.
//!
//! Rows cross the storage boundary as a vector of [`Value`] cells ordered like
//! [`TableName::columns`]. Backends encode from that shape and never see the
//! concrete row types; every column is nullable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Error, Result};

// ─── Schema ──────────────────────────────────────────────────────────────────

/// Physical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
  Utf8,
  Int32,
  Int64,
  Float64,
  /// Microsecond precision, UTC.
  Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
  pub name: &'static str,
  pub ty:   ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column { Column { name, ty } }

static SONGS: [Column; 5] = [
  col("song_id", ColumnType::Utf8),
  col("title", ColumnType::Utf8),
  col("artist_id", ColumnType::Utf8),
  col("year", ColumnType::Int64),
  col("duration", ColumnType::Float64),
];

static ARTISTS: [Column; 5] = [
  col("artist_id", ColumnType::Utf8),
  col("name", ColumnType::Utf8),
  col("location", ColumnType::Utf8),
  col("latitude", ColumnType::Float64),
  col("longitude", ColumnType::Float64),
];

static USERS: [Column; 5] = [
  col("user_id", ColumnType::Utf8),
  col("first_name", ColumnType::Utf8),
  col("last_name", ColumnType::Utf8),
  col("gender", ColumnType::Utf8),
  col("level", ColumnType::Utf8),
];

static TIME: [Column; 7] = [
  col("start_time", ColumnType::Timestamp),
  col("hour", ColumnType::Int32),
  col("day", ColumnType::Int32),
  col("week", ColumnType::Int32),
  col("month", ColumnType::Int32),
  col("year", ColumnType::Int32),
  col("weekday", ColumnType::Int32),
];

static SONGPLAYS: [Column; 11] = [
  col("songplay_id", ColumnType::Int64),
  col("start_time", ColumnType::Timestamp),
  col("user_id", ColumnType::Utf8),
  col("level", ColumnType::Utf8),
  col("song_id", ColumnType::Utf8),
  col("artist_id", ColumnType::Utf8),
  col("session_id", ColumnType::Int64),
  col("location", ColumnType::Utf8),
  col("user_agent", ColumnType::Utf8),
  col("year", ColumnType::Int32),
  col("month", ColumnType::Int32),
];

/// The five tables of the star schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TableName {
  Songs,
  Artists,
  Users,
  Time,
  Songplays,
}

impl TableName {
  pub const ALL: [TableName; 5] = [
    Self::Songs,
    Self::Artists,
    Self::Users,
    Self::Time,
    Self::Songplays,
  ];

  /// Directory name under the output root.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Songs => "songs",
      Self::Artists => "artists",
      Self::Users => "users",
      Self::Time => "time",
      Self::Songplays => "songplays",
    }
  }

  pub fn columns(self) -> &'static [Column] {
    match self {
      Self::Songs => &SONGS,
      Self::Artists => &ARTISTS,
      Self::Users => &USERS,
      Self::Time => &TIME,
      Self::Songplays => &SONGPLAYS,
    }
  }

  /// Columns that become `<name>=<value>` directories, outermost first.
  pub fn partition_by(self) -> &'static [&'static str] {
    match self {
      Self::Songs => &["year", "artist_id"],
      Self::Time | Self::Songplays => &["year", "month"],
      Self::Artists | Self::Users => &[],
    }
  }
}

impl fmt::Display for TableName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── Cells ───────────────────────────────────────────────────────────────────

/// A single nullable cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
  Null,
  Utf8(String),
  Int32(i32),
  Int64(i64),
  Float64(f64),
  Timestamp(DateTime<Utc>),
}

impl Value {
  pub fn is_null(&self) -> bool { matches!(self, Self::Null) }
}

impl From<Option<String>> for Value {
  fn from(v: Option<String>) -> Self { v.map_or(Self::Null, Self::Utf8) }
}

impl From<Option<i32>> for Value {
  fn from(v: Option<i32>) -> Self { v.map_or(Self::Null, Self::Int32) }
}

impl From<Option<i64>> for Value {
  fn from(v: Option<i64>) -> Self { v.map_or(Self::Null, Self::Int64) }
}

impl From<Option<f64>> for Value {
  fn from(v: Option<f64>) -> Self { v.map_or(Self::Null, Self::Float64) }
}

impl From<Option<DateTime<Utc>>> for Value {
  fn from(v: Option<DateTime<Utc>>) -> Self { v.map_or(Self::Null, Self::Timestamp) }
}

/// Typed, positional reader over a row's cells.
struct Cells {
  table:  TableName,
  next:   usize,
  values: std::vec::IntoIter<Value>,
}

impl Cells {
  fn new(table: TableName, values: Vec<Value>) -> Result<Self> {
    let expected = table.columns().len();
    if values.len() != expected {
      return Err(Error::ColumnCount { table, expected, actual: values.len() });
    }
    Ok(Self { table, next: 0, values: values.into_iter() })
  }

  fn advance(&mut self) -> (Column, Value) {
    let column = self.table.columns()[self.next];
    self.next += 1;
    (column, self.values.next().unwrap_or(Value::Null))
  }

  fn mismatch(&self, column: Column) -> Error {
    Error::ColumnType {
      table:    self.table,
      column:   column.name,
      expected: column.ty,
    }
  }

  fn utf8(&mut self) -> Result<Option<String>> {
    match self.advance() {
      (_, Value::Null) => Ok(None),
      (_, Value::Utf8(v)) => Ok(Some(v)),
      (c, _) => Err(self.mismatch(c)),
    }
  }

  fn int32(&mut self) -> Result<Option<i32>> {
    match self.advance() {
      (_, Value::Null) => Ok(None),
      (_, Value::Int32(v)) => Ok(Some(v)),
      (c, _) => Err(self.mismatch(c)),
    }
  }

  fn int64(&mut self) -> Result<Option<i64>> {
    match self.advance() {
      (_, Value::Null) => Ok(None),
      (_, Value::Int64(v)) => Ok(Some(v)),
      (c, _) => Err(self.mismatch(c)),
    }
  }

  fn float64(&mut self) -> Result<Option<f64>> {
    match self.advance() {
      (_, Value::Null) => Ok(None),
      (_, Value::Float64(v)) => Ok(Some(v)),
      (c, _) => Err(self.mismatch(c)),
    }
  }

  fn timestamp(&mut self) -> Result<Option<DateTime<Utc>>> {
    match self.advance() {
      (_, Value::Null) => Ok(None),
      (_, Value::Timestamp(v)) => Ok(Some(v)),
      (c, _) => Err(self.mismatch(c)),
    }
  }

  fn required<T>(&self, value: Option<T>, column: &'static str) -> Result<T> {
    value.ok_or(Error::NullValue { table: self.table, column })
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

/// A row of one of the output tables.
pub trait TableRow: Sized + Send + 'static {
  const TABLE: TableName;

  /// Cells in [`TableName::columns`] order.
  fn into_values(self) -> Vec<Value>;

  fn from_values(values: Vec<Value>) -> Result<Self>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongRow {
  pub song_id:   Option<String>,
  pub title:     Option<String>,
  pub artist_id: Option<String>,
  pub year:      Option<i64>,
  pub duration:  Option<f64>,
}

impl TableRow for SongRow {
  const TABLE: TableName = TableName::Songs;

  fn into_values(self) -> Vec<Value> {
    vec![
      self.song_id.into(),
      self.title.into(),
      self.artist_id.into(),
      self.year.into(),
      self.duration.into(),
    ]
  }

  fn from_values(values: Vec<Value>) -> Result<Self> {
    let mut c = Cells::new(Self::TABLE, values)?;
    Ok(Self {
      song_id:   c.utf8()?,
      title:     c.utf8()?,
      artist_id: c.utf8()?,
      year:      c.int64()?,
      duration:  c.float64()?,
    })
  }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArtistRow {
  pub artist_id: Option<String>,
  pub name:      Option<String>,
  pub location:  Option<String>,
  pub latitude:  Option<f64>,
  pub longitude: Option<f64>,
}

impl TableRow for ArtistRow {
  const TABLE: TableName = TableName::Artists;

  fn into_values(self) -> Vec<Value> {
    vec![
      self.artist_id.into(),
      self.name.into(),
      self.location.into(),
      self.latitude.into(),
      self.longitude.into(),
    ]
  }

  fn from_values(values: Vec<Value>) -> Result<Self> {
    let mut c = Cells::new(Self::TABLE, values)?;
    Ok(Self {
      artist_id: c.utf8()?,
      name:      c.utf8()?,
      location:  c.utf8()?,
      latitude:  c.float64()?,
      longitude: c.float64()?,
    })
  }
}

/// A user's state as of their most recent play.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserRow {
  pub user_id:    Option<String>,
  pub first_name: Option<String>,
  pub last_name:  Option<String>,
  pub gender:     Option<String>,
  pub level:      Option<String>,
}

impl TableRow for UserRow {
  const TABLE: TableName = TableName::Users;

  fn into_values(self) -> Vec<Value> {
    vec![
      self.user_id.into(),
      self.first_name.into(),
      self.last_name.into(),
      self.gender.into(),
      self.level.into(),
    ]
  }

  fn from_values(values: Vec<Value>) -> Result<Self> {
    let mut c = Cells::new(Self::TABLE, values)?;
    Ok(Self {
      user_id:    c.utf8()?,
      first_name: c.utf8()?,
      last_name:  c.utf8()?,
      gender:     c.utf8()?,
      level:      c.utf8()?,
    })
  }
}

/// Calendar breakdown of one play instant. See [`crate::activity::time_row`]
/// for the conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeRow {
  pub start_time: Option<DateTime<Utc>>,
  pub hour:       Option<i32>,
  pub day:        Option<i32>,
  pub week:       Option<i32>,
  pub month:      Option<i32>,
  pub year:       Option<i32>,
  pub weekday:    Option<i32>,
}

impl TableRow for TimeRow {
  const TABLE: TableName = TableName::Time;

  fn into_values(self) -> Vec<Value> {
    vec![
      self.start_time.into(),
      self.hour.into(),
      self.day.into(),
      self.week.into(),
      self.month.into(),
      self.year.into(),
      self.weekday.into(),
    ]
  }

  fn from_values(values: Vec<Value>) -> Result<Self> {
    let mut c = Cells::new(Self::TABLE, values)?;
    Ok(Self {
      start_time: c.timestamp()?,
      hour:       c.int32()?,
      day:        c.int32()?,
      week:       c.int32()?,
      month:      c.int32()?,
      year:       c.int32()?,
      weekday:    c.int32()?,
    })
  }
}

/// One play event, with catalog keys when the content match succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SongplayRow {
  pub songplay_id: i64,
  pub start_time:  Option<DateTime<Utc>>,
  pub user_id:     Option<String>,
  pub level:       Option<String>,
  pub song_id:     Option<String>,
  pub artist_id:   Option<String>,
  pub session_id:  Option<i64>,
  pub location:    Option<String>,
  pub user_agent:  Option<String>,
  pub year:        Option<i32>,
  pub month:       Option<i32>,
}

impl TableRow for SongplayRow {
  const TABLE: TableName = TableName::Songplays;

  fn into_values(self) -> Vec<Value> {
    vec![
      Value::Int64(self.songplay_id),
      self.start_time.into(),
      self.user_id.into(),
      self.level.into(),
      self.song_id.into(),
      self.artist_id.into(),
      self.session_id.into(),
      self.location.into(),
      self.user_agent.into(),
      self.year.into(),
      self.month.into(),
    ]
  }

  fn from_values(values: Vec<Value>) -> Result<Self> {
    let mut c = Cells::new(Self::TABLE, values)?;
    let songplay_id = c.int64()?;
    Ok(Self {
      songplay_id: c.required(songplay_id, "songplay_id")?,
      start_time:  c.timestamp()?,
      user_id:     c.utf8()?,
      level:       c.utf8()?,
      song_id:     c.utf8()?,
      artist_id:   c.utf8()?,
      session_id:  c.int64()?,
      location:    c.utf8()?,
      user_agent:  c.utf8()?,
      year:        c.int32()?,
      month:       c.int32()?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn partition_columns_are_declared_columns() {
    for table in TableName::ALL {
      for name in table.partition_by() {
        assert!(
          table.columns().iter().any(|c| c.name == *name),
          "{table}: partition column {name} is not a column"
        );
      }
    }
  }

  #[test]
  fn song_row_values_follow_column_order() {
    let row = SongRow {
      song_id:   Some("S1".to_string()),
      title:     Some("Song A".to_string()),
      artist_id: None,
      year:      Some(2000),
      duration:  Some(200.0),
    };
    let values = row.clone().into_values();
    assert_eq!(values.len(), TableName::Songs.columns().len());
    assert_eq!(values[2], Value::Null);
    assert_eq!(values[3], Value::Int64(2000));
    assert_eq!(SongRow::from_values(values).unwrap(), row);
  }

  #[test]
  fn from_values_rejects_wrong_arity() {
    let err = ArtistRow::from_values(vec![Value::Null]).unwrap_err();
    assert!(matches!(err, Error::ColumnCount { expected: 5, actual: 1, .. }));
  }

  #[test]
  fn from_values_rejects_wrong_type() {
    let values = vec![
      Value::Int32(1),
      Value::Null,
      Value::Null,
      Value::Null,
      Value::Null,
    ];
    let err = UserRow::from_values(values).unwrap_err();
    assert!(matches!(err, Error::ColumnType { column: "user_id", .. }));
  }

  #[test]
  fn songplay_id_is_required() {
    let mut values = vec![Value::Null; TableName::Songplays.columns().len()];
    values[2] = Value::Utf8("1".to_string());
    let err = SongplayRow::from_values(values).unwrap_err();
    assert!(matches!(err, Error::NullValue { column: "songplay_id", .. }));
  }
}
