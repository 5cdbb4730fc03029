//! Conversions between table cells and Parquet files.

use std::{collections::BTreeMap, sync::Arc};

use arrow::{
  array::{
    Array, ArrayRef, Float64Array, Int32Array, Int64Array, StringArray,
    TimestampMicrosecondArray,
  },
  datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit},
  record_batch::RecordBatch,
};
use bytes::Bytes;
use chrono::DateTime;
use parquet::{
  arrow::{ArrowWriter, arrow_reader::ParquetRecordBatchReaderBuilder},
  basic::Compression,
  file::properties::WriterProperties,
};
use sparkify_core::table::{Column, ColumnType, TableName, Value};

use crate::{Error, Result, partition};

/// File name of the single data file in each partition directory.
pub const PART_FILE: &str = "part-00000.snappy.parquet";

// ─── Schema ──────────────────────────────────────────────────────────────────

fn arrow_type(ty: ColumnType) -> DataType {
  match ty {
    ColumnType::Utf8 => DataType::Utf8,
    ColumnType::Int32 => DataType::Int32,
    ColumnType::Int64 => DataType::Int64,
    ColumnType::Float64 => DataType::Float64,
    ColumnType::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
  }
}

fn schema(columns: &[Column]) -> SchemaRef {
  Arc::new(Schema::new(
    columns
      .iter()
      .map(|c| Field::new(c.name, arrow_type(c.ty), true))
      .collect::<Vec<_>>(),
  ))
}

/// Columns stored in the file body, i.e. everything not encoded in the path.
fn body_columns(table: TableName) -> Vec<Column> {
  let partition_by = table.partition_by();
  table
    .columns()
    .iter()
    .filter(|c| !partition_by.contains(&c.name))
    .copied()
    .collect()
}

fn writer_properties() -> WriterProperties {
  WriterProperties::builder()
    .set_compression(Compression::SNAPPY)
    .set_created_by("sparkify-etl".to_string())
    .build()
}

// ─── Encode ──────────────────────────────────────────────────────────────────

fn to_array(table: TableName, column: &Column, cells: Vec<Value>) -> Result<ArrayRef> {
  let mismatch = || {
    Error::Core(sparkify_core::Error::ColumnType {
      table,
      column: column.name,
      expected: column.ty,
    })
  };

  let array: ArrayRef = match column.ty {
    ColumnType::Utf8 => Arc::new(StringArray::from(
      cells
        .into_iter()
        .map(|v| match v {
          Value::Null => Ok(None),
          Value::Utf8(s) => Ok(Some(s)),
          _ => Err(mismatch()),
        })
        .collect::<Result<Vec<_>>>()?,
    )),
    ColumnType::Int32 => Arc::new(Int32Array::from(
      cells
        .into_iter()
        .map(|v| match v {
          Value::Null => Ok(None),
          Value::Int32(n) => Ok(Some(n)),
          _ => Err(mismatch()),
        })
        .collect::<Result<Vec<_>>>()?,
    )),
    ColumnType::Int64 => Arc::new(Int64Array::from(
      cells
        .into_iter()
        .map(|v| match v {
          Value::Null => Ok(None),
          Value::Int64(n) => Ok(Some(n)),
          _ => Err(mismatch()),
        })
        .collect::<Result<Vec<_>>>()?,
    )),
    ColumnType::Float64 => Arc::new(Float64Array::from(
      cells
        .into_iter()
        .map(|v| match v {
          Value::Null => Ok(None),
          Value::Float64(n) => Ok(Some(n)),
          _ => Err(mismatch()),
        })
        .collect::<Result<Vec<_>>>()?,
    )),
    ColumnType::Timestamp => Arc::new(
      TimestampMicrosecondArray::from(
        cells
          .into_iter()
          .map(|v| match v {
            Value::Null => Ok(None),
            Value::Timestamp(t) => Ok(Some(t.timestamp_micros())),
            _ => Err(mismatch()),
          })
          .collect::<Result<Vec<_>>>()?,
      )
      .with_timezone("UTC"),
    ),
  };
  Ok(array)
}

/// Encode body rows (cells in `columns` order) as one Parquet file.
fn encode_file(table: TableName, columns: &[Column], rows: Vec<Vec<Value>>) -> Result<Bytes> {
  let mut by_column: Vec<Vec<Value>> = columns
    .iter()
    .map(|_| Vec::with_capacity(rows.len()))
    .collect();
  for row in rows {
    for (cells, value) in by_column.iter_mut().zip(row) {
      cells.push(value);
    }
  }

  let arrays = columns
    .iter()
    .zip(by_column)
    .map(|(column, cells)| to_array(table, column, cells))
    .collect::<Result<Vec<_>>>()?;

  let schema = schema(columns);
  let batch = RecordBatch::try_new(schema.clone(), arrays)?;

  let mut buf: Vec<u8> = Vec::new();
  let mut writer = ArrowWriter::try_new(&mut buf, schema, Some(writer_properties()))?;
  writer.write(&batch)?;
  writer.close()?;
  Ok(Bytes::from(buf))
}

/// Split a table into partitions and encode each one.
///
/// Returns `(path, bytes)` pairs relative to the output root, sorted by path.
/// Row order inside a partition follows input order. A table without
/// partition columns always yields exactly one file.
pub fn encode_table(table: TableName, rows: Vec<Vec<Value>>) -> Result<Vec<(String, Bytes)>> {
  let columns = table.columns();
  let partition_idx: Vec<usize> = table
    .partition_by()
    .iter()
    .filter_map(|name| columns.iter().position(|c| c.name == *name))
    .collect();
  let body = body_columns(table);

  let mut partitions: BTreeMap<String, Vec<Vec<Value>>> = BTreeMap::new();
  if partition_idx.is_empty() {
    partitions.insert(String::new(), Vec::new());
  }
  for row in rows {
    if row.len() != columns.len() {
      return Err(Error::Core(sparkify_core::Error::ColumnCount {
        table,
        expected: columns.len(),
        actual: row.len(),
      }));
    }
    let dir = partition::partition_dir(
      partition_idx
        .iter()
        .map(|&i| (columns[i].name, &row[i])),
    );
    let cells = row
      .into_iter()
      .enumerate()
      .filter(|(i, _)| !partition_idx.contains(i))
      .map(|(_, v)| v)
      .collect();
    partitions.entry(dir).or_default().push(cells);
  }

  partitions
    .into_iter()
    .map(|(dir, rows)| {
      let bytes = encode_file(table, &body, rows)?;
      Ok((format!("{table}/{dir}{PART_FILE}"), bytes))
    })
    .collect()
}

// ─── Decode ──────────────────────────────────────────────────────────────────

fn from_array(column: &Column, array: &ArrayRef) -> Result<Vec<Value>> {
  let mismatch = || Error::ArrowType {
    column: column.name.to_string(),
    found:  array.data_type().clone(),
  };

  let cells = match column.ty {
    ColumnType::Utf8 => array
      .as_any()
      .downcast_ref::<StringArray>()
      .ok_or_else(mismatch)?
      .iter()
      .map(|v| Value::from(v.map(str::to_string)))
      .collect(),
    ColumnType::Int32 => array
      .as_any()
      .downcast_ref::<Int32Array>()
      .ok_or_else(mismatch)?
      .iter()
      .map(Value::from)
      .collect(),
    ColumnType::Int64 => array
      .as_any()
      .downcast_ref::<Int64Array>()
      .ok_or_else(mismatch)?
      .iter()
      .map(Value::from)
      .collect(),
    ColumnType::Float64 => array
      .as_any()
      .downcast_ref::<Float64Array>()
      .ok_or_else(mismatch)?
      .iter()
      .map(Value::from)
      .collect(),
    ColumnType::Timestamp => array
      .as_any()
      .downcast_ref::<TimestampMicrosecondArray>()
      .ok_or_else(mismatch)?
      .iter()
      .map(|v| Value::from(v.and_then(DateTime::from_timestamp_micros)))
      .collect(),
  };
  Ok(cells)
}

/// Decode one Parquet file of `table` stored at `path` into full rows.
///
/// Partition cells come from the directory segments of `path`. Body columns
/// missing from the file read as null.
pub fn decode_file(table: TableName, path: &str, bytes: Bytes) -> Result<Vec<Vec<Value>>> {
  let columns = table.columns();
  let partition_by = table.partition_by();

  let relative = path
    .strip_prefix(table.as_str())
    .and_then(|p| p.strip_prefix('/'))
    .unwrap_or(path);
  let mut from_path: Vec<(&str, Value)> = Vec::new();
  let mut segments: Vec<&str> = relative.split('/').collect();
  segments.pop();
  for segment in segments {
    let invalid = || Error::Partition {
      path:    path.to_string(),
      segment: segment.to_string(),
    };
    let (name, raw) = segment.split_once('=').ok_or_else(invalid)?;
    let column = columns
      .iter()
      .find(|c| c.name == name && partition_by.contains(&c.name))
      .ok_or_else(invalid)?;
    from_path.push((column.name, partition::parse_value(raw, column, path, segment)?));
  }

  let body = body_columns(table);
  let reader = ParquetRecordBatchReaderBuilder::try_new(bytes)?.build()?;
  let mut rows = Vec::new();
  for batch in reader {
    let batch = batch?;
    let mut body_cells = Vec::with_capacity(body.len());
    for column in &body {
      let cells = match batch.schema().index_of(column.name) {
        Ok(idx) => from_array(column, batch.column(idx))?,
        Err(_) => vec![Value::Null; batch.num_rows()],
      };
      body_cells.push(cells.into_iter());
    }

    for _ in 0..batch.num_rows() {
      let mut next_body = body_cells.iter_mut();
      let row = columns
        .iter()
        .map(|column| {
          if partition_by.contains(&column.name) {
            from_path
              .iter()
              .find(|(name, _)| *name == column.name)
              .map_or(Value::Null, |(_, v)| v.clone())
          } else {
            next_body
              .next()
              .and_then(|cells| cells.next())
              .unwrap_or(Value::Null)
          }
        })
        .collect();
      rows.push(row);
    }
  }
  Ok(rows)
}

#[cfg(test)]
mod tests {
  use sparkify_core::table::{SongRow, TableRow, TimeRow};

  use super::*;

  #[test]
  fn unpartitioned_empty_table_still_yields_a_file() {
    let files = encode_table(TableName::Users, Vec::new()).unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].0, "users/part-00000.snappy.parquet");
    let rows = decode_file(TableName::Users, &files[0].0, files[0].1.clone()).unwrap();
    assert!(rows.is_empty());
  }

  #[test]
  fn partitioned_rows_are_grouped_and_restored() {
    let songs = vec![
      SongRow {
        song_id: Some("S2".to_string()),
        artist_id: Some("AR1".to_string()),
        year: Some(2000),
        ..Default::default()
      },
      SongRow {
        song_id: Some("S1".to_string()),
        artist_id: Some("AR0".to_string()),
        year: Some(2000),
        duration: Some(1.5),
        ..Default::default()
      },
    ];
    let files =
      encode_table(TableName::Songs, songs.iter().cloned().map(TableRow::into_values).collect())
        .unwrap();
    let paths: Vec<_> = files.iter().map(|(p, _)| p.as_str()).collect();
    assert_eq!(paths, vec![
      "songs/year=2000/artist_id=AR0/part-00000.snappy.parquet",
      "songs/year=2000/artist_id=AR1/part-00000.snappy.parquet",
    ]);

    let (path, bytes) = &files[0];
    let rows = decode_file(TableName::Songs, path, bytes.clone()).unwrap();
    let restored = SongRow::from_values(rows.into_iter().next().unwrap()).unwrap();
    assert_eq!(restored, songs[1]);
  }

  #[test]
  fn timestamps_keep_microseconds_in_utc() {
    let start = DateTime::from_timestamp_millis(1_541_106_106_796).unwrap();
    let row = TimeRow {
      start_time: Some(start),
      year: Some(2018),
      month: Some(11),
      ..Default::default()
    };
    let files = encode_table(TableName::Time, vec![row.clone().into_values()]).unwrap();
    let (path, bytes) = &files[0];
    assert_eq!(path, "time/year=2018/month=11/part-00000.snappy.parquet");
    let rows = decode_file(TableName::Time, path, bytes.clone()).unwrap();
    let restored = TimeRow::from_values(rows.into_iter().next().unwrap()).unwrap();
    assert_eq!(restored.start_time, Some(start));
    assert_eq!(restored, row);
  }

  #[test]
  fn encoding_is_deterministic() {
    let rows = || {
      vec![SongRow {
        song_id: Some("S1".to_string()),
        title: Some("Song A".to_string()),
        ..Default::default()
      }
      .into_values()]
    };
    let first = encode_table(TableName::Songs, rows()).unwrap();
    let second = encode_table(TableName::Songs, rows()).unwrap();
    assert_eq!(first, second);
  }

  #[test]
  fn wrong_cell_type_is_rejected() {
    let mut values = vec![Value::Null; TableName::Users.columns().len()];
    values[0] = Value::Int64(1);
    let err = encode_table(TableName::Users, vec![values]).unwrap_err();
    assert!(matches!(err, Error::Core(sparkify_core::Error::ColumnType { .. })));
  }

  #[test]
  fn unknown_partition_segment_is_rejected() {
    let files = encode_table(TableName::Users, Vec::new()).unwrap();
    let path = "users/region=eu/part-00000.snappy.parquet";
    let err = decode_file(TableName::Users, path, files[0].1.clone()).unwrap_err();
    assert!(matches!(err, Error::Partition { .. }));
  }
}
