//! Event Transform: activity log records into the `users` and `time`
//! dimension tables.
//!
//! All calendar arithmetic is pinned to UTC so that output does not depend on
//! the host's local timezone.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Datelike, Timelike, Utc};

use crate::{
  record::ActivityLogRecord,
  table::{TimeRow, UserRow},
};

/// `page` value of an actual playback event.
pub const NEXT_SONG: &str = "NextSong";

/// A playback event together with its derived start instant.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayEvent {
  pub record:     ActivityLogRecord,
  /// `None` when the record carries no usable `ts`.
  pub start_time: Option<DateTime<Utc>>,
}

/// Keep only `NextSong` events and derive each one's `start_time`.
pub fn song_plays(records: Vec<ActivityLogRecord>) -> Vec<PlayEvent> {
  records
    .into_iter()
    .filter(|r| r.page.as_deref() == Some(NEXT_SONG))
    .map(|record| {
      let start_time = record.ts.and_then(start_time_from_ts);
      PlayEvent { record, start_time }
    })
    .collect()
}

/// Epoch milliseconds to a UTC instant, keeping the millisecond part.
pub fn start_time_from_ts(ts: i64) -> Option<DateTime<Utc>> {
  DateTime::from_timestamp_millis(ts)
}

/// Each user's profile as of their latest play.
///
/// Every event that shares a user's maximum `ts` is kept, so ties yield more
/// than one row for that user. Events without a `userId` or `ts` never match.
/// Rows come out in event order.
pub fn users_table(events: &[PlayEvent]) -> Vec<UserRow> {
  let mut latest: HashMap<&str, i64> = HashMap::new();
  for event in events {
    if let (Some(user_id), Some(ts)) = (event.record.user_id.as_deref(), event.record.ts) {
      latest
        .entry(user_id)
        .and_modify(|max| *max = (*max).max(ts))
        .or_insert(ts);
    }
  }

  events
    .iter()
    .map(|e| &e.record)
    .filter(|r| match (r.user_id.as_deref(), r.ts) {
      (Some(user_id), Some(ts)) => latest.get(user_id) == Some(&ts),
      _ => false,
    })
    .map(|r| UserRow {
      user_id:    r.user_id.clone(),
      first_name: r.first_name.clone(),
      last_name:  r.last_name.clone(),
      gender:     r.gender.clone(),
      level:      r.level.clone(),
    })
    .collect()
}

/// One row per distinct `start_time`, ascending; a missing instant counts as
/// one more distinct value and sorts first.
pub fn time_table(events: &[PlayEvent]) -> Vec<TimeRow> {
  let mut seen = HashSet::new();
  let mut rows: Vec<TimeRow> = events
    .iter()
    .filter(|e| seen.insert(e.start_time))
    .map(|e| time_row(e.start_time))
    .collect();
  rows.sort_by_key(|r| r.start_time);
  rows
}

/// Calendar fields of `start_time` in UTC.
///
/// `week` is the ISO-8601 week number, `year` the calendar year and `weekday`
/// runs from 1 (Sunday) to 7 (Saturday).
pub fn time_row(start_time: Option<DateTime<Utc>>) -> TimeRow {
  let Some(t) = start_time else {
    return TimeRow::default();
  };
  TimeRow {
    start_time: Some(t),
    hour:       Some(t.hour() as i32),
    day:        Some(t.day() as i32),
    week:       Some(t.iso_week().week() as i32),
    month:      Some(t.month() as i32),
    year:       Some(t.year()),
    weekday:    Some(t.weekday().number_from_sunday() as i32),
  }
}
