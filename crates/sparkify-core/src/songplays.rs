//! Songplays Fact Join: play events matched against the catalog by content.
//!
//! The catalog is keyed on `(title, duration, artist name)` and each event
//! probes it with `(song, length, artist)`. Both numeric sides are rounded to
//! two decimals first. The match is exact on those three values and is
//! expected to miss for most events; a miss leaves `song_id` and `artist_id`
//! null rather than dropping the event.

use std::{
  collections::{HashMap, hash_map::Entry},
  str::FromStr,
};

use chrono::Datelike;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::{
  activity::PlayEvent,
  table::{ArtistRow, SongRow, SongplayRow},
};

/// Round to two decimals, halves away from zero.
///
/// Rounding applies to the shortest decimal form of `value` (`2.675` rounds to
/// `2.68` even though the nearest double is slightly below it). Non-finite
/// input, or input too large for a [`Decimal`] (about 7.9e28), has no rounded
/// value; [`SongLookup`] compares those as whole doubles instead.
pub fn round_half_up(value: f64) -> Option<Decimal> {
  if !value.is_finite() {
    return None;
  }
  let exact = Decimal::from_str(&value.to_string()).ok()?;
  Some(
    exact
      .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
      .normalize(),
  )
}

// ─── Lookup ──────────────────────────────────────────────────────────────────

/// A duration rounded to two decimals.
///
/// Doubles past the [`Decimal`] range are already whole numbers, so rounding
/// leaves them unchanged and they are keyed by their bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Rounded {
  Exact(Decimal),
  Whole(u64),
}

impl Rounded {
  fn of(value: f64) -> Option<Self> {
    if !value.is_finite() {
      return None;
    }
    Some(round_half_up(value).map_or(Self::Whole(value.to_bits()), Self::Exact))
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct MatchKey {
  title:    String,
  duration: Rounded,
  name:     String,
}

/// Catalog keys attached to a matched event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SongMatch {
  pub song_id:   Option<String>,
  pub artist_id: Option<String>,
}

/// Songs joined to their artists, indexed by content key.
#[derive(Debug, Clone, Default)]
pub struct SongLookup {
  index: HashMap<MatchKey, SongMatch>,
}

impl SongLookup {
  /// Left-join `songs` to `artists` on `artist_id` and index the result.
  ///
  /// Songs whose title, duration or artist name is missing cannot match any
  /// event and are skipped. If several songs share a key, the smallest
  /// `song_id` wins.
  pub fn build(songs: &[SongRow], artists: &[ArtistRow]) -> Self {
    let mut names: HashMap<&str, Option<&str>> = HashMap::new();
    for artist in artists {
      if let Some(id) = artist.artist_id.as_deref() {
        names.entry(id).or_insert(artist.name.as_deref());
      }
    }

    let mut index = HashMap::new();
    for song in songs {
      let name = song
        .artist_id
        .as_deref()
        .and_then(|id| names.get(id).copied().flatten());
      let (Some(title), Some(duration), Some(name)) =
        (song.title.as_deref(), song.duration.and_then(Rounded::of), name)
      else {
        continue;
      };

      let key = MatchKey {
        title: title.to_string(),
        duration,
        name: name.to_string(),
      };
      let candidate = SongMatch {
        song_id:   song.song_id.clone(),
        artist_id: song.artist_id.clone(),
      };
      match index.entry(key) {
        Entry::Vacant(slot) => {
          slot.insert(candidate);
        }
        Entry::Occupied(mut slot) => {
          if candidate.song_id < slot.get().song_id {
            slot.insert(candidate);
          }
        }
      }
    }

    Self { index }
  }

  /// Probe with an event's `song`, raw `length` and `artist`.
  pub fn find(
    &self,
    song: Option<&str>,
    length: Option<f64>,
    artist: Option<&str>,
  ) -> Option<&SongMatch> {
    let key = MatchKey {
      title:    song?.to_string(),
      duration: Rounded::of(length?)?,
      name:     artist?.to_string(),
    };
    self.index.get(&key)
  }

  /// Number of matchable keys.
  pub fn len(&self) -> usize { self.index.len() }

  pub fn is_empty(&self) -> bool { self.index.is_empty() }
}

// ─── Fact table ──────────────────────────────────────────────────────────────

/// Build the fact table.
///
/// Events are ordered by `(start_time, user_id)` ascending, missing values
/// first, with equal keys kept in input order. `songplay_id` then runs from 1
/// to N in that order.
pub fn songplays_table(events: &[PlayEvent], lookup: &SongLookup) -> Vec<SongplayRow> {
  let mut ordered: Vec<&PlayEvent> = events.iter().collect();
  ordered.sort_by(|a, b| {
    (a.start_time, a.record.user_id.as_deref())
      .cmp(&(b.start_time, b.record.user_id.as_deref()))
  });

  ordered
    .into_iter()
    .zip(1_i64..)
    .map(|(event, songplay_id)| {
      let r = &event.record;
      let matched = lookup.find(r.song.as_deref(), r.length, r.artist.as_deref());
      SongplayRow {
        songplay_id,
        start_time: event.start_time,
        user_id: r.user_id.clone(),
        level: r.level.clone(),
        song_id: matched.and_then(|m| m.song_id.clone()),
        artist_id: matched.and_then(|m| m.artist_id.clone()),
        session_id: r.session_id,
        location: r.location.clone(),
        user_agent: r.user_agent.clone(),
        year: event.start_time.map(|t| t.year()),
        month: event.start_time.map(|t| t.month() as i32),
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{activity::song_plays, record::ActivityLogRecord};

  fn dec(s: &str) -> Decimal { Decimal::from_str(s).unwrap() }

  fn song(song_id: &str, title: &str, artist_id: &str, duration: f64) -> SongRow {
    SongRow {
      song_id:   Some(song_id.to_string()),
      title:     Some(title.to_string()),
      artist_id: Some(artist_id.to_string()),
      year:      Some(2000),
      duration:  Some(duration),
    }
  }

  fn artist(artist_id: &str, name: &str) -> ArtistRow {
    ArtistRow {
      artist_id: Some(artist_id.to_string()),
      name: Some(name.to_string()),
      ..Default::default()
    }
  }

  fn play(user_id: Option<&str>, ts: Option<i64>, song: &str, artist: &str, length: f64) -> ActivityLogRecord {
    ActivityLogRecord {
      user_id: user_id.map(str::to_string),
      page: Some("NextSong".to_string()),
      ts,
      song: Some(song.to_string()),
      artist: Some(artist.to_string()),
      length: Some(length),
      level: Some("free".to_string()),
      session_id: Some(5),
      ..Default::default()
    }
  }

  #[test]
  fn rounding_uses_decimal_halves() {
    assert_eq!(round_half_up(2.675), Some(dec("2.68")));
    assert_eq!(round_half_up(0.125), Some(dec("0.13")));
    assert_eq!(round_half_up(-1.005), Some(dec("-1.01")));
    assert_eq!(round_half_up(218.93179), Some(dec("218.93")));
    assert_eq!(round_half_up(200.0), round_half_up(200.004));
    assert_eq!(round_half_up(f64::NAN), None);
    assert_eq!(round_half_up(f64::INFINITY), None);
  }

  #[test]
  fn lookup_matches_on_rounded_content() {
    let lookup = SongLookup::build(
      &[song("S1", "Song A", "AR1", 218.93179)],
      &[artist("AR1", "Artist X")],
    );
    assert_eq!(lookup.len(), 1);

    let hit = lookup.find(Some("Song A"), Some(218.934), Some("Artist X")).unwrap();
    assert_eq!(hit.song_id.as_deref(), Some("S1"));
    assert_eq!(hit.artist_id.as_deref(), Some("AR1"));

    assert!(lookup.find(Some("Song A"), Some(218.94), Some("Artist X")).is_none());
    assert!(lookup.find(Some("song a"), Some(218.93), Some("Artist X")).is_none());
    assert!(lookup.find(Some("Song A"), None, Some("Artist X")).is_none());
  }

  #[test]
  fn durations_beyond_decimal_range_still_match() {
    assert_eq!(round_half_up(1e29), None);
    let lookup = SongLookup::build(
      &[song("S1", "Long Song", "AR1", 1e29), song("S2", "Long Song", "AR1", 3e29)],
      &[artist("AR1", "Artist X")],
    );
    assert_eq!(lookup.len(), 2);
    let hit = lookup.find(Some("Long Song"), Some(1e29), Some("Artist X")).unwrap();
    assert_eq!(hit.song_id.as_deref(), Some("S1"));
    assert!(lookup.find(Some("Long Song"), Some(2e29), Some("Artist X")).is_none());
    assert!(lookup.find(Some("Long Song"), Some(f64::INFINITY), Some("Artist X")).is_none());
  }

  #[test]
  fn songs_without_artist_name_are_unmatchable() {
    let lookup = SongLookup::build(
      &[song("S1", "Song A", "AR9", 100.0), song("S2", "Song B", "AR1", 100.0)],
      &[ArtistRow { artist_id: Some("AR1".to_string()), ..Default::default() }],
    );
    assert!(lookup.is_empty());
  }

  #[test]
  fn duplicate_keys_resolve_to_smallest_song_id() {
    let lookup = SongLookup::build(
      &[song("S2", "Song A", "AR1", 200.0), song("S1", "Song A", "AR1", 200.001)],
      &[artist("AR1", "Artist X")],
    );
    assert_eq!(lookup.len(), 1);
    let hit = lookup.find(Some("Song A"), Some(200.0), Some("Artist X")).unwrap();
    assert_eq!(hit.song_id.as_deref(), Some("S1"));
  }

  #[test]
  fn ids_are_dense_and_follow_time_then_user() {
    let events = song_plays(vec![
      play(Some("2"), Some(3_000), "x", "y", 1.0),
      play(Some("10"), Some(1_000), "x", "y", 1.0),
      play(Some("1"), Some(3_000), "x", "y", 1.0),
      play(None, Some(3_000), "x", "y", 1.0),
      play(Some("1"), None, "x", "y", 1.0),
    ]);
    let rows = songplays_table(&events, &SongLookup::default());

    let ids: Vec<_> = rows.iter().map(|r| r.songplay_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    let order: Vec<_> = rows
      .iter()
      .map(|r| (r.start_time.map(|t| t.timestamp_millis()), r.user_id.as_deref()))
      .collect();
    assert_eq!(order, vec![
      (None, Some("1")),
      (Some(1_000), Some("10")),
      (Some(3_000), None),
      (Some(3_000), Some("1")),
      (Some(3_000), Some("2")),
    ]);
  }

  #[test]
  fn unmatched_events_are_kept_with_null_keys() {
    let lookup = SongLookup::build(
      &[song("S1", "Song A", "AR1", 200.0)],
      &[artist("AR1", "Artist X")],
    );
    let events = song_plays(vec![
      play(Some("1"), Some(1_000_000_000_000), "Song A", "Artist X", 200.0),
      play(Some("1"), Some(1_000_000_001_000), "Song B", "Artist X", 200.0),
    ]);
    let rows = songplays_table(&events, &lookup);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].song_id.as_deref(), Some("S1"));
    assert_eq!(rows[0].artist_id.as_deref(), Some("AR1"));
    assert_eq!(rows[0].session_id, Some(5));
    assert_eq!(rows[0].year, Some(2001));
    assert_eq!(rows[0].month, Some(9));
    assert_eq!(rows[1].song_id, None);
    assert_eq!(rows[1].artist_id, None);
  }
}
