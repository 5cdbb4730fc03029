//! The two-phase pipeline driver.
//!
//! Phase 1 builds `songs` and `artists` from the catalog. Phase 2 builds
//! `users`, `time` and `songplays` from the activity logs, reading the
//! catalog tables back from storage. Phase 2 never sees phase 1's in-memory
//! rows, so the two can run as separate invocations.

use serde::Serialize;

use crate::{
  Error, Result, activity, catalog,
  gateway::StorageGateway,
  record::{ActivityLogRecord, SongCatalogRecord},
  songplays::{self, SongLookup},
  table::{ArtistRow, SongRow, TableName},
};

/// Where the two input datasets live, relative to the input root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
  pub song_glob: String,
  pub log_glob:  String,
}

impl Default for Layout {
  fn default() -> Self {
    Self {
      song_glob: "song_data/*/*/*/*.json".to_string(),
      log_glob:  "log_data/*/*/*.json".to_string(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CatalogSummary {
  pub records: usize,
  pub songs:   usize,
  pub artists: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivitySummary {
  pub records:    usize,
  /// Events that survived the `NextSong` filter.
  pub song_plays: usize,
  pub users:      usize,
  pub time:       usize,
  pub songplays:  usize,
  /// Songplays that found a catalog match.
  pub matched:    usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
  pub catalog:  CatalogSummary,
  pub activity: ActivitySummary,
}

fn gateway_error<E>(err: E) -> Error
where
  E: std::error::Error + Send + Sync + 'static,
{
  Error::Gateway(Box::new(err))
}

// ─── Phases ──────────────────────────────────────────────────────────────────

/// Phase 1: catalog records into `songs` and `artists`.
#[tracing::instrument(skip(gateway))]
pub async fn process_song_data<G: StorageGateway>(
  gateway: &G,
  song_glob: &str,
) -> Result<CatalogSummary> {
  let records: Vec<SongCatalogRecord> =
    gateway.read_records(song_glob).await.map_err(gateway_error)?;
  tracing::info!(records = records.len(), "read song catalog");

  let songs = catalog::songs_table(&records);
  let artists = catalog::artists_table(&records);
  let summary = CatalogSummary {
    records: records.len(),
    songs:   songs.len(),
    artists: artists.len(),
  };

  gateway.write_table(songs).await.map_err(gateway_error)?;
  tracing::info!(table = %TableName::Songs, rows = summary.songs, "table written");
  gateway.write_table(artists).await.map_err(gateway_error)?;
  tracing::info!(table = %TableName::Artists, rows = summary.artists, "table written");

  Ok(summary)
}

/// Phase 2: activity logs into `users`, `time` and `songplays`.
///
/// Requires `songs` and `artists` to have been committed by phase 1.
#[tracing::instrument(skip(gateway))]
pub async fn process_log_data<G: StorageGateway>(
  gateway: &G,
  log_glob: &str,
) -> Result<ActivitySummary> {
  let records: Vec<ActivityLogRecord> =
    gateway.read_records(log_glob).await.map_err(gateway_error)?;
  let record_count = records.len();
  let events = activity::song_plays(records);
  tracing::info!(records = record_count, song_plays = events.len(), "read activity log");

  let users = activity::users_table(&events);
  let time = activity::time_table(&events);
  let mut summary = ActivitySummary {
    records: record_count,
    song_plays: events.len(),
    users: users.len(),
    time: time.len(),
    ..Default::default()
  };

  gateway.write_table(users).await.map_err(gateway_error)?;
  tracing::info!(table = %TableName::Users, rows = summary.users, "table written");
  gateway.write_table(time).await.map_err(gateway_error)?;
  tracing::info!(table = %TableName::Time, rows = summary.time, "table written");

  let songs: Vec<SongRow> = gateway.read_table().await.map_err(gateway_error)?;
  let artists: Vec<ArtistRow> = gateway.read_table().await.map_err(gateway_error)?;
  let lookup = SongLookup::build(&songs, &artists);
  tracing::debug!(songs = songs.len(), artists = artists.len(), keys = lookup.len(), "built song lookup");

  let songplays = songplays::songplays_table(&events, &lookup);
  summary.songplays = songplays.len();
  summary.matched = songplays.iter().filter(|r| r.song_id.is_some()).count();

  gateway.write_table(songplays).await.map_err(gateway_error)?;
  tracing::info!(
    table = %TableName::Songplays,
    rows = summary.songplays,
    matched = summary.matched,
    "table written"
  );

  Ok(summary)
}

/// Run phase 1 to completion, then phase 2.
pub async fn run<G: StorageGateway>(gateway: &G, layout: &Layout) -> Result<RunSummary> {
  let catalog = process_song_data(gateway, &layout.song_glob).await?;
  let activity = process_log_data(gateway, &layout.log_glob).await?;
  Ok(RunSummary { catalog, activity })
}
