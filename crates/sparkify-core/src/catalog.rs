//! Catalog Transform: song catalog records into the `songs` and `artists`
//! dimension tables.

use std::collections::HashSet;

use crate::{
  record::SongCatalogRecord,
  table::{ArtistRow, SongRow},
};

/// One row per input record; the catalog is assumed to hold each song once.
pub fn songs_table(records: &[SongCatalogRecord]) -> Vec<SongRow> {
  records
    .iter()
    .map(|r| SongRow {
      song_id:   r.song_id.clone(),
      title:     r.title.clone(),
      artist_id: r.artist_id.clone(),
      year:      r.year,
      duration:  r.duration,
    })
    .collect()
}

/// One row per distinct `artist_id`, keeping the first record seen for each
/// id. A missing id counts as one more distinct key.
pub fn artists_table(records: &[SongCatalogRecord]) -> Vec<ArtistRow> {
  let mut seen = HashSet::new();
  records
    .iter()
    .filter(|r| seen.insert(r.artist_id.as_deref()))
    .map(|r| ArtistRow {
      artist_id: r.artist_id.clone(),
      name:      r.artist_name.clone(),
      location:  r.artist_location.clone(),
      latitude:  r.artist_latitude,
      longitude: r.artist_longitude,
    })
    .collect()
}
