//! Plan domain models
//!
//! Immutable snapshots returned by the sorting service. The client never
//! mutates these; a new [`SortPlan`] wholly replaces the previous one.
//!
//! The service is tolerant in what it sends: empty collections may arrive as
//! `null`, and optional text fields may arrive as empty strings. Both are
//! normalised here so the rest of the client sees `Vec` and `Option` only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::cmp::Reverse;
use std::collections::HashSet;

/// Artist credited on a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genres: Vec<String>,
}

/// Track snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub artists: Vec<Artist>,
    #[serde(default)]
    pub album_name: String,
    #[serde(default)]
    pub album_image: String,
    /// Duration in milliseconds
    #[serde(default, rename = "duration")]
    pub duration_ms: u64,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub primary_genre: Option<String>,
}

impl Track {
    /// Artist names in credit order
    pub fn artist_names(&self) -> Vec<&str> {
        self.artists.iter().map(|a| a.name.as_str()).collect()
    }
}

/// One planned relocation of a track between playlists
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackMove {
    pub track_id: String,
    pub track_name: String,
    #[serde(default)]
    pub artist_name: String,
    #[serde(default)]
    pub album_image: String,
    #[serde(default)]
    pub genre: String,
    /// Source playlist id (empty when the track comes from liked songs)
    #[serde(default)]
    pub from_playlist: String,
    #[serde(default)]
    pub from_playlist_name: String,
    /// Destination playlist id, or the genre name when the playlist is new
    #[serde(default)]
    pub to_playlist: String,
    #[serde(default)]
    pub to_playlist_name: String,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub reason: Option<String>,
}

/// Per-genre track count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenreStat {
    pub genre: String,
    pub track_count: u32,
    /// Existing playlist for this genre, `None` if it would be created
    #[serde(default, deserialize_with = "empty_as_none")]
    pub playlist_id: Option<String>,
    #[serde(default)]
    pub is_new: bool,
}

/// Proposed merge of several sub-genre playlists under one parent genre
///
/// `parent_genre` is the key used by the enabled-groups override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSuggestion {
    pub parent_genre: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub child_genres: Vec<String>,
    pub total_tracks: u32,
    pub playlists_to_merge: u32,
}

/// Aggregate root for one review cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortPlan {
    /// Opaque identifier used to address the execution event channel
    pub id: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Dry-run flag the plan was generated with
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub total_liked_tracks: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tracks_to_add: Vec<TrackMove>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tracks_to_remove: Vec<TrackMove>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub playlists_to_create: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub uncategorized_tracks: Vec<Track>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub genre_stats: Vec<GenreStat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grouping_suggestions: Option<Vec<GroupSuggestion>>,
}

impl SortPlan {
    /// True when applying the plan would change nothing
    pub fn is_empty(&self) -> bool {
        self.tracks_to_add.is_empty()
            && self.tracks_to_remove.is_empty()
            && self.playlists_to_create.is_empty()
    }

    /// Genre stats ranked by track count (descending), ties broken by name
    pub fn genre_ranking(&self) -> Vec<&GenreStat> {
        let mut ranked: Vec<&GenreStat> = self.genre_stats.iter().collect();
        ranked.sort_by(|a, b| {
            Reverse(a.track_count)
                .cmp(&Reverse(b.track_count))
                .then_with(|| a.genre.cmp(&b.genre))
        });
        ranked
    }

    /// Number of genres observed for the first time
    pub fn new_genre_count(&self) -> usize {
        self.genre_stats.iter().filter(|s| s.is_new).count()
    }

    /// Grouping suggestions, empty when the service sent none
    pub fn suggestions(&self) -> &[GroupSuggestion] {
        self.grouping_suggestions.as_deref().unwrap_or(&[])
    }

    /// Genre names appearing more than once in `genre_stats`
    pub fn duplicate_genres(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for stat in &self.genre_stats {
            if !seen.insert(stat.genre.as_str()) && !duplicates.contains(&stat.genre.as_str()) {
                duplicates.push(stat.genre.as_str());
            }
        }
        duplicates
    }
}

/// Deserialize `null` as an empty collection
pub(crate) fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Deserialize `null` or `""` as `None`
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stat(genre: &str, count: u32, is_new: bool) -> GenreStat {
        GenreStat { genre: genre.into(), track_count: count, playlist_id: None, is_new }
    }

    #[test]
    fn test_plan_tolerates_null_collections() {
        let plan: SortPlan = serde_json::from_value(json!({
            "id": "plan-1",
            "createdAt": "2025-01-01T12:00:00Z",
            "dryRun": true,
            "totalLikedTracks": 12,
            "tracksToAdd": null,
            "tracksToRemove": null,
            "playlistsToCreate": null,
            "uncategorizedTracks": null,
            "genreStats": null
        }))
        .unwrap();

        assert_eq!(plan.id, "plan-1");
        assert!(plan.dry_run);
        assert!(plan.is_empty());
        assert!(plan.grouping_suggestions.is_none());
        assert!(plan.suggestions().is_empty());
    }

    #[test]
    fn test_track_move_empty_reason_is_none() {
        let mv: TrackMove = serde_json::from_value(json!({
            "trackId": "t1",
            "trackName": "Song",
            "artistName": "Band",
            "albumImage": "",
            "genre": "Rock",
            "fromPlaylist": "",
            "fromPlaylistName": "Liked Songs",
            "toPlaylist": "Rock",
            "toPlaylistName": "Rock",
            "reason": ""
        }))
        .unwrap();
        assert!(mv.reason.is_none());
        assert_eq!(mv.from_playlist_name, "Liked Songs");
    }

    #[test]
    fn test_genre_ranking_descending_with_name_tiebreak() {
        let plan = SortPlan {
            id: "p".into(),
            created_at: None,
            dry_run: true,
            total_liked_tracks: 0,
            tracks_to_add: vec![],
            tracks_to_remove: vec![],
            playlists_to_create: vec![],
            uncategorized_tracks: vec![],
            genre_stats: vec![stat("Jazz", 3, false), stat("Rock", 10, true), stat("Funk", 3, true)],
            grouping_suggestions: None,
        };

        let ranked: Vec<&str> = plan.genre_ranking().iter().map(|s| s.genre.as_str()).collect();
        assert_eq!(ranked, vec!["Rock", "Funk", "Jazz"]);
        assert_eq!(plan.new_genre_count(), 2);
        assert!(plan.duplicate_genres().is_empty());
    }

    #[test]
    fn test_duplicate_genres_reported_once() {
        let plan = SortPlan {
            id: "p".into(),
            created_at: None,
            dry_run: false,
            total_liked_tracks: 0,
            tracks_to_add: vec![],
            tracks_to_remove: vec![],
            playlists_to_create: vec![],
            uncategorized_tracks: vec![],
            genre_stats: vec![stat("Rock", 1, false), stat("Rock", 2, false), stat("Rock", 3, false)],
            grouping_suggestions: None,
        };
        assert_eq!(plan.duplicate_genres(), vec!["Rock"]);
    }
}
