//! Request/response bodies
//!
//! Field names follow the service's camelCase JSON.

use chrono::{DateTime, Utc};
use crate::models::null_as_empty;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// ========================================
// Authentication Types
// ========================================

/// Authenticated user profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub image_url: String,
}

/// Redirect target for starting the external auth flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResponse {
    pub url: String,
}

// ========================================
// Library Types
// ========================================

/// Aggregate library counts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total_tracks: u32,
    pub total_playlists: u32,
    pub total_genres: u32,
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,
}

/// Playlist entry in a library analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub track_count: u32,
}

/// Result of a full library analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryAnalysis {
    pub total_liked_songs: u32,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub playlists: Vec<PlaylistSummary>,
    #[serde(default, alias = "genreDistribution", deserialize_with = "null_as_empty_map")]
    pub genre_breakdown: BTreeMap<String, u32>,
}

fn null_as_empty_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, u32>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, u32>>::deserialize(deserializer)?.unwrap_or_default())
}

// ========================================
// Sort Types
// ========================================

/// Body of both plan-generation and plan-execution requests
///
/// Always built from the override snapshot current at call time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    pub dry_run: bool,
    #[serde(default)]
    pub enabled_groups: Vec<String>,
    #[serde(default)]
    pub disabled_playlists: Vec<String>,
}

// ========================================
// Error Response Types
// ========================================

/// Error body returned with non-success statuses: `{"error": "..."}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
