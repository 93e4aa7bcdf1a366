//! Derived view state
//!
//! Pure functions of (plan, override snapshot). Recomputed explicitly by the
//! session after every plan replacement and every toggle; nothing here is
//! updated incrementally.

use crate::overrides::OverrideSnapshot;
use plsort_common::{GroupSuggestion, SortPlan};

/// Headline counts of the held plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub plan_id: String,
    /// Dry-run flag the plan was generated with
    pub generated_dry_run: bool,
    pub total_liked_tracks: u32,
    pub tracks_to_add: usize,
    pub tracks_to_remove: usize,
    pub playlists_to_create: usize,
    pub uncategorized: usize,
}

/// Grouping suggestion with its current selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRow {
    pub suggestion: GroupSuggestion,
    pub enabled: bool,
}

impl GroupRow {
    pub fn key(&self) -> &str {
        &self.suggestion.parent_genre
    }
}

/// Playlist the plan would create, with its current selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaylistRow {
    pub name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenreRow {
    pub genre: String,
    pub track_count: u32,
    pub is_new: bool,
}

/// Everything a front end needs to render the review screen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionView {
    pub summary: Option<PlanSummary>,
    pub groups: Vec<GroupRow>,
    pub playlists: Vec<PlaylistRow>,
    /// Descending by track count, then by name
    pub genre_ranking: Vec<GenreRow>,
    pub new_genre_count: usize,
    pub uncategorized_count: usize,
    /// Current override, not the plan's recorded flag
    pub dry_run: bool,
    /// The plan was generated with a different dry-run flag than the current one
    pub stale: bool,
}

impl SessionView {
    pub fn derive(plan: Option<&SortPlan>, overrides: &OverrideSnapshot) -> Self {
        let Some(plan) = plan else {
            return Self { dry_run: overrides.is_dry_run, ..Self::default() };
        };

        let groups = plan
            .suggestions()
            .iter()
            .map(|s| GroupRow {
                enabled: overrides.enabled_groups.contains(&s.parent_genre),
                suggestion: s.clone(),
            })
            .collect();

        // Disabled names missing from the plan simply have no row
        let playlists = plan
            .playlists_to_create
            .iter()
            .map(|name| PlaylistRow {
                enabled: !overrides.disabled_playlists.contains(name),
                name: name.clone(),
            })
            .collect();

        let genre_ranking = plan
            .genre_ranking()
            .into_iter()
            .map(|s| GenreRow { genre: s.genre.clone(), track_count: s.track_count, is_new: s.is_new })
            .collect();

        Self {
            summary: Some(PlanSummary {
                plan_id: plan.id.clone(),
                generated_dry_run: plan.dry_run,
                total_liked_tracks: plan.total_liked_tracks,
                tracks_to_add: plan.tracks_to_add.len(),
                tracks_to_remove: plan.tracks_to_remove.len(),
                playlists_to_create: plan.playlists_to_create.len(),
                uncategorized: plan.uncategorized_tracks.len(),
            }),
            groups,
            playlists,
            genre_ranking,
            new_genre_count: plan.new_genre_count(),
            uncategorized_count: plan.uncategorized_tracks.len(),
            dry_run: overrides.is_dry_run,
            stale: plan.dry_run != overrides.is_dry_run,
        }
    }

    pub fn has_plan(&self) -> bool {
        self.summary.is_some()
    }

    pub fn enabled_group_count(&self) -> usize {
        self.groups.iter().filter(|g| g.enabled).count()
    }

    pub fn enabled_playlist_count(&self) -> usize {
        self.playlists.iter().filter(|p| p.enabled).count()
    }
}
