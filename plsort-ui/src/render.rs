//! Plain-text rendering for the command-line front end

use crate::overrides::OverrideSnapshot;
use crate::view::SessionView;
use plsort_common::api::{LibraryAnalysis, LibraryStats, User};
use plsort_common::{EventType, ProgressEvent, SortPlan};
use std::fmt::Write;

const BAR_WIDTH: usize = 30;

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}

fn checkbox(enabled: bool) -> &'static str {
    if enabled {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn user(user: &User) -> String {
    if user.email.is_empty() {
        format!("{} ({})", user.display_name, user.id)
    } else {
        format!("{} <{}> ({})", user.display_name, user.email, user.id)
    }
}

pub fn stats(stats: &LibraryStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Tracks:    {}", stats.total_tracks);
    let _ = writeln!(out, "Playlists: {}", stats.total_playlists);
    let _ = writeln!(out, "Genres:    {}", stats.total_genres);
    match stats.analyzed_at {
        Some(at) => {
            let _ = writeln!(out, "Analyzed:  {}", at.format("%Y-%m-%d %H:%M UTC"));
        }
        None => out.push_str("Analyzed:  never\n"),
    }
    out
}

pub fn analysis(analysis: &LibraryAnalysis) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Liked songs: {}", analysis.total_liked_songs);
    let _ = writeln!(out, "Playlists:   {}", analysis.playlists.len());

    let mut genres: Vec<(&String, &u32)> = analysis.genre_breakdown.iter().collect();
    genres.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if !genres.is_empty() {
        out.push_str("\nTop genres:\n");
        for (genre, count) in genres.into_iter().take(15) {
            let _ = writeln!(out, "  {count:>5}  {genre}");
        }
    }
    out
}

pub fn overrides(snapshot: &OverrideSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dry run: {}", on_off(snapshot.is_dry_run));
    if snapshot.enabled_groups.is_empty() {
        out.push_str("Enabled groups: none\n");
    } else {
        let groups: Vec<&str> = snapshot.enabled_groups.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Enabled groups: {}", groups.join(", "));
    }
    if snapshot.disabled_playlists.is_empty() {
        out.push_str("Disabled playlists: none\n");
    } else {
        let names: Vec<&str> = snapshot.disabled_playlists.iter().map(String::as_str).collect();
        let _ = writeln!(out, "Disabled playlists: {}", names.join(", "));
    }
    out
}

/// Review screen for the held plan
pub fn plan(plan: &SortPlan, view: &SessionView) -> String {
    let mut out = String::new();
    let Some(summary) = &view.summary else {
        return "No plan generated yet.\n".to_string();
    };

    let _ = writeln!(out, "Plan {}", summary.plan_id);
    let _ = writeln!(
        out,
        "Mode: {}{}",
        if view.dry_run { "dry run" } else { "live" },
        if view.stale { " (plan was generated in the other mode; regenerate before executing)" } else { "" }
    );
    let _ = writeln!(out, "Liked tracks:        {}", summary.total_liked_tracks);
    let _ = writeln!(out, "Tracks to add:       {}", summary.tracks_to_add);
    let _ = writeln!(out, "Tracks to remove:    {}", summary.tracks_to_remove);
    let _ = writeln!(
        out,
        "Playlists to create: {} ({} enabled)",
        summary.playlists_to_create,
        view.enabled_playlist_count()
    );
    let _ = writeln!(out, "Uncategorized:       {}", view.uncategorized_count);

    if !view.groups.is_empty() {
        out.push_str("\nGrouping suggestions:\n");
        for row in &view.groups {
            let s = &row.suggestion;
            let _ = writeln!(
                out,
                "  {} {} <- {} ({} tracks, merges {} playlists)",
                checkbox(row.enabled),
                s.parent_genre,
                s.child_genres.join(", "),
                s.total_tracks,
                s.playlists_to_merge
            );
        }
    }

    if !view.playlists.is_empty() {
        out.push_str("\nNew playlists:\n");
        for row in &view.playlists {
            let _ = writeln!(out, "  {} {}", checkbox(row.enabled), row.name);
        }
    }

    if !view.genre_ranking.is_empty() {
        let _ = writeln!(out, "\nGenres ({} new):", view.new_genre_count);
        for row in view.genre_ranking.iter().take(20) {
            let _ = writeln!(
                out,
                "  {:>5}  {}{}",
                row.track_count,
                row.genre,
                if row.is_new { " (new)" } else { "" }
            );
        }
    }

    if !plan.tracks_to_add.is_empty() {
        out.push_str("\nAdditions:\n");
        for m in plan.tracks_to_add.iter().take(25) {
            let _ = write!(out, "  + {} - {} -> {}", m.track_name, m.artist_name, m.to_playlist_name);
            if let Some(reason) = &m.reason {
                let _ = write!(out, " ({reason})");
            }
            out.push('\n');
        }
        if plan.tracks_to_add.len() > 25 {
            let _ = writeln!(out, "  ... and {} more", plan.tracks_to_add.len() - 25);
        }
    }

    if !plan.tracks_to_remove.is_empty() {
        out.push_str("\nRemovals:\n");
        for m in plan.tracks_to_remove.iter().take(25) {
            let _ = write!(out, "  - {} - {} <- {}", m.track_name, m.artist_name, m.from_playlist_name);
            if let Some(reason) = &m.reason {
                let _ = write!(out, " ({reason})");
            }
            out.push('\n');
        }
        if plan.tracks_to_remove.len() > 25 {
            let _ = writeln!(out, "  ... and {} more", plan.tracks_to_remove.len() - 25);
        }
    }

    if plan.is_empty() {
        out.push_str("\nNothing to change.\n");
    }
    out
}

/// Single log line for a stream event
pub fn event(event: &ProgressEvent) -> String {
    let marker = match event.kind {
        EventType::Progress => ">",
        EventType::Complete => "✓",
        EventType::Error => "✗",
        EventType::Info | EventType::Other => "·",
    };
    let mut line = format!("{marker} ");
    if let Some(phase) = event.phase {
        if event.kind == EventType::Progress {
            let _ = write!(line, "[{}] ", phase.label());
        }
    }
    line.push_str(&event.message);
    if let Some(fraction) = event.fraction() {
        let _ = write!(line, " {}", progress_bar(fraction));
    }
    line
}

/// Fixed-width bar with percentage, e.g. `[#######-------] 50%`
pub fn progress_bar(fraction: f64) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * BAR_WIDTH as f64).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(BAR_WIDTH - filled),
        (fraction * 100.0).round() as u32
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::sample_plan;

    #[test]
    fn test_progress_bar_bounds() {
        assert_eq!(progress_bar(0.0), format!("[{}]   0%", "-".repeat(BAR_WIDTH)));
        assert_eq!(progress_bar(1.5), format!("[{}] 100%", "#".repeat(BAR_WIDTH)));
        assert!(progress_bar(0.5).ends_with(" 50%"));
    }

    #[test]
    fn test_event_line() {
        let line = event(&ProgressEvent::progress("Adding tracks", 1, 4));
        assert!(line.starts_with("> Adding tracks ["));
        assert!(line.ends_with(" 25%"));
        assert_eq!(event(&ProgressEvent::error("boom")), "✗ boom");
    }

    #[test]
    fn test_plan_marks_disabled_rows() {
        let plan = sample_plan("p1");
        let mut overrides = OverrideSnapshot::default();
        overrides.disabled_playlists.insert("Polka".into());
        let view = SessionView::derive(Some(&plan), &overrides);

        let text = super::plan(&plan, &view);
        assert!(text.contains("Plan p1"));
        assert!(text.contains("[ ] Polka"));
        assert!(text.contains("[x] Shoegaze"));
        assert!(text.contains("[ ] Rock <- Indie Rock, Shoegaze"));
    }

    #[test]
    fn test_overrides_text() {
        let text = overrides(&OverrideSnapshot::default());
        assert!(text.contains("Dry run: on"));
        assert!(text.contains("Enabled groups: none"));
    }
}
