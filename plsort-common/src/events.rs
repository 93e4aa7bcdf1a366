//! Progress event vocabulary for long-running service operations
//!
//! The service pushes these over its event channel while an analysis or an
//! execution is running. Each operation's sequence ends with exactly one
//! `complete` or `error` event.

use crate::api::paths;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminant of a [`ProgressEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Intermediate progress update
    Progress,
    /// Operation finished successfully (terminal)
    Complete,
    /// Operation failed (terminal)
    Error,
    /// Informational notice, e.g. the connection greeting
    Info,
    /// Any type this client does not know; treated like `Info`
    #[serde(other)]
    Other,
}

impl EventType {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }
}

/// Phase of the operation an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    FetchingLikedSongs,
    FetchingPlaylists,
    FetchingArtists,
    Analyzing,
    GeneratingPlan,
    CreatingPlaylists,
    AddingTracks,
    RemovingTracks,
    Complete,
    #[serde(other)]
    Other,
}

impl ProgressPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::FetchingLikedSongs => "Fetching liked songs",
            Self::FetchingPlaylists => "Fetching playlists",
            Self::FetchingArtists => "Fetching artists",
            Self::Analyzing => "Analyzing",
            Self::GeneratingPlan => "Generating plan",
            Self::CreatingPlaylists => "Creating playlists",
            Self::AddingTracks => "Adding tracks",
            Self::RemovingTracks => "Removing tracks",
            Self::Complete => "Complete",
            Self::Other => "Working",
        }
    }
}

/// One message on an operation channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub kind: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ProgressPhase>,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percentage: Option<f64>,
}

impl ProgressEvent {
    fn new(kind: EventType, message: impl Into<String>) -> Self {
        Self {
            kind,
            phase: None,
            message: message.into(),
            current: None,
            total: None,
            percentage: None,
        }
    }

    pub fn progress(message: impl Into<String>, current: u32, total: u32) -> Self {
        Self { current: Some(current), total: Some(total), ..Self::new(EventType::Progress, message) }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self { phase: Some(ProgressPhase::Complete), ..Self::new(EventType::Complete, message) }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventType::Error, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventType::Info, message)
    }

    pub fn with_phase(mut self, phase: ProgressPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.kind.is_terminal()
    }

    /// Completion fraction in `0.0..=1.0`, when the event carries counters
    ///
    /// An explicit percentage wins over current/total.
    pub fn fraction(&self) -> Option<f64> {
        if let Some(pct) = self.percentage {
            return Some((pct / 100.0).clamp(0.0, 1.0));
        }
        match (self.current, self.total) {
            (Some(current), Some(total)) if total > 0 => {
                Some((f64::from(current) / f64::from(total)).clamp(0.0, 1.0))
            }
            _ => None,
        }
    }
}

/// Kind of long-running operation an event channel reports on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Analysis,
    Execution,
}

impl OperationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Analysis => "analysis",
            Self::Execution => "execution",
        }
    }
}

/// Address of one operation's event channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationChannel {
    pub kind: OperationKind,
    pub plan_id: Option<String>,
}

impl OperationChannel {
    pub fn analysis() -> Self {
        Self { kind: OperationKind::Analysis, plan_id: None }
    }

    pub fn execution(plan_id: impl Into<String>) -> Self {
        Self { kind: OperationKind::Execution, plan_id: Some(plan_id.into()) }
    }

    /// Endpoint path of the event stream
    pub fn path(&self) -> &'static str {
        paths::EVENTS
    }

    /// Query parameters selecting this channel
    pub fn query(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("type", self.kind.as_str())];
        if let Some(plan_id) = &self.plan_id {
            pairs.push(("planId", plan_id.as_str()));
        }
        pairs
    }
}

impl fmt::Display for OperationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.plan_id {
            Some(plan_id) => write!(f, "{}:{}", self.kind.as_str(), plan_id),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_progress_event_from_service_json() {
        let event: ProgressEvent = serde_json::from_value(json!({
            "type": "progress",
            "phase": "adding_tracks",
            "current": 5,
            "total": 20,
            "message": "Adding tracks to Rock"
        }))
        .unwrap();
        assert_eq!(event.kind, EventType::Progress);
        assert_eq!(event.phase, Some(ProgressPhase::AddingTracks));
        assert_eq!(event.fraction(), Some(0.25));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_unknown_type_and_phase_are_tolerated() {
        let event: ProgressEvent = serde_json::from_value(json!({
            "type": "heartbeat",
            "phase": "warming_up",
            "message": ""
        }))
        .unwrap();
        assert_eq!(event.kind, EventType::Other);
        assert_eq!(event.phase, Some(ProgressPhase::Other));
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_percentage_wins_over_counters() {
        let mut event = ProgressEvent::progress("x", 1, 4);
        event.percentage = Some(80.0);
        assert_eq!(event.fraction(), Some(0.8));

        let zero_total = ProgressEvent::progress("x", 0, 0);
        assert_eq!(zero_total.fraction(), None);
    }

    #[test]
    fn test_terminal_types() {
        assert!(ProgressEvent::complete("done").is_terminal());
        assert!(ProgressEvent::error("boom").is_terminal());
        assert!(!ProgressEvent::info("hello").is_terminal());
    }

    #[test]
    fn test_channel_query_and_display() {
        let channel = OperationChannel::execution("plan-42");
        assert_eq!(channel.query(), vec![("type", "execution"), ("planId", "plan-42")]);
        assert_eq!(channel.to_string(), "execution:plan-42");
        assert_eq!(channel.path(), "/api/events");

        let analysis = OperationChannel::analysis();
        assert_eq!(analysis.query(), vec![("type", "analysis")]);
        assert_eq!(analysis.to_string(), "analysis");
    }
}
