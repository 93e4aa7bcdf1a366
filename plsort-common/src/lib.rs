//! # plsort Common Library
//!
//! Shared code for the plsort client crates including:
//! - Plan domain models (SortPlan, TrackMove, GenreStat, GroupSuggestion)
//! - API request/response types and endpoint paths
//! - Progress event types for the service's event channel
//! - Configuration loading

pub mod api;
pub mod config;
pub mod error;
pub mod events;
pub mod models;

pub use error::{Error, Result};
pub use events::{EventType, OperationChannel, OperationKind, ProgressEvent, ProgressPhase};
pub use models::{Artist, GenreStat, GroupSuggestion, SortPlan, Track, TrackMove};
