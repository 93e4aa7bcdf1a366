//! HTTP API surface of the sorting service
//!
//! Request/response bodies and endpoint paths, shared by the client and by
//! test doubles that stand in for the service.

pub mod types;

pub use types::{
    AuthResponse, ErrorBody, LibraryAnalysis, LibraryStats, PlanRequest, PlaylistSummary, User,
};

/// Endpoint paths, relative to the service base URL
pub mod paths {
    pub const AUTH_ME: &str = "/api/auth/me";
    pub const AUTH_LOGIN: &str = "/api/auth/login";
    pub const AUTH_COMPLETE: &str = "/api/auth/complete";
    pub const AUTH_LOGOUT: &str = "/api/auth/logout";
    pub const LIBRARY_STATS: &str = "/api/library/stats";
    pub const LIBRARY_ANALYSIS: &str = "/api/library/analysis";
    pub const SORT_PLAN: &str = "/api/sort/plan";
    pub const SORT_EXECUTE: &str = "/api/sort/execute";
    pub const EVENTS: &str = "/api/events";
}

/// Name of the cookie carrying the authenticated session
pub const SESSION_COOKIE: &str = "spotify_session";
