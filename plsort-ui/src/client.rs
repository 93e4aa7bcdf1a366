//! HTTP client for the sorting service
//!
//! Stateless request functions: one request, one response, no retries and no
//! caching. Every call carries the session cookie when one is held. The
//! session cookie survives restarts through a [`CredentialFile`] in the state
//! directory.

use crate::error::{SessionError, SessionResult};
use crate::sse::{decode_progress_stream, EventStream};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use plsort_common::api::{
    paths, AuthResponse, ErrorBody, LibraryAnalysis, LibraryStats, PlanRequest, User,
    SESSION_COOKIE,
};
use plsort_common::config::ClientConfig;
use plsort_common::{OperationChannel, SortPlan};
use reqwest::header::{ACCEPT, COOKIE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of the persisted session credential
pub const CREDENTIAL_FILE: &str = "session.json";

/// Plan requests the session depends on
#[async_trait]
pub trait PlanService: Send + Sync {
    /// Generate a plan for the given override snapshot
    async fn request_plan(&self, request: &PlanRequest) -> SessionResult<SortPlan>;

    /// Trigger asynchronous execution; progress arrives on the execution channel
    async fn request_execution(&self, request: &PlanRequest) -> SessionResult<()>;

    /// Run a full library analysis; progress arrives on the analysis channel
    async fn library_analysis(&self) -> SessionResult<LibraryAnalysis>;
}

/// Opens operation event channels
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, channel: &OperationChannel) -> SessionResult<EventStream>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    session: String,
    #[serde(default)]
    saved_at: Option<DateTime<Utc>>,
}

/// Session cookie persisted between runs
#[derive(Debug, Clone)]
pub struct CredentialFile {
    path: PathBuf,
}

impl CredentialFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(state_dir: &Path) -> Self {
        Self::new(state_dir.join(CREDENTIAL_FILE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stored session value; unreadable files count as logged out
    pub fn load(&self) -> Option<String> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read session file");
                return None;
            }
        };
        match serde_json::from_str::<StoredSession>(&raw) {
            Ok(stored) if !stored.session.is_empty() => Some(stored.session),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring corrupt session file");
                None
            }
        }
    }

    pub fn save(&self, session: &str) -> plsort_common::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredSession { session: session.to_string(), saved_at: Some(Utc::now()) };
        // Write then rename so a crash never leaves a half-written file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_string_pretty(&stored)?)?;
        restrict_to_owner(&tmp)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> plsort_common::Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// The session cookie is only readable by its owner
#[cfg(unix)]
fn restrict_to_owner(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_to_owner(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Client for the sorting service's HTTP API
#[derive(Debug, Clone)]
pub struct PlanClient {
    http: reqwest::Client,
    base_url: String,
    session: Option<String>,
    credentials: Option<CredentialFile>,
}

impl PlanClient {
    /// Client without a session or credential persistence
    pub fn new(base_url: impl Into<String>) -> SessionResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("plsort-ui/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session: None,
            credentials: None,
        })
    }

    /// Client for the configured service, restoring any saved session
    pub fn from_config(config: &ClientConfig) -> SessionResult<Self> {
        let credentials = CredentialFile::in_dir(&config.state_dir);
        let session = credentials.load();
        debug!(
            server_url = %config.server_url,
            has_session = session.is_some(),
            "Plan client created"
        );
        Ok(Self { session, credentials: Some(credentials), ..Self::new(&config.server_url)? })
    }

    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.session {
            Some(session) => builder.header(COOKIE, format!("{SESSION_COOKIE}={session}")),
            None => builder,
        }
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.get(self.url(path)))
    }

    fn post(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.post(self.url(path)))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> SessionResult<T> {
        let response = check_status(self.get(path).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Profile of the authenticated user
    pub async fn current_user(&self) -> SessionResult<User> {
        self.get_json(paths::AUTH_ME).await
    }

    /// Redirect target that starts the external auth flow
    pub async fn login_url(&self) -> SessionResult<String> {
        let auth: AuthResponse = self.get_json(paths::AUTH_LOGIN).await?;
        Ok(auth.url)
    }

    /// Exchange the one-time callback token for a session
    pub async fn complete_login(&mut self, token: &str) -> SessionResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(SessionError::InvalidOperation("No token provided".into()));
        }

        let response = self
            .http
            .get(self.url(paths::AUTH_COMPLETE))
            .query(&[("token", token)])
            .send()
            .await?;
        let response = check_status(response).await?;

        let session = response
            .cookies()
            .find(|c| c.name() == SESSION_COOKIE && !c.value().is_empty())
            .map(|c| c.value().to_string())
            .ok_or_else(|| SessionError::Decode("Service did not set a session cookie".into()))?;

        if let Some(credentials) = &self.credentials {
            credentials.save(&session)?;
        }
        self.session = Some(session);
        info!("Login completed");
        Ok(())
    }

    /// End the session; local credentials are dropped even if the service refuses
    pub async fn logout(&mut self) -> SessionResult<()> {
        let result = match self.post(paths::AUTH_LOGOUT).send().await {
            Ok(response) => check_status(response).await.map(|_| ()),
            Err(e) => Err(e.into()),
        };

        self.session = None;
        if let Some(credentials) = &self.credentials {
            credentials.clear()?;
        }

        match result {
            Ok(()) | Err(SessionError::Unauthenticated) => {
                info!("Logged out");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn library_stats(&self) -> SessionResult<LibraryStats> {
        self.get_json(paths::LIBRARY_STATS).await
    }

    pub async fn library_analysis(&self) -> SessionResult<LibraryAnalysis> {
        self.get_json(paths::LIBRARY_ANALYSIS).await
    }

    pub async fn request_plan(&self, request: &PlanRequest) -> SessionResult<SortPlan> {
        debug!(
            dry_run = request.dry_run,
            enabled_groups = request.enabled_groups.len(),
            disabled_playlists = request.disabled_playlists.len(),
            "Requesting sort plan"
        );
        let response = check_status(self.post(paths::SORT_PLAN).json(request).send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn request_execution(&self, request: &PlanRequest) -> SessionResult<()> {
        debug!(dry_run = request.dry_run, "Requesting plan execution");
        check_status(self.post(paths::SORT_EXECUTE).json(request).send().await?).await?;
        Ok(())
    }

    /// Open an operation's event channel
    pub async fn connect(&self, channel: &OperationChannel) -> SessionResult<EventStream> {
        let response = self
            .get(channel.path())
            .query(&channel.query())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await?;
        let response = check_status(response).await?;
        info!(channel = %channel, "Event stream opened");
        Ok(decode_progress_stream(response.bytes_stream()))
    }
}

#[async_trait]
impl PlanService for PlanClient {
    async fn request_plan(&self, request: &PlanRequest) -> SessionResult<SortPlan> {
        PlanClient::request_plan(self, request).await
    }

    async fn request_execution(&self, request: &PlanRequest) -> SessionResult<()> {
        PlanClient::request_execution(self, request).await
    }

    async fn library_analysis(&self) -> SessionResult<LibraryAnalysis> {
        PlanClient::library_analysis(self).await
    }
}

#[async_trait]
impl StreamConnector for PlanClient {
    async fn connect(&self, channel: &OperationChannel) -> SessionResult<EventStream> {
        PlanClient::connect(self, channel).await
    }
}

#[async_trait]
impl<T: PlanService + ?Sized> PlanService for Arc<T> {
    async fn request_plan(&self, request: &PlanRequest) -> SessionResult<SortPlan> {
        (**self).request_plan(request).await
    }

    async fn request_execution(&self, request: &PlanRequest) -> SessionResult<()> {
        (**self).request_execution(request).await
    }

    async fn library_analysis(&self) -> SessionResult<LibraryAnalysis> {
        (**self).library_analysis().await
    }
}

#[async_trait]
impl<T: StreamConnector + ?Sized> StreamConnector for Arc<T> {
    async fn connect(&self, channel: &OperationChannel) -> SessionResult<EventStream> {
        (**self).connect(channel).await
    }
}

/// Map non-success statuses onto session errors
async fn check_status(response: Response) -> SessionResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(SessionError::Unauthenticated);
    }

    let body = response.text().await.unwrap_or_default();
    let message = failure_message(status, &body);
    warn!(status = status.as_u16(), message = %message, "Request failed");
    Err(SessionError::RequestFailed { status: status.as_u16(), message })
}

/// Service error text, else the raw body, else the bare status
fn failure_message(status: StatusCode, body: &str) -> String {
    if let Ok(parsed) = serde_json::from_str::<ErrorBody>(body) {
        if !parsed.error.trim().is_empty() {
            return parsed.error;
        }
    }
    let body = body.trim();
    if body.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_message_prefers_error_body() {
        assert_eq!(
            failure_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"Failed to generate sort plan"}"#),
            "Failed to generate sort plan"
        );
        assert_eq!(failure_message(StatusCode::BAD_GATEWAY, "upstream down\n"), "upstream down");
        assert_eq!(failure_message(StatusCode::NOT_FOUND, ""), "HTTP 404");
        assert_eq!(failure_message(StatusCode::BAD_REQUEST, r#"{"error":""}"#), r#"{"error":""}"#);
    }

    #[test]
    fn test_credential_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialFile::in_dir(dir.path());
        assert_eq!(credentials.load(), None);

        credentials.save("abc123").unwrap();
        assert_eq!(credentials.load().as_deref(), Some("abc123"));

        credentials.clear().unwrap();
        assert_eq!(credentials.load(), None);
        // Clearing twice is fine
        credentials.clear().unwrap();
    }

    #[test]
    fn test_credential_file_replaced_whole() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialFile::in_dir(dir.path());
        credentials.save("first").unwrap();
        credentials.save("second").unwrap();

        assert_eq!(credentials.load().as_deref(), Some("second"));
        assert!(!credentials.path().with_extension("json.tmp").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_credential_file_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialFile::in_dir(dir.path());
        credentials.save("abc123").unwrap();

        let mode = std::fs::metadata(credentials.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_corrupt_credential_file_means_logged_out() {
        let dir = tempfile::tempdir().unwrap();
        let credentials = CredentialFile::in_dir(dir.path());
        std::fs::write(credentials.path(), "][").unwrap();
        assert_eq!(credentials.load(), None);
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = PlanClient::new("http://localhost:3001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001");
        assert_eq!(client.url(paths::SORT_PLAN), "http://localhost:3001/api/sort/plan");
        assert!(client.session().is_none());
    }
}
