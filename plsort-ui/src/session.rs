//! Plan Session
//!
//! Orchestrates one review cycle: request a plan with the current overrides,
//! let the user adjust overrides, execute, follow the execution's event
//! stream and regenerate the plan once the execution completes.
//!
//! The session owns the [`OverrideStore`] for its lifetime and hands it back
//! from [`PlanSession::shutdown`]. Every failure is recorded in
//! [`PlanSession::last_error`] and leaves the held plan and the overrides
//! untouched.

use crate::client::{PlanService, StreamConnector};
use crate::error::{SessionError, SessionResult};
use crate::overrides::OverrideStore;
use crate::stream::{Dispatch, EventStreamConsumer, StreamObserver};
use crate::view::SessionView;
use plsort_common::api::{LibraryAnalysis, PlanRequest};
use plsort_common::{OperationChannel, OperationKind, ProgressEvent, SortPlan};
use tracing::{debug, info, warn};

/// Result of pumping one inbound stream message
#[derive(Debug)]
pub enum SessionUpdate {
    /// No operation is being followed
    Idle,
    /// A non-terminal event was appended
    Event(ProgressEvent),
    /// The operation completed
    Completed {
        kind: OperationKind,
        /// The post-execution plan regeneration succeeded
        plan_refreshed: bool,
    },
    /// The operation failed or the connection dropped
    Failed { kind: OperationKind, message: String },
}

impl SessionUpdate {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Idle | Self::Completed { .. } | Self::Failed { .. })
    }
}

/// Interactive plan session
pub struct PlanSession<S, C> {
    service: S,
    connector: C,
    overrides: OverrideStore,
    plan: Option<SortPlan>,
    view: SessionView,
    stream: EventStreamConsumer,
    operation: Option<OperationKind>,
    last_error: Option<String>,
}

impl<S, C> PlanSession<S, C>
where
    S: PlanService,
    C: StreamConnector,
{
    pub fn new(service: S, connector: C, overrides: OverrideStore) -> Self {
        let view = SessionView::derive(None, overrides.snapshot());
        Self {
            service,
            connector,
            overrides,
            plan: None,
            view,
            stream: EventStreamConsumer::new(),
            operation: None,
            last_error: None,
        }
    }

    pub fn with_observer(mut self, observer: impl StreamObserver + 'static) -> Self {
        self.stream.set_observer(observer);
        self
    }

    pub fn plan(&self) -> Option<&SortPlan> {
        self.plan.as_ref()
    }

    pub fn view(&self) -> &SessionView {
        &self.view
    }

    pub fn overrides(&self) -> &OverrideStore {
        &self.overrides
    }

    pub fn stream(&self) -> &EventStreamConsumer {
        &self.stream
    }

    /// Operation currently being followed
    pub fn operation(&self) -> Option<OperationKind> {
        self.operation
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    /// Execution would currently be accepted
    pub fn can_execute(&self) -> bool {
        self.plan.is_some() && !self.overrides.is_dry_run() && !self.stream.is_active()
    }

    /// Request body for the current override snapshot
    pub fn plan_request(&self) -> PlanRequest {
        self.overrides.request()
    }

    /// Request a plan with the current overrides and replace the held one
    ///
    /// On failure the previous plan is kept.
    pub async fn generate_plan(&mut self) -> SessionResult<&SortPlan> {
        let request = self.plan_request();
        match self.service.request_plan(&request).await {
            Ok(plan) => Ok(self.accept_plan(plan)),
            Err(e) => Err(self.record(e)),
        }
    }

    /// Replace the held plan wholesale
    ///
    /// Front ends that issue plan requests themselves call this with each
    /// response as it completes; the last one accepted wins.
    pub fn accept_plan(&mut self, plan: SortPlan) -> &SortPlan {
        info!(
            plan_id = %plan.id,
            dry_run = plan.dry_run,
            tracks_to_add = plan.tracks_to_add.len(),
            tracks_to_remove = plan.tracks_to_remove.len(),
            playlists_to_create = plan.playlists_to_create.len(),
            "Plan received"
        );
        let duplicates = plan.duplicate_genres();
        if !duplicates.is_empty() {
            warn!(genres = ?duplicates, "Plan lists genres more than once");
        }

        self.view = SessionView::derive(Some(&plan), self.overrides.snapshot());
        self.last_error = None;
        self.plan.insert(plan)
    }

    /// Trigger execution of the held plan and start following its progress
    ///
    /// Rejected without any request when no plan is held, when dry run is
    /// currently on, or while another operation is being followed.
    pub async fn execute_plan(&mut self) -> SessionResult<()> {
        if self.stream.is_active() {
            return Err(self.record(SessionError::InvalidOperation(
                "An operation is already running".into(),
            )));
        }
        let Some(plan_id) = self.plan.as_ref().map(|p| p.id.clone()) else {
            return Err(self.record(SessionError::InvalidOperation(
                "No plan to execute; generate a plan first".into(),
            )));
        };
        if self.overrides.is_dry_run() {
            return Err(self.record(SessionError::InvalidOperation(
                "Dry run is enabled; turn it off to execute".into(),
            )));
        }

        let request = self.plan_request();
        if let Err(e) = self.service.request_execution(&request).await {
            return Err(self.record(e));
        }
        info!(plan_id = %plan_id, "Execution started");

        self.last_error = None;
        self.follow(OperationKind::Execution, OperationChannel::execution(plan_id)).await
    }

    async fn follow(&mut self, kind: OperationKind, channel: OperationChannel) -> SessionResult<()> {
        match self.stream.open(&self.connector, channel).await {
            Ok(()) => {
                self.operation = Some(kind);
                Ok(())
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Process exactly one inbound message of the followed operation
    pub async fn pump(&mut self) -> SessionUpdate {
        match self.stream.next().await {
            Dispatch::Inactive => SessionUpdate::Idle,
            Dispatch::Appended(event) => SessionUpdate::Event(event),
            Dispatch::Completed(event) => {
                let kind = self.operation.take().unwrap_or(OperationKind::Execution);
                info!(operation = kind.as_str(), message = %event.message, "Operation completed");

                let plan_refreshed = match kind {
                    OperationKind::Execution => self.generate_plan().await.is_ok(),
                    OperationKind::Analysis => false,
                };
                // Finished streams are never reconnected
                self.stream.close();
                SessionUpdate::Completed { kind, plan_refreshed }
            }
            Dispatch::Failed(e) => {
                let kind = self.operation.take().unwrap_or(OperationKind::Execution);
                let error = self.record(e);
                SessionUpdate::Failed { kind, message: error.user_message() }
            }
        }
    }

    /// Pump until the followed operation ends
    pub async fn follow_execution(&mut self) -> SessionUpdate {
        loop {
            let update = self.pump().await;
            if update.is_terminal() {
                return update;
            }
        }
    }

    /// Run a library analysis while following its progress channel
    ///
    /// Progress is best effort: if the channel cannot be opened the analysis
    /// still runs.
    pub async fn analyze_library(&mut self) -> SessionResult<LibraryAnalysis> {
        if self.stream.is_active() {
            return Err(self.record(SessionError::InvalidOperation(
                "An operation is already running".into(),
            )));
        }
        if let Err(e) = self.stream.open(&self.connector, OperationChannel::analysis()).await {
            warn!(error = %e, "Analysis progress unavailable");
        }
        self.operation = Some(OperationKind::Analysis);

        let result = {
            let mut request = self.service.library_analysis();
            loop {
                tokio::select! {
                    result = &mut request => break result,
                    dispatch = self.stream.next(), if self.stream.is_connected() => {
                        if let Dispatch::Failed(e) = dispatch {
                            debug!(error = %e, "Analysis progress stream ended");
                        }
                    }
                }
            }
        };

        self.operation = None;
        self.stream.close();
        match result {
            Ok(analysis) => {
                info!(
                    total_liked_songs = analysis.total_liked_songs,
                    playlists = analysis.playlists.len(),
                    genres = analysis.genre_breakdown.len(),
                    "Library analysis finished"
                );
                // Progress channel failures do not outlive a successful analysis
                self.stream.dismiss_error();
                Ok(analysis)
            }
            Err(e) => Err(self.record(e)),
        }
    }

    /// Stop following the current operation
    pub fn close_stream(&mut self) {
        self.operation = None;
        self.stream.close();
    }

    /// Reset the event log; rejected while an operation is being followed
    pub fn clear_events(&mut self) -> SessionResult<()> {
        self.stream.clear()
    }

    pub fn toggle_dry_run(&mut self) {
        self.overrides.toggle_dry_run();
        self.refresh_view();
    }

    pub fn set_dry_run(&mut self, value: bool) {
        self.overrides.set_dry_run(value);
        self.refresh_view();
    }

    pub fn toggle_group(&mut self, key: &str) -> bool {
        let enabled = self.overrides.toggle_group(key);
        self.refresh_view();
        enabled
    }

    /// Enable exactly the given grouping keys
    pub fn enable_groups<I, K>(&mut self, keys: I)
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.overrides.enable_all_groups(keys);
        self.refresh_view();
    }

    /// Enable every grouping the held plan suggests
    pub fn enable_all_groups(&mut self) {
        let keys: Vec<String> = self
            .plan
            .iter()
            .flat_map(|p| p.suggestions())
            .map(|s| s.parent_genre.clone())
            .collect();
        self.enable_groups(keys);
    }

    pub fn disable_all_groups(&mut self) {
        self.overrides.disable_all_groups();
        self.refresh_view();
    }

    pub fn toggle_playlist(&mut self, name: &str) -> bool {
        let enabled = self.overrides.toggle_playlist(name);
        self.refresh_view();
        enabled
    }

    pub fn enable_all_playlists(&mut self) {
        self.overrides.enable_all_playlists();
        self.refresh_view();
    }

    /// Disable exactly the given playlist names
    pub fn disable_playlists<I, N>(&mut self, names: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.overrides.disable_all_playlists(names);
        self.refresh_view();
    }

    /// Disable every playlist the held plan would create
    pub fn disable_all_playlists(&mut self) {
        let names: Vec<String> =
            self.plan.iter().flat_map(|p| p.playlists_to_create.iter().cloned()).collect();
        self.disable_playlists(names);
    }

    /// End the session, closing any stream and handing back the overrides
    pub fn shutdown(mut self) -> OverrideStore {
        self.close_stream();
        debug!("Plan session shut down");
        self.overrides
    }

    fn refresh_view(&mut self) {
        self.view = SessionView::derive(self.plan.as_ref(), self.overrides.snapshot());
    }

    fn record(&mut self, error: SessionError) -> SessionError {
        warn!(error = %error, "Session operation failed");
        self.last_error = Some(error.user_message());
        error
    }
}

impl<S, C> std::fmt::Debug for PlanSession<S, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlanSession")
            .field("plan", &self.plan.as_ref().map(|p| &p.id))
            .field("overrides", &self.overrides)
            .field("stream", &self.stream)
            .field("operation", &self.operation)
            .field("last_error", &self.last_error)
            .finish_non_exhaustive()
    }
}
