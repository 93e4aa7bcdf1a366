//! Test doubles for the service seams

use crate::client::{PlanService, StreamConnector};
use crate::error::{SessionError, SessionResult};
use crate::sse::EventStream;
use async_trait::async_trait;
use futures::stream::{Stream, StreamExt};
use plsort_common::api::{LibraryAnalysis, PlanRequest};
use plsort_common::{GenreStat, GroupSuggestion, OperationChannel, ProgressEvent, SortPlan};
use std::collections::{BTreeMap, VecDeque};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

pub fn sample_plan(id: &str) -> SortPlan {
    SortPlan {
        id: id.to_string(),
        created_at: None,
        dry_run: true,
        total_liked_tracks: 40,
        tracks_to_add: Vec::new(),
        tracks_to_remove: Vec::new(),
        playlists_to_create: vec!["Polka".into(), "Shoegaze".into()],
        uncategorized_tracks: Vec::new(),
        genre_stats: vec![
            GenreStat { genre: "Rock".into(), track_count: 12, playlist_id: Some("p1".into()), is_new: false },
            GenreStat { genre: "Polka".into(), track_count: 3, playlist_id: None, is_new: true },
            GenreStat { genre: "Shoegaze".into(), track_count: 12, playlist_id: None, is_new: true },
        ],
        grouping_suggestions: Some(vec![GroupSuggestion {
            parent_genre: "Rock".into(),
            child_genres: vec!["Indie Rock".into(), "Shoegaze".into()],
            total_tracks: 24,
            playlists_to_merge: 2,
        }]),
    }
}

/// Plan service that replays queued responses and counts calls
#[derive(Default)]
pub struct FakeService {
    plans: Mutex<VecDeque<SessionResult<SortPlan>>>,
    executions: Mutex<VecDeque<SessionResult<()>>>,
    pub plan_calls: AtomicUsize,
    pub execute_calls: AtomicUsize,
    pub analysis_calls: AtomicUsize,
    pub requests: Mutex<Vec<PlanRequest>>,
}

impl FakeService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_plan(&self, plan: SessionResult<SortPlan>) {
        self.plans.lock().unwrap().push_back(plan);
    }

    pub fn push_execution(&self, result: SessionResult<()>) {
        self.executions.lock().unwrap().push_back(result);
    }

    pub fn plan_calls(&self) -> usize {
        self.plan_calls.load(Ordering::SeqCst)
    }

    pub fn execute_calls(&self) -> usize {
        self.execute_calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<PlanRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PlanService for FakeService {
    async fn request_plan(&self, request: &PlanRequest) -> SessionResult<SortPlan> {
        self.plan_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.plans
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(sample_plan("plan-default")))
    }

    async fn request_execution(&self, request: &PlanRequest) -> SessionResult<()> {
        self.execute_calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        self.executions.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }

    async fn library_analysis(&self) -> SessionResult<LibraryAnalysis> {
        self.analysis_calls.fetch_add(1, Ordering::SeqCst);
        Ok(LibraryAnalysis {
            total_liked_songs: 40,
            playlists: Vec::new(),
            genre_breakdown: BTreeMap::from([("Rock".to_string(), 12)]),
        })
    }
}

/// Scripted event sequence for one connection
pub struct Script {
    pub items: Vec<SessionResult<ProgressEvent>>,
    /// Keep the connection open after the items run out
    pub hang: bool,
}

impl Script {
    pub fn ends(items: Vec<ProgressEvent>) -> Self {
        Self { items: items.into_iter().map(Ok).collect(), hang: false }
    }

    pub fn hangs(items: Vec<ProgressEvent>) -> Self {
        Self { items: items.into_iter().map(Ok).collect(), hang: true }
    }
}

/// Connector that hands out scripted streams and tracks their teardown
#[derive(Default)]
pub struct FakeConnector {
    scripts: Mutex<VecDeque<SessionResult<Script>>>,
    pub channels: Mutex<Vec<OperationChannel>>,
    pub connects: AtomicUsize,
    pub dropped: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(Ok(script));
    }

    pub fn push_failure(&self, error: SessionError) {
        self.scripts.lock().unwrap().push_back(Err(error));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StreamConnector for FakeConnector {
    async fn connect(&self, channel: &OperationChannel) -> SessionResult<EventStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.channels.lock().unwrap().push(channel.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Script::hangs(Vec::new())))?;

        let items = futures::stream::iter(script.items);
        let inner = if script.hang {
            items.chain(futures::stream::pending()).boxed()
        } else {
            items.boxed()
        };
        Ok(TrackedStream { inner, dropped: self.dropped.clone() }.boxed())
    }
}

/// Counts its own drops so tests can observe connection teardown
struct TrackedStream {
    inner: EventStream,
    dropped: Arc<AtomicUsize>,
}

impl Stream for TrackedStream {
    type Item = SessionResult<ProgressEvent>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for TrackedStream {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}
