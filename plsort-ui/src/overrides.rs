//! Override Store
//!
//! Holds the user's session-persistent selections that parameterize every
//! plan request: the dry-run flag, the grouping parents to apply, and the new
//! playlists to skip. The store outlives any single plan and is mutated only
//! by explicit user toggles.
//!
//! Every mutator writes through to an [`OverrideStorage`] backend under the
//! fixed key [`STORAGE_KEY`] and publishes the new snapshot on a watch
//! channel. Restoring from storage at startup publishes nothing.

use plsort_common::api::PlanRequest;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Fixed namespace key the overrides are persisted under
pub const STORAGE_KEY: &str = "ui-storage";

const STORAGE_VERSION: u32 = 0;

/// Point-in-time copy of the override state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSnapshot {
    /// Never defaults to live mutation
    #[serde(default = "default_dry_run")]
    pub is_dry_run: bool,
    /// Grouping is opt-in
    #[serde(default)]
    pub enabled_groups: BTreeSet<String>,
    /// Playlist creation is opt-out
    #[serde(default)]
    pub disabled_playlists: BTreeSet<String>,
}

fn default_dry_run() -> bool {
    true
}

impl Default for OverrideSnapshot {
    fn default() -> Self {
        Self {
            is_dry_run: true,
            enabled_groups: BTreeSet::new(),
            disabled_playlists: BTreeSet::new(),
        }
    }
}

impl OverrideSnapshot {
    /// Request body carrying this snapshot
    pub fn to_request(&self) -> PlanRequest {
        PlanRequest {
            dry_run: self.is_dry_run,
            enabled_groups: self.enabled_groups.iter().cloned().collect(),
            disabled_playlists: self.disabled_playlists.iter().cloned().collect(),
        }
    }
}

/// On-disk envelope
#[derive(Debug, Serialize, Deserialize)]
struct PersistedOverrides {
    state: OverrideSnapshot,
    #[serde(default)]
    version: u32,
}

/// Key/value backend the store persists through
pub trait OverrideStorage: Send + Sync {
    fn load(&self, key: &str) -> plsort_common::Result<Option<String>>;
    fn save(&self, key: &str, value: &str) -> plsort_common::Result<()>;
}

/// One JSON file per key inside a state directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OverrideStorage for FileStorage {
    fn load(&self, key: &str) -> plsort_common::Result<Option<String>> {
        let path = self.path_for(key);
        match std::fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, key: &str, value: &str) -> plsort_common::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path_for(key);
        // Write then rename so a crash never leaves a half-written file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// In-memory backend; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
    }
}

impl OverrideStorage for MemoryStorage {
    fn load(&self, key: &str) -> plsort_common::Result<Option<String>> {
        Ok(self.get(key))
    }

    fn save(&self, key: &str, value: &str) -> plsort_common::Result<()> {
        self.insert(key, value);
        Ok(())
    }
}

/// Session-persistent override state container
pub struct OverrideStore {
    state: OverrideSnapshot,
    storage: Box<dyn OverrideStorage>,
    changes: watch::Sender<OverrideSnapshot>,
}

impl OverrideStore {
    /// Restore the store from storage, falling back to defaults
    ///
    /// Does not publish a change notification.
    pub fn load(storage: impl OverrideStorage + 'static) -> Self {
        let state = match storage.load(STORAGE_KEY) {
            Ok(Some(raw)) => match serde_json::from_str::<PersistedOverrides>(&raw) {
                Ok(persisted) => {
                    if persisted.version != STORAGE_VERSION {
                        debug!(version = persisted.version, "Loading overrides from other version");
                    }
                    persisted.state
                }
                Err(e) => {
                    warn!(error = %e, "Persisted overrides unreadable, using defaults");
                    OverrideSnapshot::default()
                }
            },
            Ok(None) => OverrideSnapshot::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read persisted overrides, using defaults");
                OverrideSnapshot::default()
            }
        };

        debug!(
            dry_run = state.is_dry_run,
            enabled_groups = state.enabled_groups.len(),
            disabled_playlists = state.disabled_playlists.len(),
            "Override store restored"
        );

        let (changes, _) = watch::channel(state.clone());
        Self { state, storage: Box::new(storage), changes }
    }

    /// Fresh store with defaults over in-memory storage
    pub fn in_memory() -> Self {
        Self::load(MemoryStorage::new())
    }

    pub fn snapshot(&self) -> &OverrideSnapshot {
        &self.state
    }

    /// Request body for the current snapshot
    pub fn request(&self) -> PlanRequest {
        self.state.to_request()
    }

    pub fn is_dry_run(&self) -> bool {
        self.state.is_dry_run
    }

    pub fn enabled_groups(&self) -> &BTreeSet<String> {
        &self.state.enabled_groups
    }

    pub fn disabled_playlists(&self) -> &BTreeSet<String> {
        &self.state.disabled_playlists
    }

    pub fn is_group_enabled(&self, key: &str) -> bool {
        self.state.enabled_groups.contains(key)
    }

    pub fn is_playlist_enabled(&self, name: &str) -> bool {
        !self.state.disabled_playlists.contains(name)
    }

    /// Receiver notified after every effective mutation
    pub fn subscribe(&self) -> watch::Receiver<OverrideSnapshot> {
        self.changes.subscribe()
    }

    pub fn toggle_dry_run(&mut self) {
        self.update(|s| s.is_dry_run = !s.is_dry_run);
    }

    pub fn set_dry_run(&mut self, value: bool) {
        self.update(|s| s.is_dry_run = value);
    }

    /// Add the key if absent, remove it if present. Returns whether it is now enabled.
    pub fn toggle_group(&mut self, key: &str) -> bool {
        self.update(|s| toggle_member(&mut s.enabled_groups, key));
        self.is_group_enabled(key)
    }

    /// Replace the enabled set with exactly `keys`
    pub fn enable_all_groups<I, S>(&mut self, keys: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let keys: BTreeSet<String> = keys.into_iter().map(Into::into).collect();
        self.update(|s| s.enabled_groups = keys);
    }

    pub fn disable_all_groups(&mut self) {
        self.update(|s| s.enabled_groups.clear());
    }

    /// Symmetric add/remove on the disabled set. Returns whether creation is now enabled.
    pub fn toggle_playlist(&mut self, name: &str) -> bool {
        self.update(|s| toggle_member(&mut s.disabled_playlists, name));
        self.is_playlist_enabled(name)
    }

    pub fn enable_all_playlists(&mut self) {
        self.update(|s| s.disabled_playlists.clear());
    }

    /// Replace the disabled set with exactly `names`
    pub fn disable_all_playlists<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        self.update(|s| s.disabled_playlists = names);
    }

    fn update(&mut self, mutate: impl FnOnce(&mut OverrideSnapshot)) {
        let before = self.state.clone();
        mutate(&mut self.state);
        if self.state == before {
            return;
        }
        self.persist();
        self.changes.send_replace(self.state.clone());
    }

    fn persist(&self) {
        let envelope = PersistedOverrides { state: self.state.clone(), version: STORAGE_VERSION };
        let result = serde_json::to_string(&envelope)
            .map_err(plsort_common::Error::from)
            .and_then(|raw| self.storage.save(STORAGE_KEY, &raw));
        match result {
            Ok(()) => debug!(
                dry_run = self.state.is_dry_run,
                enabled_groups = self.state.enabled_groups.len(),
                disabled_playlists = self.state.disabled_playlists.len(),
                "Overrides saved"
            ),
            // In-memory state stays authoritative
            Err(e) => warn!(error = %e, "Failed to persist overrides"),
        }
    }
}

impl std::fmt::Debug for OverrideStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverrideStore").field("state", &self.state).finish_non_exhaustive()
    }
}

fn toggle_member(set: &mut BTreeSet<String>, key: &str) {
    if !set.remove(key) {
        set.insert(key.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingStorage;

    impl OverrideStorage for FailingStorage {
        fn load(&self, _key: &str) -> plsort_common::Result<Option<String>> {
            Err(plsort_common::Error::Config("disk on fire".into()))
        }

        fn save(&self, _key: &str, _value: &str) -> plsort_common::Result<()> {
            Err(plsort_common::Error::Config("disk on fire".into()))
        }
    }

    #[test]
    fn test_defaults_are_safe() {
        let store = OverrideStore::in_memory();
        assert!(store.is_dry_run());
        assert!(store.enabled_groups().is_empty());
        assert!(store.disabled_playlists().is_empty());
        assert!(store.is_playlist_enabled("Rock"));
    }

    #[test]
    fn test_toggle_group_is_own_inverse() {
        let mut store = OverrideStore::in_memory();
        store.enable_all_groups(["Pop"]);
        let original = store.enabled_groups().clone();

        assert!(store.toggle_group("Rock"));
        assert!(!store.toggle_group("Rock"));
        assert_eq!(store.enabled_groups(), &original);
    }

    #[test]
    fn test_toggle_playlist_is_symmetric() {
        let mut store = OverrideStore::in_memory();
        assert!(!store.toggle_playlist("Polka"));
        assert!(store.disabled_playlists().contains("Polka"));
        assert!(store.toggle_playlist("Polka"));
        assert!(store.disabled_playlists().is_empty());
    }

    #[test]
    fn test_bulk_mutators_replace_sets() {
        let mut store = OverrideStore::in_memory();
        store.toggle_group("Jazz");
        store.enable_all_groups(vec!["Rock".to_string(), "Pop".to_string()]);
        assert_eq!(
            store.enabled_groups().iter().map(String::as_str).collect::<Vec<_>>(),
            vec!["Pop", "Rock"]
        );
        store.disable_all_groups();
        assert!(store.enabled_groups().is_empty());

        store.disable_all_playlists(["A", "B"]);
        assert_eq!(store.disabled_playlists().len(), 2);
        store.enable_all_playlists();
        assert!(store.disabled_playlists().is_empty());
    }

    #[test]
    fn test_repeated_intent_is_noop() {
        let mut store = OverrideStore::in_memory();
        let mut rx = store.subscribe();

        store.disable_all_playlists(["Polka"]);
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        store.disable_all_playlists(["Polka"]);
        store.set_dry_run(true);
        store.enable_all_playlists();
        store.enable_all_playlists();
        assert_eq!(store.disabled_playlists().len(), 0);
        // Only the effective enable_all_playlists call notified
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();
        store.enable_all_playlists();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reload_restores_state_without_notification() {
        let storage = MemoryStorage::new();
        let mut store = OverrideStore::load(storage.clone());
        store.set_dry_run(false);
        store.toggle_group("Rock");
        drop(store);

        let reloaded = OverrideStore::load(storage.clone());
        let rx = reloaded.subscribe();
        assert!(!reloaded.is_dry_run());
        assert!(reloaded.is_group_enabled("Rock"));
        assert!(!rx.has_changed().unwrap());

        let raw = storage.get(STORAGE_KEY).unwrap();
        assert!(raw.contains("\"isDryRun\":false"));
        assert!(raw.contains("\"version\":0"));
    }

    #[test]
    fn test_corrupt_storage_falls_back_to_defaults() {
        let storage = MemoryStorage::new();
        storage.insert(STORAGE_KEY, "{not json");
        let store = OverrideStore::load(storage);
        assert_eq!(store.snapshot(), &OverrideSnapshot::default());
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let storage = MemoryStorage::new();
        storage.insert(STORAGE_KEY, r#"{"state":{"enabledGroups":["Rock"]}}"#);
        let store = OverrideStore::load(storage);
        assert!(store.is_dry_run());
        assert!(store.is_group_enabled("Rock"));
    }

    #[test]
    fn test_failing_storage_keeps_memory_state() {
        let mut store = OverrideStore::load(FailingStorage);
        assert!(store.is_dry_run());
        store.set_dry_run(false);
        assert!(!store.is_dry_run());
    }

    #[test]
    fn test_request_reflects_current_snapshot() {
        let mut store = OverrideStore::in_memory();
        store.set_dry_run(false);
        store.toggle_group("Rock");
        store.toggle_playlist("Polka");

        let request = store.request();
        assert!(!request.dry_run);
        assert_eq!(request.enabled_groups, vec!["Rock".to_string()]);
        assert_eq!(request.disabled_playlists, vec!["Polka".to_string()]);
    }
}
