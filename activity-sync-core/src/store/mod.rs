//! The synchronization store.
//!
//! [`SyncStore`] owns the registry of server-confirmed records, the
//! selection and the progress state machines, and is the only way to change
//! any of them. Every operation follows the same shape:
//! 1. Check local preconditions and mark the operation in flight
//! 2. Await the remote call without holding the state lock
//! 3. Commit the outcome and clear the in-flight mark under one lock
//! 4. Emit intents and notify subscribers
//!
//! The registry is only written in step 3, so readers never see a change the
//! server has not confirmed.

mod state;

pub use state::{LoadingState, MutationState, StoreConfig, StoreSnapshot};

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{oneshot, watch};
use uuid::Uuid;

use crate::error::{ConflictKind, StoreError, StoreResult};
use crate::intent::{Navigator, Notifier, TracingIntents};
use crate::models::Record;
use crate::projection::{group_by_date, sort_by_date, DateGroup};
use crate::remote::{RemoteError, RemoteService};
use state::{resolve, StoreState};

/// Client-side record store kept consistent with a [`RemoteService`].
pub struct SyncStore<S: RemoteService> {
    remote: S,
    config: StoreConfig,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    state: Mutex<StoreState<S::Record>>,
    changes: watch::Sender<u64>,
}

/// Work whose in-flight mark must be cleared if the caller drops the future.
enum Pending {
    LoadAll,
    Fetch(String),
    Mutation(String),
}

struct PendingGuard<'a, S: RemoteService> {
    store: &'a SyncStore<S>,
    pending: Option<Pending>,
}

impl<S: RemoteService> PendingGuard<'_, S> {
    /// Called once the outcome is about to be committed normally.
    fn disarm(mut self) {
        self.pending = None;
    }
}

impl<S: RemoteService> Drop for PendingGuard<'_, S> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            self.store.abandon(pending);
        }
    }
}

impl<S: RemoteService> SyncStore<S> {
    /// Creates a store with default configuration that logs its intents.
    pub fn new(remote: S) -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            remote,
            config: StoreConfig::default(),
            notifier: Arc::new(TracingIntents),
            navigator: Arc::new(TracingIntents),
            state: Mutex::new(StoreState::new()),
            changes,
        }
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = navigator;
        self
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn remote(&self) -> &S {
        &self.remote
    }

    // ========== Remote operations ==========

    /// Fetches every record and merges it into the registry.
    ///
    /// Records already cached but absent from the response are kept. If a
    /// bulk load is already running, waits for it instead of starting
    /// another. Returns the number of records merged.
    pub async fn load_all(&self) -> StoreResult<usize> {
        let in_progress = {
            let mut state = self.lock();
            if state.loading == LoadingState::LoadingAll {
                let (tx, rx) = oneshot::channel();
                state.load_waiters.push(tx);
                Some(rx)
            } else {
                state.loading = LoadingState::LoadingAll;
                None
            }
        };

        if let Some(rx) = in_progress {
            tracing::debug!("load already in progress, waiting for it");
            return Self::await_waiter(rx).await;
        }

        self.touch();
        let guard = self.guard(Pending::LoadAll);
        tracing::debug!("loading all records");
        let result = self.call_remote(self.remote.list()).await;
        guard.disarm();

        let outcome = {
            let mut state = self.lock();
            let outcome = match result {
                Ok(records) => {
                    let mut merged = 0;
                    for mut record in records {
                        record.normalize_date();
                        let id = record.id().to_string();
                        match state.registry.set(&id, record) {
                            Ok(()) => merged += 1,
                            Err(e) => tracing::warn!("Skipping record from server: {}", e),
                        }
                    }
                    Ok(merged)
                }
                Err(e) => Err(StoreError::from(e)),
            };
            state.loading = LoadingState::Idle;
            resolve(std::mem::take(&mut state.load_waiters), &outcome);
            outcome
        };
        self.touch();

        match &outcome {
            Ok(merged) => tracing::info!("Loaded {} record(s)", merged),
            Err(e) => self.report(e),
        }
        outcome
    }

    /// Returns a record, fetching it only when it is not cached, and makes
    /// it the selection.
    ///
    /// Uses a per-id fetching mark rather than the bulk loading state. A
    /// second call for an id that is already being fetched waits for the
    /// first. A reply carrying a different id is rejected as a transport
    /// failure and nothing is cached.
    pub async fn load_one(&self, id: &str) -> StoreResult<S::Record> {
        if id.is_empty() {
            return Err(StoreError::InvalidRecord("empty id".to_string()));
        }

        enum Start<R> {
            Cached(R),
            Wait(oneshot::Receiver<StoreResult<R>>),
            Fetch,
        }

        let start = {
            let mut state = self.lock();
            if let Some(record) = state.registry.get(id).cloned() {
                state.selected = Some(record.clone());
                Start::Cached(record)
            } else if let Some(waiters) = state.fetching.get_mut(id) {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Start::Wait(rx)
            } else {
                state.fetching.insert(id.to_string(), Vec::new());
                Start::Fetch
            }
        };

        match start {
            Start::Cached(record) => {
                self.touch();
                return Ok(record);
            }
            Start::Wait(rx) => return Self::await_waiter(rx).await,
            Start::Fetch => {}
        }

        self.touch();
        let guard = self.guard(Pending::Fetch(id.to_string()));
        tracing::debug!("fetching record {}", id);
        let result = self.call_remote(self.remote.get(id)).await;
        guard.disarm();

        let outcome = {
            let mut state = self.lock();
            let waiters = state.fetching.remove(id).unwrap_or_default();
            let outcome = match result {
                Ok(record) if record.id() != id => Err(StoreError::Transport(format!(
                    "server returned record '{}' for '{}'",
                    record.id(),
                    id
                ))),
                Ok(mut record) => {
                    record.normalize_date();
                    state.registry.set(id, record.clone()).map(|()| {
                        state.selected = Some(record.clone());
                        state.edit_mode = false;
                        record
                    })
                }
                Err(e) => Err(StoreError::from(e)),
            };
            resolve(waiters, &outcome);
            outcome
        };
        self.touch();

        if let Err(e) = &outcome {
            self.report(e);
        }
        outcome
    }

    /// Submits a new record and caches it once the server confirms.
    ///
    /// A record with an empty id is given a fresh UUID first. Fails with a
    /// conflict, without contacting the server, if the id is already cached
    /// or already being saved.
    pub async fn create(&self, mut record: S::Record) -> StoreResult<S::Record> {
        if record.id().is_empty() {
            record.set_id(Uuid::new_v4().to_string());
        }
        let id = record.id().to_string();

        {
            let mut state = self.lock();
            if state.registry.contains(&id) {
                return Err(StoreError::conflict(&id, ConflictKind::AlreadyExists));
            }
            Self::begin_mutation(&mut state, &id)?;
        }
        self.touch();

        let guard = self.guard(Pending::Mutation(id.clone()));
        tracing::debug!("creating record {}", id);
        let result = self.call_remote(self.remote.create(&record)).await;
        guard.disarm();

        self.finish_persist(&id, record, result, false)
    }

    /// Replaces a cached record once the server confirms the change.
    ///
    /// Fails locally with `NotFound` if the id is not cached, or with a
    /// conflict if a change to it is already being saved.
    pub async fn update(&self, record: S::Record) -> StoreResult<S::Record> {
        let id = record.id().to_string();

        {
            let mut state = self.lock();
            if !state.registry.contains(&id) {
                return Err(StoreError::NotFound(id));
            }
            Self::begin_mutation(&mut state, &id)?;
        }
        self.touch();

        let guard = self.guard(Pending::Mutation(id.clone()));
        tracing::debug!("updating record {}", id);
        let result = self.call_remote(self.remote.update(&record)).await;
        guard.disarm();

        self.finish_persist(&id, record, result, true)
    }

    /// Deletes a record on the server, then drops it from the cache.
    ///
    /// `request_tag` names the control that asked for the delete so a
    /// renderer can show a busy indicator on that control alone; see
    /// [`SyncStore::delete_target`].
    pub async fn delete(&self, id: &str, request_tag: &str) -> StoreResult<()> {
        if id.is_empty() {
            return Err(StoreError::InvalidRecord("empty id".to_string()));
        }

        {
            let mut state = self.lock();
            Self::begin_mutation(&mut state, id)?;
            state
                .delete_targets
                .insert(id.to_string(), request_tag.to_string());
        }
        self.touch();

        let guard = self.guard(Pending::Mutation(id.to_string()));
        tracing::debug!("deleting record {}", id);
        let result = self.call_remote(self.remote.delete(id)).await;
        guard.disarm();

        let outcome = {
            let mut state = self.lock();
            state.mutations.remove(id);
            state.delete_targets.remove(id);
            match result {
                Ok(()) => state.registry.remove(id).map(|_| ()),
                Err(e) => Err(StoreError::from(e)),
            }
        };
        self.touch();

        if let Err(e) = &outcome {
            self.report(e);
        }
        outcome
    }

    // ========== Selection and form state ==========

    /// Selects the cached copy of `id` and leaves edit mode.
    pub fn select(&self, id: &str) -> Option<S::Record> {
        let selected = {
            let mut state = self.lock();
            state.selected = state.registry.get(id).cloned();
            state.edit_mode = false;
            state.selected.clone()
        };
        self.touch();
        selected
    }

    pub fn clear_selection(&self) {
        self.lock().selected = None;
        self.touch();
    }

    /// Clears the selection and enters edit mode for a new record.
    pub fn open_create_form(&self) {
        {
            let mut state = self.lock();
            state.selected = None;
            state.edit_mode = true;
        }
        self.touch();
    }

    /// Selects the cached copy of `id` and enters edit mode.
    pub fn open_edit_form(&self, id: &str) -> Option<S::Record> {
        let selected = {
            let mut state = self.lock();
            state.selected = state.registry.get(id).cloned();
            state.edit_mode = true;
            state.selected.clone()
        };
        self.touch();
        selected
    }

    pub fn cancel_form(&self) {
        self.lock().edit_mode = false;
        self.touch();
    }

    // ========== Reads ==========

    pub fn get(&self, id: &str) -> Option<S::Record> {
        self.lock().registry.get(id).cloned()
    }

    /// Cached records in no particular order.
    pub fn values(&self) -> Vec<S::Record> {
        self.lock().registry.values()
    }

    /// Cached records sorted by date, then id.
    pub fn sorted_by_date(&self) -> Vec<S::Record> {
        sort_by_date(self.values())
    }

    /// Cached records grouped by calendar day.
    ///
    /// Recomputed only when the registry has changed since the last call.
    pub fn grouped_by_date(&self) -> Arc<Vec<DateGroup<S::Record>>> {
        let mut state = self.lock();
        let version = state.registry.version();
        if let Some((cached_at, groups)) = &state.grouped {
            if *cached_at == version {
                return Arc::clone(groups);
            }
        }
        let groups = Arc::new(group_by_date(state.registry.values()));
        state.grouped = Some((version, Arc::clone(&groups)));
        groups
    }

    pub fn selected(&self) -> Option<S::Record> {
        self.lock().selected.clone()
    }

    pub fn edit_mode(&self) -> bool {
        self.lock().edit_mode
    }

    pub fn loading_state(&self) -> LoadingState {
        self.lock().loading
    }

    pub fn is_fetching(&self, id: &str) -> bool {
        self.lock().fetching.contains_key(id)
    }

    pub fn mutation_state(&self, id: &str) -> MutationState {
        self.lock().mutation_state(id)
    }

    /// True while any mutation is in flight.
    pub fn is_submitting(&self) -> bool {
        !self.lock().mutations.is_empty()
    }

    /// The request tag of the delete in flight for `id`, if any.
    pub fn delete_target(&self, id: &str) -> Option<String> {
        self.lock().delete_targets.get(id).cloned()
    }

    pub fn snapshot(&self) -> StoreSnapshot<S::Record> {
        let version = *self.changes.borrow();
        let state = self.lock();
        let mut fetching: Vec<String> = state.fetching.keys().cloned().collect();
        fetching.sort();

        StoreSnapshot {
            version,
            records: sort_by_date(state.registry.values()),
            selected: state.selected.clone(),
            edit_mode: state.edit_mode,
            loading: state.loading,
            fetching,
            mutations: state.mutations.clone(),
            delete_targets: state.delete_targets.clone(),
        }
    }

    /// Change notifications. The value is a counter that increases on every
    /// observable state change; re-read a snapshot when it moves.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    // ========== Internals ==========

    fn lock(&self) -> MutexGuard<'_, StoreState<S::Record>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.changes.send_modify(|version| *version += 1);
    }

    fn guard(&self, pending: Pending) -> PendingGuard<'_, S> {
        PendingGuard {
            store: self,
            pending: Some(pending),
        }
    }

    fn report(&self, error: &StoreError) {
        self.notifier.notify_error(&error.to_string());
    }

    fn begin_mutation(state: &mut StoreState<S::Record>, id: &str) -> StoreResult<()> {
        if state.mutation_state(id) == MutationState::Submitting {
            return Err(StoreError::conflict(id, ConflictKind::InFlight));
        }
        state
            .mutations
            .insert(id.to_string(), MutationState::Submitting);
        Ok(())
    }

    /// Commits the outcome of a create or update.
    fn finish_persist(
        &self,
        id: &str,
        record: S::Record,
        result: Result<(), RemoteError>,
        is_update: bool,
    ) -> StoreResult<S::Record> {
        let outcome = {
            let mut state = self.lock();
            state.mutations.remove(id);
            match result {
                Ok(()) => state.registry.set(id, record.clone()).map(|()| {
                    let was_selected = state
                        .selected
                        .as_ref()
                        .is_some_and(|selected| selected.id() == id);
                    if self.config.select_on_persist || (is_update && was_selected) {
                        state.selected = Some(record.clone());
                    }
                    state.edit_mode = false;
                    record
                }),
                Err(e) => Err(StoreError::from(e)),
            }
        };
        self.touch();

        match &outcome {
            Ok(_) => {
                if self.config.navigate_on_persist {
                    self.navigator.navigate_to_record(id);
                }
            }
            Err(e) => self.report(e),
        }
        outcome
    }

    async fn call_remote<T, F>(&self, call: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match self.config.remote_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| RemoteError::Timeout)?,
            None => call.await,
        }
    }

    async fn await_waiter<T>(rx: oneshot::Receiver<StoreResult<T>>) -> StoreResult<T> {
        rx.await
            .unwrap_or_else(|_| Err(StoreError::Transport("request cancelled".to_string())))
    }

    /// Clears the in-flight mark of an operation whose future was dropped.
    fn abandon(&self, pending: Pending) {
        {
            let mut state = self.lock();
            match &pending {
                Pending::LoadAll => {
                    state.loading = LoadingState::Idle;
                    state.load_waiters.clear();
                }
                Pending::Fetch(id) => {
                    state.fetching.remove(id);
                }
                Pending::Mutation(id) => {
                    state.mutations.remove(id);
                    state.delete_targets.remove(id);
                }
            }
        }
        tracing::debug!("remote call abandoned before it resolved");
        self.touch();
    }
}

#[cfg(test)]
mod tests;
