//! Progress state machines and the snapshot handed to renderers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::error::StoreResult;
use crate::projection::DateGroup;
use crate::registry::EntityRegistry;

/// Bulk-load progress. `Idle -> LoadingAll -> Idle` on every path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingState {
    #[default]
    Idle,
    LoadingAll,
}

/// Per-id mutation progress. `Idle -> Submitting -> Idle` on every path;
/// failures are reported as events, never kept as state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationState {
    #[default]
    Idle,
    Submitting,
}

/// Side effects and limits applied by the store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Emit a navigate intent after a confirmed create or update.
    pub navigate_on_persist: bool,
    /// Select the record after a confirmed create or update. An update
    /// always refreshes a record that is already selected.
    pub select_on_persist: bool,
    /// Upper bound on every remote call. `None` waits indefinitely.
    pub remote_timeout: Option<Duration>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            navigate_on_persist: true,
            select_on_persist: false,
            remote_timeout: None,
        }
    }
}

/// Immutable view of everything a renderer may need.
#[derive(Debug, Clone, Serialize)]
pub struct StoreSnapshot<R> {
    /// Change counter at the time of the snapshot.
    pub version: u64,
    /// Registry contents, sorted by date.
    pub records: Vec<R>,
    pub selected: Option<R>,
    pub edit_mode: bool,
    pub loading: LoadingState,
    /// Ids with a single-record fetch in flight, sorted.
    pub fetching: Vec<String>,
    /// Ids with a mutation in flight. Absent ids are idle.
    pub mutations: HashMap<String, MutationState>,
    /// Request tag of each in-flight delete, by id.
    pub delete_targets: HashMap<String, String>,
}

pub(crate) type Waiters<T> = Vec<oneshot::Sender<StoreResult<T>>>;

/// Everything behind the store's lock.
#[derive(Debug)]
pub(crate) struct StoreState<R> {
    pub registry: EntityRegistry<R>,
    pub selected: Option<R>,
    pub edit_mode: bool,
    pub loading: LoadingState,
    /// Callers waiting on the bulk load in flight.
    pub load_waiters: Waiters<usize>,
    /// Single-record fetches in flight, with callers waiting on each.
    pub fetching: HashMap<String, Waiters<R>>,
    /// Only `Submitting` entries are kept.
    pub mutations: HashMap<String, MutationState>,
    pub delete_targets: HashMap<String, String>,
    /// Grouped view memoized on registry version.
    pub grouped: Option<(u64, Arc<Vec<DateGroup<R>>>)>,
}

impl<R: crate::models::Record> StoreState<R> {
    pub fn new() -> Self {
        Self {
            registry: EntityRegistry::new(),
            selected: None,
            edit_mode: false,
            loading: LoadingState::Idle,
            load_waiters: Vec::new(),
            fetching: HashMap::new(),
            mutations: HashMap::new(),
            delete_targets: HashMap::new(),
            grouped: None,
        }
    }

    pub fn mutation_state(&self, id: &str) -> MutationState {
        self.mutations.get(id).copied().unwrap_or_default()
    }
}

/// Completes every waiter with a copy of `outcome`.
pub(crate) fn resolve<T: Clone>(waiters: Waiters<T>, outcome: &StoreResult<T>) {
    for waiter in waiters {
        // A waiter that gave up is not an error.
        let _ = waiter.send(outcome.clone());
    }
}
