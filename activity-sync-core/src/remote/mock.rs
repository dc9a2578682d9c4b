//! In-memory remote service for testing.
//!
//! Keeps records in a map, captures every call, can be told to fail the next
//! call, and can hold calls in flight until released.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;

use super::{RemoteError, RemoteService};
use crate::models::{Activity, Record};

/// A call received by [`MockRemoteService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    List,
    Get(String),
    Create(String),
    Update(String),
    Delete(String),
}

/// Mock remote service.
///
/// Clones share state, so a test can keep one handle while the store owns
/// another.
#[derive(Debug)]
pub struct MockRemoteService<R = Activity> {
    inner: Arc<Mutex<MockInner<R>>>,
    gate: Arc<watch::Sender<bool>>,
}

#[derive(Debug)]
struct MockInner<R> {
    records: HashMap<String, R>,
    calls: Vec<MockCall>,
    held: Vec<MockCall>,
    fail_next: Option<RemoteError>,
}

impl<R: Record> Default for MockRemoteService<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Clone for MockRemoteService<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            gate: Arc::clone(&self.gate),
        }
    }
}

impl<R: Record> MockRemoteService<R> {
    /// Creates an empty mock with the gate open.
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            inner: Arc::new(Mutex::new(MockInner {
                records: HashMap::new(),
                calls: Vec::new(),
                held: Vec::new(),
                fail_next: None,
            })),
            gate: Arc::new(gate),
        }
    }

    /// Creates a mock pre-populated with server-side records.
    pub fn with_records(records: impl IntoIterator<Item = R>) -> Self {
        let mock = Self::new();
        for record in records {
            mock.insert(record);
        }
        mock
    }

    /// Puts a record on the "server" without recording a call.
    pub fn insert(&self, record: R) {
        let id = record.id().to_string();
        self.insert_at(&id, record);
    }

    /// Stores a record under `key` even when its own id differs, so `get`
    /// can answer with the wrong record.
    pub fn insert_at(&self, key: &str, record: R) {
        self.lock().records.insert(key.to_string(), record);
    }

    /// Server-side copy of a record.
    pub fn record(&self, id: &str) -> Option<R> {
        self.lock().records.get(id).cloned()
    }

    /// Every call received so far, in arrival order.
    pub fn calls(&self) -> Vec<MockCall> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().calls.len()
    }

    /// Cause the next call to resolve with `error`.
    pub fn fail_next(&self, error: RemoteError) {
        self.lock().fail_next = Some(error);
    }

    /// Hold every subsequent call in flight until [`resume`](Self::resume).
    ///
    /// Calls are still recorded on arrival, so tests can observe that a call
    /// was issued while it is suspended.
    pub fn pause(&self) {
        self.gate.send_replace(false);
    }

    /// Release held calls and stop holding new ones.
    pub fn resume(&self) {
        self.gate.send_replace(true);
    }

    /// Hold calls equal to `call` in flight until [`release`](Self::release),
    /// independently of [`pause`](Self::pause).
    pub fn hold(&self, call: MockCall) {
        self.lock().held.push(call);
    }

    pub fn release(&self, call: &MockCall) {
        self.lock().held.retain(|held| held != call);
        self.gate.send_modify(|_| {});
    }

    fn is_held(&self, call: &MockCall) -> bool {
        self.lock().held.contains(call)
    }

    fn lock(&self) -> MutexGuard<'_, MockInner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records the call, waits for the gate and any hold on it, then takes
    /// any injected failure.
    async fn enter(&self, call: MockCall) -> Result<(), RemoteError> {
        self.lock().calls.push(call.clone());

        let mut gate = self.gate.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = gate.wait_for(|open| *open && !self.is_held(&call)).await;

        match self.lock().fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<R: Record> RemoteService for MockRemoteService<R> {
    type Record = R;

    async fn list(&self) -> Result<Vec<R>, RemoteError> {
        self.enter(MockCall::List).await?;
        Ok(self.lock().records.values().cloned().collect())
    }

    async fn get(&self, id: &str) -> Result<R, RemoteError> {
        self.enter(MockCall::Get(id.to_string())).await?;
        self.lock()
            .records
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn create(&self, record: &R) -> Result<(), RemoteError> {
        self.enter(MockCall::Create(record.id().to_string())).await?;
        self.insert(record.clone());
        Ok(())
    }

    async fn update(&self, record: &R) -> Result<(), RemoteError> {
        self.enter(MockCall::Update(record.id().to_string())).await?;
        let mut inner = self.lock();
        match inner.records.get_mut(record.id()) {
            Some(existing) => {
                *existing = record.clone();
                Ok(())
            }
            None => Err(RemoteError::NotFound(record.id().to_string())),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        self.enter(MockCall::Delete(id.to_string())).await?;
        match self.lock().records.remove(id) {
            Some(_) => Ok(()),
            None => Err(RemoteError::NotFound(id.to_string())),
        }
    }
}
