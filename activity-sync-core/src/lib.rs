//! Activity Sync Core Library
//!
//! A client-side store of activities that stays consistent with a remote
//! CRUD API and exposes grouped views and per-record progress state to a UI.

pub mod auth;
pub mod error;
pub mod intent;
pub mod models;
pub mod projection;
pub mod registry;
pub mod remote;
pub mod store;

pub use auth::{AuthClient, AuthError, Credentials, User};
pub use error::{ConflictKind, StoreError, StoreResult};
pub use intent::{Intent, IntentChannel, Navigator, Notifier, TracingIntents};
pub use models::{parse_date, Activity, Record};
pub use projection::{group_by_date, sort_by_date, DateGroup};
pub use registry::EntityRegistry;
pub use remote::{HttpRemoteService, MockCall, MockRemoteService, RemoteError, RemoteService};
pub use store::{LoadingState, MutationState, StoreConfig, StoreSnapshot, SyncStore};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
