//! Remote CRUD service abstraction.
//!
//! The store never talks to the network directly; it drives a
//! [`RemoteService`] implementation:
//! - [`HttpRemoteService`] speaks JSON over HTTP to the activities API
//! - [`MockRemoteService`] keeps records in memory for tests and demos
//!
//! # Endpoints
//!
//! | Operation | Request                       |
//! |-----------|-------------------------------|
//! | `list`    | `GET    {base}/activities`      |
//! | `get`     | `GET    {base}/activities/{id}` |
//! | `create`  | `POST   {base}/activities`      |
//! | `update`  | `PUT    {base}/activities/{id}` |
//! | `delete`  | `DELETE {base}/activities/{id}` |

mod http;
mod mock;

pub use http::HttpRemoteService;
pub use mock::{MockCall, MockRemoteService};

use async_trait::async_trait;
use thiserror::Error;

use crate::models::Record;

/// Failures reported by a remote service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// The server has no record with this id.
    #[error("not found: {0}")]
    NotFound(String),

    /// The bearer token was missing or rejected.
    #[error("unauthorized")]
    Unauthorized,

    /// Any other non-success response.
    #[error("server returned status {status}: {message}")]
    Status { status: u16, message: String },

    /// The request never produced a response.
    #[error("network error: {0}")]
    Network(String),

    /// The response body could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// The call did not resolve within the configured timeout.
    #[error("request timed out")]
    Timeout,
}

/// CRUD capability consumed by the store.
#[async_trait]
pub trait RemoteService: Send + Sync {
    type Record: Record;

    async fn list(&self) -> Result<Vec<Self::Record>, RemoteError>;

    async fn get(&self, id: &str) -> Result<Self::Record, RemoteError>;

    async fn create(&self, record: &Self::Record) -> Result<(), RemoteError>;

    async fn update(&self, record: &Self::Record) -> Result<(), RemoteError>;

    async fn delete(&self, id: &str) -> Result<(), RemoteError>;
}
