//! Client side of the login boundary.
//!
//! Exchanges an email and password for a user profile carrying a bearer
//! token. The token is what [`crate::HttpRemoteService::with_token`] sends.
//! Credential storage and password checks live on the server.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while logging in.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0} must not be empty")]
    MissingField(&'static str),

    #[error("Invalid email or password")]
    Unauthorized,

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Server returned status {0}")]
    ServerError(u16),
}

/// Login request body.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Both fields are required.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.email.trim().is_empty() {
            return Err(AuthError::MissingField("email"));
        }
        if self.password.is_empty() {
            return Err(AuthError::MissingField("password"));
        }
        Ok(())
    }
}

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub display_name: String,
    pub user_name: String,
    pub token: String,
    #[serde(default)]
    pub image: Option<String>,
}

/// Talks to `{base}/user/login`.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: reqwest::Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Logs in and returns the user with a fresh token.
    pub async fn login(&self, credentials: &Credentials) -> Result<User, AuthError> {
        credentials.validate()?;

        let response = self
            .client
            .post(self.login_url())
            .json(credentials)
            .send()
            .await
            .map_err(|e| AuthError::HttpError(e.to_string()))?;

        match response.status() {
            status if status.is_success() => response
                .json()
                .await
                .map_err(|e| AuthError::HttpError(e.to_string())),
            StatusCode::UNAUTHORIZED => Err(AuthError::Unauthorized),
            status => Err(AuthError::ServerError(status.as_u16())),
        }
    }

    fn login_url(&self) -> String {
        format!("{}/user/login", self.base_url.trim_end_matches('/'))
    }
}

/// Masks a token for display: first and last four characters only.
pub fn mask_token(token: &str) -> String {
    if token.len() > 8 && token.is_ascii() {
        format!("{}...{}", &token[..4], &token[token.len() - 4..])
    } else {
        "****".to_string()
    }
}
