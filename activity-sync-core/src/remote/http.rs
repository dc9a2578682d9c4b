//! HTTP remote service for the activities JSON API.

use std::marker::PhantomData;

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{RemoteError, RemoteService};
use crate::models::{Activity, Record};

/// Remote service backed by a REST resource collection.
#[derive(Debug, Clone)]
pub struct HttpRemoteService<R = Activity> {
    client: reqwest::Client,
    base_url: String,
    resource: String,
    token: Option<String>,
    _record: PhantomData<fn() -> R>,
}

impl<R> HttpRemoteService<R> {
    /// Creates a service for `{base_url}/activities`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::for_resource(base_url, "activities")
    }

    /// Creates a service for an arbitrary resource collection.
    pub fn for_resource(base_url: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            resource: resource.into(),
            token: None,
            _record: PhantomData,
        }
    }

    /// Sends `Authorization: Bearer <token>` with every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Builds the collection URL, or the item URL when `id` is given.
    fn build_url(&self, id: Option<&str>) -> String {
        let base_url = if !self.base_url.starts_with("http://")
            && !self.base_url.starts_with("https://")
        {
            format!("http://{}", self.base_url)
        } else {
            self.base_url.clone()
        };

        let collection = format!("{}/{}", base_url.trim_end_matches('/'), self.resource);
        match id {
            Some(id) => format!("{}/{}", collection, id),
            None => collection,
        }
    }

    async fn send(&self, request: RequestBuilder, id: Option<&str>) -> Result<Response, RemoteError> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        match status {
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(
                id.unwrap_or(self.resource.as_str()).to_string(),
            )),
            StatusCode::UNAUTHORIZED => Err(RemoteError::Unauthorized),
            _ => {
                let message = response.text().await.unwrap_or_default();
                Err(RemoteError::Status {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }
}

#[async_trait]
impl<R> RemoteService for HttpRemoteService<R>
where
    R: Record + Serialize + DeserializeOwned,
{
    type Record = R;

    async fn list(&self) -> Result<Vec<R>, RemoteError> {
        let request = self.client.get(self.build_url(None));
        let response = self.send(request, None).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn get(&self, id: &str) -> Result<R, RemoteError> {
        let request = self.client.get(self.build_url(Some(id)));
        let response = self.send(request, Some(id)).await?;
        response
            .json()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    async fn create(&self, record: &R) -> Result<(), RemoteError> {
        let request = self.client.post(self.build_url(None)).json(record);
        self.send(request, None).await?;
        Ok(())
    }

    async fn update(&self, record: &R) -> Result<(), RemoteError> {
        let request = self
            .client
            .put(self.build_url(Some(record.id())))
            .json(record);
        self.send(request, Some(record.id())).await?;
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let request = self.client.delete(self.build_url(Some(id)));
        self.send(request, Some(id)).await?;
        Ok(())
    }
}
