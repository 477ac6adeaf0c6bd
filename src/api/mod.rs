use crate::internal::models::{Item, Node};
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use strum_macros::Display;
use thiserror::Error;

pub const HN_API_BASE_URL: &str = "https://hacker-news.firebaseio.com/v0/";

/// Per-call timeout used when none is configured.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Whether retrying a failed fetch could plausibly succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum FetchErrorKind {
    Transient,
    Permanent,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} failure fetching item {id}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub id: u32,
    pub message: String,
}

impl FetchError {
    pub fn transient(id: u32, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            id,
            message: message.into(),
        }
    }

    pub fn permanent(id: u32, message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            id,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// Source of tree nodes. One call is one remote request; no retries happen here.
pub trait NodeFetcher: Send + Sync + 'static {
    fn fetch(&self, id: u32) -> impl Future<Output = Result<Node, FetchError>> + Send;
}

/// HTTP client for the Hacker News item endpoint.
#[derive(Clone)]
pub struct ApiService {
    client: Client,
    base_url: String,
}

impl ApiService {
    /// Create a service against the public API with the default per-call timeout.
    pub fn new() -> Self {
        Self::with_base_url(HN_API_BASE_URL)
    }

    /// Point the service at another server (a mirror, or a mock in tests).
    /// A trailing slash is added when missing.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self {
            client: build_client(DEFAULT_FETCH_TIMEOUT),
            base_url,
        }
    }

    /// Replace the per-call timeout. Exceeding it surfaces as a transient error.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn item_url(&self, id: u32) -> String {
        format!("{}item/{}.json", self.base_url, id)
    }

    async fn get_item(&self, id: u32) -> Result<Item, FetchError> {
        let url = self.item_url(id);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| classify_request_error(id, &e))?;

        let status = resp.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::transient(id, format!("HTTP {} from {}", status, url)));
        }
        if !status.is_success() {
            return Err(FetchError::permanent(id, format!("HTTP {} from {}", status, url)));
        }

        // Upstream answers `null` for ids it does not know.
        let item = resp
            .json::<Option<Item>>()
            .await
            .map_err(|e| classify_request_error(id, &e))?;
        item.ok_or_else(|| FetchError::permanent(id, "item not found"))
    }
}

impl Default for ApiService {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeFetcher for ApiService {
    async fn fetch(&self, id: u32) -> Result<Node, FetchError> {
        let item = self.get_item(id).await?;
        tracing::debug!(id, "fetched item");
        Ok(Node::from_item(id, item))
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!("Failed to build HTTP client with timeout, using defaults: {}", e);
            Client::new()
        })
}

fn classify_request_error(id: u32, err: &reqwest::Error) -> FetchError {
    if err.is_decode() {
        FetchError::permanent(id, format!("failed to parse JSON: {}", err))
    } else if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        FetchError::transient(id, err.to_string())
    } else {
        FetchError::permanent(id, err.to_string())
    }
}
