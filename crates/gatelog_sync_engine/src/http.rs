//! HTTP gateway implementation.
//!
//! The actual HTTP client is abstracted via a trait so the engine does not
//! depend on a particular HTTP library.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::SyncGateway;
use async_trait::async_trait;
use gatelog_sync_protocol::{
    PullRequest, PullResponse, PushRequest, PushResponse, WireMessage, PULL_PATH, PUSH_PATH,
};
use parking_lot::RwLock;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

/// HTTP method used by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// GET.
    Get,
    /// POST.
    Post,
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpMethod::Get => f.write_str("GET"),
            HttpMethod::Post => f.write_str("POST"),
        }
    }
}

/// An outgoing HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method.
    pub method: HttpMethod,
    /// Absolute URL including query string.
    pub url: String,
    /// Bearer token, if one is set.
    pub bearer: Option<String>,
    /// JSON body. Empty for GET.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Returns the path and query part of the URL.
    pub fn path(&self) -> &str {
        self.url
            .find("/sync/")
            .map(|i| &self.url[i..])
            .unwrap_or(&self.url)
    }
}

/// A received HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a 200 response.
    pub fn ok(body: Vec<u8>) -> Self {
        Self { status: 200, body }
    }

    /// Creates a response with the given status and a plain-text body.
    pub fn status(status: u16, text: impl Into<String>) -> Self {
        Self {
            status,
            body: text.into().into_bytes(),
        }
    }

    fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP client abstraction.
///
/// Implement this trait to provide the actual HTTP transport
/// (reqwest, hyper, a platform client, or an in-process loopback).
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a request. `Err` means no response was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String>;

    /// Checks if the client is connected/healthy.
    fn is_healthy(&self) -> bool {
        true
    }
}

/// HTTP-based sync gateway.
///
/// Uses JSON bodies and bearer authentication:
/// `POST {base}/sync/push` and `GET {base}/sync/pull?since=...`.
pub struct HttpGateway<C: HttpClient> {
    base_url: String,
    client: C,
    token: RwLock<Option<String>>,
    timeout: Duration,
    last_error: RwLock<Option<String>>,
}

impl<C: HttpClient> HttpGateway<C> {
    /// Creates a new HTTP gateway with the default request timeout.
    pub fn new(base_url: impl Into<String>, client: C) -> Self {
        Self::with_config(base_url, client, &SyncConfig::default())
    }

    /// Creates a gateway that applies `config.request_timeout` to every call.
    pub fn with_config(base_url: impl Into<String>, client: C, config: &SyncConfig) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            token: RwLock::new(None),
            timeout: config.request_timeout,
            last_error: RwLock::new(None),
        }
    }

    /// Sets the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Returns the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sets the bearer token sent with every request.
    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Removes the bearer token.
    pub fn clear_token(&self) {
        *self.token.write() = None;
    }

    /// Returns true if a bearer token is set.
    pub fn has_token(&self) -> bool {
        self.token.read().is_some()
    }

    /// Returns the last error message.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    fn set_error(&self, err: &str) {
        *self.last_error.write() = Some(err.to_string());
    }

    fn clear_error(&self) {
        *self.last_error.write() = None;
    }

    async fn exchange<Res: WireMessage>(
        &self,
        method: HttpMethod,
        path_and_query: &str,
        body: Vec<u8>,
    ) -> SyncResult<Res> {
        let request = HttpRequest {
            method,
            url: format!("{}{}", self.base_url, path_and_query),
            bearer: self.token.read().clone(),
            body,
        };
        debug!(%method, url = %request.url, "sending sync request");

        let response = match tokio::time::timeout(self.timeout, self.client.send(request)).await
        {
            Err(_) => {
                self.set_error("request timed out");
                return Err(SyncError::Timeout);
            }
            Ok(Err(e)) => {
                warn!(error = %e, "sync request failed");
                self.set_error(&e);
                return Err(SyncError::transport_retryable(e));
            }
            Ok(Ok(response)) => response,
        };

        if !response.is_success() {
            let text = response.text();
            self.set_error(&text);
            return Err(match response.status {
                401 | 403 => SyncError::AuthenticationFailed(text),
                status => SyncError::ServerError(format!("HTTP {status}: {text}")),
            });
        }

        self.clear_error();
        Ok(Res::decode(&response.body)?)
    }
}

#[async_trait]
impl<C: HttpClient> SyncGateway for HttpGateway<C> {
    async fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        let body = request.encode()?;
        self.exchange(HttpMethod::Post, PUSH_PATH, body).await
    }

    async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let path = format!("{}{}", PULL_PATH, request.to_query());
        self.exchange(HttpMethod::Get, &path, Vec::new()).await
    }

    fn is_connected(&self) -> bool {
        self.client.is_healthy()
    }
}

/// Trait for servers that can handle loopback requests.
pub trait LoopbackServer: Send + Sync {
    /// Handles a request and returns the response.
    fn handle(&self, request: &HttpRequest) -> HttpResponse;
}

impl<T: LoopbackServer + ?Sized> LoopbackServer for std::sync::Arc<T> {
    fn handle(&self, request: &HttpRequest) -> HttpResponse {
        (**self).handle(request)
    }
}

/// A loopback HTTP client that routes requests directly to an in-process server.
///
/// Useful for testing without actual network overhead.
pub struct LoopbackClient<S: LoopbackServer> {
    server: S,
}

impl<S: LoopbackServer> LoopbackClient<S> {
    /// Creates a new loopback client connected to the given server.
    pub fn new(server: S) -> Self {
        Self { server }
    }

    /// Returns the server.
    pub fn server(&self) -> &S {
        &self.server
    }
}

#[async_trait]
impl<S: LoopbackServer> HttpClient for LoopbackClient<S> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, String> {
        Ok(self.server.handle(&request))
    }
}
