//! mljob HTTP Client
//!
//! A type-safe HTTP client for the mljob coordinator API.
//!
//! The worker agent and the operator CLI both talk to the coordinator
//! through this crate, so the wire contract lives in one place.
//!
//! # Example
//!
//! ```no_run
//! use mljob_client::CoordinatorClient;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CoordinatorClient::new("http://localhost:8080")
//!         .with_token("changeme-worker-token");
//!
//!     for job in client.list_pending_jobs().await? {
//!         println!("{} {}", job.id, job.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
mod jobs;
mod workers;

// Re-export commonly used types
pub use error::{ClientError, Result};
pub use jobs::JobSubmission;

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// Timeout for plain reads
pub const GET_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for JSON writes
pub const POST_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for bundle downloads
pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);
/// Timeout for multipart uploads
pub const UPLOAD_TIMEOUT: Duration = Duration::from_secs(120);

/// HTTP client for the mljob coordinator API
///
/// Endpoints are organized into logical groups:
/// - Worker registration
/// - Job acceptance, status updates and log appends (worker side)
/// - Bundle download and artifact upload
/// - Job submission, listing and cancellation (operator side)
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    /// Base URL of the coordinator (e.g., "http://localhost:8080")
    base_url: String,
    /// Shared bearer token sent on every request
    token: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl CoordinatorClient {
    /// Create a new coordinator client
    ///
    /// # Example
    /// ```
    /// use mljob_client::CoordinatorClient;
    ///
    /// let client = CoordinatorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new coordinator client with a custom HTTP client
    ///
    /// This allows you to configure proxies, TLS settings, etc. Per-call
    /// timeouts are still applied on top.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
            client,
        }
    }

    /// Attach the shared bearer token
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Get the base URL of the coordinator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    /// Start a request with auth and timeout applied
    fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let builder = self
            .client
            .request(method, self.url(path))
            .timeout(timeout);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Fail with [`ClientError::ApiError`] unless the status is a success
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!(
                status = status.as_u16(),
                "Coordinator returned an error: {}",
                error_text
            );
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        Self::check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response whose body is not needed
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::check_status(response).await.map(|_| ())
    }
}
