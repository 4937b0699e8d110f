//! Montage HTTP Client
//!
//! A simple, type-safe HTTP client for the Montage orchestrator API.
//!
//! # Example
//!
//! ```no_run
//! use montage_client::OrchestratorClient;
//! use montage_core::dto::event::TriggerEvent;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), montage_client::ClientError> {
//!     let client = OrchestratorClient::new("http://localhost:8080");
//!
//!     let receipt = client
//!         .send_event(&TriggerEvent::VideoCreate {
//!             video_id: "v1".to_string(),
//!         })
//!         .await?;
//!
//!     println!("{:?}", receipt);
//!     Ok(())
//! }
//! ```

pub mod error;
mod events;
mod instances;

// Re-export commonly used types
pub use error::{ClientError, Result};

use reqwest::Client;
use serde::de::DeserializeOwned;

/// HTTP client for the Montage orchestrator API
///
/// Methods are organized into two groups:
/// - Event intake (start and cancel pipelines)
/// - Instance inspection (list, get, ledger)
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }
}
