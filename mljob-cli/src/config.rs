//! Configuration module
//!
//! Connection settings shared by every command.

use mljob_client::CoordinatorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the coordinator service
    pub coordinator_url: String,

    /// Bearer token; empty means no `Authorization` header
    pub token: String,
}

impl Config {
    /// Client for the configured coordinator
    pub fn client(&self) -> CoordinatorClient {
        CoordinatorClient::new(&self.coordinator_url).with_token(self.token.clone())
    }
}
