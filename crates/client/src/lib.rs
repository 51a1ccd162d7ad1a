//! Breachsim HTTP client.
//!
//! A native Rust client for driving episodes over the server's REST API.
//!
//! # Quick Start
//!
//! ```no_run
//! use breachsim_client::BreachsimClient;
//! use breachsim_core::DefenderAction;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), breachsim_client::Error> {
//!     let client = BreachsimClient::new("http://localhost:8000");
//!
//!     let first = client.reset().await?;
//!     println!("new emails: {:?}", first.observation.new_emails);
//!
//!     let action = DefenderAction::new("query_logs")
//!         .with_param("sql", "SELECT * FROM alerts");
//!     let outcome = client.step(&action).await?;
//!     println!("reward: {}", outcome.reward);
//!
//!     Ok(())
//! }
//! ```

mod error;

pub use error::Error;

use std::time::Duration;

use reqwest::Client;

use breachsim_core::{DefenderAction, EpisodeStatus, StepOutcome};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for the Breachsim server.
#[derive(Debug, Clone)]
pub struct BreachsimClient {
    client: Client,
    base_url: String,
}

/// Builder for configuring a [`BreachsimClient`].
#[derive(Debug)]
pub struct BreachsimClientBuilder {
    base_url: String,
    timeout: Duration,
    client: Option<Client>,
}

impl BreachsimClientBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            client: None,
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Use a custom reqwest client.
    #[must_use]
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<BreachsimClient, Error> {
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| Error::Configuration(e.to_string()))?,
        };
        Ok(BreachsimClient {
            client,
            base_url: self.base_url,
        })
    }
}

impl BreachsimClient {
    /// Create a client with default configuration.
    ///
    /// # Panics
    ///
    /// Panics if the underlying HTTP client cannot be constructed; use
    /// [`BreachsimClientBuilder`] to handle that case.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        BreachsimClientBuilder::new(base_url)
            .build()
            .unwrap_or_else(|e| panic!("failed to build client: {e}"))
    }

    /// Check server liveness.
    pub async fn health(&self) -> Result<bool, Error> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    /// Begin a fresh episode.
    pub async fn reset(&self) -> Result<StepOutcome, Error> {
        let response = self
            .client
            .post(format!("{}/reset", self.base_url))
            .json(&serde_json::json!({}))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Apply one defender action.
    pub async fn step(&self, action: &DefenderAction) -> Result<StepOutcome, Error> {
        let response = self
            .client
            .post(format!("{}/step", self.base_url))
            .json(action)
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Fetch episode bookkeeping.
    pub async fn state(&self) -> Result<EpisodeStatus, Error> {
        let response = self
            .client
            .get(format!("{}/state", self.base_url))
            .send()
            .await?;
        Self::parse(response).await
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, Error> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Api {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(response.json().await?)
    }
}
