//! Orchestrator construction

use std::sync::Arc;
use tokio::sync::broadcast;

use crate::config::ConfigError;
use crate::engine::LoadEngine;
use crate::token::{HttpTokenClient, TokenClient};

use super::executor::Orchestrator;

/// Capacity of the cancellation broadcast channel
const SHUTDOWN_CHANNEL_CAPACITY: usize = 1;

/// Builder for [`Orchestrator`].
///
/// The load engine is required; the token client defaults to the
/// reqwest-backed implementation.
#[derive(Default)]
pub struct OrchestratorBuilder {
    engine: Option<Arc<dyn LoadEngine>>,
    token_client: Option<Arc<dyn TokenClient>>,
}

impl OrchestratorBuilder {
    /// Creates an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the load engine route jobs delegate to
    pub fn engine(mut self, engine: Arc<dyn LoadEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Sets the HTTP client used for token refresh calls
    pub fn token_client(mut self, client: Arc<dyn TokenClient>) -> Self {
        self.token_client = Some(client);
        self
    }

    /// Builds the orchestrator
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let engine = self
            .engine
            .ok_or_else(|| ConfigError::MissingComponent("load engine".into()))?;

        let token_client: Arc<dyn TokenClient> = match self.token_client {
            Some(client) => client,
            None => Arc::new(
                HttpTokenClient::new(HttpTokenClient::MAX_TIMEOUT).map_err(|err| {
                    ConfigError::InitFailed {
                        component: "token client".into(),
                        reason: err.to_string(),
                    }
                })?,
            ),
        };

        let (shutdown_tx, _) = broadcast::channel(SHUTDOWN_CHANNEL_CAPACITY);

        Ok(Orchestrator {
            engine,
            token_client,
            shutdown_tx,
        })
    }
}
