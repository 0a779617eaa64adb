//! Auth-token refresh: a background task polling a credential endpoint
//!
//! The refresher owns its own lifecycle: `start` spawns the refresh loop
//! (an immediate attempt, then one per configured interval) and `stop`
//! cancels it without waiting on network I/O. Route execution only reads
//! the latest token through a snapshot accessor; a stale token is kept
//! when a refresh fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::TokenPolicy;

/// Non-fatal token refresh failures, recorded in [`TokenState`]
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenRefreshError {
    /// The refresh endpoint denied access
    #[error("token refresh forbidden (HTTP 403)")]
    Forbidden,

    /// The refresh endpoint returned a non-200 status
    #[error("token endpoint returned HTTP {0}")]
    Status(u16),

    /// The refresh request itself failed
    #[error("token request failed: {0}")]
    Transport(String),
}

/// Raw response from the token endpoint
#[derive(Debug, Clone)]
pub struct TokenResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body, the token itself on a 200
    pub body: String,
}

/// GET primitive used for token refresh calls
#[async_trait]
pub trait TokenClient: Send + Sync {
    /// Fetches the refresh endpoint once
    async fn get(&self, url: &str) -> Result<TokenResponse, TokenRefreshError>;
}

/// reqwest-backed [`TokenClient`]
#[derive(Debug, Clone)]
pub struct HttpTokenClient {
    client: reqwest::Client,
}

impl HttpTokenClient {
    /// Upper bound on the per-request timeout
    pub const MAX_TIMEOUT: Duration = Duration::from_secs(10);

    /// Builds a client with the given per-request timeout
    pub fn new(timeout: Duration) -> Result<Self, TokenRefreshError> {
        let client = reqwest::Client::builder()
            .timeout(timeout.min(Self::MAX_TIMEOUT))
            .build()
            .map_err(|err| TokenRefreshError::Transport(err.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl TokenClient for HttpTokenClient {
    async fn get(&self, url: &str) -> Result<TokenResponse, TokenRefreshError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| TokenRefreshError::Transport(err.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| TokenRefreshError::Transport(err.to_string()))?;
        Ok(TokenResponse { status, body })
    }
}

/// Latest known refresh state
#[derive(Debug, Clone, Default)]
pub struct TokenState {
    /// Most recently fetched token, kept across failed refreshes
    pub current_token: Option<String>,
    /// When the last successful refresh happened
    pub last_refresh_at: Option<DateTime<Utc>>,
    /// Error recorded by the most recent failed refresh
    pub last_error: Option<TokenRefreshError>,
}

/// Background task keeping [`TokenState`] fresh
pub struct TokenRefresher {
    policy: Option<TokenPolicy>,
    refresh_url: String,
    client: Arc<dyn TokenClient>,
    state: Arc<RwLock<TokenState>>,
    shutdown_tx: Option<broadcast::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TokenRefresher {
    /// Builds a refresher for the given policy; `None` or a disabled
    /// policy makes `start` a no-op
    pub fn new(
        policy: Option<TokenPolicy>,
        api_base_url: &str,
        client: Arc<dyn TokenClient>,
    ) -> Self {
        let refresh_url = policy
            .as_ref()
            .map(|policy| format!("{}{}", api_base_url, policy.refresh_path))
            .unwrap_or_default();
        Self {
            policy,
            refresh_url,
            client,
            state: Arc::new(RwLock::new(TokenState::default())),
            shutdown_tx: None,
            handle: None,
        }
    }

    fn enabled(&self) -> bool {
        self.policy
            .as_ref()
            .map(|policy| policy.enabled)
            .unwrap_or(false)
    }

    /// Spawns the refresh loop. Returns immediately; refresh failures are
    /// recorded, never raised. Calling `start` on a running refresher is a
    /// no-op.
    pub fn start(&mut self) {
        if !self.enabled() || self.handle.is_some() {
            return;
        }
        let interval_ms = match &self.policy {
            Some(policy) => policy.refresh_interval_ms,
            None => return,
        };

        let url = self.refresh_url.clone();
        let client = Arc::clone(&self.client);
        let state = Arc::clone(&self.state);
        let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        let handle = tokio::spawn(async move {
            // The first tick fires immediately.
            let mut ticker = interval(Duration::from_millis(interval_ms));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => break,
                    _ = ticker.tick() => refresh_once(client.as_ref(), &url, &state).await,
                }
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        tracing::debug!(interval_ms, url = %self.refresh_url, "token refresher started");
    }

    /// Cancels the refresh schedule. Idempotent, safe before `start`, and
    /// never blocks on an in-flight refresh.
    pub fn stop(&mut self) {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("token refresher stopped");
        }
    }

    /// Latest token, if any refresh has succeeded
    pub fn token(&self) -> Option<String> {
        self.state.read().current_token.clone()
    }

    /// Snapshot of the full refresh state
    pub fn state(&self) -> TokenState {
        self.state.read().clone()
    }
}

impl Drop for TokenRefresher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn refresh_once(client: &dyn TokenClient, url: &str, state: &RwLock<TokenState>) {
    match client.get(url).await {
        Ok(response) if response.status == 200 => {
            {
                let mut guard = state.write();
                guard.current_token = Some(response.body);
                guard.last_refresh_at = Some(Utc::now());
                guard.last_error = None;
            }
            tracing::debug!("token refreshed");
        }
        Ok(response) if response.status == 403 => {
            record_failure(state, TokenRefreshError::Forbidden);
        }
        Ok(response) => {
            record_failure(state, TokenRefreshError::Status(response.status));
        }
        Err(err) => {
            record_failure(state, err);
        }
    }
}

fn record_failure(state: &RwLock<TokenState>, err: TokenRefreshError) {
    tracing::warn!(error = %err, "token refresh failed");
    state.write().last_error = Some(err);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct ScriptedTokenClient {
        script: Vec<Result<TokenResponse, TokenRefreshError>>,
        calls: AtomicUsize,
    }

    impl ScriptedTokenClient {
        fn new(script: Vec<Result<TokenResponse, TokenRefreshError>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenClient for ScriptedTokenClient {
        async fn get(&self, _url: &str) -> Result<TokenResponse, TokenRefreshError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = call.min(self.script.len() - 1);
            self.script[idx].clone()
        }
    }

    fn ok(status: u16, body: &str) -> Result<TokenResponse, TokenRefreshError> {
        Ok(TokenResponse {
            status,
            body: body.to_string(),
        })
    }

    fn policy(interval_ms: u64) -> Option<TokenPolicy> {
        Some(TokenPolicy {
            enabled: true,
            refresh_path: "/auth/token".to_string(),
            refresh_interval_ms: interval_ms,
        })
    }

    #[tokio::test]
    async fn test_disabled_policy_never_calls_client() {
        let client = ScriptedTokenClient::new(vec![ok(200, "tok")]);
        let mut refresher = TokenRefresher::new(
            Some(TokenPolicy {
                enabled: false,
                refresh_path: "/auth/token".to_string(),
                refresh_interval_ms: 10,
            }),
            "http://localhost",
            client.clone(),
        );
        refresher.start();
        sleep(Duration::from_millis(80)).await;

        assert_eq!(client.calls(), 0);
        assert!(refresher.token().is_none());
        refresher.stop();
    }

    #[tokio::test]
    async fn test_first_refresh_is_immediate() {
        let client = ScriptedTokenClient::new(vec![ok(200, "tok-1")]);
        let mut refresher = TokenRefresher::new(policy(60_000), "http://localhost", client.clone());
        refresher.start();
        sleep(Duration::from_millis(100)).await;

        assert_eq!(refresher.token().as_deref(), Some("tok-1"));
        assert_eq!(client.calls(), 1);
        let state = refresher.state();
        assert!(state.last_refresh_at.is_some());
        assert!(state.last_error.is_none());
        refresher.stop();
    }

    #[tokio::test]
    async fn test_forbidden_then_success() {
        let client = ScriptedTokenClient::new(vec![ok(403, "denied"), ok(200, "fresh")]);
        let mut refresher = TokenRefresher::new(policy(100), "http://localhost", client.clone());
        refresher.start();

        sleep(Duration::from_millis(50)).await;
        assert!(refresher.token().is_none());
        assert_eq!(
            refresher.state().last_error,
            Some(TokenRefreshError::Forbidden)
        );

        sleep(Duration::from_millis(200)).await;
        assert_eq!(refresher.token().as_deref(), Some("fresh"));
        assert!(refresher.state().last_error.is_none());
        refresher.stop();
    }

    #[tokio::test]
    async fn test_stale_token_kept_on_failure() {
        let client = ScriptedTokenClient::new(vec![ok(200, "first"), ok(500, "oops")]);
        let mut refresher = TokenRefresher::new(policy(50), "http://localhost", client.clone());
        refresher.start();

        sleep(Duration::from_millis(30)).await;
        assert_eq!(refresher.token().as_deref(), Some("first"));

        sleep(Duration::from_millis(150)).await;
        assert_eq!(refresher.token().as_deref(), Some("first"));
        assert_eq!(
            refresher.state().last_error,
            Some(TokenRefreshError::Status(500))
        );
        refresher.stop();
    }

    #[tokio::test]
    async fn test_transport_error_recorded() {
        let client =
            ScriptedTokenClient::new(vec![Err(TokenRefreshError::Transport("refused".into()))]);
        let mut refresher = TokenRefresher::new(policy(60_000), "http://localhost", client.clone());
        refresher.start();
        sleep(Duration::from_millis(80)).await;

        assert!(refresher.token().is_none());
        assert!(matches!(
            refresher.state().last_error,
            Some(TokenRefreshError::Transport(_))
        ));
        refresher.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let client = ScriptedTokenClient::new(vec![ok(200, "tok")]);
        let mut refresher = TokenRefresher::new(policy(20), "http://localhost", client.clone());

        refresher.stop();
        refresher.start();
        sleep(Duration::from_millis(60)).await;
        refresher.stop();
        refresher.stop();

        let calls_after_stop = client.calls();
        sleep(Duration::from_millis(100)).await;
        assert!(client.calls() <= calls_after_stop + 1);
    }

    #[tokio::test]
    async fn test_http_token_client_returns_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(200).set_body_string("the-token"))
            .mount(&server)
            .await;

        let client = HttpTokenClient::new(Duration::from_secs(2)).unwrap();
        let response = client
            .get(&format!("{}/auth/token", server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "the-token");
    }

    #[tokio::test]
    async fn test_http_token_client_passes_403_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/auth/token"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let client = HttpTokenClient::new(Duration::from_secs(2)).unwrap();
        let response = client
            .get(&format!("{}/auth/token", server.uri()))
            .await
            .unwrap();
        assert_eq!(response.status, 403);
    }
}
