//! Access-token persistence and refresh

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use narrator_core::RepositoryError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct TokenState {
    token: String,
    refreshed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    app_key: &'a str,
    app_secret: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    token: String,
}

/// Holds the service access token, persisting it across restarts.
///
/// The token value is opaque to the rest of the system; the repository asks
/// for it per request and triggers a refresh when the API rejects it.
pub struct TokenManager {
    path: PathBuf,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Load persisted state from `path`; a missing or corrupt file means
    /// starting without a token.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let state = read_state(&path).unwrap_or_default();
        Self {
            path,
            state: Mutex::new(state),
        }
    }

    /// Current token, if any.
    pub async fn current(&self) -> Option<String> {
        let state = self.state.lock().await;
        if state.token.is_empty() {
            None
        } else {
            Some(state.token.clone())
        }
    }

    /// Fetch a new token from the service and persist it.
    pub async fn refresh(
        &self,
        client: &reqwest::Client,
        token_endpoint: &str,
        app_key: &str,
        app_secret: &str,
    ) -> Result<String, RepositoryError> {
        let response = client
            .post(token_endpoint)
            .json(&RefreshRequest {
                app_key,
                app_secret,
            })
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(RepositoryError::Api {
                code: response.status().as_u16() as i32,
                message: "token refresh rejected".into(),
            });
        }

        let parsed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        let mut state = self.state.lock().await;
        state.token = parsed.token.clone();
        state.refreshed_at = Some(Utc::now());
        if let Err(e) = write_state(&self.path, &state) {
            tracing::warn!(path = %self.path.display(), error = %e, "token persist failed");
        }
        tracing::info!("access token refreshed");
        Ok(parsed.token)
    }
}

fn read_state(path: &Path) -> Option<TokenState> {
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

fn write_state(path: &Path, state: &TokenState) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec_pretty(state)?;
    std::fs::write(path, bytes)
}
