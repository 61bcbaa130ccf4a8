//! HTTPS speech repository

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use narrator_config::OnlineSettings;
use narrator_core::{DecodedPcm, NetworkMonitor, RepositoryError, SpeechRepository};

use crate::cache::PcmCache;
use crate::decode::decode_mp3;
use crate::resample::resample_to;
use crate::token::TokenManager;

/// API code the service uses for an expired or invalid access token.
const CODE_TOKEN_EXPIRED: i32 = -13;

#[derive(Debug, Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
    speaker: &'a str,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    code: i32,
    #[serde(default)]
    message: String,
}

/// [`SpeechRepository`] backed by a remote TTS service with a local cache.
///
/// Lookup order: disk cache, then (network permitting) the service. The MP3
/// payload is decoded to mono PCM, optionally resampled to a fixed rate,
/// and written back to the cache.
pub struct HttpSpeechRepository {
    settings: OnlineSettings,
    client: reqwest::Client,
    cache: PcmCache,
    token: TokenManager,
    monitor: Arc<dyn NetworkMonitor>,
}

impl HttpSpeechRepository {
    pub fn new(
        settings: OnlineSettings,
        monitor: Arc<dyn NetworkMonitor>,
    ) -> Result<Self, RepositoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .build()
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        let cache = PcmCache::new(&settings.cache_dir);
        let token = TokenManager::load(&settings.token_path);
        Ok(Self {
            settings,
            client,
            cache,
            token,
            monitor,
        })
    }

    async fn bearer_token(&self) -> Result<String, RepositoryError> {
        if let Some(token) = self.token.current().await {
            return Ok(token);
        }
        self.token
            .refresh(
                &self.client,
                &self.settings.token_endpoint,
                &self.settings.app_key,
                &self.settings.app_secret,
            )
            .await
    }

    /// One synthesis round-trip. Returns the raw audio payload, or the API
    /// envelope when the service answered with one.
    async fn request_audio(
        &self,
        text: &str,
        speaker: &str,
        token: &str,
    ) -> Result<Result<Vec<u8>, ApiEnvelope>, RepositoryError> {
        let response = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(token)
            .json(&SynthesizeRequest { text, speaker })
            .send()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;

        let status = response.status();
        let is_json = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("json"));

        if is_json {
            let envelope: ApiEnvelope = response
                .json()
                .await
                .map_err(|e| RepositoryError::Transport(e.to_string()))?;
            return Ok(Err(envelope));
        }

        if !status.is_success() {
            return Err(RepositoryError::Api {
                code: status.as_u16() as i32,
                message: "synthesis request failed".into(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RepositoryError::Transport(e.to_string()))?;
        Ok(Ok(bytes.to_vec()))
    }

    async fn synthesize_remote(
        &self,
        text: &str,
        speaker: &str,
    ) -> Result<DecodedPcm, RepositoryError> {
        let mut token = self.bearer_token().await?;
        let mut refreshed = false;

        loop {
            match self.request_audio(text, speaker, &token).await? {
                Ok(audio) => {
                    let pcm = decode_mp3(&audio)?;
                    return match self.settings.output_sample_rate {
                        Some(rate) => resample_to(pcm, rate),
                        None => Ok(pcm),
                    };
                }
                Err(envelope) if envelope.code == CODE_TOKEN_EXPIRED && !refreshed => {
                    tracing::info!("access token expired, refreshing");
                    token = self
                        .token
                        .refresh(
                            &self.client,
                            &self.settings.token_endpoint,
                            &self.settings.app_key,
                            &self.settings.app_secret,
                        )
                        .await?;
                    refreshed = true;
                }
                Err(envelope) => {
                    return Err(RepositoryError::Api {
                        code: envelope.code,
                        message: envelope.message,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl SpeechRepository for HttpSpeechRepository {
    async fn fetch_pcm(
        &self,
        text: &str,
        speaker: &str,
        allow_network: bool,
    ) -> Result<DecodedPcm, RepositoryError> {
        if let Some(pcm) = self.cache.get(speaker, text) {
            return Ok(pcm);
        }

        if !allow_network {
            return Err(RepositoryError::ForbiddenNetwork);
        }
        if !self.monitor.is_good() {
            return Err(RepositoryError::NetworkDown);
        }

        let pcm = self.synthesize_remote(text, speaker).await?;
        self.cache.put(speaker, text, &pcm);
        tracing::debug!(
            speaker,
            text_len = text.len(),
            samples = pcm.samples.len(),
            sample_rate = pcm.sample_rate,
            "online synthesis complete"
        );
        Ok(pcm)
    }
}
