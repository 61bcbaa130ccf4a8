//! Online speech repository port

use async_trait::async_trait;
use thiserror::Error;

/// Decoded PCM returned by the repository, mono 16-bit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPcm {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl DecodedPcm {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Failure kinds a repository call can produce.
///
/// The synthesis loop treats all of these as "online unavailable" and either
/// falls back to the offline engine or surfaces the failure, depending on
/// the strategy. The distinct kinds exist for logging and for the cooldown
/// controller.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The caller forbade network use and the cache had no entry.
    #[error("network use forbidden and no cached audio")]
    ForbiddenNetwork,

    /// The network monitor reports the network as unusable.
    #[error("network is down")]
    NetworkDown,

    /// The remote API answered with an error payload.
    #[error("api error {code}: {message}")]
    Api { code: i32, message: String },

    /// The audio payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// Local IO (cache, token store) failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The HTTP transport failed before an API answer arrived.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote TTS service with a local cache.
#[async_trait]
pub trait SpeechRepository: Send + Sync {
    /// Fetch decoded PCM for `text` spoken by `speaker`.
    ///
    /// When `allow_network` is false only the cache may be consulted; a miss
    /// fails with [`RepositoryError::ForbiddenNetwork`]. Token refresh is
    /// transparent to the caller.
    async fn fetch_pcm(
        &self,
        text: &str,
        speaker: &str,
        allow_network: bool,
    ) -> Result<DecodedPcm, RepositoryError>;
}
