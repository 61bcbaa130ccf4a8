//! On-disk cache of decoded sentences
//!
//! One WAV file per (speaker, text) pair, keyed by SHA-256. The cache is an
//! optimization only; any read failure is treated as a miss.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use narrator_core::{DecodedPcm, RepositoryError};

#[derive(Debug, Clone)]
pub struct PcmCache {
    dir: PathBuf,
}

impl PcmCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, speaker: &str, text: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(speaker.as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        self.dir.join(format!("{}.wav", hex::encode(hasher.finalize())))
    }

    /// Look up a cached sentence. Corrupt or unreadable entries count as
    /// misses.
    pub fn get(&self, speaker: &str, text: &str) -> Option<DecodedPcm> {
        let path = self.path_for(speaker, text);
        match read_wav(&path) {
            Ok(Some(pcm)) => {
                tracing::debug!(path = %path.display(), "tts cache hit");
                Some(pcm)
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable cache entry");
                None
            }
        }
    }

    /// Store a decoded sentence. Failures are logged and swallowed; the
    /// caller already has the PCM.
    pub fn put(&self, speaker: &str, text: &str, pcm: &DecodedPcm) {
        if pcm.samples.is_empty() {
            return;
        }
        let path = self.path_for(speaker, text);
        if let Err(e) = write_wav(&self.dir, &path, pcm) {
            tracing::warn!(path = %path.display(), error = %e, "cache write failed");
        }
    }
}

fn read_wav(path: &Path) -> Result<Option<DecodedPcm>, RepositoryError> {
    if !path.exists() {
        return Ok(None);
    }
    let mut reader =
        hound::WavReader::open(path).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let spec = reader.spec();
    let samples: Vec<i16> = reader
        .samples::<i16>()
        .collect::<Result<_, _>>()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(Some(DecodedPcm {
        samples,
        sample_rate: spec.sample_rate,
    }))
}

fn write_wav(dir: &Path, path: &Path, pcm: &DecodedPcm) -> Result<(), RepositoryError> {
    std::fs::create_dir_all(dir)?;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: pcm.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    for &s in &pcm.samples {
        writer
            .write_sample(s)
            .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    }
    writer
        .finalize()
        .map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(())
}
