//! Fixed-ratio sample-rate conversion for repository output

use rubato::{FftFixedIn, Resampler};

use narrator_core::{DecodedPcm, RepositoryError};

/// Convert `pcm` to `target_rate`, preserving content.
///
/// FFT resampling for anything long enough to window; linear interpolation
/// for very short runs where the FFT setup dominates.
pub(crate) fn resample_to(pcm: DecodedPcm, target_rate: u32) -> Result<DecodedPcm, RepositoryError> {
    if pcm.sample_rate == target_rate || pcm.samples.is_empty() {
        return Ok(DecodedPcm {
            samples: pcm.samples,
            sample_rate: target_rate,
        });
    }

    if pcm.samples.len() < 256 {
        return Ok(DecodedPcm {
            samples: resample_linear(&pcm.samples, pcm.sample_rate, target_rate),
            sample_rate: target_rate,
        });
    }

    let chunk = 1024usize;
    let mut resampler =
        FftFixedIn::<f64>::new(pcm.sample_rate as usize, target_rate as usize, chunk, 2, 1)
            .map_err(|e| RepositoryError::Decode(format!("resampler init failed: {e}")))?;

    let expected = (pcm.samples.len() as f64 * target_rate as f64 / pcm.sample_rate as f64) as usize;
    let mut output: Vec<i16> = Vec::with_capacity(expected + chunk);

    let mut input: Vec<f64> = pcm.samples.iter().map(|&s| f64::from(s)).collect();
    // Zero-pad to a whole number of chunks; the trim below removes the pad's
    // contribution.
    let rem = input.len() % chunk;
    if rem != 0 {
        input.resize(input.len() + chunk - rem, 0.0);
    }

    for frame in input.chunks(chunk) {
        let processed = resampler
            .process(&[frame.to_vec()], None)
            .map_err(|e| RepositoryError::Decode(format!("resample failed: {e}")))?;
        output.extend(
            processed[0]
                .iter()
                .map(|&s| s.clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16),
        );
    }

    output.truncate(expected);
    Ok(DecodedPcm {
        samples: output,
        sample_rate: target_rate,
    })
}

fn resample_linear(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    let ratio = to_rate as f64 / from_rate as f64;
    let new_len = (samples.len() as f64 * ratio) as usize;

    let mut out = Vec::with_capacity(new_len);
    for i in 0..new_len {
        let src = i as f64 / ratio;
        let lo = src.floor() as usize;
        let hi = (lo + 1).min(samples.len().saturating_sub(1));
        let frac = src - lo as f64;
        let sample = f64::from(samples[lo]) * (1.0 - frac) + f64::from(samples[hi]) * frac;
        out.push(sample as i16);
    }
    out
}
