//! MP3 to mono i16 PCM decoding via Symphonia

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use narrator_core::{DecodedPcm, RepositoryError};

/// Decode MP3 bytes to mono 16-bit PCM, reporting the stream's sample rate.
///
/// Multi-channel payloads are downmixed by averaging.
pub(crate) fn decode_mp3(mp3_bytes: &[u8]) -> Result<DecodedPcm, RepositoryError> {
    // MediaSourceStream wants an owned 'static source.
    let cursor = std::io::Cursor::new(mp3_bytes.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("mp3");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| RepositoryError::Decode(format!("mp3 probe failed: {e}")))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| RepositoryError::Decode("no audio track in payload".into()))?;
    let track_id = track.id;
    let channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);
    let sample_rate = track.codec_params.sample_rate.unwrap_or(0);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| RepositoryError::Decode(format!("mp3 decoder init failed: {e}")))?;

    let mut samples: Vec<i16> = Vec::new();
    let mut stream_rate = sample_rate;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => {
                return Err(RepositoryError::Decode(format!("mp3 read error: {e}")));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "mp3 packet decode error, skipping packet");
                continue;
            }
        };

        let spec = *decoded.spec();
        stream_rate = spec.rate;
        let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        let interleaved = buf.samples();

        if channels <= 1 {
            samples.extend_from_slice(interleaved);
        } else {
            for frame in interleaved.chunks(channels) {
                let sum: i32 = frame.iter().map(|&s| i32::from(s)).sum();
                samples.push((sum / channels as i32) as i16);
            }
        }
    }

    if stream_rate == 0 {
        return Err(RepositoryError::Decode(
            "payload carried no sample rate".into(),
        ));
    }

    Ok(DecodedPcm {
        samples,
        sample_rate: stream_rate,
    })
}
