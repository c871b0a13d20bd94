use std::path::Path;

use tracing::{debug, info};

use crate::config::AudioProcessing;
use crate::error::{Error, Result};
use crate::tools::{stderr_excerpt, ToolCommand};
use crate::types::AudioTrack;

/// Sample rate whisper.cpp expects.
pub const WHISPER_SAMPLE_RATE: u32 = 16_000;

/// Longest speech track we decode (4 hours, ~920 MB of f32 samples).
const MAX_AUDIO_DURATION_SECS: f64 = 4.0 * 3600.0;

/// Below this a track counts as silent.
const MIN_LEVEL: f32 = 1e-6;

/// Pull `track` out of a video as 16 kHz mono f32 samples.
///
/// The timeline is preserved sample for sample, so segment timestamps
/// coming back from whisper line up with the video frames.
pub fn load_audio(
    ffmpeg: &Path,
    video: &Path,
    track: &AudioTrack,
    processing: &AudioProcessing,
) -> Result<Vec<f32>> {
    info!(path = %video.display(), stream = track.stream_index, "extracting speech track");

    if !video.exists() {
        return Err(Error::SourceNotFound {
            path: video.to_path_buf(),
        });
    }

    let map = format!("0:a:{}", track.stream_index);
    let rate = WHISPER_SAMPLE_RATE.to_string();
    let output = ToolCommand::new(ffmpeg)
        .args(["-nostdin", "-hide_banner", "-loglevel", "error", "-threads", "0", "-i"])
        .arg(video)
        .args(["-map", &map, "-vn", "-f", "s16le", "-ac", "1", "-acodec", "pcm_s16le", "-ar", &rate, "-"])
        .run()?;

    if !output.status.success() {
        return Err(Error::AudioDecode(format!(
            "ffmpeg failed: {}",
            stderr_excerpt(&output)
        )));
    }

    let mut samples = pcm_to_f32(&output.stdout);
    if samples.is_empty() {
        return Err(Error::AudioDecode("ffmpeg produced no samples".into()));
    }

    let duration = samples.len() as f64 / WHISPER_SAMPLE_RATE as f64;
    debug!(
        samples = samples.len(),
        duration_secs = format!("{duration:.1}"),
        "decoded audio"
    );

    if duration > MAX_AUDIO_DURATION_SECS {
        return Err(Error::AudioDecode(format!(
            "audio too long ({duration:.0}s); maximum supported duration is {MAX_AUDIO_DURATION_SECS:.0}s"
        )));
    }

    process(&mut samples, processing);
    Ok(samples)
}

/// Apply the optional conditioning steps in place.
pub fn process(samples: &mut [f32], processing: &AudioProcessing) {
    if processing.dc_offset_removal {
        remove_dc_offset(samples);
    }
    if processing.normalize {
        normalize_peak(samples);
    }
}

/// Signed 16-bit little-endian PCM to [-1.0, 1.0). A trailing odd byte is dropped.
fn pcm_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

fn remove_dc_offset(samples: &mut [f32]) {
    if samples.is_empty() {
        return;
    }

    let mean = samples.iter().sum::<f32>() / samples.len() as f32;
    if mean.abs() > MIN_LEVEL {
        debug!(dc_offset = mean, "removing DC offset");
        samples.iter_mut().for_each(|s| *s -= mean);
    }
}

fn normalize_peak(samples: &mut [f32]) {
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

    if peak < MIN_LEVEL {
        debug!("speech track is silent, skipping normalization");
        return;
    }

    if (peak - 1.0).abs() > 0.01 {
        debug!(peak, "normalizing peak amplitude");
        let scale = 1.0 / peak;
        samples.iter_mut().for_each(|s| *s *= scale);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mean(samples: &[f32]) -> f32 {
        samples.iter().sum::<f32>() / samples.len() as f32
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max)
    }

    #[test]
    fn test_pcm_conversion() {
        let bytes = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x01];
        let samples = pcm_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert_eq!(samples[0], 0.0);
        assert!((samples[1] - 32767.0 / 32768.0).abs() < 1e-6);
        assert_eq!(samples[2], -1.0);
    }

    #[test]
    fn test_dc_offset_removed() {
        let mut samples = vec![0.5, 0.6, 0.4, 0.5, 0.7, 0.3];
        remove_dc_offset(&mut samples);
        assert!(mean(&samples).abs() < 1e-5);
    }

    #[test]
    fn test_dc_offset_leaves_centred_signal_alone() {
        let mut samples = vec![-0.25, 0.25, -0.25, 0.25];
        remove_dc_offset(&mut samples);
        assert_eq!(samples, [-0.25, 0.25, -0.25, 0.25]);
        remove_dc_offset(&mut []);
    }

    #[test]
    fn test_normalize_scales_to_unit_peak() {
        let mut samples = vec![0.1, -0.4, 0.2];
        normalize_peak(&mut samples);
        assert!((peak(&samples) - 1.0).abs() < 1e-5);
        assert!((samples[0] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_normalize_silence_is_untouched() {
        let mut samples = vec![0.0; 8];
        normalize_peak(&mut samples);
        assert!(samples.iter().all(|&s| s == 0.0));
        normalize_peak(&mut []);
    }

    #[test]
    fn test_processing_never_changes_length() {
        let mut samples = vec![0.0, 0.0, 0.3, 0.2, 0.0, 0.0];
        let processing = AudioProcessing::new().dc_offset_removal(true).normalize(true);
        process(&mut samples, &processing);
        assert_eq!(samples.len(), 6);
        assert!((peak(&samples) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_default_processing_is_identity() {
        let mut samples = vec![0.5, 0.6];
        process(&mut samples, &AudioProcessing::default());
        assert_eq!(samples, [0.5, 0.6]);
    }

    #[test]
    fn test_missing_video_is_reported() {
        let track = AudioTrack {
            stream_index: 0,
            codec: None,
            channels: None,
            sample_rate: None,
        };
        let err = load_audio(
            Path::new("ffmpeg"),
            Path::new("/nonexistent/clip.mp4"),
            &track,
            &AudioProcessing::default(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
    }
}
