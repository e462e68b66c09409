//! Level and silence statistics for captured WAV artifacts

use std::fs;
use std::path::Path;

use hound::{SampleFormat, WavReader};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Absolute amplitude below which a sample counts as silence
pub const SILENCE_THRESHOLD: f64 = 0.01;

/// Basic signal statistics of one audio file
///
/// Levels are on a normalized `[0, 1]` amplitude scale, computed over all
/// channels interleaved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioAnalysis {
    pub duration_secs: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub rms_level: f64,
    pub peak_level: f64,
    pub silence_ratio: f64,
    pub dynamic_range: f64,
    pub file_size: u64,
}

impl AudioAnalysis {
    /// Decode a WAV file and measure it
    pub fn from_file(path: &Path) -> Result<Self> {
        let file_size = fs::metadata(path)?.len();
        let mut reader = WavReader::open(path)?;
        let spec = reader.spec();

        let samples: Vec<f64> = match spec.sample_format {
            SampleFormat::Float => reader
                .samples::<f32>()
                .map(|s| s.map(f64::from))
                .collect::<std::result::Result<Vec<f64>, _>>()?,
            SampleFormat::Int => {
                let scale = (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f64;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f64 / scale))
                    .collect::<std::result::Result<Vec<f64>, _>>()?
            }
        };

        let frames = reader.duration();
        let duration_secs = if spec.sample_rate > 0 {
            frames as f64 / spec.sample_rate as f64
        } else {
            0.0
        };

        Ok(Self::measure(&samples, duration_secs, spec.sample_rate, spec.channels, file_size))
    }

    fn measure(samples: &[f64], duration_secs: f64, sample_rate: u32, channels: u16, file_size: u64) -> Self {
        let (rms_level, peak_level, silence_ratio) = if samples.is_empty() {
            (0.0, 0.0, 0.0)
        } else {
            let count = samples.len() as f64;
            let rms = (samples.iter().map(|s| s * s).sum::<f64>() / count).sqrt();
            let peak = samples.iter().map(|s| s.abs()).fold(0.0, f64::max);
            let silent = samples.iter().filter(|s| s.abs() < SILENCE_THRESHOLD).count();
            (rms, peak, silent as f64 / count)
        };

        Self {
            duration_secs,
            sample_rate,
            channels,
            rms_level,
            peak_level,
            silence_ratio,
            dynamic_range: if peak_level > 0.0 { peak_level - rms_level } else { 0.0 },
            file_size,
        }
    }
}

/// Whether a file looks like something [`AudioAnalysis::from_file`] can read
pub fn is_wav(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("wav"))
        .unwrap_or(false)
}
