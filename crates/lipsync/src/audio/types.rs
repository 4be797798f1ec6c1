//! Shared audio types
//!
//! Pure data types used across the audio subsystem.

use std::fmt;
use std::time::Duration;

/// Result of one `LipSync::update()` call
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LipSyncAnalyzeResult {
    /// Mouth openness in `0.0..=1.0`
    pub volume: f32,
}

/// Identifier assigned to every clip started on an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClipId(pub u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

/// Fully decoded audio: interleaved f32 samples in `-1.0..=1.0`
#[derive(Clone)]
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback length at the native sample rate
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}

impl fmt::Debug for DecodedAudio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodedAudio")
            .field("samples", &self.samples.len())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- LipSyncAnalyzeResult ---

    #[test]
    fn analyze_result_default_is_silent() {
        assert_eq!(LipSyncAnalyzeResult::default().volume, 0.0);
    }

    // --- ClipId ---

    #[test]
    fn clip_id_display() {
        assert_eq!(ClipId(7).to_string(), "clip#7");
    }

    #[test]
    fn clip_id_orders_by_value() {
        assert!(ClipId(1) < ClipId(2));
    }

    // --- DecodedAudio ---

    #[test]
    fn frames_for_stereo() {
        let audio = DecodedAudio {
            samples: vec![0.0; 96_000],
            channels: 2,
            sample_rate: 48_000,
        };
        assert_eq!(audio.frames(), 48_000);
        assert_eq!(audio.duration(), Duration::from_secs(1));
    }

    #[test]
    fn zero_channels_has_no_frames() {
        let audio = DecodedAudio {
            samples: vec![0.5; 10],
            channels: 0,
            sample_rate: 44_100,
        };
        assert_eq!(audio.frames(), 0);
    }

    #[test]
    fn zero_sample_rate_has_no_duration() {
        let audio = DecodedAudio {
            samples: vec![0.5; 10],
            channels: 1,
            sample_rate: 0,
        };
        assert_eq!(audio.duration(), Duration::ZERO);
    }

    #[test]
    fn debug_omits_sample_data() {
        let audio = DecodedAudio {
            samples: vec![0.25; 4],
            channels: 1,
            sample_rate: 8000,
        };
        let debug = format!("{:?}", audio);
        assert!(debug.contains("samples: 4"));
        assert!(!debug.contains("0.25"));
    }
}
