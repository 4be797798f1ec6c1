//! Volume shaping
//!
//! Turns a window of time-domain samples into mouth openness: a peak
//! detector followed by a logistic curve and a dead zone.

use crate::config::analysis::{DEAD_ZONE, SQUASH_GAIN, SQUASH_OFFSET};

/// Maximum absolute sample value in the window (0 for an empty window)
pub fn peak(samples: &[f32]) -> f32 {
    samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
}

/// Logistic squashing of a peak amplitude into `0.0..=1.0`
pub fn squash(peak: f32) -> f32 {
    1.0 / (1.0 + (-SQUASH_GAIN * peak + SQUASH_OFFSET).exp())
}

/// Mouth openness for a peak amplitude.
///
/// Values under `DEAD_ZONE` are forced to exactly zero so decoder floor
/// noise does not make the mouth twitch.
pub fn mouth_openness(peak: f32) -> f32 {
    let volume = squash(peak);
    if volume < DEAD_ZONE {
        0.0
    } else {
        volume
    }
}
