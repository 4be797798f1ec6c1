//! Audio subsystem
//!
//! Handles decoding, playback engines, the analysis tap, and volume shaping.
//!

pub mod decoder;
pub mod engine;
pub mod level;
pub mod offline;
pub mod output;
pub mod tap;
pub mod types;

pub use engine::{AudioEngine, ClipSource, Completion, OnEnded};
pub use offline::OfflineEngine;
pub use output::RodioEngine;
pub use tap::{AnalysisTap, TapSet, TappedSource};
pub use types::{ClipId, DecodedAudio, LipSyncAnalyzeResult};
