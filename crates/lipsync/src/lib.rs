//! lipsync: audio-driven mouth animation
//!
//! Plays encoded clips through an audio graph and turns the live waveform
//! into a 0..1 "mouth openness" value once per rendered frame.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use lipsync::audio::RodioEngine;
//! use lipsync::LipSync;
//!
//! let engine = Arc::new(RodioEngine::new()?);
//! let mut lip_sync = LipSync::new(engine)?;
//! lip_sync.play_from_url("https://example.com/voice.mp3", None)?;
//! let volume = lip_sync.update().volume;
//! # Ok::<(), lipsync::error::LipSyncError>(())
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod lipsync;
pub mod net;

pub use crate::lipsync::{LipSync, LipSyncPlayer};
pub use audio::types::LipSyncAnalyzeResult;
