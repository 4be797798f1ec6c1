//! Lip-sync level analyzer
//!
//! `LipSync` reads the engine's analysis tap once per rendered frame and
//! turns the window into mouth openness. Playback goes through
//! `LipSyncPlayer`, a cloneable handle that can be moved to other threads
//! while the render loop keeps calling `update()`.

use std::sync::Arc;

use crate::audio::engine::{AudioEngine, Completion, OnEnded};
use crate::audio::level;
use crate::audio::tap::AnalysisTap;
use crate::audio::types::LipSyncAnalyzeResult;
use crate::config::analysis::TIME_DOMAIN_DATA_LENGTH;
use crate::error::Result;
use crate::net;

/// Mouth-openness analyzer attached to an audio engine
pub struct LipSync<E: AudioEngine> {
    player: LipSyncPlayer<E>,
    tap: AnalysisTap,
    time_domain_data: Vec<f32>,
}

impl<E: AudioEngine> LipSync<E> {
    /// Attach an analysis tap to `engine`.
    ///
    /// The engine stays owned by the caller; tap allocation failures are
    /// returned as-is.
    pub fn new(engine: Arc<E>) -> Result<Self> {
        let tap = engine.create_tap(TIME_DOMAIN_DATA_LENGTH)?;
        Ok(Self {
            player: LipSyncPlayer { engine },
            tap,
            time_domain_data: vec![0.0; TIME_DOMAIN_DATA_LENGTH],
        })
    }

    /// Sample the tap and compute the current mouth openness.
    ///
    /// Never blocks on playback; meant to be called once per rendered frame.
    pub fn update(&mut self) -> LipSyncAnalyzeResult {
        self.tap.read_time_domain(&mut self.time_domain_data);
        let peak = level::peak(&self.time_domain_data);
        LipSyncAnalyzeResult {
            volume: level::mouth_openness(peak),
        }
    }

    /// The samples read by the last `update()`
    pub fn time_domain_data(&self) -> &[f32] {
        &self.time_domain_data
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.player.engine
    }

    /// A playback handle that can be cloned and sent to other threads
    pub fn player(&self) -> LipSyncPlayer<E> {
        self.player.clone()
    }

    /// See [`LipSyncPlayer::play_from_buffer`]
    pub fn play_from_buffer(&self, bytes: Vec<u8>, on_ended: Option<OnEnded>) {
        self.player.play_from_buffer(bytes, on_ended)
    }

    /// See [`LipSyncPlayer::play_from_url`]
    pub fn play_from_url(&self, url: &str, on_ended: Option<OnEnded>) -> Result<()> {
        self.player.play_from_url(url, on_ended)
    }
}

/// Playback side of a `LipSync`
pub struct LipSyncPlayer<E: AudioEngine> {
    engine: Arc<E>,
}

impl<E: AudioEngine> Clone for LipSyncPlayer<E> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}

impl<E: AudioEngine> LipSyncPlayer<E> {
    /// Decode `bytes` and start playing them through the engine.
    ///
    /// Blocks while decoding, then returns without waiting for playback.
    /// `on_ended` runs exactly once: when the clip finishes, or right away
    /// if the clip could not be decoded or started. Those failures are
    /// logged, not returned.
    pub fn play_from_buffer(&self, bytes: Vec<u8>, on_ended: Option<OnEnded>) {
        self.play_from_buffer_with_hint(bytes, None, on_ended)
    }

    /// Like [`play_from_buffer`](Self::play_from_buffer) with a container
    /// hint (file extension) for the decoder
    pub fn play_from_buffer_with_hint(
        &self,
        bytes: Vec<u8>,
        format_hint: Option<&str>,
        on_ended: Option<OnEnded>,
    ) {
        let completion = Completion::new(on_ended);

        let audio = match self.engine.decode(bytes, format_hint) {
            Ok(audio) => audio,
            Err(e) => {
                log::error!("Error while trying to play from buffer: {}", e);
                completion.fire();
                return;
            }
        };

        let source = self.engine.create_source(audio, completion.clone());
        if let Err(e) = self.engine.connect(source) {
            log::error!("Error while trying to start playback: {}", e);
            completion.fire();
        }
    }

    /// Fetch `url` and play it.
    ///
    /// Network errors are returned and `on_ended` is dropped without
    /// running. Once the body is in hand this behaves like
    /// [`play_from_buffer`](Self::play_from_buffer).
    pub fn play_from_url(&self, url: &str, on_ended: Option<OnEnded>) -> Result<()> {
        let fetched = net::fetch(url)?;
        let hint = net::detect_format_hint(url, fetched.content_type.as_deref());
        self.play_from_buffer_with_hint(fetched.bytes, hint.as_deref(), on_ended);
        Ok(())
    }
}
