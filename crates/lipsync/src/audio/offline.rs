//! Offline engine
//!
//! Renders clips without an output device. Connected clips are mixed on a
//! single render thread and each mixed block goes straight into the
//! analysis taps, optionally paced at real time so `LipSync::update()`
//! sees a live signal.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use rodio::mixer::{Mixer, MixerSource};

use crate::config::offline::{OFFLINE_BLOCK_FRAMES, OFFLINE_CHANNELS, OFFLINE_SAMPLE_RATE};
use crate::error::{LipSyncError, Result};

use super::engine::{AudioEngine, ClipSource, Completion};
use super::tap::{AnalysisTap, TapSet};
use super::types::ClipId;

/// Device-less engine for headless analysis and tests
pub struct OfflineEngine {
    mixer: Mixer,
    taps: Arc<TapSet>,
    active: Arc<AtomicUsize>,
    ended_tx: Sender<(ClipId, Completion)>,
    wake_tx: Sender<()>,
    renderer: Arc<Mutex<Option<Renderer>>>,
    rendering: AtomicBool,
}

impl Default for OfflineEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineEngine {
    /// Render clips as fast as possible
    pub fn new() -> Self {
        Self::with_pacing(false)
    }

    /// Render clips at their natural playback speed
    pub fn realtime() -> Self {
        Self::with_pacing(true)
    }

    fn with_pacing(realtime: bool) -> Self {
        let (mixer, source) = rodio::mixer::mixer(OFFLINE_CHANNELS, OFFLINE_SAMPLE_RATE);
        let (ended_tx, ended_rx) = unbounded();
        let (wake_tx, wake_rx) = unbounded();
        let taps = Arc::new(TapSet::new());
        let active = Arc::new(AtomicUsize::new(0));
        let renderer = Renderer {
            source,
            taps: taps.clone(),
            active: active.clone(),
            ended_rx,
            wake_rx,
            realtime,
        };
        Self {
            mixer,
            taps,
            active,
            ended_tx,
            wake_tx,
            renderer: Arc::new(Mutex::new(Some(renderer))),
            rendering: AtomicBool::new(false),
        }
    }

    /// Clips currently being rendered
    pub fn active_clips(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Start the render thread on first use
    fn ensure_rendering(&self) -> Result<()> {
        if self.rendering.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let slot = self.renderer.clone();
        let spawned = thread::Builder::new()
            .name("lipsync-offline".to_string())
            .spawn(move || {
                let renderer = slot.lock().ok().and_then(|mut slot| slot.take());
                if let Some(renderer) = renderer {
                    renderer.run();
                }
            });
        if let Err(e) = spawned {
            self.rendering.store(false, Ordering::SeqCst);
            return Err(LipSyncError::Audio(format!(
                "Failed to spawn render thread: {}",
                e
            )));
        }
        Ok(())
    }
}

/// Render-thread side of an `OfflineEngine`
struct Renderer {
    source: MixerSource,
    taps: Arc<TapSet>,
    active: Arc<AtomicUsize>,
    ended_rx: Receiver<(ClipId, Completion)>,
    wake_rx: Receiver<()>,
    realtime: bool,
}

impl Renderer {
    /// Mix while clips are active, sleep on the wake queue otherwise. Exits
    /// once the engine is gone and nothing is left to render.
    fn run(mut self) {
        let block_len = OFFLINE_BLOCK_FRAMES * OFFLINE_CHANNELS as usize;
        let block_time =
            Duration::from_secs_f64(OFFLINE_BLOCK_FRAMES as f64 / OFFLINE_SAMPLE_RATE as f64);
        let mut block = Vec::with_capacity(block_len);
        // Clips that ran out during the previous block; the resampler may
        // still hold a few of their samples
        let mut ending: Vec<(ClipId, Completion)> = Vec::new();

        while self.wake_rx.recv().is_ok() {
            let started = Instant::now();
            let mut blocks: u32 = 0;
            while self.active.load(Ordering::SeqCst) > 0 {
                block.clear();
                block.extend(self.source.by_ref().take(block_len));
                if !block.is_empty() {
                    self.taps.write(&block, OFFLINE_CHANNELS);
                }
                blocks += 1;

                for (id, completion) in ending.drain(..) {
                    // Last clip out: the mix goes quiet
                    if self.active.fetch_sub(1, Ordering::SeqCst) == 1 {
                        self.taps.clear();
                    }
                    log::debug!("{} ended", id);
                    completion.fire();
                }
                ending.extend(self.ended_rx.try_iter());

                if self.realtime {
                    let due = block_time * blocks;
                    if let Some(wait) = due.checked_sub(started.elapsed()) {
                        thread::sleep(wait);
                    }
                } else if block.is_empty() {
                    thread::yield_now();
                }
            }
        }
    }
}

impl AudioEngine for OfflineEngine {
    fn create_tap(&self, len: usize) -> Result<AnalysisTap> {
        Ok(self.taps.register(len))
    }

    fn connect(&self, mut source: ClipSource) -> Result<()> {
        self.ensure_rendering()?;

        let ended_tx = self.ended_tx.clone();
        source.set_on_finish(move |id, completion| {
            let _ = ended_tx.send((id, completion));
        });
        log::debug!("{} started offline ({:?})", source.id(), source);
        self.active.fetch_add(1, Ordering::SeqCst);
        self.mixer.add(source);
        let _ = self.wake_tx.send(());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::types::DecodedAudio;
    use crossbeam_channel::bounded;

    fn clip(samples: Vec<f32>, completion: Completion) -> ClipSource {
        ClipSource::new(
            DecodedAudio {
                samples,
                channels: 1,
                sample_rate: 8000,
            },
            completion,
        )
    }

    fn ended_channel() -> (Completion, crossbeam_channel::Receiver<()>) {
        let (tx, rx) = bounded(1);
        let completion = Completion::new(Some(Box::new(move || {
            let _ = tx.send(());
        })));
        (completion, rx)
    }

    #[test]
    fn clip_runs_to_completion() {
        let engine = OfflineEngine::new();
        let (completion, rx) = ended_channel();
        engine.connect(clip(vec![0.5; 3000], completion.clone())).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(!completion.is_pending());
        assert_eq!(engine.active_clips(), 0);
    }

    #[test]
    fn taps_see_the_clip_while_rendering() {
        let engine = OfflineEngine::realtime();
        let tap = engine.create_tap(256).unwrap();
        let (completion, rx) = ended_channel();
        // 1s at 8kHz
        engine.connect(clip(vec![0.75; 8000], completion)).unwrap();

        thread::sleep(Duration::from_millis(300));
        let mut window = vec![0.0f32; 256];
        tap.read_time_domain(&mut window);
        assert!(window.iter().all(|&s| (s - 0.75).abs() < 1e-4));

        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn taps_fall_silent_after_last_clip() {
        let engine = OfflineEngine::new();
        let tap = engine.create_tap(64).unwrap();
        let (completion, rx) = ended_channel();
        engine.connect(clip(vec![0.9; 1000], completion)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let mut window = vec![1.0f32; 64];
        tap.read_time_domain(&mut window);
        assert!(window.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn realtime_pacing_takes_clip_duration() {
        let engine = OfflineEngine::realtime();
        let (completion, rx) = ended_channel();
        let started = Instant::now();
        // 0.25s at 8kHz
        engine.connect(clip(vec![0.1; 2000], completion)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(started.elapsed() >= Duration::from_millis(200));
    }

    #[test]
    fn overlapping_clips_are_mixed() {
        let engine = OfflineEngine::realtime();
        let tap = engine.create_tap(256).unwrap();
        let (quiet, quiet_rx) = ended_channel();
        let (loud, loud_rx) = ended_channel();
        engine.connect(clip(vec![0.25; 8000], quiet)).unwrap();
        engine.connect(clip(vec![0.5; 8000], loud)).unwrap();

        thread::sleep(Duration::from_millis(300));
        let mut window = vec![0.0f32; 256];
        tap.read_time_domain(&mut window);
        assert!(
            window.iter().all(|&s| (s - 0.75).abs() < 1e-3),
            "window = {:?}",
            &window[..8]
        );

        quiet_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        loud_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(engine.active_clips(), 0);
    }

    #[test]
    fn renderer_serves_later_clips() {
        let engine = OfflineEngine::new();
        for _ in 0..3 {
            let (completion, rx) = ended_channel();
            engine.connect(clip(vec![0.3; 500], completion)).unwrap();
            rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }
        assert_eq!(engine.active_clips(), 0);
    }

    #[test]
    fn empty_clip_still_ends() {
        let engine = OfflineEngine::new();
        let (completion, rx) = ended_channel();
        engine.connect(clip(Vec::new(), completion)).unwrap();
        rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }
}
