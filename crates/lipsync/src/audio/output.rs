//! Device output engine
//!
//! `RodioEngine` plays clips on the default output device. The device
//! stream lives on a dedicated thread; clips are mixed on a destination
//! bus whose output runs through a `TappedSource` on its way to the device,
//! so every tap sees the mixed signal (and silence once clips end).

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use rodio::mixer::{Mixer, MixerSource};
use rodio::source::Zero;
use rodio::OutputStreamBuilder;

use crate::config::output::{BUS_CHANNELS, BUS_SAMPLE_RATE};
use crate::error::{LipSyncError, Result};

use super::engine::{AudioEngine, ClipSource, Completion};
use super::tap::{AnalysisTap, TapSet, TappedSource};
use super::types::ClipId;

/// Destination bus: every connected clip is mixed here, and the mixed
/// signal passes through the taps on its way out
struct OutputBus {
    mixer: Mixer,
    taps: Arc<TapSet>,
    ended_tx: Sender<(ClipId, Completion)>,
}

impl OutputBus {
    /// Build the bus along with its tapped output and the queue of ended
    /// clips. Needs no device.
    fn new() -> (
        Self,
        TappedSource<MixerSource>,
        Receiver<(ClipId, Completion)>,
    ) {
        let (ended_tx, ended_rx) = unbounded::<(ClipId, Completion)>();
        let taps = Arc::new(TapSet::new());
        let (mixer, mixer_source) = rodio::mixer::mixer(BUS_CHANNELS, BUS_SAMPLE_RATE);
        // An endless silent input keeps the bus (and the taps) running
        // between clips
        mixer.add(Zero::new(BUS_CHANNELS, BUS_SAMPLE_RATE));
        let output = TappedSource::new(mixer_source, taps.clone());
        (
            Self {
                mixer,
                taps,
                ended_tx,
            },
            output,
            ended_rx,
        )
    }

    /// Start `source` on the bus. Its end is reported on the ended queue
    /// instead of firing on the thread pulling the bus.
    fn add(&self, mut source: ClipSource) {
        let ended_tx = self.ended_tx.clone();
        source.set_on_finish(move |id, completion| {
            let _ = ended_tx.send((id, completion));
        });
        log::debug!("{} started ({:?})", source.id(), source);
        self.mixer.add(source);
    }
}

/// Audio engine backed by the default output device
pub struct RodioEngine {
    bus: OutputBus,
    shutdown_tx: Sender<()>,
    thread: Option<JoinHandle<()>>,
}

impl RodioEngine {
    /// Open the default output device, spawning the output thread.
    ///
    /// Blocks until the device is open (or fails).
    pub fn new() -> Result<Self> {
        let (init_tx, init_rx) = bounded::<std::result::Result<(), String>>(1);
        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let (bus, output, ended_rx) = OutputBus::new();

        let thread = thread::Builder::new()
            .name("lipsync-output".to_string())
            .spawn(move || Self::run(output, init_tx, shutdown_rx, ended_rx))
            .map_err(|e| LipSyncError::Audio(format!("Failed to spawn output thread: {}", e)))?;

        let init_result = init_rx
            .recv()
            .map_err(|_| LipSyncError::Audio("Output thread terminated during init".to_string()))?;
        init_result.map_err(LipSyncError::Audio)?;

        Ok(Self {
            bus,
            shutdown_tx,
            thread: Some(thread),
        })
    }

    /// The output thread: owns the device stream and runs completion
    /// callbacks off the device callback
    fn run(
        output: TappedSource<MixerSource>,
        init_tx: Sender<std::result::Result<(), String>>,
        shutdown_rx: Receiver<()>,
        ended_rx: Receiver<(ClipId, Completion)>,
    ) {
        // Output streams may be !Send, so the stream is created here
        let mut stream = match OutputStreamBuilder::open_default_stream() {
            Ok(s) => s,
            Err(e) => {
                let _ = init_tx.send(Err(format!("Failed to open audio output: {}", e)));
                return;
            }
        };
        stream.log_on_drop(false);
        stream.mixer().add(output);
        log::info!(
            "Audio output open ({} ch @ {} Hz bus)",
            BUS_CHANNELS,
            BUS_SAMPLE_RATE
        );

        let _ = init_tx.send(Ok(()));

        loop {
            select! {
                recv(ended_rx) -> msg => match msg {
                    Ok((id, completion)) => {
                        log::debug!("{} ended", id);
                        completion.fire();
                    }
                    Err(_) => break,
                },
                recv(shutdown_rx) -> _ => break,
            }
        }

        log::debug!("Audio output closing");
    }

    fn shutdown_inner(&mut self) {
        let _ = self.shutdown_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            join_unless_current(thread);
        }
    }
}

/// Join `thread`, unless it is the calling thread (the engine was dropped
/// from inside an `on_ended` callback); that thread exits on its own once
/// the callback returns.
fn join_unless_current(thread: JoinHandle<()>) {
    if thread.thread().id() == thread::current().id() {
        return;
    }
    let _ = thread.join();
}

impl AudioEngine for RodioEngine {
    fn create_tap(&self, len: usize) -> Result<AnalysisTap> {
        Ok(self.bus.taps.register(len))
    }

    fn connect(&self, source: ClipSource) -> Result<()> {
        self.bus.add(source);
        Ok(())
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::level;
    use crate::audio::types::DecodedAudio;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn clip(amplitude: f32, frames: usize, on_ended: Option<crate::audio::OnEnded>) -> ClipSource {
        ClipSource::new(
            DecodedAudio {
                samples: vec![amplitude; frames],
                channels: 1,
                sample_rate: 8000,
            },
            Completion::new(on_ended),
        )
    }

    fn pull(output: &mut TappedSource<MixerSource>, samples: usize) {
        let pulled = output.by_ref().take(samples).count();
        assert_eq!(pulled, samples, "bus stopped producing");
    }

    fn window(tap: &AnalysisTap) -> Vec<f32> {
        let mut out = vec![f32::NAN; tap.len()];
        tap.read_time_domain(&mut out);
        out
    }

    // --- OutputBus ---

    #[test]
    fn idle_bus_feeds_silence() {
        let (bus, mut output, _ended_rx) = OutputBus::new();
        let tap = bus.taps.register(256);
        pull(&mut output, 4096);
        assert!(window(&tap).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn clip_reaches_taps_then_bus_falls_silent() {
        let (bus, mut output, ended_rx) = OutputBus::new();
        let tap = bus.taps.register(256);
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        // 0.1s at 8kHz, 4800 bus frames
        bus.add(clip(
            0.5,
            800,
            Some(Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
        ));

        // 1000 stereo frames in, well inside the clip
        pull(&mut output, 2000);
        let peak = level::peak(&window(&tap));
        assert!((peak - 0.5).abs() < 0.01, "peak = {}", peak);
        assert!(ended_rx.try_recv().is_err());

        // One second of bus output covers the clip and its tail
        pull(&mut output, 96_000);
        assert!(window(&tap).iter().all(|&s| s == 0.0));

        let ended: Vec<(ClipId, Completion)> = ended_rx.try_iter().collect();
        assert_eq!(ended.len(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(ended[0].1.fire());
        assert!(!ended[0].1.fire());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn overlapping_clips_are_summed() {
        let (bus, mut output, ended_rx) = OutputBus::new();
        let tap = bus.taps.register(256);
        bus.add(clip(0.25, 800, None));
        bus.add(clip(0.5, 800, None));

        pull(&mut output, 2000);
        let peak = level::peak(&window(&tap));
        assert!((peak - 0.75).abs() < 0.01, "peak = {}", peak);

        pull(&mut output, 96_000);
        assert_eq!(ended_rx.try_iter().count(), 2);
    }

    // --- Shutdown ---

    #[test]
    fn join_from_own_thread_returns() {
        let (handle_tx, handle_rx) = bounded::<JoinHandle<()>>(1);
        let (done_tx, done_rx) = bounded::<()>(1);
        let worker = thread::spawn(move || {
            if let Ok(own) = handle_rx.recv() {
                join_unless_current(own);
            }
            let _ = done_tx.send(());
        });
        handle_tx.send(worker).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    }

    #[test]
    fn join_from_other_thread_waits() {
        let (go_tx, go_rx) = bounded::<()>(1);
        let finished = Arc::new(AtomicUsize::new(0));
        let f = finished.clone();
        let worker = thread::spawn(move || {
            let _ = go_rx.recv();
            f.fetch_add(1, Ordering::SeqCst);
        });
        go_tx.send(()).unwrap();
        join_unless_current(worker);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }
}
