//! Audio engine seam
//!
//! `AudioEngine` is the audio graph a `LipSync` plays through: it hands out
//! analysis taps, decodes clips, and starts them on its output destination.
//! `ClipSource` is one started clip; `Completion` is its one-shot end
//! notification.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rodio::Source;

use crate::error::Result;

use super::decoder;
use super::tap::AnalysisTap;
use super::types::{ClipId, DecodedAudio};

/// Zero-argument completion callback
pub type OnEnded = Box<dyn FnOnce() + Send + 'static>;

static NEXT_CLIP_ID: AtomicU64 = AtomicU64::new(1);

impl ClipId {
    fn allocate() -> Self {
        ClipId(NEXT_CLIP_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// One-shot completion notifier.
///
/// Clones share the same slot; whichever clone fires first runs the
/// callback and every later `fire()` is a no-op.
#[derive(Clone, Default)]
pub struct Completion {
    slot: Arc<Mutex<Option<OnEnded>>>,
}

impl Completion {
    pub fn new(on_ended: Option<OnEnded>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(on_ended)),
        }
    }

    /// Run the callback if it has not run yet. Returns whether it ran.
    pub fn fire(&self) -> bool {
        let on_ended = match self.slot.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        match on_ended {
            Some(callback) => {
                callback();
                true
            }
            None => false,
        }
    }

    /// True while a callback is still waiting to run
    pub fn is_pending(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("pending", &self.is_pending())
            .finish()
    }
}

type FinishHook = Box<dyn FnOnce(ClipId, Completion) + Send + 'static>;

/// A decoded clip ready to be started on an engine.
///
/// Yields its samples once; the completion fires together with the last
/// sample (or on the first poll of an empty clip), either directly or
/// through the hook an engine installed with `set_on_finish`.
pub struct ClipSource {
    id: ClipId,
    samples: std::vec::IntoIter<f32>,
    channels: u16,
    sample_rate: u32,
    duration: Duration,
    completion: Completion,
    on_finish: Option<FinishHook>,
    finished: bool,
}

impl ClipSource {
    pub fn new(audio: DecodedAudio, completion: Completion) -> Self {
        let duration = audio.duration();
        Self {
            id: ClipId::allocate(),
            samples: audio.samples.into_iter(),
            channels: audio.channels.max(1),
            sample_rate: audio.sample_rate.max(1),
            duration,
            completion,
            on_finish: None,
            finished: false,
        }
    }

    pub fn id(&self) -> ClipId {
        self.id
    }

    /// Handle onto this clip's completion
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Route the end-of-clip notification through `hook` instead of
    /// firing the completion on the thread that drained the clip
    pub fn set_on_finish<F>(&mut self, hook: F)
    where
        F: FnOnce(ClipId, Completion) + Send + 'static,
    {
        self.on_finish = Some(Box::new(hook));
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        match self.on_finish.take() {
            Some(hook) => hook(self.id, self.completion.clone()),
            None => {
                self.completion.fire();
            }
        }
    }
}

impl Iterator for ClipSource {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        match self.samples.next() {
            Some(sample) => {
                // Mixers may stop polling as soon as the last sample is out
                if self.samples.len() == 0 {
                    self.finish();
                }
                Some(sample)
            }
            None => {
                self.finish();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.samples.size_hint()
    }
}

impl Source for ClipSource {
    fn current_span_len(&self) -> Option<usize> {
        // Format never changes mid-clip
        None
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        Some(self.duration)
    }
}

impl fmt::Debug for ClipSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipSource")
            .field("id", &self.id)
            .field("remaining", &self.samples.len())
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

/// The audio graph a `LipSync` plays through.
///
/// Implementations own an output destination. Every clip passed to
/// `connect` is heard on that destination and delivered to every tap
/// created by `create_tap`.
pub trait AudioEngine: Send + Sync + 'static {
    /// Attach a new analysis tap holding `len` samples
    fn create_tap(&self, len: usize) -> Result<AnalysisTap>;

    /// Decode an encoded clip
    fn decode(&self, bytes: Vec<u8>, format_hint: Option<&str>) -> Result<DecodedAudio> {
        decoder::decode(bytes, format_hint)
    }

    /// Wrap decoded audio into a startable clip
    fn create_source(&self, audio: DecodedAudio, completion: Completion) -> ClipSource {
        ClipSource::new(audio, completion)
    }

    /// Route `source` to the destination and the taps, and start it now
    fn connect(&self, source: ClipSource) -> Result<()>;
}
