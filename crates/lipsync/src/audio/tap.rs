//! Analysis tap
//!
//! An `AnalysisTap` keeps the most recent mono samples that passed through
//! an engine's output bus. `TappedSource` wraps any `rodio::Source` and
//! feeds every registered tap without altering the signal.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use rodio::Source;

use crate::config::tap::TAP_FLUSH_FRAMES;

struct TapWindow {
    ring: Vec<f32>,
    write_pos: usize,
}

struct TapInner {
    len: usize,
    window: Mutex<TapWindow>,
}

/// Rolling window of the most recent mono samples seen by the engine.
///
/// Cheap to clone; all clones share the same window.
#[derive(Clone)]
pub struct AnalysisTap {
    inner: Arc<TapInner>,
}

impl AnalysisTap {
    /// Create a silent window holding `len` samples
    pub fn new(len: usize) -> Self {
        Self {
            inner: Arc::new(TapInner {
                len,
                window: Mutex::new(TapWindow {
                    ring: vec![0.0; len],
                    write_pos: 0,
                }),
            }),
        }
    }

    /// Window length in samples
    pub fn len(&self) -> usize {
        self.inner.len
    }

    pub fn is_empty(&self) -> bool {
        self.inner.len == 0
    }

    /// Append interleaved frames, down-mixed to mono by averaging channels.
    ///
    /// A trailing partial frame is ignored.
    pub fn push_interleaved(&self, samples: &[f32], channels: u16) {
        let len = self.inner.len;
        if len == 0 || channels == 0 {
            return;
        }
        let scale = 1.0 / channels as f32;
        if let Ok(mut window) = self.inner.window.lock() {
            for frame in samples.chunks_exact(channels as usize) {
                let mono = frame.iter().sum::<f32>() * scale;
                let pos = window.write_pos;
                window.ring[pos] = mono;
                window.write_pos = (pos + 1) % len;
            }
        }
    }

    /// Reset the window to silence
    pub fn clear(&self) {
        if let Ok(mut window) = self.inner.window.lock() {
            window.ring.fill(0.0);
            window.write_pos = 0;
        }
    }

    /// Overwrite `out` with the window in chronological order.
    ///
    /// If `out` is shorter than the window only the newest samples are
    /// copied; if it is longer the head is zero-filled.
    pub fn read_time_domain(&self, out: &mut [f32]) {
        let len = self.inner.len;
        let n = out.len().min(len);
        let (head, tail) = out.split_at_mut(out.len() - n);
        head.fill(0.0);
        if n == 0 {
            return;
        }

        match self.inner.window.lock() {
            Ok(window) => {
                let start = (window.write_pos + len - n) % len;
                for (i, slot) in tail.iter_mut().enumerate() {
                    *slot = window.ring[(start + i) % len];
                }
            }
            Err(_) => tail.fill(0.0),
        }
    }

    fn downgrade(&self) -> Weak<TapInner> {
        Arc::downgrade(&self.inner)
    }
}

/// Engine-side registry of the taps attached to an output bus.
///
/// Holds taps weakly: a tap detaches itself when its last handle drops.
#[derive(Default)]
pub struct TapSet {
    taps: Mutex<Vec<Weak<TapInner>>>,
}

impl TapSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tap of `len` samples and attach it
    pub fn register(&self, len: usize) -> AnalysisTap {
        let tap = AnalysisTap::new(len);
        if let Ok(mut taps) = self.taps.lock() {
            taps.push(tap.downgrade());
        }
        tap
    }

    /// Deliver interleaved frames to every live tap, dropping dead ones
    pub fn write(&self, samples: &[f32], channels: u16) {
        if let Ok(mut taps) = self.taps.lock() {
            taps.retain(|weak| match weak.upgrade() {
                Some(inner) => {
                    AnalysisTap { inner }.push_interleaved(samples, channels);
                    true
                }
                None => false,
            });
        }
    }

    /// Reset every live tap to silence
    pub fn clear(&self) {
        if let Ok(taps) = self.taps.lock() {
            for inner in taps.iter().filter_map(Weak::upgrade) {
                AnalysisTap { inner }.clear();
            }
        }
    }

    /// Number of taps still held by someone
    pub fn live_count(&self) -> usize {
        self.taps
            .lock()
            .map(|taps| taps.iter().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }
}

/// Pass-through source that copies what it yields into a `TapSet`
pub struct TappedSource<S> {
    inner: S,
    taps: Arc<TapSet>,
    pending: Vec<f32>,
    channels: u16,
    sample_rate: u32,
}

impl<S> TappedSource<S>
where
    S: Source,
{
    pub fn new(source: S, taps: Arc<TapSet>) -> Self {
        let channels = source.channels();
        let sample_rate = source.sample_rate();
        Self {
            inner: source,
            taps,
            pending: Vec::with_capacity(TAP_FLUSH_FRAMES * channels.max(1) as usize),
            channels,
            sample_rate,
        }
    }

    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        self.taps.write(&self.pending, self.channels);
        self.pending.clear();
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(sample) = self.inner.next() else {
            self.flush();
            return None;
        };

        self.pending.push(sample);
        if self.pending.len() >= TAP_FLUSH_FRAMES * self.channels.max(1) as usize {
            self.flush();
        }

        Some(sample)
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source,
{
    fn current_span_len(&self) -> Option<usize> {
        self.inner.current_span_len()
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}
