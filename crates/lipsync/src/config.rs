//! Configuration constants for lipsync

/// Level analysis configuration
pub mod analysis {
    /// Number of time-domain samples read from the tap on every update
    pub const TIME_DOMAIN_DATA_LENGTH: usize = 2048;

    /// Steepness of the logistic curve applied to the peak
    pub const SQUASH_GAIN: f32 = 45.0;

    /// Offset of the logistic curve; the 0.5 crossover sits at
    /// `SQUASH_OFFSET / SQUASH_GAIN` (≈ 0.111)
    pub const SQUASH_OFFSET: f32 = 5.0;

    /// Squashed values below this are reported as exactly zero
    pub const DEAD_ZONE: f32 = 0.1;
}

/// Analysis tap configuration
pub mod tap {
    /// Frames accumulated by `TappedSource` before flushing into the taps.
    /// 256 frames is ~5ms at 48kHz, well under one rendered frame.
    pub const TAP_FLUSH_FRAMES: usize = 256;
}

/// Device output configuration
pub mod output {
    /// Channel count of the destination bus
    pub const BUS_CHANNELS: u16 = 2;

    /// Sample rate of the destination bus (Hz)
    pub const BUS_SAMPLE_RATE: u32 = 48_000;
}

/// Offline rendering configuration
pub mod offline {
    /// Frames rendered per block by `OfflineEngine`
    pub const OFFLINE_BLOCK_FRAMES: usize = 512;

    /// Channel count of the offline mix
    pub const OFFLINE_CHANNELS: u16 = 1;

    /// Sample rate of the offline mix (Hz)
    pub const OFFLINE_SAMPLE_RATE: u32 = 48_000;
}
