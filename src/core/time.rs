//! Per-frame time input.

use std::time::Duration;

/// Elapsed time carried by one tick.
///
/// `scaled` is affected by the host's time scale (pause, slow motion);
/// `unscaled` is real elapsed time. Both are in seconds.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Scaled delta-time in seconds.
    pub scaled: f32,
    /// Unscaled delta-time in seconds.
    pub unscaled: f32,
}

impl FrameTime {
    /// Both deltas set to `dt`.
    #[must_use]
    pub const fn uniform(dt: f32) -> Self {
        Self {
            scaled: dt,
            unscaled: dt,
        }
    }

    /// Explicit scaled and unscaled deltas.
    #[must_use]
    pub const fn new(scaled: f32, unscaled: f32) -> Self {
        Self { scaled, unscaled }
    }

    /// Pick the delta a consumer asked for.
    #[must_use]
    pub const fn delta(&self, unscaled: bool) -> f32 {
        if unscaled {
            self.unscaled
        } else {
            self.scaled
        }
    }
}

/// Turns raw elapsed durations into [`FrameTime`] values.
///
/// Long stalls are clamped to `max_dt` so a hitch does not fire a burst of
/// catch-up work.
#[derive(Debug, Clone)]
pub struct FrameClock {
    max_dt: Duration,
    time_scale: f32,
    frame_index: u64,
    elapsed_unscaled: f64,
}

impl FrameClock {
    /// Create a clock with the given clamp and time scale.
    #[must_use]
    pub const fn new(max_dt: Duration, time_scale: f32) -> Self {
        Self {
            max_dt,
            time_scale,
            frame_index: 0,
            elapsed_unscaled: 0.0,
        }
    }

    /// Current time scale.
    #[must_use]
    pub const fn time_scale(&self) -> f32 {
        self.time_scale
    }

    /// Change the time scale. Negative or non-finite values are ignored.
    pub fn set_time_scale(&mut self, scale: f32) {
        if scale.is_finite() && scale >= 0.0 {
            self.time_scale = scale;
        } else {
            tracing::warn!(scale, "ignoring invalid time scale");
        }
    }

    /// Number of frames produced so far.
    #[must_use]
    pub const fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Total unscaled seconds handed out so far.
    #[must_use]
    pub const fn elapsed_unscaled(&self) -> f64 {
        self.elapsed_unscaled
    }

    /// Produce the frame time for `elapsed` real time.
    pub fn advance(&mut self, elapsed: Duration) -> FrameTime {
        let unscaled = elapsed.min(self.max_dt).as_secs_f32();
        self.frame_index += 1;
        self.elapsed_unscaled += f64::from(unscaled);
        FrameTime {
            scaled: unscaled * self.time_scale,
            unscaled,
        }
    }
}
