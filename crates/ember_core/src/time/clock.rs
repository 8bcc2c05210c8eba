//! Frame clock fed by the host's per-tick delta.

/// Monotonic simulation clock.
///
/// Never reads wall-clock time: the host passes the delta in. Negative deltas
/// are rejected and oversized deltas are clamped so one long stall (debugger,
/// window drag) does not fast-forward every timer at once.
#[derive(Clone, Debug)]
pub struct FrameClock {
    now: f64,
    frame: u64,
    max_delta: f32,
    last_delta: f32,
}

impl FrameClock {
    /// Default clamp for a single tick (matches the 0.1s physics clamp of the host loop).
    pub const DEFAULT_MAX_DELTA: f32 = 0.1;

    /// Creates a clock at time zero.
    #[must_use]
    pub const fn new(max_delta: f32) -> Self {
        Self {
            now: 0.0,
            frame: 0,
            max_delta,
            last_delta: 0.0,
        }
    }

    /// Advances by one tick. Returns the delta actually applied.
    pub fn advance(&mut self, delta: f32) -> f32 {
        let applied = if delta.is_nan() || delta < 0.0 {
            tracing::warn!("Frame clock rejected delta {} at frame {}", delta, self.frame);
            0.0
        } else if delta > self.max_delta {
            tracing::debug!("Frame clock clamped delta {} to {}", delta, self.max_delta);
            self.max_delta
        } else {
            delta
        };

        self.now += f64::from(applied);
        self.frame += 1;
        self.last_delta = applied;
        applied
    }

    /// Seconds elapsed since the clock was created.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Number of ticks applied.
    #[inline]
    #[must_use]
    pub const fn frame(&self) -> u64 {
        self.frame
    }

    /// Delta applied by the last tick.
    #[inline]
    #[must_use]
    pub const fn last_delta(&self) -> f32 {
        self.last_delta
    }

    /// Per-tick clamp.
    #[inline]
    #[must_use]
    pub const fn max_delta(&self) -> f32 {
        self.max_delta
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_DELTA)
    }
}
