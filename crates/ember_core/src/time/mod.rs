//! # Tick Time
//!
//! The host supplies one delta per scheduling tick. Everything that waits
//! (start delays, playback timeouts, repeat intervals) is a timer measured
//! against that tick clock.

mod clock;
mod timer;

pub use clock::FrameClock;
pub use timer::{TimerId, TimerQueue};

/// Slack used when comparing deadlines against the accumulated clock.
///
/// Float accumulation of per-frame deltas drifts slightly below exact
/// multiples; a deadline within this margin of `now` counts as reached.
pub const TIME_EPSILON: f64 = 1.0e-6;
