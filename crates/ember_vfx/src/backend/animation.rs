//! Animated clip backend with optional loop markers.
//!
//! A clip with both markers loops between them until a graceful stop, then
//! plays through to the end of the clip.

use serde::{Deserialize, Serialize};

use super::EffectBackend;

/// Authored animation clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationSpec {
    /// Clip length in seconds at speed 1.
    pub clip_length: f32,
    /// Whole-clip looping.
    pub looping: bool,
    /// Marker where a marker loop restarts.
    pub loop_start: Option<f32>,
    /// Marker where a marker loop jumps back to `loop_start`.
    pub loop_end: Option<f32>,
    /// Playback speed multiplier.
    pub speed: f32,
}

impl Default for AnimationSpec {
    fn default() -> Self {
        Self {
            clip_length: 1.0,
            looping: false,
            loop_start: None,
            loop_end: None,
            speed: 1.0,
        }
    }
}

/// Clip player.
#[derive(Debug, Clone)]
pub struct AnimationBackend {
    spec: AnimationSpec,
    markers: Option<(f32, f32)>,
    time: f32,
    playing: bool,
    stopping: bool,
    loops_completed: u32,
}

impl AnimationBackend {
    /// Creates a stopped player.
    #[must_use]
    pub fn new(spec: AnimationSpec) -> Self {
        let markers = match (spec.loop_start, spec.loop_end) {
            (Some(start), Some(end)) if end > start && start >= 0.0 => Some((start, end)),
            (None, None) => None,
            (start, end) => {
                tracing::warn!(
                    "Ignoring unusable loop markers {:?}..{:?} on a {}s clip",
                    start,
                    end,
                    spec.clip_length
                );
                None
            }
        };

        Self {
            spec,
            markers,
            time: 0.0,
            playing: false,
            stopping: false,
            loops_completed: 0,
        }
    }

    /// Clip time in seconds.
    #[must_use]
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Times playback jumped back to a loop start.
    #[must_use]
    pub fn loops_completed(&self) -> u32 {
        self.loops_completed
    }

    /// True while the clip is playing.
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    fn wrap(&mut self) {
        if let Some((start, end)) = self.markers {
            if self.time >= end {
                self.time = start + (self.time - end) % (end - start);
                self.loops_completed += 1;
            }
        } else if self.spec.looping && self.spec.clip_length > 0.0 && self.time >= self.spec.clip_length {
            self.time %= self.spec.clip_length;
            self.loops_completed += 1;
        }
    }
}

impl EffectBackend for AnimationBackend {
    fn start(&mut self) {
        self.time = 0.0;
        self.playing = true;
        self.stopping = false;
        self.loops_completed = 0;
    }

    fn advance(&mut self, dt: f32) {
        if !self.playing {
            return;
        }

        self.time += dt * self.spec.speed;
        if !self.stopping {
            self.wrap();
        }

        let ends = self.stopping || !self.reported_looping();
        if ends && self.time >= self.spec.clip_length {
            self.time = self.spec.clip_length;
            self.playing = false;
            self.stopping = false;
        }
    }

    fn stop_graceful(&mut self) {
        if self.playing {
            self.stopping = true;
        }
    }

    fn stop_immediate(&mut self) {
        self.playing = false;
        self.stopping = false;
    }

    fn is_finished(&self) -> bool {
        !self.playing
    }

    fn reported_duration(&self) -> f32 {
        if self.spec.speed > 0.0 {
            self.spec.clip_length / self.spec.speed
        } else {
            -1.0
        }
    }

    fn reported_looping(&self) -> bool {
        self.spec.looping || self.markers.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marked() -> AnimationSpec {
        AnimationSpec {
            clip_length: 2.0,
            loop_start: Some(0.5),
            loop_end: Some(1.5),
            ..AnimationSpec::default()
        }
    }

    #[test]
    fn test_one_shot_clip_finishes() {
        let mut clip = AnimationBackend::new(AnimationSpec::default());
        clip.start();
        clip.advance(0.5);
        assert!(!clip.is_finished());
        clip.advance(0.5);
        assert!(clip.is_finished());
    }

    #[test]
    fn test_marker_loop_until_graceful_stop() {
        let mut clip = AnimationBackend::new(marked());
        assert!(clip.reported_looping());
        clip.start();

        clip.advance(1.0);
        clip.advance(1.0); // 2.0 -> wraps to 1.0
        assert!(clip.is_playing());
        assert_eq!(clip.loops_completed(), 1);
        assert!((clip.time() - 1.0).abs() < 1e-5);

        clip.stop_graceful();
        clip.advance(0.5);
        assert!(clip.is_playing()); // past loop_end, no wrap
        clip.advance(0.5);
        assert!(clip.is_finished());
    }

    #[test]
    fn test_looping_clip_finishes_cycle_on_graceful_stop() {
        let mut clip = AnimationBackend::new(AnimationSpec {
            looping: true,
            ..AnimationSpec::default()
        });
        clip.start();
        clip.advance(0.75);
        clip.advance(0.5);
        assert_eq!(clip.loops_completed(), 1);

        clip.stop_graceful();
        clip.advance(0.5);
        assert!(!clip.is_finished());
        clip.advance(0.5);
        assert!(clip.is_finished());
    }

    #[test]
    fn test_inverted_markers_ignored() {
        let clip = AnimationBackend::new(AnimationSpec {
            loop_start: Some(1.0),
            loop_end: Some(0.5),
            ..AnimationSpec::default()
        });
        assert!(!clip.reported_looping());
    }
}
