//! # Effect Events
//!
//! Lifecycle notifications published by the registry.
//!
//! ```text
//! ┌─────────────┐      ┌─────────────┐      ┌──────────────┐
//! │  Registry   │─────>│   Bounded   │─────>│  Observers   │
//! │   (tick)    │      │   Channel   │      │ (audio, UI,  │
//! └─────────────┘      └─────────────┘      │  telemetry)  │
//!                                           └──────────────┘
//! ```
//!
//! Sending never blocks the tick: when the channel is full the event is
//! dropped and counted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::instance::EffectHandle;
use crate::template::TemplateId;

/// Kinds of usage violation the registry detects and heals.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Violation {
    /// A pool handed out an instance that was still playing.
    PooledRestart,
    /// Play was requested while a stop was being finalized.
    PlayDuringFinalize,
    /// Play was requested for an unknown template.
    UnknownTemplate,
    /// A director entry still tracked instances from a previous cycle.
    StaleDirectorInstances,
    /// A handle no longer refers to a live instance.
    StaleHandle,
}

/// Lifecycle events.
#[derive(Clone, Debug, PartialEq)]
pub enum EffectEvent {
    /// A new instance was built.
    Spawned {
        /// New instance.
        handle: EffectHandle,
        /// Its template.
        template: TemplateId,
    },

    /// An instance started a play cycle.
    Started {
        /// Instance.
        handle: EffectHandle,
        /// Its template.
        template: TemplateId,
        /// Spawned by this director, if any.
        director: Option<EffectHandle>,
    },

    /// An instance was asked to stop.
    Stopping {
        /// Instance.
        handle: EffectHandle,
        /// Immediate or graceful.
        immediate: bool,
    },

    /// An instance finished its play cycle.
    Stopped {
        /// Instance.
        handle: EffectHandle,
        /// Its template.
        template: TemplateId,
    },

    /// A pooled instance went back to its pool.
    Recycled {
        /// Handle of the finished cycle (now stale).
        handle: EffectHandle,
        /// Its template.
        template: TemplateId,
    },

    /// An instance was destroyed.
    Destroyed {
        /// Its template.
        template: TemplateId,
    },

    /// A standalone instance got its pre-play placement back.
    PlacementRestored {
        /// Instance.
        handle: EffectHandle,
    },

    /// A pool grew past its capacity.
    CapacityExceeded {
        /// Pool's template.
        template: TemplateId,
        /// Instances after growing.
        count_all: usize,
        /// Configured capacity.
        capacity_max: usize,
    },

    /// A usage error was detected and healed.
    UsageViolation {
        /// What went wrong.
        violation: Violation,
        /// Template involved, if known.
        template: Option<TemplateId>,
    },
}

/// Event bus for registry observers.
///
/// Pre-allocates a bounded channel so a stalled observer cannot grow memory
/// in the hot path.
pub struct EffectEventBus {
    sender: Sender<EffectEvent>,
    receiver: Receiver<EffectEvent>,
    dropped: Arc<AtomicU64>,
}

impl EffectEventBus {
    /// Creates a new event bus.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum events in flight before new ones are dropped.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity.max(1));
        Self {
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates a sender handle (clone for multiple producers).
    #[must_use]
    pub fn sender(&self) -> EffectEventSender {
        EffectEventSender {
            sender: self.sender.clone(),
            dropped: Arc::clone(&self.dropped),
        }
    }

    /// Creates a receiver handle (clone for multiple consumers).
    #[must_use]
    pub fn receiver(&self) -> EffectEventReceiver {
        EffectEventReceiver {
            receiver: self.receiver.clone(),
        }
    }

    /// Events dropped because the channel was full.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Handle for sending events.
#[derive(Clone)]
pub struct EffectEventSender {
    sender: Sender<EffectEvent>,
    dropped: Arc<AtomicU64>,
}

impl EffectEventSender {
    /// Sends an event (non-blocking).
    ///
    /// Returns `false` if the channel is full or closed; the event is dropped.
    #[inline]
    pub fn send(&self, event: EffectEvent) -> bool {
        match self.sender.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                // Nobody is draining fast enough; keep the tick moving
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Handle for receiving events.
#[derive(Clone)]
pub struct EffectEventReceiver {
    receiver: Receiver<EffectEvent>,
}

impl EffectEventReceiver {
    /// Receives all pending events (non-blocking).
    #[inline]
    pub fn drain(&self) -> Vec<EffectEvent> {
        let mut events = Vec::with_capacity(self.receiver.len());
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Receives one event (non-blocking).
    #[inline]
    pub fn try_recv(&self) -> Option<EffectEvent> {
        self.receiver.try_recv().ok()
    }

    /// Returns the number of pending events.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Checks if there are pending events.
    #[inline]
    #[must_use]
    pub fn has_events(&self) -> bool {
        !self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_roundtrip() {
        let bus = EffectEventBus::new(16);
        let sender = bus.sender();
        let receiver = bus.receiver();

        let template = TemplateId::from_path("fx/a");
        assert!(sender.send(EffectEvent::Destroyed { template }));
        assert!(receiver.has_events());
        assert_eq!(receiver.try_recv(), Some(EffectEvent::Destroyed { template }));
        assert!(!receiver.has_events());
    }

    #[test]
    fn test_full_channel_drops_and_counts() {
        let bus = EffectEventBus::new(2);
        let sender = bus.sender();
        let receiver = bus.receiver();
        let template = TemplateId::from_path("fx/a");

        for _ in 0..5 {
            sender.send(EffectEvent::Destroyed { template });
        }
        assert_eq!(receiver.pending_count(), 2);
        assert_eq!(bus.dropped(), 3);
        assert_eq!(receiver.drain().len(), 2);
    }
}
