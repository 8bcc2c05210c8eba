//! # Timer Queue
//!
//! Replaces "yield and wait" with data: a pending timer is a deadline plus
//! the event to deliver when the clock reaches it.
//!
//! Due timers are returned in registration order, not deadline order, so
//! everything that expires within one tick is serviced in the order it was
//! armed.

use std::collections::BTreeMap;

use super::TIME_EPSILON;

/// Identifier of an armed timer.
///
/// Ids are never reused, so cancelling an already-fired timer is a no-op.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Registration sequence number.
    #[inline]
    #[must_use]
    pub const fn sequence(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
struct Timer<E> {
    deadline: f64,
    event: E,
}

/// Cancellable one-shot timers keyed by registration order.
#[derive(Debug)]
pub struct TimerQueue<E> {
    timers: BTreeMap<u64, Timer<E>>,
    next_sequence: u64,
    now: f64,
}

impl<E> TimerQueue<E> {
    /// Creates an empty queue at time zero.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timers: BTreeMap::new(),
            next_sequence: 0,
            now: 0.0,
        }
    }

    /// Current queue time.
    #[inline]
    #[must_use]
    pub const fn now(&self) -> f64 {
        self.now
    }

    /// Moves queue time forward. Time never goes backwards.
    pub fn advance_to(&mut self, now: f64) {
        if now > self.now {
            self.now = now;
        }
    }

    /// Arms a timer that fires `delay` seconds from now.
    ///
    /// A negative or NaN delay fires on the next [`Self::take_due`].
    pub fn schedule(&mut self, delay: f32, event: E) -> TimerId {
        let delay = if delay.is_nan() { 0.0 } else { f64::from(delay.max(0.0)) };
        self.schedule_at(self.now + delay, event)
    }

    /// Arms a timer with an absolute deadline.
    pub fn schedule_at(&mut self, deadline: f64, event: E) -> TimerId {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.timers.insert(sequence, Timer { deadline, event });
        TimerId(sequence)
    }

    /// Disarms a timer. Returns its event if it had not fired yet.
    pub fn cancel(&mut self, id: TimerId) -> Option<E> {
        self.timers.remove(&id.0).map(|timer| timer.event)
    }

    /// True if the timer is still armed.
    #[inline]
    #[must_use]
    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id.0)
    }

    /// Deadline of an armed timer.
    #[must_use]
    pub fn deadline(&self, id: TimerId) -> Option<f64> {
        self.timers.get(&id.0).map(|timer| timer.deadline)
    }

    /// Number of armed timers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// True if nothing is armed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// True if any timer has reached its deadline.
    #[must_use]
    pub fn has_due(&self) -> bool {
        self.timers
            .values()
            .any(|timer| timer.deadline <= self.now + TIME_EPSILON)
    }

    /// Removes and returns every due timer, in registration order.
    ///
    /// Each entry carries the timer's own deadline so repeating work can
    /// re-arm relative to it instead of to `now` and avoid drift.
    pub fn take_due(&mut self) -> Vec<(TimerId, f64, E)> {
        let limit = self.now + TIME_EPSILON;
        let due: Vec<u64> = self
            .timers
            .iter()
            .filter(|(_, timer)| timer.deadline <= limit)
            .map(|(&sequence, _)| sequence)
            .collect();

        due.into_iter()
            .filter_map(|sequence| {
                self.timers
                    .remove(&sequence)
                    .map(|timer| (TimerId(sequence), timer.deadline, timer.event))
            })
            .collect()
    }

    /// Disarms everything.
    pub fn clear(&mut self) {
        self.timers.clear();
    }
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_fires_at_deadline() {
        let mut queue = TimerQueue::new();
        queue.schedule(1.0, "a");

        queue.advance_to(0.5);
        assert!(queue.take_due().is_empty());

        queue.advance_to(1.0);
        let due = queue.take_due();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].2, "a");
        assert!(queue.is_empty());
    }

    #[test]
    fn test_timer_registration_order() {
        let mut queue = TimerQueue::new();
        queue.schedule(0.9, 1);
        queue.schedule(0.1, 2);
        queue.schedule(0.5, 3);

        queue.advance_to(1.0);
        let order: Vec<i32> = queue.take_due().into_iter().map(|(_, _, e)| e).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_timer_cancel() {
        let mut queue = TimerQueue::new();
        let id = queue.schedule(0.5, "gone");
        assert!(queue.is_pending(id));
        assert_eq!(queue.cancel(id), Some("gone"));
        assert_eq!(queue.cancel(id), None);

        queue.advance_to(1.0);
        assert!(queue.take_due().is_empty());
    }

    #[test]
    fn test_timer_accumulated_float_deadline() {
        let mut queue = TimerQueue::new();
        queue.schedule(1.0, ());

        let mut now = 0.0f64;
        for _ in 0..10 {
            now += 0.1;
        }
        queue.advance_to(now); // 0.9999999999999999
        assert_eq!(queue.take_due().len(), 1);
    }
}
