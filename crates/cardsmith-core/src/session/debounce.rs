//! Cancellable, replaceable scheduled tasks.
//!
//! A [`Debouncer`] holds at most one pending task. Scheduling again cancels
//! the previous task and starts a fresh quiescence window; the payload can be
//! merged with the cancelled one so no update is lost.

use std::time::{Duration, Instant};

/// Identifies one scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

/// A task waiting for its deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledTask<T> {
    pub id: TaskId,
    pub due: Instant,
    pub payload: T,
}

/// Single-slot debouncer.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    delay: Duration,
    next_id: u64,
    pending: Option<ScheduledTask<T>>,
}

impl<T> Debouncer<T> {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            next_id: 0,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Replace any pending task with `payload`, due `delay` after `now`.
    pub fn schedule(&mut self, payload: T, now: Instant) -> TaskId {
        self.schedule_with(now, |_| payload)
    }

    /// Cancel the pending task and schedule `merge(previous payload)`.
    pub fn schedule_with(&mut self, now: Instant, merge: impl FnOnce(Option<T>) -> T) -> TaskId {
        let previous = self.pending.take().map(|task| task.payload);
        self.next_id += 1;
        let id = TaskId(self.next_id);
        self.pending = Some(ScheduledTask {
            id,
            due: now + self.delay,
            payload: merge(previous),
        });
        id
    }

    /// Drop the pending task, returning it.
    pub fn cancel(&mut self) -> Option<ScheduledTask<T>> {
        self.pending.take()
    }

    /// Take the payload if its deadline has passed.
    pub fn take_due(&mut self, now: Instant) -> Option<T> {
        if self.pending.as_ref().is_some_and(|task| now >= task.due) {
            self.pending.take().map(|task| task.payload)
        } else {
            None
        }
    }

    /// Take the payload regardless of its deadline.
    pub fn take(&mut self) -> Option<T> {
        self.pending.take().map(|task| task.payload)
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&ScheduledTask<T>> {
        self.pending.as_ref()
    }

    pub fn pending_id(&self) -> Option<TaskId> {
        self.pending.as_ref().map(|task| task.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_after_quiescence() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(1000));
        d.schedule(1, t0);
        assert_eq!(d.take_due(t0 + Duration::from_millis(999)), None);
        assert_eq!(d.take_due(t0 + Duration::from_millis(1000)), Some(1));
        assert!(!d.is_pending());
    }

    #[test]
    fn test_reschedule_replaces_and_restarts_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(1000));
        let first = d.schedule(1, t0);
        let second = d.schedule(2, t0 + Duration::from_millis(600));
        assert_ne!(first, second);
        assert_eq!(d.pending_id(), Some(second));
        assert_eq!(d.take_due(t0 + Duration::from_millis(1200)), None);
        assert_eq!(d.take_due(t0 + Duration::from_millis(1600)), Some(2));
    }

    #[test]
    fn test_schedule_with_merges() {
        let t0 = Instant::now();
        let mut d: Debouncer<Vec<u32>> = Debouncer::new(Duration::from_millis(10));
        d.schedule(vec![1], t0);
        d.schedule_with(t0, |prev| {
            let mut v = prev.unwrap_or_default();
            v.push(2);
            v
        });
        assert_eq!(d.take(), Some(vec![1, 2]));
    }

    #[test]
    fn test_cancel() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(Duration::from_millis(10));
        let id = d.schedule("x", t0);
        let task = d.cancel().unwrap();
        assert_eq!(task.id, id);
        assert_eq!(d.take_due(t0 + Duration::from_secs(1)), None);
    }
}
