//! Refresh-cadence scheduling for the detection loop.
//!
//! `FrameScheduler` plays the role of the display's animation-frame queue: an
//! iteration is requested for the next refresh and runs once that refresh is
//! due. Requests return a `FrameHandle` that can be cancelled; a cancelled or
//! already-taken handle never fires.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Default refresh interval (60 Hz).
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_micros(16_667);

/// Identifier of one scheduled iteration. Never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct FrameScheduler {
    interval: Duration,
    next_id: u64,
    pending: BTreeMap<FrameHandle, Instant>,
}

impl FrameScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            next_id: 1,
            pending: BTreeMap::new(),
        }
    }

    /// Scheduler ticking at `fps` refreshes per second. Zero falls back to 60 Hz.
    pub fn with_fps(fps: u32) -> Self {
        if fps == 0 {
            return Self::new(DEFAULT_REFRESH_INTERVAL);
        }
        Self::new(Duration::from_secs(1) / fps)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Request an iteration on the refresh after `now`.
    pub fn request_frame(&mut self, now: Instant) -> FrameHandle {
        let handle = FrameHandle(self.next_id);
        self.next_id += 1;
        self.pending.insert(handle, now + self.interval);
        handle
    }

    /// Cancel a pending request. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, handle: FrameHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Pop the earliest request whose refresh has arrived.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameHandle> {
        let (handle, due) = self
            .pending
            .iter()
            .min_by_key(|(handle, due)| (**due, **handle))
            .map(|(handle, due)| (*handle, *due))?;
        if due > now {
            return None;
        }
        self.pending.remove(&handle);
        Some(handle)
    }

    /// When the earliest pending request becomes due.
    pub fn next_due(&self) -> Option<Instant> {
        self.pending.values().min().copied()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending request.
    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

impl Default for FrameScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REFRESH_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_only_after_interval() {
        let start = Instant::now();
        let mut scheduler = FrameScheduler::new(Duration::from_millis(10));
        let handle = scheduler.request_frame(start);

        assert_eq!(scheduler.take_due(start), None);
        assert_eq!(scheduler.take_due(start + Duration::from_millis(10)), Some(handle));
        assert_eq!(scheduler.take_due(start + Duration::from_secs(1)), None);
    }

    #[test]
    fn cancelled_requests_never_fire() {
        let start = Instant::now();
        let mut scheduler = FrameScheduler::new(Duration::from_millis(5));
        let handle = scheduler.request_frame(start);
        assert!(scheduler.cancel(handle));
        assert!(!scheduler.cancel(handle));
        assert_eq!(scheduler.take_due(start + Duration::from_secs(1)), None);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[test]
    fn handles_are_unique_and_fire_in_order() {
        let start = Instant::now();
        let mut scheduler = FrameScheduler::new(Duration::from_millis(5));
        let a = scheduler.request_frame(start);
        let b = scheduler.request_frame(start);
        assert_ne!(a, b);
        assert_eq!(scheduler.next_due(), Some(start + Duration::from_millis(5)));

        let later = start + Duration::from_millis(6);
        assert_eq!(scheduler.take_due(later), Some(a));
        assert_eq!(scheduler.take_due(later), Some(b));
        assert_eq!(scheduler.next_due(), None);
    }

    #[test]
    fn fps_sets_interval() {
        assert_eq!(FrameScheduler::with_fps(10).interval(), Duration::from_millis(100));
        assert_eq!(FrameScheduler::with_fps(0).interval(), DEFAULT_REFRESH_INTERVAL);
    }
}
