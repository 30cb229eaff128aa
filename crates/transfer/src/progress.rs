use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::blob::ByteProgress;

/// Completions older than this no longer count toward throughput.
const THROUGHPUT_WINDOW: Duration = Duration::from_secs(10);

/// Aggregate progress of one job.
///
/// Outstanding operations write their byte counts into a fixed arena of
/// atomic slots. Completions are folded into `processed` under one lock,
/// and the percentage is only reported when its rounded value changes.
pub struct ProgressTracker {
    slots: Arc<[AtomicU64]>,
    inner: Mutex<Accumulator>,
    total: u64,
}

struct Accumulator {
    processed: u64,
    last_reported: Option<u8>,
    started: Instant,
    /// `(completed at, bytes)` inside the throughput window.
    recent: VecDeque<(Instant, u64)>,
}

impl ProgressTracker {
    /// Creates a tracker for `total` bytes with `slots` in-flight counters.
    pub fn new(total: u64, slots: usize) -> Self {
        Self {
            slots: (0..slots).map(|_| AtomicU64::new(0)).collect(),
            inner: Mutex::new(Accumulator {
                processed: 0,
                last_reported: None,
                started: Instant::now(),
                recent: VecDeque::new(),
            }),
            total,
        }
    }

    /// Returns a byte-progress callback bound to `slot`.
    pub fn slot_reporter(&self, slot: usize) -> ByteProgress {
        let slots = Arc::clone(&self.slots);
        Arc::new(move |loaded| {
            if let Some(counter) = slots.get(slot) {
                counter.store(loaded, Ordering::Relaxed);
            }
        })
    }

    /// Records a completed operation of `bytes` in `slot`.
    ///
    /// Returns the new percentage if it differs from the last one reported.
    pub fn complete(&self, slot: usize, bytes: u64) -> Option<u8> {
        let mut acc = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(counter) = self.slots.get(slot) {
            counter.store(0, Ordering::Relaxed);
        }
        acc.processed += bytes;

        let now = Instant::now();
        acc.recent.push_back((now, bytes));
        while acc
            .recent
            .front()
            .is_some_and(|(at, _)| now.duration_since(*at) > THROUGHPUT_WINDOW)
        {
            acc.recent.pop_front();
        }

        let percentage = self.percentage_of(acc.processed);
        if acc.last_reported == Some(percentage) {
            return None;
        }
        acc.last_reported = Some(percentage);
        Some(percentage)
    }

    /// Reports 100 once the job is done if it has not been reported yet.
    pub fn finish(&self) -> Option<u8> {
        let mut acc = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if acc.last_reported == Some(100) {
            return None;
        }
        acc.last_reported = Some(100);
        Some(100)
    }

    /// Bytes of fully completed operations.
    pub fn processed(&self) -> u64 {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .processed
    }

    /// Sum of the in-flight counters.
    pub fn in_flight(&self) -> u64 {
        self.slots.iter().map(|s| s.load(Ordering::Relaxed)).sum()
    }

    /// Throughput of the completions inside the last window, in bytes/second.
    ///
    /// The window opens at the oldest retained completion, or at creation
    /// while only one completion is retained.
    pub fn bytes_per_second(&self) -> f64 {
        let acc = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(&(last, _)) = acc.recent.back() else {
            return 0.0;
        };
        let opened = match acc.recent.front() {
            Some(&(first, _)) if acc.recent.len() > 1 => first,
            _ => acc.started,
        };
        let elapsed = last.duration_since(opened);
        if elapsed.is_zero() {
            return 0.0;
        }
        let bytes: u64 = acc.recent.iter().map(|(_, b)| b).sum();
        bytes as f64 / elapsed.as_secs_f64()
    }

    fn percentage_of(&self, processed: u64) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let done = u128::from(processed + self.in_flight());
        let total = u128::from(self.total);
        let rounded = (done * 100 + total / 2) / total;
        rounded.min(100) as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_reports_only_changes() {
        let tracker = ProgressTracker::new(1000, 2);
        assert_eq!(tracker.complete(0, 1), Some(0));
        assert_eq!(tracker.complete(0, 1), None);
        assert_eq!(tracker.complete(1, 498), Some(50));
        assert_eq!(tracker.complete(0, 500), Some(100));
        assert_eq!(tracker.processed(), 1000);
    }

    #[test]
    fn in_flight_bytes_count_toward_percentage() {
        let tracker = ProgressTracker::new(200, 2);
        let reporter = tracker.slot_reporter(1);
        reporter(50);
        assert_eq!(tracker.in_flight(), 50);

        // Slot 0 completes while slot 1 is halfway.
        assert_eq!(tracker.complete(0, 100), Some(75));

        // Completion zeroes the slot before adding its final count.
        assert_eq!(tracker.complete(1, 100), Some(100));
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn rounding_is_half_up() {
        let tracker = ProgressTracker::new(200, 1);
        assert_eq!(tracker.complete(0, 1), Some(1)); // 0.5% rounds up
        let tracker = ProgressTracker::new(300, 1);
        assert_eq!(tracker.complete(0, 1), Some(0)); // 0.33%
    }

    #[test]
    fn zero_total_is_complete() {
        let tracker = ProgressTracker::new(0, 1);
        assert_eq!(tracker.complete(0, 0), Some(100));
        assert_eq!(tracker.finish(), None);

        let tracker = ProgressTracker::new(0, 1);
        assert_eq!(tracker.finish(), Some(100));
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn finish_skips_when_100_already_reported() {
        let tracker = ProgressTracker::new(10, 1);
        assert_eq!(tracker.complete(0, 10), Some(100));
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn out_of_range_slot_is_ignored() {
        let tracker = ProgressTracker::new(10, 1);
        (tracker.slot_reporter(5))(3);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.complete(5, 10), Some(100));
    }

    #[test]
    fn concurrent_completions_do_not_lose_updates() {
        use std::thread;

        let tracker = Arc::new(ProgressTracker::new(10_000, 10));
        let mut handles = vec![];
        for slot in 0..10 {
            let t = Arc::clone(&tracker);
            handles.push(thread::spawn(move || {
                let report = t.slot_reporter(slot);
                for _ in 0..100 {
                    report(5);
                    t.complete(slot, 10);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(tracker.processed(), 10_000);
        assert_eq!(tracker.in_flight(), 0);
        assert_eq!(tracker.finish(), None);
    }

    #[test]
    fn throughput_is_zero_without_completions() {
        let tracker = ProgressTracker::new(100, 1);
        assert_eq!(tracker.bytes_per_second(), 0.0);
    }

    #[test]
    fn throughput_counts_recent_completions() {
        let tracker = ProgressTracker::new(1000, 1);
        tracker.complete(0, 500);
        std::thread::sleep(Duration::from_millis(50));
        tracker.complete(0, 500);

        // Timing is imprecise; the window spans at least the sleep.
        let rate = tracker.bytes_per_second();
        assert!(rate > 0.0);
        assert!(rate <= 1000.0 / 0.05);
    }
}
