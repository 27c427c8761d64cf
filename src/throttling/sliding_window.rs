use super::MeasurementWindow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

struct Bucket {
    slot_start_ms: AtomicU64,
    count: AtomicU64,
}

/// Counter over a fixed-resolution sliding window.
///
/// Each bucket covers one resolution slot; a tick lands in the bucket of the
/// current slot, evicting a stale occupant by compare-and-set. The reported
/// rate is the sum of all buckets younger than the window, so the invariant
/// `rate == sum of ticks within the last window duration (at bucket
/// granularity)` holds without any locking.
pub struct SlidingWindowCounter {
    window: MeasurementWindow,
    buckets: Vec<Bucket>,
}

impl SlidingWindowCounter {
    pub fn new(window: MeasurementWindow) -> Self {
        let buckets = (0..window.bucket_count())
            .map(|_| Bucket {
                slot_start_ms: AtomicU64::new(0),
                count: AtomicU64::new(0),
            })
            .collect();
        Self { window, buckets }
    }

    pub fn window(&self) -> MeasurementWindow {
        self.window
    }

    pub fn increment(&self) {
        self.increment_at(now_ms());
    }

    pub fn rate(&self) -> u64 {
        self.rate_at(now_ms())
    }

    pub(crate) fn increment_at(&self, now_ms: u64) {
        let resolution_ms = self.window.resolution.as_millis() as u64;
        let slot_start = now_ms - now_ms % resolution_ms;
        let index = ((now_ms / resolution_ms) % self.buckets.len() as u64) as usize;
        let bucket = &self.buckets[index];

        let stamp = bucket.slot_start_ms.load(Ordering::Acquire);
        if stamp != slot_start {
            // The slot wrapped around; whoever wins the CAS resets the count.
            if bucket
                .slot_start_ms
                .compare_exchange(stamp, slot_start, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                bucket.count.store(0, Ordering::Release);
            }
        }
        bucket.count.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn rate_at(&self, now_ms: u64) -> u64 {
        let window_ms = self.window.duration.as_millis() as u64;
        self.buckets
            .iter()
            .filter(|bucket| {
                let slot_start = bucket.slot_start_ms.load(Ordering::Acquire);
                now_ms.saturating_sub(slot_start) < window_ms
            })
            .map(|bucket| bucket.count.load(Ordering::Acquire))
            .sum()
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}
