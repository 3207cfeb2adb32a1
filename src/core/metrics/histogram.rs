//! Lock-free latency histogram with log2 buckets.
//!
//! Bucket `k` covers `[2^k, 2^(k+1))` nanoseconds, bucket 0 covers `[0, 1]`.
//! Recording is two relaxed increments; percentiles are computed offline by
//! materializing bucket midpoints and running a partial selection, which is
//! an approximation bounded by the bucket width.

use std::sync::atomic::{AtomicU64, Ordering};

pub const NUM_BUCKETS: usize = 64;

pub struct LatencyHistogram {
    buckets: [AtomicU64; NUM_BUCKETS],
    total_count: AtomicU64,
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
            total_count: AtomicU64::new(0),
        }
    }

    /// Record one latency sample in nanoseconds.
    pub fn record(&self, latency_ns: u64) {
        let bucket = Self::bucket_for(latency_ns);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
        self.total_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_count(&self) -> u64 {
        self.total_count.load(Ordering::Relaxed)
    }

    pub fn bucket_count(&self, bucket: usize) -> u64 {
        if bucket >= NUM_BUCKETS {
            return 0;
        }
        self.buckets[bucket].load(Ordering::Relaxed)
    }

    /// Approximate p-th percentile (0-100) in nanoseconds.
    pub fn percentile(&self, p: f64) -> u64 {
        let mut samples = Vec::new();
        for b in 0..NUM_BUCKETS {
            let count = self.bucket_count(b);
            if count == 0 {
                continue;
            }
            let midpoint = Self::bucket_min(b) + (1u64 << b) / 2;
            samples.extend(std::iter::repeat(midpoint).take(count as usize));
        }
        if samples.is_empty() {
            return 0;
        }
        let mut idx = ((p / 100.0) * samples.len() as f64) as usize;
        if idx >= samples.len() {
            idx = samples.len() - 1;
        }
        let (_, nth, _) = samples.select_nth_unstable(idx);
        *nth
    }

    /// Lower bound of the first non-empty bucket.
    pub fn min_value(&self) -> u64 {
        (0..NUM_BUCKETS)
            .find(|&b| self.bucket_count(b) > 0)
            .map(Self::bucket_min)
            .unwrap_or(0)
    }

    /// Upper bound of the last non-empty bucket.
    pub fn max_value(&self) -> u64 {
        (0..NUM_BUCKETS)
            .rev()
            .find(|&b| self.bucket_count(b) > 0)
            .map(Self::bucket_max)
            .unwrap_or(0)
    }

    pub fn reset(&self) {
        for bucket in &self.buckets {
            bucket.store(0, Ordering::Relaxed);
        }
        self.total_count.store(0, Ordering::Relaxed);
    }

    /// Bucket index = position of the most significant bit. 0 and 1 both
    /// land in bucket 0.
    fn bucket_for(latency_ns: u64) -> usize {
        if latency_ns <= 1 {
            return 0;
        }
        let msb = 63 - latency_ns.leading_zeros() as usize;
        msb.min(NUM_BUCKETS - 1)
    }

    fn bucket_min(bucket: usize) -> u64 {
        if bucket == 0 {
            0
        } else {
            1u64 << bucket
        }
    }

    fn bucket_max(bucket: usize) -> u64 {
        if bucket == NUM_BUCKETS - 1 {
            u64::MAX
        } else {
            (1u64 << (bucket + 1)) - 1
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_and_one_share_bucket_zero() {
        let hist = LatencyHistogram::new();
        hist.record(0);
        hist.record(1);
        assert_eq!(hist.bucket_count(0), 2);
        assert_eq!(hist.total_count(), 2);
    }

    #[test]
    fn large_values_land_in_last_bucket() {
        let hist = LatencyHistogram::new();
        hist.record(1u64 << 63);
        hist.record(u64::MAX);
        assert_eq!(hist.bucket_count(NUM_BUCKETS - 1), 2);
    }

    #[test]
    fn bucket_boundaries() {
        let hist = LatencyHistogram::new();
        hist.record(2); // bucket 1
        hist.record(3); // bucket 1
        hist.record(4); // bucket 2
        hist.record(7); // bucket 2
        hist.record(8); // bucket 3
        assert_eq!(hist.bucket_count(1), 2);
        assert_eq!(hist.bucket_count(2), 2);
        assert_eq!(hist.bucket_count(3), 1);
    }

    #[test]
    fn min_max_scan_nonempty_buckets() {
        let hist = LatencyHistogram::new();
        assert_eq!(hist.min_value(), 0);
        assert_eq!(hist.max_value(), 0);
        hist.record(100); // bucket 6 ([64, 127])
        hist.record(5000); // bucket 12 ([4096, 8191])
        assert_eq!(hist.min_value(), 64);
        assert_eq!(hist.max_value(), 8191);
    }

    #[test]
    fn percentiles_are_ordered() {
        let hist = LatencyHistogram::new();
        for i in 1..=1000u64 {
            hist.record(i * 1000);
        }
        let p50 = hist.percentile(50.0);
        let p99 = hist.percentile(99.0);
        assert!(p50 <= p99);
        assert!(p50 > 0);
        // Median of 1k..1M ns should sit in the hundreds of microseconds.
        assert!(p50 >= 256_000 && p50 <= 1_048_576);
    }

    #[test]
    fn reset_clears_counts() {
        let hist = LatencyHistogram::new();
        hist.record(42);
        hist.reset();
        assert_eq!(hist.total_count(), 0);
        assert_eq!(hist.percentile(99.0), 0);
    }
}
