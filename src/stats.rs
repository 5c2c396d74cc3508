// Copyright 2021 Twitter, Inc.
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Performance counters shared across the listener, workers, and cache.
//! Counters are plain atomics; the rolling mean response time needs a mutex
//! since it folds each sample into a running average.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct Stats {
    total_requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    bytes_served: AtomicU64,
    response_time: Mutex<ResponseTime>,
}

#[derive(Default)]
struct ResponseTime {
    mean_ms: f64,
    samples: u64,
}

impl Stats {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Folds one completed request into the counters: bytes written to the
    /// client and the wall time the handler spent on it.
    pub fn record_request(&self, bytes: u64, elapsed: Duration) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.bytes_served.fetch_add(bytes, Ordering::Relaxed);

        let sample_ms = elapsed.as_secs_f64() * 1000.0;
        let mut rt = self.response_time.lock().unwrap();
        rt.mean_ms = (rt.mean_ms * rt.samples as f64 + sample_ms) / (rt.samples + 1) as f64;
        rt.samples += 1;
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn cache_misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn bytes_served(&self) -> u64 {
        self.bytes_served.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self, cache_bytes: usize) -> Snapshot {
        Snapshot {
            total_requests: self.total_requests(),
            cache_hits: self.cache_hits(),
            cache_misses: self.cache_misses(),
            bytes_served: self.bytes_served(),
            mean_response_ms: self.response_time.lock().unwrap().mean_ms,
            cache_bytes,
        }
    }
}

/// A point-in-time copy of the counters, rendered as the human-readable
/// statistics block.
pub struct Snapshot {
    pub total_requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub bytes_served: u64,
    pub mean_response_ms: f64,
    pub cache_bytes: usize,
}

impl Snapshot {
    fn percent(&self, count: u64) -> f64 {
        if self.total_requests > 0 {
            count as f64 * 100.0 / self.total_requests as f64
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Performance Statistics ===")?;
        writeln!(f, "Total Requests: {}", self.total_requests)?;
        writeln!(
            f,
            "Cache Hits: {} ({:.2}%)",
            self.cache_hits,
            self.percent(self.cache_hits)
        )?;
        writeln!(
            f,
            "Cache Misses: {} ({:.2}%)",
            self.cache_misses,
            self.percent(self.cache_misses)
        )?;
        writeln!(f, "Bytes Served: {} MB", self.bytes_served / (1024 * 1024))?;
        writeln!(f, "Average Response Time: {:.2} ms", self.mean_response_ms)?;
        write!(
            f,
            "Cache Size: {} bytes ({:.2} MB)",
            self.cache_bytes,
            self.cache_bytes as f64 / (1024.0 * 1024.0)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rolling_mean_tracks_samples() {
        let stats = Stats::new();
        stats.record_request(0, Duration::from_millis(10));
        stats.record_request(0, Duration::from_millis(20));
        stats.record_request(0, Duration::from_millis(30));

        let snapshot = stats.snapshot(0);
        assert_eq!(snapshot.total_requests, 3);
        assert!((snapshot.mean_response_ms - 20.0).abs() < 0.01);
    }

    #[test]
    fn bytes_accumulate() {
        let stats = Stats::new();
        stats.record_request(100, Duration::from_millis(1));
        stats.record_request(250, Duration::from_millis(1));
        assert_eq!(stats.bytes_served(), 350);
    }

    #[test]
    fn report_covers_hit_ratio() {
        let stats = Stats::new();
        stats.record_hit();
        stats.record_miss();
        stats.record_request(5, Duration::from_millis(1));
        stats.record_request(5, Duration::from_millis(1));

        let rendered = stats.snapshot(1024).to_string();
        assert!(rendered.contains("Cache Hits: 1 (50.00%)"));
        assert!(rendered.contains("Cache Misses: 1 (50.00%)"));
        assert!(rendered.contains("Cache Size: 1024 bytes"));
    }
}
