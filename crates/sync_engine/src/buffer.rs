//! Bounded, time-ordered inertial sample windows.
//!
//! One ring per stream (accelerometer, gyroscope), both behind a single
//! exclusive lock. Driver callback threads append; the capture thread reads.
//! The window retains the most recent `capacity` samples, oldest evicted
//! first - a sliding window read concurrently while being appended, not a
//! queue.

use std::sync::{Mutex, PoisonError};

use contracts::{ImuSample, ImuStream};
use ringbuf::{traits::*, HeapRb};
use tracing::debug;

/// Where a target timestamp lands relative to the buffered window
#[derive(Debug, Clone, Copy)]
pub(crate) enum Bracket {
    /// Target matches a stored sample exactly
    Exact(ImuSample),
    /// Target lies between these two consecutive samples
    Span(ImuSample, ImuSample),
    /// Target falls outside the window; `newest` supports the restamp fallback
    Outside {
        lower: ImuSample,
        upper: ImuSample,
        newest: ImuSample,
    },
}

/// One stream's bounded window
struct ImuRing {
    ring: HeapRb<ImuSample>,
    last_timestamp: Option<f64>,
    out_of_order: u64,
}

impl ImuRing {
    fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity),
            last_timestamp: None,
            out_of_order: 0,
        }
    }

    /// Append a sample, evicting the oldest when full.
    ///
    /// The driver contract guarantees non-decreasing timestamps per stream;
    /// delivery order is kept as-is. An out-of-order arrival is tolerated
    /// and counted, not corrected - bracket lookups may then return a
    /// non-minimal span for the affected region of the window.
    fn push(&mut self, sample: ImuSample) {
        if let Some(last) = self.last_timestamp {
            if sample.timestamp_ms < last {
                self.out_of_order += 1;
                debug!(
                    timestamp_ms = sample.timestamp_ms,
                    last_ms = last,
                    "out-of-order inertial sample"
                );
            }
        }
        self.last_timestamp = Some(sample.timestamp_ms);
        self.ring.push_overwrite(sample);
    }

    fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    fn newest(&self) -> Option<ImuSample> {
        self.ring.iter().last().copied()
    }

    /// Locate the bracketing pair for `target_ms`.
    ///
    /// Mirrors an ordered-map `lower_bound` with both ends clamped: the
    /// at-or-after sample plus its predecessor.
    fn bracket(&self, target_ms: f64) -> Option<Bracket> {
        let newest = self.newest()?;

        let mut before_prev: Option<ImuSample> = None;
        let mut prev: Option<ImuSample> = None;
        let mut at_or_after: Option<ImuSample> = None;
        for sample in self.ring.iter() {
            if sample.timestamp_ms >= target_ms {
                at_or_after = Some(*sample);
                break;
            }
            before_prev = prev;
            prev = Some(*sample);
        }

        Some(match (prev, at_or_after) {
            // Window starts at or after the target
            (None, Some(b)) => {
                if b.timestamp_ms == target_ms {
                    Bracket::Exact(b)
                } else {
                    Bracket::Outside {
                        lower: b,
                        upper: b,
                        newest,
                    }
                }
            }
            // Target inside the window
            (Some(a), Some(b)) => {
                if b.timestamp_ms == target_ms {
                    Bracket::Exact(b)
                } else {
                    Bracket::Span(a, b)
                }
            }
            // Target beyond the newest sample
            (Some(a), None) => Bracket::Outside {
                lower: before_prev.unwrap_or(a),
                upper: a,
                newest,
            },
            (None, None) => return None,
        })
    }

    /// Timestamps strictly between `lo_ms` and `hi_ms`, ascending
    fn timestamps_between(&self, lo_ms: f64, hi_ms: f64) -> Vec<f64> {
        self.ring
            .iter()
            .map(|s| s.timestamp_ms)
            .filter(|ts| *ts > lo_ms && *ts < hi_ms)
            .collect()
    }
}

/// Accelerometer + gyroscope windows behind one exclusive lock
///
/// The lock is held only for the duration of a single append or query; the
/// interpolator's bounded waits release it between poll iterations.
pub struct ImuBufferPair {
    inner: Mutex<Streams>,
}

struct Streams {
    accel: ImuRing,
    gyro: ImuRing,
}

impl ImuBufferPair {
    /// Create windows retaining the most recent `capacity` samples per stream
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Streams {
                accel: ImuRing::new(capacity),
                gyro: ImuRing::new(capacity),
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Streams> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_ring<R>(&self, stream: ImuStream, f: impl FnOnce(&ImuRing) -> R) -> R {
        let guard = self.lock();
        match stream {
            ImuStream::Accel => f(&guard.accel),
            ImuStream::Gyro => f(&guard.gyro),
        }
    }

    /// Append a sample under the exclusive lock
    pub fn record(&self, stream: ImuStream, sample: ImuSample) {
        let mut guard = self.lock();
        let ring = match stream {
            ImuStream::Accel => &mut guard.accel,
            ImuStream::Gyro => &mut guard.gyro,
        };
        ring.push(sample);
        drop(guard);
        metrics::counter!("fusion_imu_samples_total", "stream" => stream_label(stream))
            .increment(1);
    }

    /// Number of buffered samples for one stream
    pub fn len(&self, stream: ImuStream) -> usize {
        self.with_ring(stream, |r| r.len())
    }

    /// Whether one stream's window is empty
    pub fn is_empty(&self, stream: ImuStream) -> bool {
        self.len(stream) == 0
    }

    /// Timestamp of the newest buffered sample for one stream
    pub fn latest_timestamp(&self, stream: ImuStream) -> Option<f64> {
        self.with_ring(stream, |r| r.newest().map(|s| s.timestamp_ms))
    }

    /// Out-of-order arrivals observed on one stream (diagnostics)
    pub fn out_of_order_count(&self, stream: ImuStream) -> u64 {
        self.with_ring(stream, |r| r.out_of_order)
    }

    /// Oldest buffered timestamp for one stream
    pub fn earliest_timestamp(&self, stream: ImuStream) -> Option<f64> {
        self.with_ring(stream, |r| r.ring.iter().next().map(|s| s.timestamp_ms))
    }

    /// Gyro sample timestamps strictly between two instants, ascending
    pub fn gyro_timestamps_between(&self, lo_ms: f64, hi_ms: f64) -> Vec<f64> {
        self.with_ring(ImuStream::Gyro, |r| r.timestamps_between(lo_ms, hi_ms))
    }

    pub(crate) fn bracket(&self, stream: ImuStream, target_ms: f64) -> Option<Bracket> {
        self.with_ring(stream, |r| r.bracket(target_ms))
    }
}

fn stream_label(stream: ImuStream) -> &'static str {
    match stream {
        ImuStream::Accel => "accel",
        ImuStream::Gyro => "gyro",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    fn sample(ts: f64) -> ImuSample {
        ImuSample::new(ts, Vector3::new(0.0, 0.0, ts as f32))
    }

    #[test]
    fn eviction_keeps_most_recent_capacity() {
        let buffers = ImuBufferPair::new(1000);
        for i in 0..1001 {
            buffers.record(ImuStream::Accel, sample(i as f64));
        }
        assert_eq!(buffers.len(ImuStream::Accel), 1000);
        // Oldest (t=0) evicted, newest retained
        assert_eq!(buffers.earliest_timestamp(ImuStream::Accel), Some(1.0));
        assert_eq!(buffers.latest_timestamp(ImuStream::Accel), Some(1000.0));
    }

    #[test]
    fn streams_are_independent() {
        let buffers = ImuBufferPair::new(10);
        buffers.record(ImuStream::Accel, sample(1.0));
        assert_eq!(buffers.len(ImuStream::Accel), 1);
        assert!(buffers.is_empty(ImuStream::Gyro));
    }

    #[test]
    fn out_of_order_is_counted_not_corrected() {
        let buffers = ImuBufferPair::new(10);
        buffers.record(ImuStream::Gyro, sample(10.0));
        buffers.record(ImuStream::Gyro, sample(5.0));
        assert_eq!(buffers.out_of_order_count(ImuStream::Gyro), 1);
        // Delivery order preserved: newest-by-insertion is the late sample
        assert_eq!(buffers.latest_timestamp(ImuStream::Gyro), Some(5.0));
    }

    #[test]
    fn bracket_exact_hit() {
        let buffers = ImuBufferPair::new(10);
        for ts in [100.0, 200.0, 300.0] {
            buffers.record(ImuStream::Accel, sample(ts));
        }
        match buffers.bracket(ImuStream::Accel, 200.0) {
            Some(Bracket::Exact(s)) => assert_eq!(s.timestamp_ms, 200.0),
            other => panic!("expected exact hit, got {other:?}"),
        }
    }

    #[test]
    fn bracket_span_between_samples() {
        let buffers = ImuBufferPair::new(10);
        for ts in [100.0, 200.0] {
            buffers.record(ImuStream::Accel, sample(ts));
        }
        match buffers.bracket(ImuStream::Accel, 150.0) {
            Some(Bracket::Span(a, b)) => {
                assert_eq!(a.timestamp_ms, 100.0);
                assert_eq!(b.timestamp_ms, 200.0);
            }
            other => panic!("expected span, got {other:?}"),
        }
    }

    #[test]
    fn bracket_before_window_is_outside() {
        let buffers = ImuBufferPair::new(10);
        for ts in [100.0, 200.0] {
            buffers.record(ImuStream::Accel, sample(ts));
        }
        match buffers.bracket(ImuStream::Accel, 50.0) {
            Some(Bracket::Outside { lower, upper, .. }) => {
                assert_eq!(lower.timestamp_ms, 100.0);
                assert_eq!(upper.timestamp_ms, 100.0);
            }
            other => panic!("expected outside, got {other:?}"),
        }
    }

    #[test]
    fn bracket_beyond_window_reports_newest() {
        let buffers = ImuBufferPair::new(10);
        for ts in [100.0, 200.0] {
            buffers.record(ImuStream::Accel, sample(ts));
        }
        match buffers.bracket(ImuStream::Accel, 250.0) {
            Some(Bracket::Outside { newest, .. }) => assert_eq!(newest.timestamp_ms, 200.0),
            other => panic!("expected outside, got {other:?}"),
        }
    }

    #[test]
    fn gyro_timestamps_between_is_strictly_exclusive() {
        let buffers = ImuBufferPair::new(10);
        for ts in [100.0, 150.0, 200.0, 250.0, 300.0] {
            buffers.record(ImuStream::Gyro, sample(ts));
        }
        let stamps = buffers.gyro_timestamps_between(100.0, 300.0);
        assert_eq!(stamps, vec![150.0, 200.0, 250.0]);
    }
}
