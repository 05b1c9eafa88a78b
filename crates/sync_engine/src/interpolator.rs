//! Fused inertial estimates for arbitrary timestamps.
//!
//! Converts the asynchronous inertial streams into a bounded-latency,
//! on-demand service for the capture loop: a request for time `t` either
//! returns an estimate backed by buffered data or fails within the wait
//! budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{FusedImu, ImuStream};
use nalgebra::Vector3;
use tokio::time::sleep;
use tracing::warn;

use crate::buffer::{Bracket, ImuBufferPair};

/// Interpolator behavior knobs
#[derive(Debug, Clone, Copy)]
pub struct InterpolatorConfig {
    /// Only return estimates backed by data at or after the target; when
    /// disabled, stale data may be re-stamped instead
    pub global_time_sync: bool,

    /// Poll resolution of the bounded wait (the lock is released while
    /// sleeping)
    pub poll_interval: Duration,
}

impl Default for InterpolatorConfig {
    fn default() -> Self {
        Self {
            global_time_sync: true,
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Inertial interpolator over a shared buffer pair
pub struct ImuInterpolator {
    buffers: Arc<ImuBufferPair>,
    config: InterpolatorConfig,
    desync_warned: AtomicBool,
    restamp_warned: AtomicBool,
}

impl ImuInterpolator {
    /// Create an interpolator reading from `buffers`
    pub fn new(buffers: Arc<ImuBufferPair>, config: InterpolatorConfig) -> Self {
        Self {
            buffers,
            config,
            desync_warned: AtomicBool::new(false),
            restamp_warned: AtomicBool::new(false),
        }
    }

    /// Produce a fused accel+gyro estimate for `target_ms`.
    ///
    /// Both streams are interpolated independently with the identical
    /// algorithm; the composite requires both to succeed. `None` means the
    /// caller should proceed without inertial data for this cycle.
    pub async fn estimate(&self, target_ms: f64, max_wait: Duration) -> Option<FusedImu> {
        if self.buffers.is_empty(ImuStream::Accel) || self.buffers.is_empty(ImuStream::Gyro) {
            return None;
        }

        let accel = self.sample_stream(ImuStream::Accel, target_ms, max_wait).await?;
        let gyro = self.sample_stream(ImuStream::Gyro, target_ms, max_wait).await?;

        Some(FusedImu {
            timestamp_ms: target_ms,
            accel,
            gyro,
        })
    }

    async fn sample_stream(
        &self,
        stream: ImuStream,
        target_ms: f64,
        max_wait: Duration,
    ) -> Option<Vector3<f32>> {
        if self.config.global_time_sync {
            // Block (lock released per iteration) until data covering the
            // target arrives or the wait budget runs out.
            let mut waited = Duration::ZERO;
            while !max_wait.is_zero()
                && waited < max_wait
                && self.newest_precedes(stream, target_ms)
            {
                sleep(self.config.poll_interval).await;
                waited += self.config.poll_interval;
            }

            if self.newest_precedes(stream, target_ms) {
                if !max_wait.is_zero() {
                    warn!(
                        stream = ?stream,
                        target_s = target_ms / 1000.0,
                        waited_ms = max_wait.as_millis() as u64,
                        newest_s = self.buffers.latest_timestamp(stream).unwrap_or(0.0) / 1000.0,
                        "no inertial data to interpolate at image time after waiting"
                    );
                    metrics::counter!("fusion_imu_wait_timeouts_total").increment(1);
                }
                return None;
            }
        }

        match self.buffers.bracket(stream, target_ms)? {
            Bracket::Exact(s) => Some(s.v),
            Bracket::Span(a, b) => {
                let t = ((target_ms - a.timestamp_ms) / (b.timestamp_ms - a.timestamp_ms)) as f32;
                Some(a.v + (b.v - a.v) * t)
            }
            Bracket::Outside { lower, upper, newest } => {
                if !self.desync_warned.load(Ordering::Relaxed) {
                    if target_ms < lower.timestamp_ms {
                        warn!(
                            stream = ?stream,
                            target_s = target_ms / 1000.0,
                            earliest_s = lower.timestamp_ms / 1000.0,
                            "no inertial data to interpolate at image time; are sensors synchronized?"
                        );
                    } else {
                        warn!(
                            stream = ?stream,
                            target_s = target_ms / 1000.0,
                            lower_s = lower.timestamp_ms / 1000.0,
                            upper_s = upper.timestamp_ms / 1000.0,
                            "no inertial data to interpolate at image time; are sensors synchronized?"
                        );
                    }
                    self.desync_warned.store(true, Ordering::Relaxed);
                }

                if self.config.global_time_sync {
                    return None;
                }

                if !self.restamp_warned.swap(true, Ordering::Relaxed) {
                    warn!(
                        "global time sync is off; latest inertial samples will be \
                         re-stamped with image time (shown once)"
                    );
                }
                metrics::counter!("fusion_imu_restamp_fallbacks_total").increment(1);
                Some(newest.v)
            }
        }
    }

    fn newest_precedes(&self, stream: ImuStream, target_ms: f64) -> bool {
        match self.buffers.latest_timestamp(stream) {
            Some(newest) => newest < target_ms,
            None => true,
        }
    }
}
