//! Frame synchronizer: assembles one complete instant from independent
//! color/infrared/depth streams.
//!
//! The driver's wait-for-frame-set primitive yields whatever subset of
//! streams happens to be ready; this loop retains the first frame of each
//! kind seen until depth and infrared are both present or the timeout
//! elapses. Depth and infrared are mandatory; color is best-effort (a stale
//! color frame is acceptable, stale depth/infrared is not).

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use contracts::{CameraDriver, ImageData, ImageFormat, StreamProfile};
use tracing::{debug, warn};

/// Frame timestamps this far ahead of the host clock indicate a broken
/// device clock, not ordinary jitter (seconds).
const CLOCK_SKEW_FUTURE_S: f64 = 1.0e9;

/// Synchronization timing knobs
#[derive(Debug, Clone, Copy)]
pub struct SyncTiming {
    /// Overall budget for assembling one complete frame set
    pub frame_timeout: Duration,

    /// Single wait-for-frame-set poll
    pub poll_timeout: Duration,
}

impl Default for SyncTiming {
    fn default() -> Self {
        Self {
            frame_timeout: Duration::from_secs(2),
            poll_timeout: Duration::from_millis(100),
        }
    }
}

/// One synchronized set of raw images
#[derive(Debug, Clone)]
pub struct RawFrames {
    /// Host-normalized timestamp (seconds)
    pub timestamp_s: f64,

    /// Infrared image
    pub infrared: ImageData,

    /// Depth image
    pub depth: ImageData,

    /// Color image; most recent available, possibly older than `timestamp_s`
    pub color: ImageData,
}

/// Collects frames from independent streams into complete instants.
///
/// Single-writer/single-reader: only the capture thread calls into this, so
/// the internal frame cache needs no lock.
pub struct FrameSynchronizer {
    timing: SyncTiming,
    prev_color: ImageData,
    clock_warned: bool,
}

impl FrameSynchronizer {
    /// Create a synchronizer; the stale-color slot is seeded with a zeroed
    /// frame of the configured color resolution so every synced frame
    /// carries a color image.
    pub fn new(timing: SyncTiming, color_profile: &StreamProfile) -> Self {
        Self {
            timing,
            prev_color: ImageData::zeroed(color_profile.width, color_profile.height, ImageFormat::Rgb8),
            clock_warned: false,
        }
    }

    /// Acquire one synchronized frame set, or `None` within the timeout.
    ///
    /// Failure is reported, not fatal; the caller skips the cycle.
    pub async fn capture<D: CameraDriver>(&mut self, driver: &mut D) -> Option<RawFrames> {
        let start = Instant::now();
        let mut timestamp_ms = 0.0;
        let mut color: Option<ImageData> = None;
        let mut infrared: Option<ImageData> = None;
        let mut depth: Option<ImageData> = None;

        loop {
            if let Some(set) = driver.wait_for_frame_set(self.timing.poll_timeout).await {
                timestamp_ms = set.timestamp_ms;
                color = color.or(set.color);
                infrared = infrared.or(set.infrared);
                depth = depth.or(set.depth);
            }

            if infrared.is_some() && depth.is_some() {
                break;
            }
            if start.elapsed() >= self.timing.frame_timeout {
                warn!(
                    timeout_s = self.timing.frame_timeout.as_secs_f64(),
                    "missing required frames"
                );
                metrics::counter!("fusion_frames_missed_total").increment(1);
                return None;
            }
        }

        let timestamp_s = self.normalize_timestamp(timestamp_ms / 1000.0);

        if let Some(color) = color {
            self.prev_color = color;
        }

        debug!(timestamp_s, "frame set arrived");
        Some(RawFrames {
            timestamp_s,
            infrared: infrared?,
            depth: depth?,
            color: self.prev_color.clone(),
        })
    }

    /// Substitute host time for stamps in the far future (broken device
    /// clock); degrades precision but never aborts capture.
    fn normalize_timestamp(&mut self, stamp_s: f64) -> f64 {
        let now_s = host_now_s();
        if stamp_s - now_s > CLOCK_SKEW_FUTURE_S {
            if !self.clock_warned {
                warn!(
                    stamp_s,
                    host_s = now_s,
                    "device clock is not in sync with the host; using host time \
                     instead (shown once)"
                );
                self.clock_warned = true;
            }
            metrics::counter!("fusion_clock_skew_total").increment(1);
            return now_s;
        }
        stamp_s
    }
}

/// Host wall clock as seconds since the Unix epoch
pub fn host_now_s() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
