//! Pipeline metrics collection.
//!
//! Prometheus-facing record helpers plus an in-memory aggregator for
//! end-of-session summaries.

use contracts::SyncedFrame;
use metrics::{counter, gauge, histogram};

/// Record one published frame.
///
/// Call once per sensor-frame event leaving the capture stage.
pub fn record_frame_published(frame: &SyncedFrame) {
    counter!("fusion_frames_total").increment(1);
    gauge!("fusion_last_frame_id").set(frame.frame_id as f64);

    if frame.imu.is_none() && frame.inter_imu.is_empty() {
        counter!("fusion_frames_without_imu_total").increment(1);
    }
    if frame.color.is_none() {
        counter!("fusion_frames_without_color_total").increment(1);
    }
    if !frame.inter_imu.is_empty() {
        counter!("fusion_inter_imu_samples_total").increment(frame.inter_imu.len() as u64);
    }
}

/// Record a synchronization cycle that produced no frame set
pub fn record_sync_timeout() {
    counter!("fusion_sync_timeouts_total").increment(1);
}

/// Record the outcome of one pose estimation
pub fn record_pose_result(localized: bool) {
    let status = if localized { "localized" } else { "lost" };
    counter!("fusion_pose_results_total", "status" => status.to_string()).increment(1);
}

/// Record capture-to-pose latency
pub fn record_pose_latency_ms(latency_ms: f64) {
    histogram!("fusion_pose_latency_ms").record(latency_ms);
}

/// Record the current inertial window depth
pub fn record_imu_buffer_depth(stream: &str, depth: usize) {
    gauge!(
        "fusion_imu_buffer_depth",
        "stream" => stream.to_string()
    )
    .set(depth as f64);
}

/// In-memory session statistics
///
/// Aggregates per-frame observations so a summary can be printed at
/// session teardown without scraping the Prometheus endpoint.
#[derive(Debug, Clone, Default)]
pub struct SessionStatsAggregator {
    /// Frames published
    pub total_frames: u64,

    /// Frames carrying no inertial data at all
    pub frames_without_imu: u64,

    /// Pose estimations that failed to localize
    pub poses_lost: u64,

    /// Discrete inter-frame inertial events
    pub inter_imu_events: u64,

    /// Inter-frame interval statistics (milliseconds)
    pub interval_stats: RunningStats,

    /// Capture-to-pose latency statistics (milliseconds)
    pub latency_stats: RunningStats,

    last_frame_stamp_ms: Option<f64>,
}

impl SessionStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one published frame into the aggregate
    pub fn update_frame(&mut self, frame: &SyncedFrame) {
        self.total_frames += 1;
        self.inter_imu_events += frame.inter_imu.len() as u64;
        if frame.imu.is_none() && frame.inter_imu.is_empty() {
            self.frames_without_imu += 1;
        }

        let stamp_ms = frame.timestamp_s * 1000.0;
        if let Some(prev) = self.last_frame_stamp_ms {
            self.interval_stats.push(stamp_ms - prev);
        }
        self.last_frame_stamp_ms = Some(stamp_ms);
    }

    /// Fold one pose estimation outcome into the aggregate
    pub fn update_pose(&mut self, localized: bool, latency_ms: f64) {
        if !localized {
            self.poses_lost += 1;
        }
        self.latency_stats.push(latency_ms);
    }

    /// Produce a summary report
    pub fn report(&self) -> StatsReport {
        StatsReport {
            total_frames: self.total_frames,
            frames_without_imu: self.frames_without_imu,
            poses_lost: self.poses_lost,
            inter_imu_events: self.inter_imu_events,
            imu_miss_rate: if self.total_frames > 0 {
                self.frames_without_imu as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            lost_rate: if self.total_frames > 0 {
                self.poses_lost as f64 / self.total_frames as f64 * 100.0
            } else {
                0.0
            },
            frame_interval_ms: StatsSummary::from(&self.interval_stats),
            pose_latency_ms: StatsSummary::from(&self.latency_stats),
        }
    }

    /// Reset all aggregates
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Session summary
#[derive(Debug, Clone, Default)]
pub struct StatsReport {
    pub total_frames: u64,
    pub frames_without_imu: u64,
    pub poses_lost: u64,
    pub inter_imu_events: u64,
    pub imu_miss_rate: f64,
    pub lost_rate: f64,
    pub frame_interval_ms: StatsSummary,
    pub pose_latency_ms: StatsSummary,
}

impl std::fmt::Display for StatsReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Session Summary ===")?;
        writeln!(f, "Frames published: {}", self.total_frames)?;
        writeln!(
            f,
            "Frames without IMU: {} ({:.2}%)",
            self.frames_without_imu, self.imu_miss_rate
        )?;
        writeln!(
            f,
            "Poses lost: {} ({:.2}%)",
            self.poses_lost, self.lost_rate
        )?;
        writeln!(f, "Inter-frame IMU events: {}", self.inter_imu_events)?;
        writeln!(f, "Frame interval (ms): {}", self.frame_interval_ms)?;
        writeln!(f, "Pose latency (ms): {}", self.pose_latency_ms)?;
        Ok(())
    }
}

/// Flat view of a [`RunningStats`]
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// Fold in a new value
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
