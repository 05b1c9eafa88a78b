//! Capture worker: synchronization cycle and event publication.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{
    CameraDriver, CameraIntrinsics, FusedImu, ImuAttachment, ImuStream, SessionConfig,
    SyncedFrame,
};
use observability::SessionStatsAggregator;
use pipeline::{InterImuEvent, PipelineBus, SensorFrameEvent, CAPTURE_STAGE};
use sync_engine::{
    FrameSynchronizer, ImuBufferPair, ImuInterpolator, InterpolatorConfig, RawFrames, SyncTiming,
};

/// Counters maintained by the capture worker
#[derive(Debug, Default)]
pub struct CaptureMetrics {
    frames_published: AtomicU64,
    sync_timeouts: AtomicU64,
    imu_missing: AtomicU64,
    inter_imu_published: AtomicU64,
}

/// Point-in-time copy of [`CaptureMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSnapshot {
    pub frames_published: u64,
    pub sync_timeouts: u64,
    pub imu_missing: u64,
    pub inter_imu_published: u64,
}

impl CaptureMetrics {
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            sync_timeouts: self.sync_timeouts.load(Ordering::Relaxed),
            imu_missing: self.imu_missing.load(Ordering::Relaxed),
            inter_imu_published: self.inter_imu_published.load(Ordering::Relaxed),
        }
    }
}

/// One camera's capture loop, generic over the driver backend
///
/// The driver must already be open with streams started; the stage only
/// consumes frame sets and the inertial buffers the driver callback fills.
pub struct CaptureStage<D> {
    driver: D,
    synchronizer: FrameSynchronizer,
    interpolator: ImuInterpolator,
    buffers: Arc<ImuBufferPair>,
    bus: Arc<PipelineBus>,
    intrinsics: CameraIntrinsics,
    attachment: ImuAttachment,
    imu_max_wait: Duration,
    next_frame_id: u64,
    last_frame_stamp_ms: f64,
    metrics: Arc<CaptureMetrics>,
    stats: Arc<Mutex<SessionStatsAggregator>>,
}

impl<D: CameraDriver + 'static> CaptureStage<D> {
    pub fn new(
        driver: D,
        buffers: Arc<ImuBufferPair>,
        bus: Arc<PipelineBus>,
        intrinsics: CameraIntrinsics,
        config: &SessionConfig,
        stats: Arc<Mutex<SessionStatsAggregator>>,
    ) -> Self {
        let timing = SyncTiming {
            frame_timeout: Duration::from_secs_f64(config.frame_timeout_s),
            poll_timeout: Duration::from_millis(config.frame_poll_ms),
        };
        let interpolator = ImuInterpolator::new(
            Arc::clone(&buffers),
            InterpolatorConfig {
                global_time_sync: config.global_time_sync,
                poll_interval: Duration::from_millis(config.imu_poll_interval_ms),
            },
        );
        Self {
            driver,
            synchronizer: FrameSynchronizer::new(timing, &config.color),
            interpolator,
            buffers,
            bus,
            intrinsics,
            attachment: config.imu_attachment,
            imu_max_wait: Duration::from_millis(config.imu_max_wait_ms),
            next_frame_id: 1,
            last_frame_stamp_ms: 0.0,
            metrics: Arc::new(CaptureMetrics::default()),
            stats,
        }
    }

    /// Start the capture loop on its own task
    pub fn spawn(self) -> CaptureHandle {
        let running = Arc::new(AtomicBool::new(true));
        let metrics = Arc::clone(&self.metrics);
        let worker = tokio::spawn(self.run(Arc::clone(&running)));
        CaptureHandle {
            running,
            worker,
            metrics,
        }
    }

    #[instrument(skip_all, fields(device = self.driver.device_name()))]
    async fn run(mut self, running: Arc<AtomicBool>) {
        info!("capture loop started");
        while running.load(Ordering::Acquire) {
            match self.synchronizer.capture(&mut self.driver).await {
                Some(raw) => self.publish_cycle(raw).await,
                None => {
                    self.metrics.sync_timeouts.fetch_add(1, Ordering::Relaxed);
                    observability::record_sync_timeout();
                }
            }
        }
        self.driver.stop();
        info!(
            frames = self.metrics.frames_published.load(Ordering::Relaxed),
            "capture loop stopped"
        );
    }

    async fn publish_cycle(&mut self, raw: RawFrames) {
        let frame_stamp_ms = raw.timestamp_s * 1000.0;

        let (imu, inter_imu) = match self.attachment {
            ImuAttachment::Single => (self.single_estimate(frame_stamp_ms).await, Vec::new()),
            ImuAttachment::InterFrame => (None, self.publish_inter_imu(frame_stamp_ms).await),
        };
        self.last_frame_stamp_ms = frame_stamp_ms;

        let frame = SyncedFrame {
            frame_id: self.next_frame_id,
            timestamp_s: raw.timestamp_s,
            infrared: raw.infrared,
            depth: raw.depth,
            color: Some(raw.color),
            intrinsics: self.intrinsics,
            imu,
            inter_imu,
        };
        self.next_frame_id += 1;
        self.metrics.frames_published.fetch_add(1, Ordering::Relaxed);
        observability::record_frame_published(&frame);
        observability::record_imu_buffer_depth("accel", self.buffers.len(ImuStream::Accel));
        observability::record_imu_buffer_depth("gyro", self.buffers.len(ImuStream::Gyro));
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .update_frame(&frame);
        self.bus
            .publish(CAPTURE_STAGE, Arc::new(SensorFrameEvent { frame: Arc::new(frame) }));
    }

    async fn single_estimate(&mut self, frame_stamp_ms: f64) -> Option<FusedImu> {
        let fused = self
            .interpolator
            .estimate(frame_stamp_ms, self.imu_max_wait)
            .await;
        if fused.is_none() {
            self.metrics.imu_missing.fetch_add(1, Ordering::Relaxed);
            debug!(frame_stamp_ms, "frame published without inertial estimate");
        }
        fused
    }

    /// Emit one inertial event per native gyro sample strictly between the
    /// previous and current frame instants, oldest first, each before the
    /// frame event itself.
    async fn publish_inter_imu(&mut self, frame_stamp_ms: f64) -> Vec<FusedImu> {
        if self.last_frame_stamp_ms <= 0.0
            || self.buffers.is_empty(contracts::ImuStream::Gyro)
        {
            return Vec::new();
        }
        assert!(
            frame_stamp_ms > self.last_frame_stamp_ms,
            "frame timestamps must be strictly increasing ({frame_stamp_ms} <= {})",
            self.last_frame_stamp_ms
        );

        let stamps = self
            .buffers
            .gyro_timestamps_between(self.last_frame_stamp_ms, frame_stamp_ms);
        let mut published = Vec::with_capacity(stamps.len());
        for stamp_ms in stamps {
            // All data is already buffered at this point; never wait
            let Some(sample) = self.interpolator.estimate(stamp_ms, Duration::ZERO).await
            else {
                self.metrics.imu_missing.fetch_add(1, Ordering::Relaxed);
                break;
            };
            self.bus
                .publish(CAPTURE_STAGE, Arc::new(InterImuEvent { sample }));
            self.metrics
                .inter_imu_published
                .fetch_add(1, Ordering::Relaxed);
            published.push(sample);
        }
        published
    }
}

/// Owner-side handle to a running capture worker
pub struct CaptureHandle {
    running: Arc<AtomicBool>,
    worker: JoinHandle<()>,
    metrics: Arc<CaptureMetrics>,
}

impl CaptureHandle {
    /// Counter view shared with the worker
    pub fn metrics(&self) -> Arc<CaptureMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Request the loop to finish its current cycle and wait for it.
    ///
    /// Blocks for at most one frame-synchronization timeout; the driver's
    /// streams are stopped before the worker exits.
    pub async fn stop(self) {
        self.running.store(false, Ordering::Release);
        if self.worker.await.is_err() {
            warn!("capture worker panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{
        FrameSet, FusionError, ImageData, ImageFormat, ImuCallback, ImuSample, ImuStream,
        StreamConfig,
    };
    use nalgebra::Vector3;
    use pipeline::{downcast_event, BusEvent, EventHandler};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedDriver {
        polls: Mutex<VecDeque<Option<FrameSet>>>,
    }

    impl ScriptedDriver {
        fn new(polls: Vec<Option<FrameSet>>) -> Self {
            Self {
                polls: Mutex::new(polls.into()),
            }
        }
    }

    impl CameraDriver for ScriptedDriver {
        fn device_name(&self) -> &str {
            "scripted"
        }

        async fn open(&mut self, _config: &StreamConfig) -> Result<(), FusionError> {
            Ok(())
        }

        fn intrinsics(&self) -> Result<(CameraIntrinsics, CameraIntrinsics), FusionError> {
            Err(FusionError::driver("not modeled"))
        }

        async fn start_streams(&mut self, _imu: ImuCallback) -> Result<(), FusionError> {
            Ok(())
        }

        async fn wait_for_frame_set(&mut self, _timeout: Duration) -> Option<FrameSet> {
            self.polls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .flatten()
        }

        fn stop(&mut self) {}
    }

    #[derive(Default)]
    struct EventLog {
        classes: Mutex<Vec<&'static str>>,
        frames: Mutex<Vec<Arc<SyncedFrame>>>,
        inter_imu: Mutex<Vec<FusedImu>>,
    }

    impl EventHandler for EventLog {
        fn handle_event(&self, event: &Arc<dyn BusEvent>) -> bool {
            self.classes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event.class_name());
            if let Some(frame) = downcast_event::<SensorFrameEvent>(event) {
                self.frames
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(Arc::clone(&frame.frame));
            }
            if let Some(imu) = downcast_event::<InterImuEvent>(event) {
                self.inter_imu
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .push(imu.sample);
            }
            false
        }
    }

    fn frame_set(stamp_ms: f64) -> FrameSet {
        FrameSet {
            timestamp_ms: stamp_ms,
            color: Some(ImageData::zeroed(4, 4, ImageFormat::Rgb8)),
            infrared: Some(ImageData::zeroed(4, 4, ImageFormat::Luma8)),
            depth: Some(ImageData::zeroed(4, 4, ImageFormat::Depth16)),
        }
    }

    fn intrinsics() -> CameraIntrinsics {
        CameraIntrinsics {
            fx: 4.0,
            fy: 4.0,
            cx: 2.0,
            cy: 2.0,
            width: 4,
            height: 4,
        }
    }

    fn fill_imu(buffers: &ImuBufferPair, stamps_ms: &[f64]) {
        for &t in stamps_ms {
            buffers.record(
                ImuStream::Accel,
                ImuSample {
                    timestamp_ms: t,
                    v: Vector3::new(0.0, 0.0, 9.8),
                },
            );
            buffers.record(
                ImuStream::Gyro,
                ImuSample {
                    timestamp_ms: t,
                    v: Vector3::new(0.0, t as f32, 0.0),
                },
            );
        }
    }

    fn config(attachment: ImuAttachment) -> SessionConfig {
        SessionConfig {
            imu_attachment: attachment,
            imu_max_wait_ms: 0,
            ..SessionConfig::default()
        }
    }

    fn stage(
        polls: Vec<Option<FrameSet>>,
        buffers: Arc<ImuBufferPair>,
        bus: Arc<PipelineBus>,
        attachment: ImuAttachment,
    ) -> CaptureStage<ScriptedDriver> {
        CaptureStage::new(
            ScriptedDriver::new(polls),
            buffers,
            bus,
            intrinsics(),
            &config(attachment),
            Arc::new(Mutex::new(SessionStatsAggregator::new())),
        )
    }

    #[tokio::test]
    async fn single_mode_attaches_fused_estimate() {
        let buffers = Arc::new(ImuBufferPair::new(100));
        fill_imu(&buffers, &[90.0, 100.0, 110.0]);
        let bus = Arc::new(PipelineBus::new());
        let log = Arc::new(EventLog::default());
        bus.register("log", log.clone()).unwrap();

        let mut stage = stage(
            vec![Some(frame_set(100.0))],
            buffers,
            bus,
            ImuAttachment::Single,
        );
        let raw = stage.synchronizer.capture(&mut stage.driver).await.unwrap();
        stage.publish_cycle(raw).await;

        let frames = log
            .frames
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].frame_id, 1);
        let imu = frames[0].imu.expect("fused estimate attached");
        assert!((imu.timestamp_ms - 100.0).abs() < 1e-9);
        assert!(frames[0].inter_imu.is_empty());
        assert_eq!(stage.metrics.snapshot().frames_published, 1);
    }

    #[tokio::test]
    async fn single_mode_publishes_frame_without_imu_when_buffers_empty() {
        let buffers = Arc::new(ImuBufferPair::new(100));
        let bus = Arc::new(PipelineBus::new());
        let log = Arc::new(EventLog::default());
        bus.register("log", log.clone()).unwrap();

        let mut stage = stage(
            vec![Some(frame_set(100.0))],
            buffers,
            bus,
            ImuAttachment::Single,
        );
        let raw = stage.synchronizer.capture(&mut stage.driver).await.unwrap();
        stage.publish_cycle(raw).await;

        let frames = log
            .frames
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(frames[0].imu.is_none());
        assert_eq!(stage.metrics.snapshot().imu_missing, 1);
    }

    #[tokio::test]
    async fn inter_frame_mode_publishes_imu_events_before_the_frame() {
        let buffers = Arc::new(ImuBufferPair::new(100));
        fill_imu(&buffers, &[95.0, 105.0, 110.0, 115.0, 125.0]);
        let bus = Arc::new(PipelineBus::new());
        let log = Arc::new(EventLog::default());
        bus.register("log", log.clone()).unwrap();

        let mut stage = stage(
            vec![Some(frame_set(100.0)), Some(frame_set(120.0))],
            buffers,
            bus,
            ImuAttachment::InterFrame,
        );
        for _ in 0..2 {
            let raw = stage.synchronizer.capture(&mut stage.driver).await.unwrap();
            stage.publish_cycle(raw).await;
        }

        // Gyro stamps strictly inside (100, 120): 105, 110, 115
        let inter = log
            .inter_imu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let stamps: Vec<f64> = inter.iter().map(|s| s.timestamp_ms).collect();
        assert_eq!(stamps, vec![105.0, 110.0, 115.0]);

        let classes = log
            .classes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(
            *classes,
            vec![
                "SensorFrameEvent",
                "InterImuEvent",
                "InterImuEvent",
                "InterImuEvent",
                "SensorFrameEvent",
            ]
        );

        let frames = log
            .frames
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(frames[1].imu.is_none());
        assert_eq!(frames[1].inter_imu.len(), 3);
        assert_eq!(stage.metrics.snapshot().inter_imu_published, 3);
    }

    #[tokio::test]
    async fn first_frame_never_emits_inter_imu() {
        let buffers = Arc::new(ImuBufferPair::new(100));
        fill_imu(&buffers, &[90.0, 95.0]);
        let bus = Arc::new(PipelineBus::new());
        let log = Arc::new(EventLog::default());
        bus.register("log", log.clone()).unwrap();

        let mut stage = stage(
            vec![Some(frame_set(100.0))],
            buffers,
            bus,
            ImuAttachment::InterFrame,
        );
        let raw = stage.synchronizer.capture(&mut stage.driver).await.unwrap();
        stage.publish_cycle(raw).await;

        assert!(log
            .inter_imu
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .is_empty());
    }

    #[tokio::test]
    async fn spawned_worker_stops_cooperatively() {
        let buffers = Arc::new(ImuBufferPair::new(100));
        let bus = Arc::new(PipelineBus::new());
        let stage = stage(Vec::new(), buffers, bus, ImuAttachment::Single);
        let handle = stage.spawn();
        handle.stop().await;
    }

    // Drivers only need to be Send; the worker must spawn even when the
    // driver keeps single-threaded interior state.
    #[tokio::test]
    async fn worker_spawns_for_send_only_driver() {
        use std::cell::Cell;

        struct CellDriver {
            pending: Cell<Option<FrameSet>>,
        }

        impl CameraDriver for CellDriver {
            fn device_name(&self) -> &str {
                "cell"
            }

            async fn open(&mut self, _config: &StreamConfig) -> Result<(), FusionError> {
                Ok(())
            }

            fn intrinsics(&self) -> Result<(CameraIntrinsics, CameraIntrinsics), FusionError> {
                Err(FusionError::driver("not modeled"))
            }

            async fn start_streams(&mut self, _imu: ImuCallback) -> Result<(), FusionError> {
                Ok(())
            }

            async fn wait_for_frame_set(&mut self, timeout: Duration) -> Option<FrameSet> {
                match self.pending.take() {
                    Some(frame) => Some(frame),
                    None => {
                        tokio::time::sleep(timeout).await;
                        None
                    }
                }
            }

            fn stop(&mut self) {}
        }

        let buffers = Arc::new(ImuBufferPair::new(100));
        let bus = Arc::new(PipelineBus::new());
        let log = Arc::new(EventLog::default());
        bus.register("log", log.clone()).unwrap();

        let driver = CellDriver {
            pending: Cell::new(Some(frame_set(100.0))),
        };
        let config = SessionConfig {
            imu_max_wait_ms: 0,
            frame_timeout_s: 0.1,
            frame_poll_ms: 10,
            ..SessionConfig::default()
        };
        let stats = Arc::new(Mutex::new(SessionStatsAggregator::new()));
        let handle =
            CaptureStage::new(driver, buffers, bus, intrinsics(), &config, stats.clone()).spawn();
        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = handle.metrics();
        handle.stop().await;

        assert_eq!(metrics.snapshot().frames_published, 1);
        assert_eq!(
            log.frames
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .len(),
            1
        );
        let stats = stats.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        assert_eq!(stats.total_frames, 1);
        assert_eq!(stats.frames_without_imu, 1);
    }
}
