//! Synthetic camera driver for tests and hardware-free runs.
//!
//! Emulates the real device's observable contract: inertial callbacks fire
//! from their own OS threads at configurable rates with device-clock
//! timestamps, frame sets arrive paced at the configured frame rate, and
//! configuration problems surface at `open` the way the hardware does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use image::{GrayImage, RgbImage};
use tracing::debug;

use contracts::{
    CameraDriver, CameraIntrinsics, FrameSet, FusionError, ImageData, ImageFormat, ImuCallback,
    ImuSample, ImuStream, StreamConfig, StreamProfile,
};
use nalgebra::Vector3;

/// Behavior knobs for [`MockCameraDriver`]
#[derive(Debug, Clone)]
pub struct MockDriverConfig {
    /// `open` fails with device-not-found when false
    pub device_present: bool,
    /// `intrinsics` reports an invalid calibration when true
    pub invalid_calibration: bool,
    /// Accelerometer callback rate
    pub accel_rate_hz: u32,
    /// Gyroscope callback rate
    pub gyro_rate_hz: u32,
    /// Offset added to every device timestamp, to emulate clock skew
    pub clock_offset_ms: f64,
    /// Emit a color image on every Nth frame set (1 = always)
    pub color_every: u32,
    /// Frame rates `open` accepts
    pub supported_fps: Vec<u32>,
}

impl Default for MockDriverConfig {
    fn default() -> Self {
        Self {
            device_present: true,
            invalid_calibration: false,
            accel_rate_hz: 250,
            gyro_rate_hz: 400,
            clock_offset_ms: 0.0,
            color_every: 1,
            supported_fps: vec![6, 15, 30, 60, 90],
        }
    }
}

/// In-process stand-in for the depth-camera backend
pub struct MockCameraDriver {
    config: MockDriverConfig,
    streams: Option<StreamConfig>,
    running: Arc<AtomicBool>,
    imu_threads: Vec<JoinHandle<()>>,
    started_at: Instant,
    epoch_ms: f64,
    frame_index: u64,
    next_frame_at: Option<Instant>,
}

impl MockCameraDriver {
    pub fn new(config: MockDriverConfig) -> Self {
        Self {
            config,
            streams: None,
            running: Arc::new(AtomicBool::new(false)),
            imu_threads: Vec::new(),
            started_at: Instant::now(),
            epoch_ms: 0.0,
            frame_index: 0,
            next_frame_at: None,
        }
    }

    /// Device timestamp "now", in milliseconds
    fn device_now_ms(&self) -> f64 {
        let elapsed = self.started_at.elapsed().as_secs_f64() * 1000.0;
        self.epoch_ms + self.config.clock_offset_ms + elapsed
    }

    fn frame_interval(&self) -> Duration {
        let fps = self
            .streams
            .as_ref()
            .map(|s| s.ir_depth.fps)
            .unwrap_or(30);
        Duration::from_secs_f64(1.0 / fps as f64)
    }

    fn spawn_imu_thread(
        &self,
        stream: ImuStream,
        rate_hz: u32,
        imu: ImuCallback,
    ) -> JoinHandle<()> {
        let running = Arc::clone(&self.running);
        let started_at = self.started_at;
        let base_ms = self.epoch_ms + self.config.clock_offset_ms;
        let period = Duration::from_secs_f64(1.0 / rate_hz as f64);
        std::thread::spawn(move || {
            while running.load(Ordering::Acquire) {
                std::thread::sleep(period);
                let t_ms = base_ms + started_at.elapsed().as_secs_f64() * 1000.0;
                let v = match stream {
                    ImuStream::Accel => Vector3::new(0.0, 0.0, 9.81),
                    ImuStream::Gyro => {
                        let phase = (t_ms / 1000.0) as f32;
                        Vector3::new(phase.sin() * 0.01, 0.0, phase.cos() * 0.01)
                    }
                };
                imu(stream, ImuSample {
                    timestamp_ms: t_ms,
                    v,
                });
            }
        })
    }

    fn synth_infrared(profile: &StreamProfile, frame_index: u64) -> ImageData {
        let img = GrayImage::from_fn(profile.width, profile.height, |x, y| {
            image::Luma([((x + y + frame_index as u32) % 256) as u8])
        });
        ImageData::packed(
            profile.width,
            profile.height,
            ImageFormat::Luma8,
            Bytes::from(img.into_raw()),
        )
    }

    fn synth_color(profile: &StreamProfile, frame_index: u64) -> ImageData {
        let img = RgbImage::from_fn(profile.width, profile.height, |x, y| {
            image::Rgb([
                (x % 256) as u8,
                (y % 256) as u8,
                (frame_index % 256) as u8,
            ])
        });
        ImageData::packed(
            profile.width,
            profile.height,
            ImageFormat::Rgb8,
            Bytes::from(img.into_raw()),
        )
    }

    /// Flat synthetic depth plane, 1 meter with a per-frame ripple
    fn synth_depth(profile: &StreamProfile, frame_index: u64) -> ImageData {
        let depth_mm = 1000 + (frame_index % 16) as u16;
        let pixels = vec![depth_mm; (profile.width * profile.height) as usize];
        ImageData::packed(
            profile.width,
            profile.height,
            ImageFormat::Depth16,
            Bytes::copy_from_slice(bytemuck::cast_slice(&pixels)),
        )
    }
}

impl CameraDriver for MockCameraDriver {
    fn device_name(&self) -> &str {
        "mock-d4xx"
    }

    async fn open(&mut self, config: &StreamConfig) -> Result<(), FusionError> {
        if !self.config.device_present {
            return Err(FusionError::device_not_found(self.device_name()));
        }
        for (stream, profile) in [("color", &config.color), ("ir_depth", &config.ir_depth)] {
            if !self.config.supported_fps.contains(&profile.fps) {
                return Err(FusionError::unsupported_stream(
                    stream,
                    format!("{} fps not supported by this device", profile.fps),
                ));
            }
        }
        self.started_at = Instant::now();
        self.epoch_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64() * 1000.0)
            .unwrap_or(0.0);
        self.streams = Some(*config);
        debug!(device = self.device_name(), "mock device opened");
        Ok(())
    }

    fn intrinsics(&self) -> Result<(CameraIntrinsics, CameraIntrinsics), FusionError> {
        if self.config.invalid_calibration {
            return Err(FusionError::invalid_calibration(
                "mock calibration flagged invalid",
            ));
        }
        let streams = self
            .streams
            .as_ref()
            .ok_or_else(|| FusionError::driver("intrinsics queried before open"))?;
        let model = |p: &StreamProfile| CameraIntrinsics {
            fx: f64::from(p.width) * 0.9,
            fy: f64::from(p.width) * 0.9,
            cx: f64::from(p.width) / 2.0,
            cy: f64::from(p.height) / 2.0,
            width: p.width,
            height: p.height,
        };
        Ok((model(&streams.color), model(&streams.ir_depth)))
    }

    async fn start_streams(&mut self, imu: ImuCallback) -> Result<(), FusionError> {
        if self.streams.is_none() {
            return Err(FusionError::driver("streams started before open"));
        }
        self.running.store(true, Ordering::Release);
        self.imu_threads.push(self.spawn_imu_thread(
            ImuStream::Accel,
            self.config.accel_rate_hz,
            Arc::clone(&imu),
        ));
        self.imu_threads
            .push(self.spawn_imu_thread(ImuStream::Gyro, self.config.gyro_rate_hz, imu));
        Ok(())
    }

    async fn wait_for_frame_set(&mut self, timeout: Duration) -> Option<FrameSet> {
        let streams = self.streams?;
        let interval = self.frame_interval();
        let due = *self
            .next_frame_at
            .get_or_insert_with(|| Instant::now() + interval);
        let now = Instant::now();
        if due > now {
            let wait = due - now;
            if wait > timeout {
                tokio::time::sleep(timeout).await;
                return None;
            }
            tokio::time::sleep(wait).await;
        }
        self.next_frame_at = Some(due + self.frame_interval());

        let index = self.frame_index;
        self.frame_index += 1;
        let with_color = index % u64::from(self.config.color_every.max(1)) == 0;
        Some(FrameSet {
            timestamp_ms: self.device_now_ms(),
            color: with_color.then(|| Self::synth_color(&streams.color, index)),
            infrared: Some(Self::synth_infrared(&streams.ir_depth, index)),
            depth: Some(Self::synth_depth(&streams.ir_depth, index)),
        })
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        for thread in self.imu_threads.drain(..) {
            let _ = thread.join();
        }
        self.next_frame_at = None;
        debug!(device = self.device_name(), "mock device stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SessionConfig;

    fn stream_config() -> StreamConfig {
        SessionConfig::default().stream_config()
    }

    #[tokio::test]
    async fn absent_device_fails_open() {
        let mut driver = MockCameraDriver::new(MockDriverConfig {
            device_present: false,
            ..MockDriverConfig::default()
        });
        let err = driver.open(&stream_config()).await.unwrap_err();
        assert!(matches!(err, FusionError::DeviceNotFound { .. }));
        assert!(err.is_fatal_at_init());
    }

    #[tokio::test]
    async fn unsupported_rate_fails_open() {
        let mut driver = MockCameraDriver::new(MockDriverConfig::default());
        let mut config = stream_config();
        config.ir_depth.fps = 144;
        let err = driver.open(&config).await.unwrap_err();
        assert!(matches!(err, FusionError::UnsupportedStreamConfig { .. }));
    }

    #[tokio::test]
    async fn intrinsics_follow_stream_profiles() {
        let mut driver = MockCameraDriver::new(MockDriverConfig::default());
        driver.open(&stream_config()).await.unwrap();
        let (color, ir) = driver.intrinsics().unwrap();
        assert_eq!((color.width, color.height), (640, 480));
        assert!((color.fx - 576.0).abs() < 1e-9);
        assert!((color.cx - 320.0).abs() < 1e-9);
        assert!(ir.is_valid_for_projection());
    }

    #[tokio::test]
    async fn flagged_calibration_fails_intrinsics() {
        let mut driver = MockCameraDriver::new(MockDriverConfig {
            invalid_calibration: true,
            ..MockDriverConfig::default()
        });
        driver.open(&stream_config()).await.unwrap();
        assert!(matches!(
            driver.intrinsics(),
            Err(FusionError::InvalidCalibration { .. })
        ));
    }

    #[tokio::test]
    async fn imu_threads_deliver_monotonic_samples() {
        let mut driver = MockCameraDriver::new(MockDriverConfig::default());
        driver.open(&stream_config()).await.unwrap();

        let samples = Arc::new(std::sync::Mutex::new(Vec::<(ImuStream, f64)>::new()));
        let sink = Arc::clone(&samples);
        let callback: ImuCallback = Arc::new(move |stream, sample| {
            sink.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push((stream, sample.timestamp_ms));
        });
        driver.start_streams(callback).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        driver.stop();

        let samples = samples
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        assert!(samples.iter().any(|(s, _)| *s == ImuStream::Accel));
        assert!(samples.iter().any(|(s, _)| *s == ImuStream::Gyro));
        let gyro: Vec<f64> = samples
            .iter()
            .filter(|(s, _)| *s == ImuStream::Gyro)
            .map(|(_, t)| *t)
            .collect();
        assert!(gyro.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn frame_sets_are_paced_and_complete() {
        let mut driver = MockCameraDriver::new(MockDriverConfig::default());
        driver.open(&stream_config()).await.unwrap();

        // 30 fps: the set is not due within a 1 ms poll
        assert!(driver
            .wait_for_frame_set(Duration::from_millis(1))
            .await
            .is_none());
        let set = driver
            .wait_for_frame_set(Duration::from_millis(100))
            .await
            .expect("frame set due within one interval");
        assert!(set.color.is_some());
        let depth = set.depth.unwrap();
        assert_eq!(depth.format, ImageFormat::Depth16);
        assert_eq!(depth.byte_len(), 640 * 480 * 2);
    }

    #[tokio::test]
    async fn color_every_n_skips_frames() {
        let mut driver = MockCameraDriver::new(MockDriverConfig {
            color_every: 2,
            ..MockDriverConfig::default()
        });
        let mut config = stream_config();
        config.ir_depth.fps = 90;
        config.color.fps = 90;
        driver.open(&config).await.unwrap();

        let mut colors = Vec::new();
        while colors.len() < 4 {
            if let Some(set) = driver.wait_for_frame_set(Duration::from_millis(100)).await {
                colors.push(set.color.is_some());
            }
        }
        assert_eq!(colors, vec![true, false, true, false]);
    }
}
