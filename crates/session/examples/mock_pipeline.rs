//! Runs the full pipeline against the synthetic camera driver for a few
//! seconds and prints every pose delivered to the external callback.
//!
//! ```bash
//! RUST_LOG=info cargo run -p session --example mock_pipeline
//! ```

use std::sync::mpsc;
use std::time::Duration;

use session::{
    MockCameraDriver, MockDriverConfig, NullMapping, ScriptedOdometry, Session, SessionConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init_with_config(observability::ObservabilityConfig {
        log_format: observability::LogFormat::Compact,
        metrics_port: None,
        ..Default::default()
    })?;

    let session = Session::create(
        SessionConfig::default(),
        MockCameraDriver::new(MockDriverConfig::default()),
        ScriptedOdometry::always_identity(),
        NullMapping::new(),
    )
    .await?;

    let (tx, rx) = mpsc::channel();
    session.register_pose_callback(Box::new(move |update| {
        let _ = tx.send((
            update.frame_id,
            update.timestamp_s,
            update.translation,
            update.is_localized(),
        ));
        update.color.release();
        update.depth.release();
    }));

    tokio::time::sleep(Duration::from_secs(3)).await;
    let snapshot = session.capture_metrics().snapshot();
    let report = session.stats_report();
    session.destroy().await;

    while let Ok((frame_id, timestamp_s, translation, localized)) = rx.try_recv() {
        println!("frame {frame_id} @ {timestamp_s:.3}s t={translation:?} localized={localized}");
    }
    println!(
        "published {} frames, {} sync timeouts, {} without IMU",
        snapshot.frames_published, snapshot.sync_timeouts, snapshot.imu_missing
    );
    println!("{report}");
    Ok(())
}
