//! Stage workers: bounded inboxes draining into async processing tasks.
//!
//! Bus dispatch runs on the publisher's thread, so a stage's bus-facing
//! handler only enqueues. A tokio task drains the queue and runs the
//! stage's actual processing. When the inbox is full the newest event is
//! dropped and counted rather than blocking the publisher.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::bus::EventHandler;
use crate::error::PipelineError;
use crate::event::BusEvent;

/// Async body of a pipeline stage
///
/// `on_event` receives every event the stage's inbox accepted, in arrival
/// order. Errors are logged and the worker keeps draining.
#[trait_variant::make(PipelineStage: Send)]
pub trait LocalPipelineStage {
    /// Stable stage name (also the bus registration name)
    fn name(&self) -> &'static str;

    /// Process one event
    async fn on_event(&mut self, event: Arc<dyn BusEvent>) -> Result<(), PipelineError>;

    /// Run once after the inbox closes, before the worker exits
    async fn on_shutdown(&mut self) -> Result<(), PipelineError>;
}

/// The worker's sender, shared between the inbox and its [`StageHandle`].
///
/// Shutdown takes the sender out, which closes the queue even while inbox
/// references are still registered on a bus.
type SharedSender = Arc<Mutex<Option<mpsc::Sender<Arc<dyn BusEvent>>>>>;

/// Bus-side endpoint of a stage: registered as an [`EventHandler`], it
/// filters by event class and forwards into the worker's queue.
pub struct StageInbox {
    name: &'static str,
    classes: Vec<&'static str>,
    consume: bool,
    tx: SharedSender,
}

impl EventHandler for StageInbox {
    fn handle_event(&self, event: &Arc<dyn BusEvent>) -> bool {
        if !self.classes.contains(&event.class_name()) {
            return false;
        }
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(tx) = guard.as_ref() else {
            // Stage already shut down; let the event flow past
            return false;
        };
        if tx.try_send(Arc::clone(event)).is_err() {
            metrics::counter!("pipeline_events_dropped_total", "stage" => self.name)
                .increment(1);
            warn!(stage = self.name, class = event.class_name(), "inbox full, event dropped");
        }
        self.consume
    }
}

/// Owner-side handle to a running stage worker
pub struct StageHandle {
    name: &'static str,
    tx: SharedSender,
    worker: Option<JoinHandle<()>>,
}

impl StageHandle {
    /// Spawn a worker for `stage` and return its handle plus the bus-facing
    /// inbox. `classes` selects which event classes enter the queue;
    /// `consume` is what the inbox reports back to broadcast dispatch.
    pub fn spawn<S>(
        stage: S,
        classes: Vec<&'static str>,
        consume: bool,
        queue_capacity: usize,
    ) -> (Self, Arc<StageInbox>)
    where
        S: PipelineStage + 'static,
    {
        let name = stage.name();
        let (tx, rx) = mpsc::channel(queue_capacity);
        let worker = tokio::spawn(stage_worker(stage, rx));
        let tx: SharedSender = Arc::new(Mutex::new(Some(tx)));
        let inbox = Arc::new(StageInbox {
            name,
            classes,
            consume,
            tx: Arc::clone(&tx),
        });
        (
            Self {
                name,
                tx,
                worker: Some(worker),
            },
            inbox,
        )
    }

    /// Stage name this handle was spawned with
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Close the inbox and wait for the worker to drain and exit.
    ///
    /// Closing is unilateral: inbox references still registered on a bus
    /// stop enqueuing and report events unconsumed from here on.
    pub async fn shutdown(mut self) {
        drop(
            self.tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        if let Some(worker) = self.worker.take() {
            if worker.await.is_err() {
                warn!(stage = self.name, "stage worker panicked");
            }
        }
    }
}

#[instrument(skip_all, fields(stage = stage.name()))]
async fn stage_worker<S: PipelineStage>(
    mut stage: S,
    mut rx: mpsc::Receiver<Arc<dyn BusEvent>>,
) {
    debug!("stage worker started");
    while let Some(event) = rx.recv().await {
        if let Err(error) = stage.on_event(event).await {
            metrics::counter!("pipeline_stage_errors_total", "stage" => stage.name())
                .increment(1);
            warn!(%error, "stage event processing failed");
        }
    }
    if let Err(error) = stage.on_shutdown().await {
        warn!(%error, "stage shutdown hook failed");
    }
    debug!("stage worker stopped");
}
