//! PipelineBus - named publish/subscribe registry with direct pipes.
//!
//! An explicitly owned object shared by all stages of one session (not a
//! process-wide singleton), so multiple sessions stay independent and
//! teardown is deterministic. Registration and unregistration happen at
//! lifecycle boundaries (never concurrently with steady-state dispatch in
//! the expected usage); both are serialized with dispatch by the registry
//! lock regardless.
//!
//! Dispatch styles:
//! - **Direct pipe**: events of a given class from a given source are
//!   delivered only to one named target handler.
//! - **Broadcast**: all other events visit handlers in registration order,
//!   stopping when one reports the event consumed.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::error::PipelineError;
use crate::event::BusEvent;

/// A synchronous event subscriber
///
/// Runs on the publisher's thread; implementations must be cheap and
/// non-blocking (stages enqueue and return).
pub trait EventHandler: Send + Sync {
    /// Handle one event; `true` marks it consumed and stops broadcast
    fn handle_event(&self, event: &Arc<dyn BusEvent>) -> bool;
}

struct HandlerEntry {
    name: String,
    handler: Arc<dyn EventHandler>,
}

struct Pipe {
    source: String,
    target: String,
    class: &'static str,
}

#[derive(Default)]
struct Registry {
    handlers: Vec<HandlerEntry>,
    pipes: Vec<Pipe>,
}

impl Registry {
    fn find(&self, name: &str) -> Option<&HandlerEntry> {
        self.handlers.iter().find(|entry| entry.name == name)
    }
}

/// Session-scoped event bus
#[derive(Default)]
pub struct PipelineBus {
    registry: Mutex<Registry>,
}

impl PipelineBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a named handler
    ///
    /// # Errors
    /// `HandlerExists` when the name is already taken.
    pub fn register(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), PipelineError> {
        let name = name.into();
        let mut registry = self.lock();
        if registry.find(&name).is_some() {
            return Err(PipelineError::HandlerExists { name });
        }
        debug!(handler = %name, "handler registered");
        registry.handlers.push(HandlerEntry { name, handler });
        Ok(())
    }

    /// Remove a handler; pipes targeting it are removed as well.
    ///
    /// Returns whether the handler was present. Unregistration must precede
    /// joining the stage's worker so no event is delivered to a stage that
    /// is shutting down.
    pub fn unregister(&self, name: &str) -> bool {
        let mut registry = self.lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|entry| entry.name != name);
        registry.pipes.retain(|pipe| pipe.target != name);
        let removed = registry.handlers.len() != before;
        if removed {
            debug!(handler = %name, "handler unregistered");
        }
        removed
    }

    /// Connect `source`'s events of `class` directly to `target`'s queue,
    /// bypassing broadcast.
    ///
    /// # Errors
    /// `HandlerNotFound` when the target is not registered.
    pub fn create_pipe(
        &self,
        source: impl Into<String>,
        target: impl Into<String>,
        class: &'static str,
    ) -> Result<(), PipelineError> {
        let (source, target) = (source.into(), target.into());
        let mut registry = self.lock();
        if registry.find(&target).is_none() {
            return Err(PipelineError::HandlerNotFound { name: target });
        }
        debug!(%source, %target, class, "pipe created");
        registry.pipes.push(Pipe {
            source,
            target,
            class,
        });
        Ok(())
    }

    /// Publish one event on behalf of `source`.
    ///
    /// A matching pipe routes the event to its single target; otherwise the
    /// event is broadcast in registration order (skipping the source's own
    /// handler) until consumed. Handlers run on the calling thread; the
    /// registry lock is not held during dispatch.
    pub fn publish(&self, source: &str, event: Arc<dyn BusEvent>) {
        let class = event.class_name();

        enum Route {
            Pipe(Option<Arc<dyn EventHandler>>),
            Broadcast(Vec<(String, Arc<dyn EventHandler>)>),
        }

        let route = {
            let registry = self.lock();
            let piped = registry
                .pipes
                .iter()
                .find(|pipe| pipe.source == source && pipe.class == class);
            match piped {
                Some(pipe) => Route::Pipe(
                    registry
                        .find(&pipe.target)
                        .map(|entry| Arc::clone(&entry.handler)),
                ),
                None => Route::Broadcast(
                    registry
                        .handlers
                        .iter()
                        .map(|entry| (entry.name.clone(), Arc::clone(&entry.handler)))
                        .collect(),
                ),
            }
        };

        match route {
            Route::Pipe(Some(handler)) => {
                trace!(%source, class, "pipe dispatch");
                handler.handle_event(&event);
            }
            Route::Pipe(None) => {
                // Target unregistered between pipe creation and publish
                debug!(%source, class, "pipe target gone, event dropped");
            }
            Route::Broadcast(handlers) => {
                for (name, handler) in handlers {
                    if name == source {
                        continue;
                    }
                    if handler.handle_event(&event) {
                        trace!(%source, class, consumer = %name, "event consumed");
                        break;
                    }
                }
            }
        }
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.lock().handlers.len()
    }
}
