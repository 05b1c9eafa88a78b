//! Pipeline wiring errors

use thiserror::Error;

/// Bus and stage wiring error type
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A handler with this name is already registered
    #[error("handler already registered: {name}")]
    HandlerExists { name: String },

    /// No handler registered under this name
    #[error("handler not found: {name}")]
    HandlerNotFound { name: String },

    /// A stage failed while processing an event
    #[error("stage '{stage}' error: {message}")]
    Stage { stage: String, message: String },
}

impl PipelineError {
    /// Create a stage-processing error
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}
