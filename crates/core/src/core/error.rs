use std::time::Duration;

use thiserror::Error;

use crate::engine::ModelRole;

/// Failures at the inference-engine boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("{role}: missing input tensor `{name}`")]
    MissingInput { role: ModelRole, name: String },

    #[error("{role}: missing output tensor `{name}`")]
    MissingOutput { role: ModelRole, name: String },

    #[error("{role}: tensor `{name}` has shape {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        role: ModelRole,
        name: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("tensor shape {shape:?} needs {expected} elements, buffer has {actual}")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },

    #[error("no engine loaded for {0}")]
    Unavailable(ModelRole),

    #[error("{role}: failed to load `{path}`: {reason}")]
    Load {
        role: ModelRole,
        path: String,
        reason: String,
    },

    #[error("{0}")]
    Backend(String),
}

/// Outcome of a queued run that did not produce a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RunError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("run timed out after {0:?}")]
    TimedOut(Duration),

    /// The task panicked, or the queue shut down before it ran.
    #[error("run aborted before producing a result")]
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OrchestratorError {
    #[error("models not ready: {0}")]
    NotReady(String),

    #[error("{0} is not available in this visualizer")]
    Unsupported(&'static str),

    #[error("latent index {0} out of range")]
    InvalidLatent(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}
