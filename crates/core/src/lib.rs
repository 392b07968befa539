//! # wmscope
//!
//! Inference-run orchestration for interactive world-model inspection.
//!
//! A visualizer shows a ground-truth cart-pole next to one or more learned
//! models of it (an image VAE with recurrent latent dynamics, and a
//! physically-interpretable model). The user edits states, steps the world and
//! re-syncs the models; this crate keeps the model runs ordered, drops results
//! that newer requests have made obsolete, and keeps failures contained.
//!
//! ## Quick Start
//!
//! ```
//! use wmscope::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! // No models registered: ground truth still works, model panels do not.
//! let session = Session::builder(SessionConfig::default()).build();
//! let orch = Orchestrator::new(session, VisualizerKind::Piwm);
//!
//! orch.edit_physical(StateField::Angle, 0.2).unwrap();
//! assert!(!orch.readiness().is_ready());
//! assert!(orch.step(Action::Right).is_err());
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`run_queue`]: Session-wide serialized execution of model runs
//! - [`staleness`]: Latest-result-wins tokens per output stream
//! - [`session`]: Loaded engines and contract-checked evaluation
//! - [`orchestrator`]: Per-visualizer state and intents
//! - [`tensor`]: Tensor exchange and pixel conversion

#[path = "core/error.rs"]
pub mod error;

#[path = "core/tensor.rs"]
pub mod tensor;

#[path = "core/engine.rs"]
pub mod engine;

#[path = "core/learned.rs"]
pub mod learned;

#[path = "core/config.rs"]
pub mod config;

#[path = "core/prng.rs"]
pub mod prng;

#[path = "core/run_queue.rs"]
pub mod run_queue;

#[path = "core/staleness.rs"]
pub mod staleness;

#[path = "core/state.rs"]
pub mod state;

#[path = "core/controls.rs"]
pub mod controls;

#[path = "core/bindings.rs"]
pub mod bindings;

#[path = "core/session.rs"]
pub mod session;

#[path = "core/orchestrator.rs"]
pub mod orchestrator;

pub use wmscope_physics as physics;

/// Prelude module for convenient imports.
///
/// ```
/// use wmscope::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::SessionConfig;
    pub use crate::controls::{Panel, SliderSpec, StateField, VisualizerKind};
    pub use crate::engine::{FnEngine, InferenceEngine, ModelDims, ModelLoader, ModelRole};
    pub use crate::error::{ConfigError, EngineError, OrchestratorError, RunError};
    pub use crate::orchestrator::{Orchestrator, Outcome, Pending, Readiness};
    pub use crate::prng::Prng;
    pub use crate::run_queue::{QueuedRun, RunQueue};
    pub use crate::session::{Session, SessionBuilder};
    pub use crate::staleness::{StalenessGuard, Stream, Token};
    pub use crate::state::{InterpretableState, LatentVector, RecurrentMemory, WorldState};
    pub use crate::tensor::{NamedTensors, Tensor};
    pub use wmscope_physics::{Action, CartPoleParams, Frame, Integrator, PhysicalState};
}
