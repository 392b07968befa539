//! Ground-truth collaborators for the world-model inspector.
//!
//! - [`cartpole`]: closed-form cart-pole dynamics (ground truth and learned constants)
//! - [`frame`]: RGBA8 pixel buffers
//! - [`render`]: deterministic observation renderer
//!
//! Nothing here is asynchronous; the orchestration core calls into this crate
//! synchronously and never through the run queue.

pub mod cartpole;
pub mod frame;
pub mod render;

pub use cartpole::{transition, Action, CartPoleParams, Integrator, PhysicalState};
pub use frame::Frame;
pub use render::{CartPoleRenderer, Renderer};
