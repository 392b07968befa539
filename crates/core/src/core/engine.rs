//! Inference engine boundary.
//!
//! An engine is an opaque, pre-loaded handle for one network. The core only knows
//! each model's declared tensor names and shapes ([`ModelContract`]); evaluation
//! itself is a black box that must be awaited to completion before another
//! evaluate call may start. Engines are only ever invoked from inside a
//! [`RunQueue`](crate::run_queue::RunQueue) task.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::tensor::{NamedTensors, Tensor};

pub const IN_IMAGE: &str = "x";
pub const IN_LATENT_Z: &str = "z";
pub const IN_LATENT: &str = "latent";
pub const IN_ACTION: &str = "action";
pub const IN_HIDDEN: &str = "h0";
pub const IN_CELL: &str = "c0";
pub const IN_STATE: &str = "state";

pub const OUT_MU: &str = "mu";
pub const OUT_RECON: &str = "x_recon";
pub const OUT_IMAGE: &str = "image";
pub const OUT_NEXT_LATENT: &str = "next_latent";
pub const OUT_HIDDEN: &str = "h1";
pub const OUT_CELL: &str = "c1";
pub const OUT_STATE: &str = "state";
pub const OUT_NEXT_STATE: &str = "next_state";

pub type EngineFuture<'a> =
    Pin<Box<dyn Future<Output = Result<NamedTensors, EngineError>> + Send + 'a>>;

pub type LoadFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Arc<dyn InferenceEngine>, EngineError>> + Send + 'a>>;

/// One loaded network.
///
/// Implementations need not be re-entrant: the run queue guarantees at most one
/// `evaluate` is in flight per session. That holds only while the returned
/// future owns the work. A run that times out is dropped, so an engine that
/// hands work to another thread must stop it when its future is dropped.
pub trait InferenceEngine: Send + Sync {
    fn evaluate(&self, inputs: NamedTensors) -> EngineFuture<'_>;
}

/// One-time asynchronous factory for engine handles.
pub trait ModelLoader: Send + Sync {
    fn load<'a>(&'a self, role: ModelRole, path: &'a str) -> LoadFuture<'a>;
}

/// Adapter for backends that evaluate synchronously.
pub struct FnEngine<F> {
    f: F,
}

impl<F> FnEngine<F>
where
    F: Fn(NamedTensors) -> Result<NamedTensors, EngineError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> InferenceEngine for FnEngine<F>
where
    F: Fn(NamedTensors) -> Result<NamedTensors, EngineError> + Send + Sync,
{
    fn evaluate(&self, inputs: NamedTensors) -> EngineFuture<'_> {
        let result = (self.f)(inputs);
        Box::pin(async move { result })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelRole {
    /// VAE encoder: image -> 16-d latent mean.
    ImageEncoder,
    /// VAE decoder: latent -> image.
    ImageDecoder,
    /// Recurrent latent dynamics (LSTM).
    LatentStep,
    /// Physically-interpretable encoder: image -> (x, theta).
    InterpretableEncoder,
    /// Physically-interpretable decoder: (x, theta) -> image.
    InterpretableDecoder,
    /// Learned cart-pole dynamics over the interpretable state.
    InterpretableStep,
    /// Standalone (x, theta) -> image decoder.
    StateDecoder2d,
    /// Standalone (x, x_dot, theta, theta_dot) -> image decoder.
    StateDecoder4d,
}

impl ModelRole {
    pub fn label(self) -> &'static str {
        match self {
            ModelRole::ImageEncoder => "image_encoder",
            ModelRole::ImageDecoder => "image_decoder",
            ModelRole::LatentStep => "latent_step",
            ModelRole::InterpretableEncoder => "interpretable_encoder",
            ModelRole::InterpretableDecoder => "interpretable_decoder",
            ModelRole::InterpretableStep => "interpretable_step",
            ModelRole::StateDecoder2d => "state_decoder_2d",
            ModelRole::StateDecoder4d => "state_decoder_4d",
        }
    }

    /// Model file shipped for this role; `None` for built-in engines.
    pub fn default_file(self) -> Option<&'static str> {
        match self {
            ModelRole::ImageEncoder => Some("vae_encoder16.onnx"),
            ModelRole::ImageDecoder => Some("vae_decoder16.onnx"),
            ModelRole::LatentStep => Some("lstm_latent_step.onnx"),
            ModelRole::InterpretableEncoder => Some("piwm_encoder.onnx"),
            ModelRole::InterpretableDecoder => Some("piwm_decoder.onnx"),
            ModelRole::InterpretableStep => None,
            ModelRole::StateDecoder2d => Some("decoder_interpretable.onnx"),
            ModelRole::StateDecoder4d => Some("state_to_image.onnx"),
        }
    }

    pub fn all() -> &'static [ModelRole] {
        &[
            ModelRole::ImageEncoder,
            ModelRole::ImageDecoder,
            ModelRole::LatentStep,
            ModelRole::InterpretableEncoder,
            ModelRole::InterpretableDecoder,
            ModelRole::InterpretableStep,
            ModelRole::StateDecoder2d,
            ModelRole::StateDecoder4d,
        ]
    }

    pub fn contract(self, dims: &ModelDims) -> ModelContract {
        let image = vec![1, 3, dims.image_height, dims.image_width];
        let latent = vec![1, dims.latent];
        let memory = vec![dims.layers, 1, dims.hidden];
        let spec = TensorSpec::new;
        match self {
            ModelRole::ImageEncoder => ModelContract {
                inputs: vec![spec(IN_IMAGE, image)],
                outputs: vec![spec(OUT_MU, latent)],
            },
            ModelRole::ImageDecoder => ModelContract {
                inputs: vec![spec(IN_LATENT_Z, latent)],
                outputs: vec![spec(OUT_RECON, image)],
            },
            ModelRole::LatentStep => ModelContract {
                inputs: vec![
                    spec(IN_LATENT, latent.clone()),
                    spec(IN_ACTION, vec![1, 1]),
                    spec(IN_HIDDEN, memory.clone()),
                    spec(IN_CELL, memory.clone()),
                ],
                outputs: vec![
                    spec(OUT_NEXT_LATENT, latent),
                    spec(OUT_HIDDEN, memory.clone()),
                    spec(OUT_CELL, memory),
                ],
            },
            ModelRole::InterpretableEncoder => ModelContract {
                inputs: vec![spec(IN_IMAGE, image)],
                outputs: vec![spec(OUT_STATE, vec![1, 2])],
            },
            ModelRole::InterpretableDecoder | ModelRole::StateDecoder2d => ModelContract {
                inputs: vec![spec(IN_STATE, vec![1, 2])],
                outputs: vec![spec(OUT_IMAGE, image)],
            },
            ModelRole::InterpretableStep => ModelContract {
                inputs: vec![spec(IN_STATE, vec![1, 4]), spec(IN_ACTION, vec![1, 1])],
                outputs: vec![spec(OUT_NEXT_STATE, vec![1, 4])],
            },
            ModelRole::StateDecoder4d => ModelContract {
                inputs: vec![spec(IN_STATE, vec![1, 4])],
                outputs: vec![spec(OUT_RECON, image)],
            },
        }
    }
}

impl fmt::Display for ModelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Dimensions shared by every model contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDims {
    pub image_height: usize,
    pub image_width: usize,
    pub latent: usize,
    /// Recurrent layers (L).
    pub layers: usize,
    /// Recurrent hidden width (D).
    pub hidden: usize,
}

impl Default for ModelDims {
    fn default() -> Self {
        Self {
            image_height: 96,
            image_width: 96,
            latent: 16,
            layers: 2,
            hidden: 128,
        }
    }
}

impl ModelDims {
    /// Elements in one recurrent memory buffer (`layers * 1 * hidden`).
    pub fn memory_len(&self) -> usize {
        self.layers * self.hidden
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: &'static str,
    pub shape: Vec<usize>,
}

impl TensorSpec {
    pub fn new(name: &'static str, shape: Vec<usize>) -> Self {
        Self { name, shape }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelContract {
    pub inputs: Vec<TensorSpec>,
    pub outputs: Vec<TensorSpec>,
}

impl ModelContract {
    pub fn check_inputs(&self, role: ModelRole, inputs: &NamedTensors) -> Result<(), EngineError> {
        for spec in &self.inputs {
            let t = inputs.get(spec.name).ok_or_else(|| EngineError::MissingInput {
                role,
                name: spec.name.to_string(),
            })?;
            check_shape(role, spec, t)?;
        }
        Ok(())
    }

    /// Extra outputs are allowed; declared ones must be present with their shapes.
    pub fn check_outputs(&self, role: ModelRole, outputs: &NamedTensors) -> Result<(), EngineError> {
        for spec in &self.outputs {
            let t = outputs.get(spec.name).ok_or_else(|| EngineError::MissingOutput {
                role,
                name: spec.name.to_string(),
            })?;
            check_shape(role, spec, t)?;
        }
        Ok(())
    }
}

fn check_shape(role: ModelRole, spec: &TensorSpec, t: &Tensor) -> Result<(), EngineError> {
    if t.shape() != spec.shape.as_slice() {
        return Err(EngineError::ShapeMismatch {
            role,
            name: spec.name.to_string(),
            expected: spec.shape.clone(),
            actual: t.shape().to_vec(),
        });
    }
    Ok(())
}

/// Remove a declared output from an evaluation result.
pub fn take_output(
    role: ModelRole,
    outputs: &mut NamedTensors,
    name: &str,
) -> Result<Tensor, EngineError> {
    outputs.remove(name).ok_or_else(|| EngineError::MissingOutput {
        role,
        name: name.to_string(),
    })
}
