//! Per-visualizer application state.
//!
//! The orchestrator owns one [`WorldState`] and hands out clones as snapshots.
//! Images and recurrent memory sit behind `Arc`s, so snapshots are cheap and
//! a committed value is never mutated in place afterwards; it is replaced whole.

use std::sync::Arc;

use wmscope_physics::{Frame, PhysicalState};

use crate::error::EngineError;
use crate::tensor::Tensor;

#[derive(Debug, Clone, PartialEq)]
pub struct LatentVector(Vec<f32>);

impl LatentVector {
    pub fn zeros(len: usize) -> Self {
        Self(vec![0.0; len])
    }

    /// Length-checked construction.
    pub fn from_slice(values: &[f32], len: usize) -> Result<Self, EngineError> {
        if values.len() != len {
            return Err(EngineError::ElementCount {
                shape: vec![1, len],
                expected: len,
                actual: values.len(),
            });
        }
        Ok(Self(values.to_vec()))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f32> {
        self.0.get(index).copied()
    }

    pub(crate) fn set(&mut self, index: usize, value: f32) {
        self.0[index] = value;
    }

    /// `[1, len]` tensor.
    pub fn to_tensor(&self) -> Tensor {
        Tensor::row(&self.0)
    }
}

/// LSTM hidden and cell state, each `[layers, 1, hidden]`.
///
/// Always replaced as a pair; there is no way to update one buffer alone.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrentMemory {
    hidden: Tensor,
    cell: Tensor,
}

impl RecurrentMemory {
    pub fn new(hidden: Tensor, cell: Tensor) -> Result<Self, EngineError> {
        if hidden.shape() != cell.shape() {
            return Err(EngineError::Backend(format!(
                "recurrent memory: hidden {:?} and cell {:?} shapes differ",
                hidden.shape(),
                cell.shape()
            )));
        }
        Ok(Self { hidden, cell })
    }

    pub fn hidden(&self) -> &Tensor {
        &self.hidden
    }

    pub fn cell(&self) -> &Tensor {
        &self.cell
    }
}

/// Physically-interpretable model state.
///
/// The encoder and decoders only see `(x, theta)`; the velocities are zero after
/// an encode or reset and are carried only by the learned dynamics.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct InterpretableState {
    pub x: f32,
    pub theta: f32,
    pub x_dot: f32,
    pub theta_dot: f32,
}

impl InterpretableState {
    pub fn from_pose(x: f32, theta: f32) -> Self {
        Self {
            x,
            theta,
            x_dot: 0.0,
            theta_dot: 0.0,
        }
    }

    pub fn to_physical(self) -> PhysicalState {
        PhysicalState {
            x: self.x,
            x_dot: self.x_dot,
            theta: self.theta,
            theta_dot: self.theta_dot,
        }
    }

    pub fn from_physical(s: PhysicalState) -> Self {
        Self {
            x: s.x,
            theta: s.theta,
            x_dot: s.x_dot,
            theta_dot: s.theta_dot,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorldState {
    pub physical: PhysicalState,
    pub latent: LatentVector,
    /// `None` means zeros: no recurrent step has run since the last reset or sync.
    pub memory: Option<RecurrentMemory>,
    pub interpretable: InterpretableState,

    pub ground_truth_image: Option<Arc<Frame>>,
    pub latent_image: Option<Arc<Frame>>,
    pub interpretable_image: Option<Arc<Frame>>,

    /// Last failure, for display.
    pub error: Option<String>,
}

impl WorldState {
    pub fn new(latent_len: usize) -> Self {
        Self {
            physical: PhysicalState::ORIGIN,
            latent: LatentVector::zeros(latent_len),
            memory: None,
            interpretable: InterpretableState::default(),
            ground_truth_image: None,
            latent_image: None,
            interpretable_image: None,
            error: None,
        }
    }
}
