//! Built-in engine for the interpretable model's learned dynamics.
//!
//! The learned transition is closed-form, but it is still served through the
//! engine boundary so the interpretable step is ordered, token-guarded and
//! failure-isolated exactly like the network-backed steps.

use wmscope_physics::{transition, Action, CartPoleParams, Integrator, PhysicalState};

use crate::engine::{EngineFuture, InferenceEngine, IN_ACTION, IN_STATE, OUT_NEXT_STATE};
use crate::error::EngineError;
use crate::tensor::{named, NamedTensors, Tensor};

#[derive(Debug, Clone, Copy)]
pub struct LearnedDynamics {
    pub params: CartPoleParams,
    pub integrator: Integrator,
}

impl LearnedDynamics {
    pub fn new(params: CartPoleParams, integrator: Integrator) -> Self {
        Self { params, integrator }
    }

    fn step(&self, inputs: &NamedTensors) -> Result<NamedTensors, EngineError> {
        let state = inputs
            .get(IN_STATE)
            .ok_or_else(|| EngineError::Backend("learned dynamics: missing `state`".into()))?;
        let action = inputs
            .get(IN_ACTION)
            .ok_or_else(|| EngineError::Backend("learned dynamics: missing `action`".into()))?;

        let s: [f32; 4] = state.data().try_into().map_err(|_| {
            EngineError::Backend(format!(
                "learned dynamics: `state` has {} elements, expected 4",
                state.len()
            ))
        })?;
        let action = match action.data().first() {
            Some(v) if *v >= 0.5 => Action::Right,
            Some(_) => Action::Left,
            None => return Err(EngineError::Backend("learned dynamics: empty `action`".into())),
        };

        let next = transition(
            &PhysicalState::from_array(s),
            action,
            &self.params,
            self.integrator,
        );
        let out = Tensor::new(next.to_array().to_vec(), &[1, 4])?;
        Ok(named([(OUT_NEXT_STATE, out)]))
    }
}

impl Default for LearnedDynamics {
    fn default() -> Self {
        Self::new(CartPoleParams::learned(), Integrator::default())
    }
}

impl InferenceEngine for LearnedDynamics {
    fn evaluate(&self, inputs: NamedTensors) -> EngineFuture<'_> {
        let result = self.step(&inputs);
        Box::pin(async move { result })
    }
}
