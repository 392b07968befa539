//! Cart-pole dynamics.
//!
//! Coordinate system (matches the renderer and the trained models):
//! - `x` is the cart position, `0` at the centre of the track, `±2.4` at the edges
//! - `theta` is the pole angle in radians, `0` upright
//!
//! The ground-truth simulation and the learned dynamics used by the interpretable
//! model share [`transition`]; they differ only in [`CartPoleParams`].

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

pub const GRAVITY: f32 = 9.8;

/// Fixed integration step (seconds).
pub const TAU: f32 = 0.02;

/// Half-width of the visible track.
pub const X_THRESHOLD: f32 = 2.4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Action {
    Left,
    Right,
}

impl Action {
    /// Encoding fed to the models' `action` input (`[1, 1]`).
    pub fn as_input(self) -> f32 {
        match self {
            Action::Left => 0.0,
            Action::Right => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Action::Left => "left",
            Action::Right => "right",
        }
    }

    fn direction(self) -> f32 {
        match self {
            Action::Left => -1.0,
            Action::Right => 1.0,
        }
    }
}

/// Full cart-pole state. Always fully defined; there are no partial updates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhysicalState {
    pub x: f32,
    pub x_dot: f32,
    pub theta: f32,
    pub theta_dot: f32,
}

impl PhysicalState {
    pub const ORIGIN: PhysicalState = PhysicalState {
        x: 0.0,
        x_dot: 0.0,
        theta: 0.0,
        theta_dot: 0.0,
    };

    /// `[x, x_dot, theta, theta_dot]`, the layout of 4-D state tensors.
    pub fn to_array(self) -> [f32; 4] {
        [self.x, self.x_dot, self.theta, self.theta_dot]
    }

    pub fn from_array(v: [f32; 4]) -> Self {
        Self {
            x: v[0],
            x_dot: v[1],
            theta: v[2],
            theta_dot: v[3],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Integrator {
    /// Positions advance with the velocity from before the step.
    Euler,
    /// Velocities advance first and positions use the updated velocity.
    #[default]
    SemiImplicitEuler,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CartPoleParams {
    pub gravity: f32,
    pub mass_cart: f32,
    pub mass_pole: f32,
    /// Half the pole length.
    pub length: f32,
    pub force_mag: f32,
    pub tau: f32,
}

impl CartPoleParams {
    /// Constants of the simulation the training data was recorded from.
    pub fn ground_truth() -> Self {
        Self {
            gravity: GRAVITY,
            mass_cart: 1.0,
            mass_pole: 0.1,
            length: 0.5,
            force_mag: 10.0,
            tau: TAU,
        }
    }

    /// Constants recovered by the physically-interpretable model.
    ///
    /// These deliberately differ from [`CartPoleParams::ground_truth`]: the gap is
    /// the model's parameter error, and it is what makes drift visible.
    pub fn learned() -> Self {
        Self {
            gravity: GRAVITY,
            mass_cart: 1.017,
            mass_pole: 0.103,
            length: 0.5,
            force_mag: 11.26,
            tau: TAU,
        }
    }

    pub fn total_mass(&self) -> f32 {
        self.mass_cart + self.mass_pole
    }

    pub fn polemass_length(&self) -> f32 {
        self.mass_pole * self.length
    }
}

impl Default for CartPoleParams {
    fn default() -> Self {
        Self::ground_truth()
    }
}

/// Advance `state` by one fixed step under `action`.
///
/// Pure: identical inputs give bit-identical outputs.
pub fn transition(
    state: &PhysicalState,
    action: Action,
    params: &CartPoleParams,
    integrator: Integrator,
) -> PhysicalState {
    let force = action.direction() * params.force_mag;
    let total_mass = params.total_mass();
    let polemass_length = params.polemass_length();

    let (sintheta, costheta) = state.theta.sin_cos();

    let temp =
        (force + polemass_length * state.theta_dot * state.theta_dot * sintheta) / total_mass;
    let theta_acc = (params.gravity * sintheta - costheta * temp)
        / (params.length * (4.0 / 3.0 - params.mass_pole * costheta * costheta / total_mass));
    let x_acc = temp - polemass_length * theta_acc * costheta / total_mass;

    let tau = params.tau;
    match integrator {
        Integrator::Euler => PhysicalState {
            x: state.x + tau * state.x_dot,
            x_dot: state.x_dot + tau * x_acc,
            theta: state.theta + tau * state.theta_dot,
            theta_dot: state.theta_dot + tau * theta_acc,
        },
        Integrator::SemiImplicitEuler => {
            let x_dot = state.x_dot + tau * x_acc;
            let theta_dot = state.theta_dot + tau * theta_acc;
            PhysicalState {
                x: state.x + tau * x_dot,
                x_dot,
                theta: state.theta + tau * theta_dot,
                theta_dot,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bits(s: PhysicalState) -> [u32; 4] {
        s.to_array().map(f32::to_bits)
    }

    #[test]
    fn transition_is_bit_reproducible() {
        let params = CartPoleParams::ground_truth();
        let start = PhysicalState {
            x: 0.3,
            x_dot: -0.7,
            theta: 0.12,
            theta_dot: 1.5,
        };
        for action in [Action::Left, Action::Right] {
            for integrator in [Integrator::Euler, Integrator::SemiImplicitEuler] {
                let a = transition(&start, action, &params, integrator);
                let b = transition(&start, action, &params, integrator);
                assert_eq!(bits(a), bits(b));
            }
        }
    }

    #[test]
    fn force_direction_maps_to_position_sign() {
        let params = CartPoleParams::ground_truth();
        let integrator = Integrator::SemiImplicitEuler;
        let right = transition(&PhysicalState::ORIGIN, Action::Right, &params, integrator);
        let left = transition(&PhysicalState::ORIGIN, Action::Left, &params, integrator);

        assert!(right.x > 0.0);
        assert!(left.x < 0.0);
        assert!(right.x >= left.x);
        // Pushing the cart right tips the pole back to the left.
        assert!(right.theta_dot < 0.0);
    }

    #[test]
    fn explicit_euler_moves_position_one_step_late() {
        let params = CartPoleParams::ground_truth();
        let s1 = transition(&PhysicalState::ORIGIN, Action::Right, &params, Integrator::Euler);
        assert_eq!(s1.x, 0.0);
        assert!(s1.x_dot > 0.0);

        let s2 = transition(&s1, Action::Right, &params, Integrator::Euler);
        assert!(s2.x > 0.0);
    }

    #[test]
    fn learned_constants_drift_from_ground_truth() {
        let truth = CartPoleParams::ground_truth();
        let learned = CartPoleParams::learned();
        let integrator = Integrator::SemiImplicitEuler;

        let mut a = PhysicalState::ORIGIN;
        let mut b = PhysicalState::ORIGIN;
        for _ in 0..10 {
            a = transition(&a, Action::Right, &truth, integrator);
            b = transition(&b, Action::Right, &learned, integrator);
        }
        // The learned model over-estimates the push force.
        assert!(b.x > a.x);
    }

    #[test]
    fn tilted_pole_falls_further_without_opposing_force() {
        let params = CartPoleParams::ground_truth();
        let start = PhysicalState {
            theta: 0.1,
            ..PhysicalState::ORIGIN
        };
        let next = transition(&start, Action::Left, &params, Integrator::SemiImplicitEuler);
        assert!(next.theta > start.theta);
    }
}
