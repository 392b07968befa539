//! Declarative model-to-panel wiring.
//!
//! Each visualizer is a list of [`Binding`]s: which model serves which phase and
//! which state stream its result lands in. The orchestrator walks this table
//! instead of hard-coding per-visualizer control flow.

use std::sync::Arc;

use wmscope_physics::{Action, Frame, PhysicalState};

use crate::controls::VisualizerKind;
use crate::engine::{
    take_output, ModelDims, ModelRole, IN_ACTION, IN_CELL, IN_HIDDEN, IN_IMAGE, IN_LATENT,
    IN_LATENT_Z, IN_STATE, OUT_CELL, OUT_HIDDEN, OUT_IMAGE, OUT_MU, OUT_NEXT_LATENT,
    OUT_NEXT_STATE, OUT_RECON, OUT_STATE,
};
use crate::error::EngineError;
use crate::staleness::Stream;
use crate::state::{InterpretableState, LatentVector, RecurrentMemory, WorldState};
use crate::tensor::{named, tensor_to_frame, NamedTensors, Tensor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Encode the ground-truth frame.
    Sync,
    /// Advance one time step under an action.
    Step,
    /// Render a state stream to an image.
    Decode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub role: ModelRole,
    pub phase: Phase,
    /// Stream the result is committed to.
    pub stream: Stream,
}

const fn bind(role: ModelRole, phase: Phase, stream: Stream) -> Binding {
    Binding {
        role,
        phase,
        stream,
    }
}

const VAE_ENCODE: Binding = bind(ModelRole::ImageEncoder, Phase::Sync, Stream::Latent);
const VAE_DECODE: Binding = bind(ModelRole::ImageDecoder, Phase::Decode, Stream::LatentImage);
const LATENT_STEP: Binding = bind(ModelRole::LatentStep, Phase::Step, Stream::Latent);
const PIWM_ENCODE: Binding = bind(
    ModelRole::InterpretableEncoder,
    Phase::Sync,
    Stream::Interpretable,
);
const PIWM_DECODE: Binding = bind(
    ModelRole::InterpretableDecoder,
    Phase::Decode,
    Stream::InterpretableImage,
);
const PIWM_STEP: Binding = bind(
    ModelRole::InterpretableStep,
    Phase::Step,
    Stream::Interpretable,
);
const STATE_DECODE_2D: Binding = bind(
    ModelRole::StateDecoder2d,
    Phase::Decode,
    Stream::InterpretableImage,
);
const STATE_DECODE_4D: Binding = bind(
    ModelRole::StateDecoder4d,
    Phase::Decode,
    Stream::InterpretableImage,
);

impl VisualizerKind {
    pub fn bindings(self) -> &'static [Binding] {
        match self {
            VisualizerKind::VaeLatent => &[VAE_DECODE],
            VisualizerKind::StateLatent => &[STATE_DECODE_2D],
            VisualizerKind::SemiInterpretable => &[STATE_DECODE_4D],
            VisualizerKind::LatentRollout => &[VAE_ENCODE, VAE_DECODE, LATENT_STEP],
            VisualizerKind::Piwm => &[
                VAE_ENCODE,
                VAE_DECODE,
                LATENT_STEP,
                PIWM_ENCODE,
                PIWM_DECODE,
                PIWM_STEP,
            ],
        }
    }

    pub fn bindings_for(self, phase: Phase) -> impl Iterator<Item = Binding> {
        self.bindings().iter().copied().filter(move |b| b.phase == phase)
    }
}

/// A model result ready to be committed to its stream.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Update {
    Latent {
        latent: LatentVector,
        memory: Option<RecurrentMemory>,
    },
    Interpretable(InterpretableState),
    Image {
        stream: Stream,
        frame: Arc<Frame>,
    },
}

impl Update {
    pub(crate) fn apply(self, state: &mut WorldState) {
        match self {
            Update::Latent { latent, memory } => {
                state.latent = latent;
                state.memory = memory;
            }
            Update::Interpretable(s) => state.interpretable = s,
            Update::Image { stream, frame } => match stream {
                Stream::LatentImage => state.latent_image = Some(frame),
                _ => state.interpretable_image = Some(frame),
            },
        }
    }
}

impl Binding {
    fn wrong_phase(&self, wanted: Phase) -> EngineError {
        EngineError::Backend(format!(
            "{} serves {:?}, not {:?}",
            self.role, self.phase, wanted
        ))
    }

    pub(crate) fn sync_inputs(&self, image: &Tensor) -> Result<NamedTensors, EngineError> {
        match self.phase {
            Phase::Sync => Ok(named([(IN_IMAGE, image.clone())])),
            _ => Err(self.wrong_phase(Phase::Sync)),
        }
    }

    /// Step inputs from the state as it is when the step runs.
    pub(crate) fn step_inputs(
        &self,
        state: &WorldState,
        action: Action,
        dims: &ModelDims,
    ) -> Result<NamedTensors, EngineError> {
        let action = Tensor::row(&[action.as_input()]);
        match self.role {
            ModelRole::LatentStep => {
                let (h0, c0) = match &state.memory {
                    Some(m) => (m.hidden().clone(), m.cell().clone()),
                    None => {
                        let zeros = Tensor::new(
                            vec![0.0; dims.memory_len()],
                            &[dims.layers, 1, dims.hidden],
                        )?;
                        (zeros.clone(), zeros)
                    }
                };
                Ok(named([
                    (IN_LATENT, state.latent.to_tensor()),
                    (IN_ACTION, action),
                    (IN_HIDDEN, h0),
                    (IN_CELL, c0),
                ]))
            }
            ModelRole::InterpretableStep => Ok(named([
                (
                    IN_STATE,
                    Tensor::row(&state.interpretable.to_physical().to_array()),
                ),
                (IN_ACTION, action),
            ])),
            _ => Err(self.wrong_phase(Phase::Step)),
        }
    }

    pub(crate) fn decode_inputs(&self, state: &WorldState) -> Result<NamedTensors, EngineError> {
        let s = state.interpretable;
        match self.role {
            ModelRole::ImageDecoder => Ok(named([(IN_LATENT_Z, state.latent.to_tensor())])),
            ModelRole::InterpretableDecoder | ModelRole::StateDecoder2d => {
                Ok(named([(IN_STATE, Tensor::row(&[s.x, s.theta]))]))
            }
            // Velocities are always fed as zero to this decoder.
            ModelRole::StateDecoder4d => {
                Ok(named([(IN_STATE, Tensor::row(&[s.x, 0.0, s.theta, 0.0]))]))
            }
            _ => Err(self.wrong_phase(Phase::Decode)),
        }
    }

    /// Turn validated outputs into the update for this binding's stream.
    pub(crate) fn consume(
        &self,
        mut outputs: NamedTensors,
        dims: &ModelDims,
    ) -> Result<Update, EngineError> {
        let role = self.role;
        let mut take = |name: &str| take_output(role, &mut outputs, name);

        match role {
            ModelRole::ImageEncoder => {
                let mu = take(OUT_MU)?;
                Ok(Update::Latent {
                    latent: LatentVector::from_slice(mu.data(), dims.latent)?,
                    memory: None,
                })
            }
            ModelRole::LatentStep => {
                let next = take(OUT_NEXT_LATENT)?;
                let hidden = take(OUT_HIDDEN)?;
                let cell = take(OUT_CELL)?;
                Ok(Update::Latent {
                    latent: LatentVector::from_slice(next.data(), dims.latent)?,
                    memory: Some(RecurrentMemory::new(hidden, cell)?),
                })
            }
            ModelRole::InterpretableEncoder => {
                let [x, theta] = fixed::<2>(role, &take(OUT_STATE)?)?;
                Ok(Update::Interpretable(InterpretableState::from_pose(x, theta)))
            }
            ModelRole::InterpretableStep => {
                let next = fixed::<4>(role, &take(OUT_NEXT_STATE)?)?;
                Ok(Update::Interpretable(InterpretableState::from_physical(
                    PhysicalState::from_array(next),
                )))
            }
            ModelRole::ImageDecoder | ModelRole::StateDecoder4d => {
                let image = take(OUT_RECON)?;
                self.image_update(&image, dims)
            }
            ModelRole::InterpretableDecoder | ModelRole::StateDecoder2d => {
                let image = take(OUT_IMAGE)?;
                self.image_update(&image, dims)
            }
        }
    }

    fn image_update(&self, image: &Tensor, dims: &ModelDims) -> Result<Update, EngineError> {
        let frame = tensor_to_frame(image, dims.image_width, dims.image_height)?;
        Ok(Update::Image {
            stream: self.stream,
            frame: Arc::new(frame),
        })
    }
}

fn fixed<const N: usize>(role: ModelRole, t: &Tensor) -> Result<[f32; N], EngineError> {
    t.data().try_into().map_err(|_| {
        EngineError::Backend(format!(
            "{role}: expected {N} output values, got {}",
            t.len()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoders_commit_to_image_streams() {
        for kind in VisualizerKind::all() {
            for b in kind.bindings_for(Phase::Decode) {
                assert!(matches!(
                    b.stream,
                    Stream::LatentImage | Stream::InterpretableImage
                ));
            }
            for b in kind.bindings() {
                if b.phase != Phase::Decode {
                    assert!(b.stream.image().is_some());
                }
            }
        }
    }

    #[test]
    fn every_state_stream_with_a_step_has_a_decoder() {
        for kind in VisualizerKind::all() {
            for step in kind.bindings_for(Phase::Step) {
                let image = step.stream.image().unwrap();
                assert!(kind.bindings_for(Phase::Decode).any(|d| d.stream == image));
            }
        }
    }

    #[test]
    fn latent_step_starts_from_zero_memory() {
        let dims = ModelDims::default();
        let state = WorldState::new(dims.latent);
        let inputs = LATENT_STEP.step_inputs(&state, Action::Right, &dims).unwrap();
        assert_eq!(inputs[IN_HIDDEN].shape(), &[2, 1, 128]);
        assert!(inputs[IN_CELL].data().iter().all(|v| *v == 0.0));
        assert_eq!(inputs[IN_ACTION].data(), &[1.0]);
    }

    #[test]
    fn four_d_decoder_zeroes_velocities() {
        let mut state = WorldState::new(16);
        state.interpretable = InterpretableState {
            x: 1.0,
            theta: 0.3,
            x_dot: 5.0,
            theta_dot: -2.0,
        };
        let inputs = STATE_DECODE_4D.decode_inputs(&state).unwrap();
        assert_eq!(inputs[IN_STATE].data(), &[1.0, 0.0, 0.3, 0.0]);
    }

    #[test]
    fn encoder_clears_recurrent_memory() {
        let dims = ModelDims::default();
        let outputs = named([(OUT_MU, Tensor::row(&[0.25; 16]))]);
        let update = VAE_ENCODE.consume(outputs, &dims).unwrap();

        let mut state = WorldState::new(16);
        state.memory = Some(
            RecurrentMemory::new(Tensor::zeros(&[2, 1, 128]), Tensor::zeros(&[2, 1, 128]))
                .unwrap(),
        );
        update.apply(&mut state);
        assert!(state.memory.is_none());
        assert_eq!(state.latent.get(3), Some(0.25));
    }

    #[test]
    fn step_replaces_memory_as_a_pair() {
        let dims = ModelDims::default();
        let ones = Tensor::new(vec![1.0; 256], &[2, 1, 128]).unwrap();
        let outputs = named([
            (OUT_NEXT_LATENT, Tensor::row(&[0.5; 16])),
            (OUT_HIDDEN, ones.clone()),
            (OUT_CELL, ones),
        ]);
        let mut state = WorldState::new(16);
        LATENT_STEP.consume(outputs, &dims).unwrap().apply(&mut state);
        let memory = state.memory.unwrap();
        assert!(memory.hidden().data().iter().all(|v| *v == 1.0));
        assert!(memory.cell().data().iter().all(|v| *v == 1.0));
    }

    #[test]
    fn decoder_output_becomes_frame() {
        let dims = ModelDims::default();
        let outputs = named([(OUT_RECON, Tensor::zeros(&[1, 3, 96, 96]))]);
        let mut state = WorldState::new(16);
        VAE_DECODE.consume(outputs, &dims).unwrap().apply(&mut state);
        let frame = state.latent_image.unwrap();
        assert_eq!(frame.pixel(10, 10), [0, 0, 0, 255]);
        assert!(state.interpretable_image.is_none());
    }

    #[test]
    fn wrong_phase_is_rejected() {
        let state = WorldState::new(16);
        assert!(VAE_ENCODE.decode_inputs(&state).is_err());
        assert!(VAE_DECODE.sync_inputs(&Tensor::zeros(&[1, 3, 96, 96])).is_err());
    }
}
