//! Visualizer inventory and control metadata.
//!
//! Kept free of any presentation code so the slider ranges, panel layout and
//! model requirements of every visualizer can be unit-tested on the host.

use crate::engine::ModelRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VisualizerKind {
    VaeLatent,
    StateLatent,
    SemiInterpretable,
    LatentRollout,
    Piwm,
}

impl VisualizerKind {
    pub fn label(self) -> &'static str {
        match self {
            VisualizerKind::VaeLatent => "vae_latent",
            VisualizerKind::StateLatent => "state_latent",
            VisualizerKind::SemiInterpretable => "semi_interpretable",
            VisualizerKind::LatentRollout => "latent_rollout",
            VisualizerKind::Piwm => "piwm",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            VisualizerKind::VaeLatent => "VAE Latent",
            VisualizerKind::StateLatent => "State Decoder",
            VisualizerKind::SemiInterpretable => "Semi-Interpretable",
            VisualizerKind::LatentRollout => "Latent Rollout",
            VisualizerKind::Piwm => "PIWM",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            VisualizerKind::VaeLatent => "Edit the 16 latent dimensions of the image VAE and watch the decoder output. Dimensions the decoder ignores are marked unused.",
            VisualizerKind::StateLatent => "Decode an image directly from cart position and pole angle.",
            VisualizerKind::SemiInterpretable => "Decode an image from the full cart-pole state. Velocity inputs are held at zero.",
            VisualizerKind::LatentRollout => "Step the true cart-pole and the recurrent latent model side by side. Sync re-encodes the true frame into the latent.",
            VisualizerKind::Piwm => "Three panels: the true simulation, the latent world model, and the physically-interpretable model with learned dynamics.",
        }
    }

    pub fn all() -> &'static [VisualizerKind] {
        &[
            VisualizerKind::VaeLatent,
            VisualizerKind::StateLatent,
            VisualizerKind::SemiInterpretable,
            VisualizerKind::LatentRollout,
            VisualizerKind::Piwm,
        ]
    }

    pub fn panels(self) -> &'static [Panel] {
        match self {
            VisualizerKind::VaeLatent => &[Panel::Latent],
            VisualizerKind::StateLatent | VisualizerKind::SemiInterpretable => {
                &[Panel::Interpretable]
            }
            VisualizerKind::LatentRollout => &[Panel::GroundTruth, Panel::Latent],
            VisualizerKind::Piwm => &[Panel::GroundTruth, Panel::Latent, Panel::Interpretable],
        }
    }

    pub fn has_panel(self, panel: Panel) -> bool {
        self.panels().contains(&panel)
    }

    /// Models this visualizer cannot work without.
    pub fn required_roles(self) -> Vec<ModelRole> {
        let mut roles: Vec<ModelRole> = self.bindings().iter().map(|b| b.role).collect();
        roles.sort();
        roles.dedup();
        roles
    }

    pub fn physical_slider(self, field: StateField) -> SliderSpec {
        match field {
            StateField::Position => POSITION,
            StateField::Angle => ANGLE,
        }
    }

    /// Position range depends on what the decoder was trained on.
    pub fn interpretable_slider(self, field: StateField) -> SliderSpec {
        match (self, field) {
            (_, StateField::Angle) => ANGLE,
            (VisualizerKind::StateLatent | VisualizerKind::SemiInterpretable, _) => {
                DECODER_POSITION
            }
            _ => POSITION,
        }
    }

    pub fn latent_slider(self) -> SliderSpec {
        LATENT
    }

    /// Latent dimensions the image decoder is known to ignore.
    pub fn unused_latents(self) -> &'static [usize] {
        match self {
            VisualizerKind::VaeLatent => &UNUSED_LATENTS,
            _ => &[],
        }
    }
}

const UNUSED_LATENTS: [usize; 10] = [0, 1, 2, 3, 4, 6, 7, 8, 13, 14];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Panel {
    GroundTruth,
    Latent,
    Interpretable,
}

impl Panel {
    pub fn label(self) -> &'static str {
        match self {
            Panel::GroundTruth => "Ground truth",
            Panel::Latent => "Latent model",
            Panel::Interpretable => "Interpretable model",
        }
    }
}

/// Directly editable components of a cart-pole pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateField {
    Position,
    Angle,
}

/// Range input: `[min, max]` with values on multiples of `step`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliderSpec {
    pub min: f32,
    pub max: f32,
    pub step: f32,
}

pub const POSITION: SliderSpec = SliderSpec::new(-2.4, 2.4, 0.01);
pub const DECODER_POSITION: SliderSpec = SliderSpec::new(-2.14, 2.14, 0.01);
pub const ANGLE: SliderSpec = SliderSpec::new(-3.14159, 3.14159, 0.01);
pub const LATENT: SliderSpec = SliderSpec::new(-3.0, 3.0, 0.05);

impl SliderSpec {
    pub const fn new(min: f32, max: f32, step: f32) -> Self {
        Self { min, max, step }
    }

    /// Snap to the step grid, then clamp into range. Non-finite input maps to
    /// the value nearest zero.
    pub fn apply(&self, value: f32) -> f32 {
        let v = if value.is_finite() { value } else { 0.0 };
        let snapped = if self.step > 0.0 {
            (v / self.step).round() * self.step
        } else {
            v
        };
        self.clamp(snapped)
    }

    /// Clamp into range without snapping. Non-finite input maps to 0.
    pub fn clamp(&self, value: f32) -> f32 {
        let v = if value.is_finite() { value } else { 0.0 };
        v.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f32) -> bool {
        (self.min..=self.max).contains(&value)
    }
}
