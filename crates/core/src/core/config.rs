//! Session configuration (JSON).
//!
//! Every field is optional; missing fields take the values the shipped models
//! were exported with.

use std::fs;
use std::path::Path;
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Deserializer, Serialize};
use wmscope_physics::{CartPoleParams, Integrator};

use crate::engine::{ModelDims, ModelRole};
use crate::error::ConfigError;

fn default_model_dir() -> String {
    "/".to_string()
}

fn default_learned() -> CartPoleParams {
    CartPoleParams::learned()
}

fn default_ground_truth() -> CartPoleParams {
    CartPoleParams::ground_truth()
}

/// A partial `CartPoleParams` section. Fields left out keep the value of the
/// parameter set it is laid over.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ParamsOverlay {
    gravity: Option<f32>,
    mass_cart: Option<f32>,
    mass_pole: Option<f32>,
    length: Option<f32>,
    force_mag: Option<f32>,
    tau: Option<f32>,
}

impl ParamsOverlay {
    fn over(self, base: CartPoleParams) -> CartPoleParams {
        CartPoleParams {
            gravity: self.gravity.unwrap_or(base.gravity),
            mass_cart: self.mass_cart.unwrap_or(base.mass_cart),
            mass_pole: self.mass_pole.unwrap_or(base.mass_pole),
            length: self.length.unwrap_or(base.length),
            force_mag: self.force_mag.unwrap_or(base.force_mag),
            tau: self.tau.unwrap_or(base.tau),
        }
    }
}

fn learned_params<'de, D: Deserializer<'de>>(d: D) -> Result<CartPoleParams, D::Error> {
    Ok(ParamsOverlay::deserialize(d)?.over(CartPoleParams::learned()))
}

fn ground_truth_params<'de, D: Deserializer<'de>>(d: D) -> Result<CartPoleParams, D::Error> {
    Ok(ParamsOverlay::deserialize(d)?.over(CartPoleParams::ground_truth()))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Prefix for default model file names.
    #[serde(default = "default_model_dir")]
    pub model_dir: String,

    /// Per-role path overrides, used verbatim.
    #[serde(default)]
    pub models: HashMap<ModelRole, String>,

    #[serde(default)]
    pub dims: ModelDims,

    #[serde(default = "default_ground_truth", deserialize_with = "ground_truth_params")]
    pub ground_truth: CartPoleParams,

    /// Constants of the interpretable model's learned dynamics.
    #[serde(default = "default_learned", deserialize_with = "learned_params")]
    pub learned: CartPoleParams,

    #[serde(default)]
    pub integrator: Integrator,

    /// Per-run timeout; `None` lets a run wait indefinitely.
    #[serde(default)]
    pub run_timeout_ms: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model_dir: default_model_dir(),
            models: HashMap::new(),
            dims: ModelDims::default(),
            ground_truth: default_ground_truth(),
            learned: default_learned(),
            integrator: Integrator::default(),
            run_timeout_ms: None,
        }
    }
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Where to load `role` from; `None` for built-in engines without an override.
    pub fn model_path(&self, role: ModelRole) -> Option<String> {
        if let Some(p) = self.models.get(&role) {
            return Some(p.clone());
        }
        let file = role.default_file()?;
        Some(format!("{}/{}", self.model_dir.trim_end_matches('/'), file))
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_gives_defaults() {
        let cfg = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(cfg, SessionConfig::default());
        assert_eq!(cfg.dims.latent, 16);
        assert_eq!(cfg.integrator, Integrator::SemiImplicitEuler);
        assert_eq!(cfg.run_timeout(), None);
    }

    #[test]
    fn default_paths_sit_at_server_root() {
        let cfg = SessionConfig::default();
        assert_eq!(
            cfg.model_path(ModelRole::LatentStep).as_deref(),
            Some("/lstm_latent_step.onnx")
        );
        assert_eq!(cfg.model_path(ModelRole::InterpretableStep), None);
    }

    #[test]
    fn overrides_and_partial_sections_parse() {
        let cfg = SessionConfig::from_json_str(
            r#"{
                "model_dir": "assets/models/",
                "models": { "image_decoder": "custom/dec.onnx" },
                "learned": { "force_mag": 12.0 },
                "integrator": "euler",
                "run_timeout_ms": 1500
            }"#,
        )
        .unwrap();

        assert_eq!(
            cfg.model_path(ModelRole::ImageDecoder).as_deref(),
            Some("custom/dec.onnx")
        );
        assert_eq!(
            cfg.model_path(ModelRole::ImageEncoder).as_deref(),
            Some("assets/models/vae_encoder16.onnx")
        );
        assert_eq!(cfg.learned.force_mag, 12.0);
        assert_eq!(cfg.integrator, Integrator::Euler);
        assert_eq!(cfg.run_timeout(), Some(Duration::from_millis(1500)));
    }

    #[test]
    fn partial_params_keep_their_own_defaults() {
        let cfg = SessionConfig::from_json_str(
            r#"{ "learned": { "force_mag": 12.0 }, "ground_truth": { "mass_pole": 0.2 } }"#,
        )
        .unwrap();

        let learned = CartPoleParams::learned();
        assert_eq!(cfg.learned.force_mag, 12.0);
        assert_eq!(cfg.learned.mass_cart, learned.mass_cart);
        assert_eq!(cfg.learned.mass_pole, learned.mass_pole);
        assert_ne!(cfg.learned.mass_cart, cfg.ground_truth.mass_cart);

        let truth = CartPoleParams::ground_truth();
        assert_eq!(cfg.ground_truth.mass_pole, 0.2);
        assert_eq!(cfg.ground_truth.force_mag, truth.force_mag);
    }

    #[test]
    fn full_config_round_trips_through_json() {
        let cfg = SessionConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(SessionConfig::from_json_str(&text).unwrap(), cfg);
    }

    #[test]
    fn unknown_param_is_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "learned": { "mass": 2.0 } }"#);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn unknown_role_is_rejected() {
        let err = SessionConfig::from_json_str(r#"{ "models": { "mystery": "x.onnx" } }"#);
        assert!(matches!(err, Err(ConfigError::Parse(_))));
    }
}
