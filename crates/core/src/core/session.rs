//! One inference session: the loaded engines, the run queue they share, and
//! the renderer for ground-truth frames.
//!
//! Engines are loaded once, up front. A role that fails to load is remembered
//! with its error so visualizers depending on it can report why they are not
//! ready; the session itself stays usable for every other role.

use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, error, info};
use wmscope_physics::{CartPoleRenderer, Frame, PhysicalState, Renderer};

use crate::config::SessionConfig;
use crate::engine::{InferenceEngine, ModelLoader, ModelRole};
use crate::error::EngineError;
use crate::learned::LearnedDynamics;
use crate::run_queue::{QueuedRun, RunQueue};
use crate::tensor::NamedTensors;

#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    queue: RunQueue,
    engines: HashMap<ModelRole, Arc<dyn InferenceEngine>>,
    failures: HashMap<ModelRole, EngineError>,
    renderer: Arc<dyn Renderer>,
}

pub struct SessionBuilder {
    config: SessionConfig,
    engines: HashMap<ModelRole, Arc<dyn InferenceEngine>>,
    failures: HashMap<ModelRole, EngineError>,
    renderer: Arc<dyn Renderer>,
}

impl SessionBuilder {
    /// Starts with the built-in learned dynamics registered for
    /// [`ModelRole::InterpretableStep`].
    pub fn new(config: SessionConfig) -> Self {
        let mut engines: HashMap<ModelRole, Arc<dyn InferenceEngine>> = HashMap::new();
        engines.insert(
            ModelRole::InterpretableStep,
            Arc::new(LearnedDynamics::new(config.learned, config.integrator)),
        );
        Self {
            config,
            engines,
            failures: HashMap::new(),
            renderer: Arc::new(CartPoleRenderer::default()),
        }
    }

    /// Register (or replace) the engine for `role`.
    pub fn engine(mut self, role: ModelRole, engine: Arc<dyn InferenceEngine>) -> Self {
        self.failures.remove(&role);
        self.engines.insert(role, engine);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    /// Load `roles` through `loader`, one at a time.
    ///
    /// Roles without a model path (built-ins with no override) are skipped.
    /// Failures are recorded, not returned.
    pub async fn load_from<L>(mut self, loader: &L, roles: &[ModelRole]) -> Self
    where
        L: ModelLoader + ?Sized,
    {
        for &role in roles {
            let Some(path) = self.config.model_path(role) else {
                debug!(role = role.label(), "no model file; keeping built-in engine");
                continue;
            };
            match loader.load(role, &path).await {
                Ok(engine) => {
                    info!(role = role.label(), path = %path, "model loaded");
                    self.failures.remove(&role);
                    self.engines.insert(role, engine);
                }
                Err(e) => {
                    let e = match e {
                        e @ EngineError::Load { .. } => e,
                        other => EngineError::Load {
                            role,
                            path: path.clone(),
                            reason: other.to_string(),
                        },
                    };
                    error!(role = role.label(), path = %path, "model failed to load: {}", e);
                    self.engines.remove(&role);
                    self.failures.insert(role, e);
                }
            }
        }
        self
    }

    /// Finish the session. Spawns the run queue, so this must run inside a
    /// Tokio runtime.
    pub fn build(self) -> Session {
        let queue = RunQueue::with_timeout(self.config.run_timeout());
        info!(
            engines = self.engines.len(),
            failures = self.failures.len(),
            "inference session ready"
        );
        Session {
            inner: Arc::new(SessionInner {
                config: self.config,
                queue,
                engines: self.engines,
                failures: self.failures,
                renderer: self.renderer,
            }),
        }
    }
}

impl Session {
    pub fn builder(config: SessionConfig) -> SessionBuilder {
        SessionBuilder::new(config)
    }

    /// Load `roles` and build the session in one go.
    pub async fn load<L>(config: SessionConfig, loader: &L, roles: &[ModelRole]) -> Session
    where
        L: ModelLoader + ?Sized,
    {
        SessionBuilder::new(config)
            .load_from(loader, roles)
            .await
            .build()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &RunQueue {
        &self.inner.queue
    }

    pub fn has_engine(&self, role: ModelRole) -> bool {
        self.inner.engines.contains_key(&role)
    }

    /// Why `role` has no engine: its load error, or `Unavailable` if it was
    /// never loaded. `None` when the engine is present.
    pub fn unavailable(&self, role: ModelRole) -> Option<EngineError> {
        if self.has_engine(role) {
            return None;
        }
        Some(
            self.inner
                .failures
                .get(&role)
                .cloned()
                .unwrap_or(EngineError::Unavailable(role)),
        )
    }

    pub fn render_ground_truth(&self, state: &PhysicalState) -> Frame {
        let dims = &self.inner.config.dims;
        self.inner
            .renderer
            .render(state, dims.image_width, dims.image_height)
    }

    /// Queue one evaluation of `role`.
    pub fn run(&self, role: ModelRole, inputs: NamedTensors) -> QueuedRun<NamedTensors> {
        let session = self.clone();
        self.inner
            .queue
            .enqueue(move || async move { session.evaluate(role, inputs).await })
    }

    /// Contract-checked evaluation. Only called from inside a queued task.
    pub(crate) async fn evaluate(
        &self,
        role: ModelRole,
        inputs: NamedTensors,
    ) -> Result<NamedTensors, EngineError> {
        let engine = self
            .inner
            .engines
            .get(&role)
            .cloned()
            .ok_or(EngineError::Unavailable(role))?;
        let contract = role.contract(&self.inner.config.dims);
        contract.check_inputs(role, &inputs)?;
        let outputs = engine.evaluate(inputs).await?;
        contract.check_outputs(role, &outputs)?;
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{FnEngine, LoadFuture, IN_LATENT_Z, OUT_RECON};
    use crate::error::RunError;
    use crate::tensor::{named, Tensor};

    struct OnlyDecoder;

    impl ModelLoader for OnlyDecoder {
        fn load<'a>(&'a self, role: ModelRole, path: &'a str) -> LoadFuture<'a> {
            Box::pin(async move {
                if role != ModelRole::ImageDecoder {
                    return Err(EngineError::Backend(format!("no such file: {path}")));
                }
                let engine: Arc<dyn InferenceEngine> = Arc::new(FnEngine::new(|_: NamedTensors| {
                    Ok(named([(OUT_RECON, Tensor::zeros(&[1, 3, 96, 96]))]))
                }));
                Ok(engine)
            })
        }
    }

    #[tokio::test]
    async fn load_records_failures_per_role() {
        let session = Session::load(
            SessionConfig::default(),
            &OnlyDecoder,
            &[
                ModelRole::ImageDecoder,
                ModelRole::ImageEncoder,
                ModelRole::InterpretableStep,
            ],
        )
        .await;

        assert!(session.has_engine(ModelRole::ImageDecoder));
        assert!(session.has_engine(ModelRole::InterpretableStep));
        match session.unavailable(ModelRole::ImageEncoder) {
            Some(EngineError::Load { path, .. }) => assert_eq!(path, "/vae_encoder16.onnx"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(
            session.unavailable(ModelRole::LatentStep),
            Some(EngineError::Unavailable(ModelRole::LatentStep))
        );
    }

    #[tokio::test]
    async fn run_validates_contract() {
        let session = Session::load(
            SessionConfig::default(),
            &OnlyDecoder,
            &[ModelRole::ImageDecoder],
        )
        .await;

        let bad = session.run(
            ModelRole::ImageDecoder,
            named([(IN_LATENT_Z, Tensor::zeros(&[1, 3]))]),
        );
        assert!(matches!(
            bad.await,
            Err(RunError::Engine(EngineError::ShapeMismatch { .. }))
        ));

        let good = session.run(
            ModelRole::ImageDecoder,
            named([(IN_LATENT_Z, Tensor::zeros(&[1, 16]))]),
        );
        assert_eq!(good.await.unwrap()[OUT_RECON].shape(), &[1, 3, 96, 96]);
    }

    #[tokio::test]
    async fn missing_engine_is_unavailable() {
        let session = Session::builder(SessionConfig::default()).build();
        let run = session.run(ModelRole::LatentStep, NamedTensors::new());
        assert_eq!(
            run.await,
            Err(RunError::Engine(EngineError::Unavailable(ModelRole::LatentStep)))
        );
    }

    #[tokio::test]
    async fn ground_truth_frame_uses_model_dims() {
        let session = Session::builder(SessionConfig::default()).build();
        let frame = session.render_ground_truth(&PhysicalState::ORIGIN);
        assert_eq!((frame.width(), frame.height()), (96, 96));
    }
}
