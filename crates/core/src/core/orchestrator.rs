//! Per-visualizer orchestration.
//!
//! An [`Orchestrator`] owns one visualizer's [`WorldState`] and turns user
//! intents (edit, step, sync, reset) into state changes and queued model runs:
//!
//! ```text
//! intent ──► local state change (synchronous) ──► bump revision
//!        └─► queued run ──► evaluate ──► token check ──► commit ──► queued decode
//! ```
//!
//! Ground-truth physics and rendering happen synchronously inside the intent.
//! Every model evaluation goes through the session's run queue, and every
//! result is checked against the staleness guard immediately before it is
//! committed, with the state write lock held. Edits advance the guard under the
//! same lock, so a result is either committed before an edit or discarded.
//!
//! Steps capture the latest token instead of issuing one: consecutive steps
//! chain on each other's results, while an edit, reset or sync supersedes every
//! step still in the queue. Decodes issue a fresh token, so only the most
//! recently requested image for a stream is shown.
//!
//! Failures never escape a run: they are logged, stored in
//! [`WorldState::error`] for display, and reported as [`Outcome::Failed`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{oneshot, watch};
use tracing::{debug, error, warn};
use wmscope_physics::{transition, Action, PhysicalState};

use crate::bindings::{Binding, Phase, Update};
use crate::controls::{Panel, StateField, VisualizerKind};
use crate::error::{EngineError, OrchestratorError, RunError};
use crate::prng::Prng;
use crate::session::Session;
use crate::staleness::{StalenessGuard, Stream, Token};
use crate::state::{InterpretableState, LatentVector, WorldState};
use crate::tensor::{frame_to_tensor, Tensor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// At least one required model is missing; the message says which and why.
    Unavailable(String),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }
}

/// How one queued run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Committed,
    /// A newer request for the same stream made this result obsolete.
    Superseded,
    Failed(String),
}

/// Runs started by one intent.
#[must_use = "runs proceed regardless; call `wait` to observe their outcomes"]
#[derive(Debug)]
pub struct Pending {
    runs: Vec<oneshot::Receiver<Outcome>>,
}

impl Pending {
    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Outcomes in the order the runs were queued.
    pub async fn wait(self) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(self.runs.len());
        for rx in self.runs {
            outcomes.push(
                rx.await
                    .unwrap_or_else(|_| Outcome::Failed(RunError::Aborted.to_string())),
            );
        }
        outcomes
    }
}

/// Cheap to clone; every clone drives the same visualizer.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

struct Shared {
    kind: VisualizerKind,
    session: Session,
    guard: StalenessGuard,
    readiness: Readiness,
    state: RwLock<WorldState>,
    revision: watch::Sender<u64>,
}

impl Orchestrator {
    /// Set up `kind` on top of `session` and queue its initial decodes.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(session: Session, kind: VisualizerKind) -> Self {
        let mut state = WorldState::new(session.config().dims.latent);

        let missing: Vec<String> = kind
            .required_roles()
            .into_iter()
            .filter_map(|role| session.unavailable(role))
            .map(|e| e.to_string())
            .collect();
        let readiness = if missing.is_empty() {
            Readiness::Ready
        } else {
            let msg = missing.join("; ");
            error!(visualizer = kind.label(), "models not ready: {}", msg);
            state.error = Some(msg.clone());
            Readiness::Unavailable(msg)
        };

        if kind.has_panel(Panel::GroundTruth) {
            state.ground_truth_image = Some(Arc::new(session.render_ground_truth(&state.physical)));
        }

        let (revision, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            kind,
            session,
            guard: StalenessGuard::new(),
            readiness,
            state: RwLock::new(state),
            revision,
        });

        for binding in kind.bindings_for(Phase::Decode) {
            let _ = shared.schedule_decode(binding);
        }

        Self { shared }
    }

    pub fn kind(&self) -> VisualizerKind {
        self.shared.kind
    }

    pub fn session(&self) -> &Session {
        &self.shared.session
    }

    pub fn readiness(&self) -> &Readiness {
        &self.shared.readiness
    }

    /// Copy of the current state. Images are shared, not copied.
    pub fn snapshot(&self) -> WorldState {
        self.shared.read().clone()
    }

    /// Change notifications: the value is bumped after every state change.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.shared.revision.borrow()
    }

    /// Wait until the session's queue is empty, including decodes queued by
    /// runs that were still in flight when this was called.
    pub async fn settle(&self) {
        let queue = self.shared.session.queue();
        loop {
            let _ = queue.barrier().await;
            if queue.pending() == 0 {
                break;
            }
        }
    }

    pub fn edit_physical(&self, field: StateField, value: f32) -> Result<(), OrchestratorError> {
        self.require_panel(Panel::GroundTruth, "ground-truth editing")?;
        let value = self.kind().physical_slider(field).apply(value);
        {
            let mut st = self.shared.write();
            let mut next = st.physical;
            match field {
                StateField::Position => next.x = value,
                StateField::Angle => next.theta = value,
            }
            self.shared.set_physical(&mut st, next);
        }
        self.shared.bump();
        Ok(())
    }

    /// Set one latent component. Supersedes in-flight latent steps and syncs.
    pub fn edit_latent(&self, index: usize, value: f32) -> Result<(), OrchestratorError> {
        self.require_panel(Panel::Latent, "latent editing")?;
        let value = self.kind().latent_slider().apply(value);
        {
            let mut st = self.shared.write();
            if index >= st.latent.len() {
                return Err(OrchestratorError::InvalidLatent(index));
            }
            st.latent.set(index, value);
            self.shared.guard.issue(Stream::Latent);
        }
        self.shared.bump();
        let _ = self.shared.schedule_decodes(Stream::Latent);
        Ok(())
    }

    /// Replace the whole latent vector; each component is clamped to the
    /// slider range.
    pub fn set_latent(&self, values: &[f32]) -> Result<(), OrchestratorError> {
        self.require_panel(Panel::Latent, "latent editing")?;
        let spec = self.kind().latent_slider();
        let snapped: Vec<f32> = values.iter().map(|v| spec.apply(*v)).collect();
        self.replace_latent(&snapped)
    }

    /// Sample every latent component from a standard normal.
    ///
    /// Samples are clamped to the slider range but not snapped to its step.
    pub fn randomize_latent(&self, rng: &mut Prng) -> Result<(), OrchestratorError> {
        self.require_panel(Panel::Latent, "latent editing")?;
        self.require_ready()?;
        let spec = self.kind().latent_slider();
        let len = self.shared.session.config().dims.latent;
        let values: Vec<f32> = (0..len)
            .map(|_| spec.clamp(rng.next_standard_normal()))
            .collect();
        self.replace_latent(&values)
    }

    fn replace_latent(&self, values: &[f32]) -> Result<(), OrchestratorError> {
        {
            let mut st = self.shared.write();
            let len = st.latent.len();
            st.latent = LatentVector::from_slice(values, len)
                .map_err(|_| OrchestratorError::InvalidLatent(values.len()))?;
            self.shared.guard.issue(Stream::Latent);
        }
        self.shared.bump();
        let _ = self.shared.schedule_decodes(Stream::Latent);
        Ok(())
    }

    pub fn edit_interpretable(
        &self,
        field: StateField,
        value: f32,
    ) -> Result<(), OrchestratorError> {
        self.require_panel(Panel::Interpretable, "interpretable editing")?;
        let value = self.kind().interpretable_slider(field).apply(value);
        {
            let mut st = self.shared.write();
            match field {
                StateField::Position => st.interpretable.x = value,
                StateField::Angle => st.interpretable.theta = value,
            }
            self.shared.guard.issue(Stream::Interpretable);
        }
        self.shared.bump();
        let _ = self.shared.schedule_decodes(Stream::Interpretable);
        Ok(())
    }

    /// Return one panel to its baseline. Resetting a model panel supersedes
    /// its in-flight runs and clears recurrent memory.
    pub fn reset(&self, panel: Panel) -> Result<(), OrchestratorError> {
        self.require_panel(panel, "reset")?;
        let source = {
            let mut st = self.shared.write();
            match panel {
                Panel::GroundTruth => {
                    self.shared.set_physical(&mut st, PhysicalState::ORIGIN);
                    None
                }
                Panel::Latent => {
                    st.latent = LatentVector::zeros(st.latent.len());
                    st.memory = None;
                    self.shared.guard.issue(Stream::Latent);
                    Some(Stream::Latent)
                }
                Panel::Interpretable => {
                    st.interpretable = InterpretableState::default();
                    self.shared.guard.issue(Stream::Interpretable);
                    Some(Stream::Interpretable)
                }
            }
        };
        self.shared.bump();
        if let Some(stream) = source {
            let _ = self.shared.schedule_decodes(stream);
        }
        Ok(())
    }

    /// Advance the ground truth now and queue one step per model panel.
    pub fn step(&self, action: Action) -> Result<Pending, OrchestratorError> {
        self.require_panel(Panel::GroundTruth, "step")?;
        self.require_ready()?;

        let config = self.shared.session.config();
        {
            let mut st = self.shared.write();
            let next = transition(&st.physical, action, &config.ground_truth, config.integrator);
            self.shared.set_physical(&mut st, next);
        }
        self.shared.bump();

        let runs: Vec<_> = self
            .kind()
            .bindings_for(Phase::Step)
            .map(|b| self.shared.schedule_step(b, action))
            .collect();
        debug!(action = action.label(), runs = runs.len(), "step queued");
        Ok(Pending { runs })
    }

    /// Re-encode the current ground-truth frame into every model panel.
    pub fn sync(&self) -> Result<Pending, OrchestratorError> {
        self.require_panel(Panel::GroundTruth, "sync")?;
        self.require_ready()?;

        let encoders: Vec<Binding> = self.kind().bindings_for(Phase::Sync).collect();
        if encoders.is_empty() {
            return Err(OrchestratorError::Unsupported("sync"));
        }

        // Tokens are issued under the write lock so no commit can interleave.
        let (image, tokens) = {
            let st = self.shared.write();
            let image = match &st.ground_truth_image {
                Some(frame) => frame_to_tensor(frame),
                None => frame_to_tensor(&self.shared.session.render_ground_truth(&st.physical)),
            };
            let tokens: Vec<Token> = encoders
                .iter()
                .map(|b| self.shared.guard.issue(b.stream))
                .collect();
            (image, tokens)
        };

        let shared = Arc::clone(&self.shared);
        let run = self.shared.submit("sync", move || async move {
            shared.run_sync(encoders, tokens, image).await
        });
        Ok(Pending { runs: vec![run] })
    }

    /// Clear a transient error. The not-ready message stays.
    pub fn dismiss_error(&self) {
        if !self.shared.readiness.is_ready() {
            return;
        }
        self.shared.write().error = None;
        self.shared.bump();
    }

    fn require_panel(&self, panel: Panel, what: &'static str) -> Result<(), OrchestratorError> {
        if self.kind().has_panel(panel) {
            Ok(())
        } else {
            Err(OrchestratorError::Unsupported(what))
        }
    }

    fn require_ready(&self) -> Result<(), OrchestratorError> {
        match &self.shared.readiness {
            Readiness::Ready => Ok(()),
            Readiness::Unavailable(msg) => Err(OrchestratorError::NotReady(msg.clone())),
        }
    }
}

impl Shared {
    fn read(&self) -> RwLockReadGuard<'_, WorldState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WorldState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r = r.wrapping_add(1));
    }

    fn set_physical(&self, st: &mut WorldState, physical: PhysicalState) {
        st.physical = physical;
        st.ground_truth_image = Some(Arc::new(self.session.render_ground_truth(&physical)));
    }

    /// Queue `task`. Errors from the task body, and run-level failures
    /// (timeouts, panics), are recorded and reported as [`Outcome::Failed`].
    fn submit<F, Fut>(self: &Arc<Self>, label: &'static str, task: F) -> oneshot::Receiver<Outcome>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Outcome, EngineError>> + Send + 'static,
    {
        let recorder = Arc::clone(self);
        let run = self.session.queue().enqueue(move || async move {
            let outcome = match task().await {
                Ok(outcome) => outcome,
                Err(e) => recorder.fail(label, e),
            };
            Ok::<_, RunError>(outcome)
        });

        let (tx, rx) = oneshot::channel();
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            let outcome = match run.await {
                Ok(outcome) => outcome,
                Err(e) => shared.fail(label, e),
            };
            let _ = tx.send(outcome);
        });
        rx
    }

    fn fail(&self, label: &'static str, err: impl fmt::Display) -> Outcome {
        let msg = err.to_string();
        warn!(run = label, "model run failed: {}", msg);
        if self.readiness.is_ready() {
            self.write().error = Some(msg.clone());
            self.bump();
        }
        Outcome::Failed(msg)
    }

    fn superseded(&self, binding: Binding, token: Token) -> Outcome {
        debug!(
            role = binding.role.label(),
            stream = token.stream().label(),
            token = token.value(),
            "discarding superseded run"
        );
        Outcome::Superseded
    }

    /// Apply `update` if `token` is still current, then queue the decodes that
    /// depend on the committed stream.
    fn commit(self: &Arc<Self>, binding: Binding, token: Token, update: Update) -> Outcome {
        {
            let mut st = self.write();
            if !self.guard.is_current(token) {
                drop(st);
                return self.superseded(binding, token);
            }
            update.apply(&mut st);
        }
        self.bump();
        if binding.phase != Phase::Decode {
            let _ = self.schedule_decodes(binding.stream);
        }
        Outcome::Committed
    }

    fn schedule_step(self: &Arc<Self>, binding: Binding, action: Action) -> oneshot::Receiver<Outcome> {
        let token = self.guard.current(binding.stream);
        let shared = Arc::clone(self);
        self.submit(binding.role.label(), move || async move {
            if !shared.guard.is_current(token) {
                return Ok(shared.superseded(binding, token));
            }
            let dims = shared.session.config().dims;
            // Inputs come from the state as the previous run left it.
            let inputs = {
                let st = shared.read();
                binding.step_inputs(&st, action, &dims)
            }?;
            let outputs = shared.session.evaluate(binding.role, inputs).await?;
            let update = binding.consume(outputs, &dims)?;
            Ok(shared.commit(binding, token, update))
        })
    }

    fn schedule_decodes(self: &Arc<Self>, source: Stream) -> Vec<oneshot::Receiver<Outcome>> {
        let Some(image) = source.image() else {
            return Vec::new();
        };
        self.kind
            .bindings_for(Phase::Decode)
            .filter(|b| b.stream == image)
            .filter_map(|b| self.schedule_decode(b))
            .collect()
    }

    /// Snapshot the decoder input now and queue the decode. `None` when the
    /// decoder is not loaded.
    fn schedule_decode(self: &Arc<Self>, binding: Binding) -> Option<oneshot::Receiver<Outcome>> {
        if !self.session.has_engine(binding.role) {
            debug!(role = binding.role.label(), "decoder not loaded; skipping decode");
            return None;
        }
        let (token, inputs) = {
            let st = self.write();
            (self.guard.issue(binding.stream), binding.decode_inputs(&st))
        };
        let shared = Arc::clone(self);
        Some(self.submit(binding.role.label(), move || async move {
            if !shared.guard.is_current(token) {
                return Ok(shared.superseded(binding, token));
            }
            let outputs = shared.session.evaluate(binding.role, inputs?).await?;
            let update = binding.consume(outputs, &shared.session.config().dims)?;
            Ok(shared.commit(binding, token, update))
        }))
    }

    /// Encode `image` with every encoder, then commit each result against
    /// its own token.
    async fn run_sync(
        self: Arc<Self>,
        encoders: Vec<Binding>,
        tokens: Vec<Token>,
        image: Tensor,
    ) -> Result<Outcome, EngineError> {
        if tokens.iter().all(|t| !self.guard.is_current(*t)) {
            debug!("sync superseded before it started");
            return Ok(Outcome::Superseded);
        }

        let dims = self.session.config().dims;
        let mut updates = Vec::with_capacity(encoders.len());
        for binding in &encoders {
            let outputs = self
                .session
                .evaluate(binding.role, binding.sync_inputs(&image)?)
                .await?;
            updates.push(binding.consume(outputs, &dims)?);
        }

        let mut outcome = Outcome::Superseded;
        for ((binding, token), update) in encoders.into_iter().zip(tokens).zip(updates) {
            if self.commit(binding, token, update) == Outcome::Committed {
                outcome = Outcome::Committed;
            }
        }
        Ok(outcome)
    }
}
