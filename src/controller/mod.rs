//! Run lifecycle around the remediation engine.
//!
//! At most one run is active at a time. A run that suspends for approval is
//! checkpointed to disk so it can be resumed by a later process.

mod checkpoint;

pub use checkpoint::{clear_checkpoint, load_checkpoint, save_checkpoint};

use crate::error::WorkflowError;
use crate::events::EventKind;
use crate::memory::{Episode, MemorySummary};
use crate::workflow::{
    ApprovalDecision, RemediationEngine, RunOutcome, ServiceStatus, WorkflowState,
};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    /// A plan is held for operator approval.
    Waiting,
    /// The last run died unexpectedly.
    Error,
}

/// Read-only view of the controller for inspection surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerSnapshot {
    pub status: RunStatus,
    pub last_run: Option<DateTime<Local>>,
    pub last_outcome: Option<RunOutcome>,
    pub state: WorkflowState,
}

#[derive(Default)]
struct RunSlot {
    status: RunStatus,
    last_run: Option<DateTime<Local>>,
    last_outcome: Option<RunOutcome>,
    state: WorkflowState,
    cancel: Option<CancellationToken>,
}

pub struct Controller {
    engine: Arc<RemediationEngine>,
    slot: Mutex<RunSlot>,
    checkpoint_path: Option<PathBuf>,
}

impl Controller {
    pub fn new(engine: Arc<RemediationEngine>) -> Self {
        Self {
            engine,
            slot: Mutex::new(RunSlot::default()),
            checkpoint_path: None,
        }
    }

    /// Persist waiting runs at `path`, restoring one if it is already there.
    #[must_use]
    pub fn with_checkpoint(mut self, path: PathBuf) -> Self {
        match load_checkpoint(&path) {
            Ok(Some(state)) => {
                tracing::info!(path = %path.display(), "restored run waiting for approval");
                let slot = self.slot.get_mut().unwrap_or_else(PoisonError::into_inner);
                slot.status = RunStatus::Waiting;
                slot.state = state;
                slot.last_outcome = Some(RunOutcome::WaitingApproval);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(path = %path.display(), "ignoring unreadable checkpoint: {e:#}"),
        }
        self.checkpoint_path = Some(path);
        self
    }

    pub fn engine(&self) -> &Arc<RemediationEngine> {
        &self.engine
    }

    fn slot(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Run lifecycle ──────────────────────────────────────────

    /// Run one full cycle now. Rejected, not queued, while a run is active.
    pub async fn run_now(&self) -> Result<RunOutcome, WorkflowError> {
        let cancel = self.claim_fresh(None)?;
        Ok(self.drive_fresh(cancel).await)
    }

    /// Like [`Self::run_now`] but on a background task.
    pub fn start(self: &Arc<Self>) -> Result<JoinHandle<RunOutcome>, WorkflowError> {
        let cancel = self.claim_fresh(None)?;
        let this = Arc::clone(self);
        Ok(self.spawn_guarded(async move { this.drive_fresh(cancel).await }))
    }

    /// Request cooperative cancellation of the active run.
    pub fn stop(&self) -> Result<(), WorkflowError> {
        let slot = self.slot();
        match (&slot.status, &slot.cancel) {
            (RunStatus::Running, Some(cancel)) => {
                cancel.cancel();
                self.engine
                    .events()
                    .emit(EventKind::System, "Stop requested. Cancelling the active run...");
                Ok(())
            }
            _ => Err(WorkflowError::NotRunning),
        }
    }

    /// Resume a waiting run with an operator decision.
    pub async fn resume(&self, decision: ApprovalDecision) -> Result<RunOutcome, WorkflowError> {
        let (state, cancel) = self.claim_waiting()?;
        self.drive_resumed(state, decision, cancel).await
    }

    /// Like [`Self::resume`] but on a background task.
    pub fn start_resume(
        self: &Arc<Self>,
        decision: ApprovalDecision,
    ) -> Result<JoinHandle<RunOutcome>, WorkflowError> {
        let (state, cancel) = self.claim_waiting()?;
        let this = Arc::clone(self);
        Ok(self.spawn_guarded(async move {
            this.drive_resumed(state, decision, cancel)
                .await
                .unwrap_or(RunOutcome::Cancelled)
        }))
    }

    // ── Inspection ─────────────────────────────────────────────

    pub fn status(&self) -> RunStatus {
        self.slot().status
    }

    pub fn snapshot(&self) -> ControllerSnapshot {
        let slot = self.slot();
        ControllerSnapshot {
            status: slot.status,
            last_run: slot.last_run,
            last_outcome: slot.last_outcome.clone(),
            state: slot.state.clone(),
        }
    }

    pub fn episodes(&self) -> Vec<Episode> {
        self.engine.memory().episodes()
    }

    pub fn memory_summary(&self) -> MemorySummary {
        self.engine.memory().summary()
    }

    pub async fn fleet_status(&self) -> Vec<ServiceStatus> {
        self.engine.check_fleet().await
    }

    // ── Watch mode ─────────────────────────────────────────────

    /// Run a cycle every `interval` until `shutdown` fires. Cycles are
    /// skipped while a run waits for approval.
    pub async fn watch(&self, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.status() == RunStatus::Waiting {
                tracing::info!("run waiting for approval, skipping cycle");
                continue;
            }

            // The run's token is a child of `shutdown`, so Ctrl-C cancels it too.
            let outcome = self.run_linked(&shutdown).await;

            match outcome {
                Ok(outcome) => tracing::info!(?outcome, "watch cycle finished"),
                Err(e) => tracing::warn!("watch cycle skipped: {e}"),
            }
        }

        tracing::info!("watch mode stopped");
    }

    // ── Internals ──────────────────────────────────────────────

    async fn run_linked(&self, parent: &CancellationToken) -> Result<RunOutcome, WorkflowError> {
        let cancel = self.claim_fresh(Some(parent))?;
        Ok(self.drive_fresh(cancel).await)
    }

    fn claim_fresh(
        &self,
        parent: Option<&CancellationToken>,
    ) -> Result<CancellationToken, WorkflowError> {
        let mut slot = self.slot();
        if slot.status == RunStatus::Running {
            return Err(WorkflowError::AlreadyRunning);
        }
        let cancel = parent.map_or_else(CancellationToken::new, CancellationToken::child_token);
        slot.status = RunStatus::Running;
        slot.last_run = Some(Local::now());
        slot.state = WorkflowState::new();
        slot.cancel = Some(cancel.clone());
        drop(slot);

        self.remove_checkpoint();
        self.engine
            .events()
            .emit(EventKind::System, "Running an on-demand analysis cycle...");
        Ok(cancel)
    }

    fn claim_waiting(&self) -> Result<(WorkflowState, CancellationToken), WorkflowError> {
        let mut slot = self.slot();
        if slot.status != RunStatus::Waiting {
            return Err(WorkflowError::NotWaitingForApproval);
        }
        let cancel = CancellationToken::new();
        slot.status = RunStatus::Running;
        slot.cancel = Some(cancel.clone());
        Ok((slot.state.clone(), cancel))
    }

    async fn drive_fresh(&self, cancel: CancellationToken) -> RunOutcome {
        let (state, outcome) = self.engine.run(&cancel).await;
        self.finish(state, &outcome);
        outcome
    }

    async fn drive_resumed(
        &self,
        mut state: WorkflowState,
        decision: ApprovalDecision,
        cancel: CancellationToken,
    ) -> Result<RunOutcome, WorkflowError> {
        let message = match decision {
            ApprovalDecision::Approve => "Approval received. Resuming...",
            ApprovalDecision::Reject => "Plan rejected. Escalating...",
        };
        self.engine.events().emit(EventKind::System, message);
        self.remove_checkpoint();

        match self.engine.resume(&mut state, decision, &cancel).await {
            Ok(outcome) => {
                self.finish(state, &outcome);
                Ok(outcome)
            }
            Err(e) => {
                let mut slot = self.slot();
                slot.status = RunStatus::Waiting;
                slot.cancel = None;
                Err(e)
            }
        }
    }

    fn finish(&self, state: WorkflowState, outcome: &RunOutcome) {
        let status = if outcome.is_waiting() {
            if let Some(path) = &self.checkpoint_path
                && let Err(e) = save_checkpoint(path, &state)
            {
                self.engine
                    .events()
                    .emit(EventKind::Warning, format!("Checkpoint not written: {e:#}"));
            }
            RunStatus::Waiting
        } else {
            RunStatus::Idle
        };

        let message = match outcome {
            RunOutcome::WaitingApproval => "Run paused waiting for approval.",
            RunOutcome::Cancelled => "Run stopped by the operator.",
            _ => "Analysis cycle completed.",
        };

        let mut slot = self.slot();
        slot.status = status;
        slot.state = state;
        slot.last_outcome = Some(outcome.clone());
        slot.cancel = None;
        drop(slot);

        self.engine.events().emit(EventKind::System, message);
    }

    fn remove_checkpoint(&self) {
        if let Some(path) = &self.checkpoint_path
            && let Err(e) = clear_checkpoint(path)
        {
            tracing::warn!(path = %path.display(), "failed to remove checkpoint: {e}");
        }
    }

    /// Spawn `run`, marking the controller as errored if the task panics.
    fn spawn_guarded<F>(self: &Arc<Self>, run: F) -> JoinHandle<RunOutcome>
    where
        F: std::future::Future<Output = RunOutcome> + Send + 'static,
    {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match tokio::spawn(run).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let mut slot = this.slot();
                    slot.status = RunStatus::Error;
                    slot.cancel = None;
                    drop(slot);
                    this.engine
                        .events()
                        .emit(EventKind::Error, format!("Run task failed: {e}"));
                    RunOutcome::Cancelled
                }
            }
        })
    }
}
