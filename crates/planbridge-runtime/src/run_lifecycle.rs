//! Remote run lifecycle: create or attach once, complete once.

use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::watch;

use crate::api::{ApiError, TestPlanApi};
use crate::api_types::RunCreateModel;
use crate::lock_or_recover;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle phases of the remote run owned by this process.
pub enum RunPhase {
    Uninitialized,
    Creating,
    Ready,
    Completing,
    Completed,
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Creating => "creating",
            Self::Ready => "ready",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// User-facing reasons the run could not be obtained.
pub enum RunSetupFailure {
    #[error("project '{0}' does not exist or is not visible to the supplied token")]
    ProjectNotFound(String),
    #[error("test plan service is unreachable: {0}")]
    Unreachable(String),
    #[error("credentials were rejected by the test plan service: {0}")]
    Unauthorized(String),
    #[error("reporter configuration is invalid: {0}")]
    Configuration(String),
    #[error("run setup failed: {0}")]
    Other(String),
}

impl RunSetupFailure {
    fn from_api_error(error: &ApiError) -> Self {
        if error.is_unreachable() {
            Self::Unreachable(error.to_string())
        } else if error.is_unauthorized() {
            Self::Unauthorized(error.to_string())
        } else {
            Self::Other(error.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Value observed through [`RunIdCell`].
pub enum RunIdState {
    Pending,
    Ready(u64),
    Failed(RunSetupFailure),
}

#[derive(Debug)]
/// Single-assignment cell for the run id. Only [`RunLifecycle`] settles it.
pub struct RunIdCell {
    tx: watch::Sender<RunIdState>,
}

impl Default for RunIdCell {
    fn default() -> Self {
        let (tx, _rx) = watch::channel(RunIdState::Pending);
        Self { tx }
    }
}

impl RunIdCell {
    pub fn current(&self) -> RunIdState {
        self.tx.borrow().clone()
    }

    /// Wait until the cell is settled; `Err` when run setup failed.
    pub async fn wait(&self) -> Result<u64, RunSetupFailure> {
        let mut rx = self.tx.subscribe();
        let settled = rx
            .wait_for(|state| !matches!(state, RunIdState::Pending))
            .await
            .map(|state| (*state).clone());
        match settled {
            Ok(RunIdState::Ready(run_id)) => Ok(run_id),
            Ok(RunIdState::Failed(failure)) => Err(failure),
            Ok(RunIdState::Pending) | Err(_) => {
                Err(RunSetupFailure::Other("run id cell closed".to_string()))
            }
        }
    }

    fn settle(&self, next: RunIdState) -> bool {
        self.tx.send_if_modified(|state| {
            if matches!(state, RunIdState::Pending) {
                *state = next;
                true
            } else {
                false
            }
        })
    }
}

/// Owns the remote run record for the lifetime of the reporter.
pub struct RunLifecycle {
    api: Arc<dyn TestPlanApi>,
    project: String,
    phase: Mutex<RunPhase>,
    run_id: RunIdCell,
}

impl RunLifecycle {
    pub fn new(api: Arc<dyn TestPlanApi>, project: impl Into<String>) -> Self {
        Self {
            api,
            project: project.into(),
            phase: Mutex::new(RunPhase::Uninitialized),
            run_id: RunIdCell::default(),
        }
    }

    pub fn phase(&self) -> RunPhase {
        *lock_or_recover(&self.phase)
    }

    pub fn run_id(&self) -> Option<u64> {
        match self.run_id.current() {
            RunIdState::Ready(run_id) => Some(run_id),
            _ => None,
        }
    }

    /// True once run setup failed; every publish path becomes a no-op.
    pub fn is_disabled(&self) -> bool {
        matches!(self.run_id.current(), RunIdState::Failed(_))
    }

    /// Wait for the run id. `None` means publishing is disabled.
    pub async fn wait_for_run_id(&self) -> Option<u64> {
        self.run_id.wait().await.ok()
    }

    fn begin_setup(&self) -> Result<(), RunSetupFailure> {
        let mut phase = lock_or_recover(&self.phase);
        if *phase != RunPhase::Uninitialized {
            return Err(RunSetupFailure::Other(format!(
                "run setup already attempted (phase {})",
                phase.as_str()
            )));
        }
        *phase = RunPhase::Creating;
        Ok(())
    }

    fn mark_ready(&self, run_id: u64) {
        *lock_or_recover(&self.phase) = RunPhase::Ready;
        self.run_id.settle(RunIdState::Ready(run_id));
    }

    /// Reject the run id and disable every downstream publish. A no-op once
    /// the run id is settled.
    pub fn disable(&self, failure: RunSetupFailure) {
        let mut phase = lock_or_recover(&self.phase);
        if matches!(*phase, RunPhase::Uninitialized | RunPhase::Creating) {
            *phase = RunPhase::Failed;
            self.run_id.settle(RunIdState::Failed(failure));
        }
    }

    /// Check the project exists, then create the run.
    pub async fn create(&self, model: RunCreateModel) -> Result<u64, RunSetupFailure> {
        self.begin_setup()?;

        if let Err(error) = self.api.get_project(&self.project).await {
            let failure = if error.status() == Some(404) {
                RunSetupFailure::ProjectNotFound(self.project.clone())
            } else {
                RunSetupFailure::from_api_error(&error)
            };
            self.disable(failure.clone());
            return Err(failure);
        }

        match self.api.create_run(&model).await {
            Ok(run) => {
                tracing::debug!(run_id = run.id, run_name = %run.name, "created test run");
                self.mark_ready(run.id);
                Ok(run.id)
            }
            Err(error) => {
                let failure = RunSetupFailure::from_api_error(&error);
                self.disable(failure.clone());
                Err(failure)
            }
        }
    }

    /// Use a run created by another process.
    pub fn attach(&self, run_id: u64) -> Result<u64, RunSetupFailure> {
        self.begin_setup()?;
        self.mark_ready(run_id);
        Ok(run_id)
    }

    /// Mark the run completed. Only valid from `Ready`.
    pub async fn complete(&self) -> Result<(), ApiError> {
        let run_id = {
            let mut phase = lock_or_recover(&self.phase);
            let Some(run_id) = self.run_id().filter(|_| *phase == RunPhase::Ready) else {
                return Ok(());
            };
            *phase = RunPhase::Completing;
            run_id
        };
        match self.api.complete_run(run_id).await {
            Ok(_) => {
                *lock_or_recover(&self.phase) = RunPhase::Completed;
                Ok(())
            }
            Err(error) => {
                *lock_or_recover(&self.phase) = RunPhase::Ready;
                Err(error)
            }
        }
    }
}
