//! Single-run execution control
//!
//! At most one Kometa run is active. The run state is one atomic token
//! holding the active run id (0 when idle) and it only changes through
//! compare-and-set, never through a read followed by a write.

use crate::core::error::{Result, WizardError};
use crate::core::runner::{ProcessRunner, RunOutcome, RunRequest};
use crate::hub::broadcaster::{EventSink, SyncHub};
use crate::hub::events::{Origin, Scope, ServerEvent};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

const IDLE: u64 = 0;

struct ActiveRun {
    profile: String,
    stop: Option<oneshot::Sender<()>>,
}

pub struct ExecutionControl {
    state: AtomicU64,
    next_run: AtomicU64,
    runs: Mutex<HashMap<u64, ActiveRun>>,
    runner: Arc<dyn ProcessRunner>,
    hub: Arc<SyncHub>,
}

impl ExecutionControl {
    pub fn new(runner: Arc<dyn ProcessRunner>, hub: Arc<SyncHub>) -> Self {
        Self {
            state: AtomicU64::new(IDLE),
            next_run: AtomicU64::new(1),
            runs: Mutex::new(HashMap::new()),
            runner,
            hub,
        }
    }

    /// Active run id, if any
    pub fn current_run(&self) -> Option<u64> {
        match self.state.load(Ordering::Acquire) {
            IDLE => None,
            id => Some(id),
        }
    }

    pub fn is_running(&self) -> bool {
        self.current_run().is_some()
    }

    /// Claim the run slot, await `prepare` for the request, then launch the
    /// runner in the background. Fails with `Busy` while another run holds
    /// the slot; a failed `prepare` gives the slot back.
    pub async fn start<F>(self: &Arc<Self>, profile: &str, prepare: F) -> Result<u64>
    where
        F: Future<Output = Result<RunRequest>>,
    {
        let run_id = self.next_run.fetch_add(1, Ordering::Relaxed);

        // registered before the slot is claimed so a concurrent stop always finds it
        let (stop_tx, stop_rx) = oneshot::channel();
        self.runs.lock().await.insert(
            run_id,
            ActiveRun {
                profile: profile.to_string(),
                stop: Some(stop_tx),
            },
        );

        if self
            .state
            .compare_exchange(IDLE, run_id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.runs.lock().await.remove(&run_id);
            let active = self.active_profile().await.unwrap_or_else(|| profile.to_string());
            debug!(profile, active = %active, "Execution start rejected");
            return Err(WizardError::Busy(active));
        }

        let request = match prepare.await {
            Ok(request) => request,
            Err(e) => {
                self.runs.lock().await.remove(&run_id);
                let _ = self
                    .state
                    .compare_exchange(run_id, IDLE, Ordering::AcqRel, Ordering::Acquire);
                return Err(e);
            }
        };

        // stopped while preparing; the slot may already belong to someone else
        if self.state.load(Ordering::Acquire) != run_id {
            self.runs.lock().await.remove(&run_id);
            debug!(profile, run_id, "Run stopped before launch");
            return Err(WizardError::Execution(format!(
                "Run {} was stopped before it started",
                run_id
            )));
        }

        info!(profile, run_id, config = %request.config_path.display(), "Execution started");
        self.hub
            .publish(
                Scope::Everyone,
                ServerEvent::ExecutionStarted {
                    profile: profile.to_string(),
                    run_id,
                    config_path: request.config_path.clone(),
                },
                &Origin::System,
            )
            .await;

        let control = Arc::clone(self);
        tokio::spawn(async move { control.drive(run_id, request, stop_rx).await });

        Ok(run_id)
    }

    async fn drive(self: Arc<Self>, run_id: u64, request: RunRequest, stop: oneshot::Receiver<()>) {
        let profile = request.profile.clone();
        let (log_tx, mut log_rx) = mpsc::unbounded_channel::<String>();

        let forwarder = {
            let hub = self.hub.clone();
            let profile = profile.clone();
            tokio::spawn(async move {
                while let Some(line) = log_rx.recv().await {
                    hub.publish(
                        Scope::Everyone,
                        ServerEvent::ExecutionLog { profile: profile.clone(), run_id, line },
                        &Origin::System,
                    )
                    .await;
                }
            })
        };

        let result = self.runner.run(request, log_tx, stop).await;
        let _ = forwarder.await;

        self.runs.lock().await.remove(&run_id);

        // a stop request already reported this run
        if self
            .state
            .compare_exchange(run_id, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(profile = %profile, run_id, "Run ended after stop");
            return;
        }

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(profile = %profile, run_id, error = %e, "Execution failed");
                self.hub
                    .publish(
                        Scope::Everyone,
                        ServerEvent::ExecutionError {
                            profile: profile.clone(),
                            run_id: Some(run_id),
                            message: e.to_string(),
                        },
                        &Origin::System,
                    )
                    .await;
                RunOutcome::Failed { code: None }
            }
        };

        if let RunOutcome::Failed { code: Some(code) } = outcome {
            warn!(profile = %profile, run_id, code, "Kometa exited with an error");
            self.hub
                .publish(
                    Scope::Everyone,
                    ServerEvent::ExecutionError {
                        profile: profile.clone(),
                        run_id: Some(run_id),
                        message: format!("Kometa exited with code {}", code),
                    },
                    &Origin::System,
                )
                .await;
        }

        info!(profile = %profile, run_id, outcome = ?outcome, "Execution finished");
        self.hub
            .publish(
                Scope::Everyone,
                ServerEvent::ExecutionStopped { profile, run_id, outcome },
                &Origin::System,
            )
            .await;
    }

    /// Best-effort stop. The slot is released and `ExecutionStopped` goes
    /// out right away; the process is not waited for. Returns the stopped
    /// run id, `None` when idle.
    pub async fn stop(&self) -> Option<u64> {
        let run_id = self.state.swap(IDLE, Ordering::AcqRel);
        if run_id == IDLE {
            debug!("Stop requested while idle");
            return None;
        }

        let run = self.runs.lock().await.remove(&run_id);
        let profile = match run {
            Some(mut run) => {
                if let Some(stop) = run.stop.take() {
                    if stop.send(()).is_err() {
                        debug!(run_id, "Runner already finished");
                    }
                }
                run.profile
            }
            None => String::new(),
        };

        info!(profile = %profile, run_id, "Execution stopped");
        self.hub
            .publish(
                Scope::Everyone,
                ServerEvent::ExecutionStopped {
                    profile,
                    run_id,
                    outcome: RunOutcome::Cancelled,
                },
                &Origin::System,
            )
            .await;

        Some(run_id)
    }

    pub async fn active_profile(&self) -> Option<String> {
        let run_id = self.current_run()?;
        self.runs.lock().await.get(&run_id).map(|r| r.profile.clone())
    }
}
