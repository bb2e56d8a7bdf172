//! Kometa process runner
//!
//! Runs one Kometa process against a generated config, forwarding every
//! stdout/stderr line as it arrives and honouring a stop signal.

use crate::core::config::ExecutionConfig;
use crate::core::error::{Result, WizardError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// One execution request
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    pub profile: String,
    pub config_path: PathBuf,
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RunOutcome {
    Succeeded,
    Failed { code: Option<i32> },
    Cancelled,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Succeeded)
    }
}

/// Executes the external tool
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run to completion. Output lines go to `logs`; the run ends early
    /// once `stop` fires or its sender is dropped.
    async fn run(
        &self,
        request: RunRequest,
        logs: mpsc::UnboundedSender<String>,
        stop: oneshot::Receiver<()>,
    ) -> Result<RunOutcome>;
}

/// Spawns the configured Kometa command
pub struct KometaProcessRunner {
    command: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl KometaProcessRunner {
    pub fn new(config: &ExecutionConfig) -> Self {
        Self {
            command: config.kometa_command.clone(),
            args: config.kometa_args.clone(),
            working_dir: config.working_dir.clone(),
        }
    }

    fn build_command(&self, request: &RunRequest) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.arg("--config")
            .arg(&request.config_path)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn forward_lines<R>(reader: R, logs: mpsc::UnboundedSender<String>) -> tokio::task::JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if logs.send(line).is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read Kometa output");
                    break;
                }
            }
        }
    })
}

#[async_trait]
impl ProcessRunner for KometaProcessRunner {
    async fn run(
        &self,
        request: RunRequest,
        logs: mpsc::UnboundedSender<String>,
        stop: oneshot::Receiver<()>,
    ) -> Result<RunOutcome> {
        let mut child = self.build_command(&request).spawn().map_err(|e| {
            WizardError::Execution(format!("failed to start '{}': {}", self.command, e))
        })?;

        info!(
            profile = %request.profile,
            pid = child.id(),
            config = %request.config_path.display(),
            "Kometa started"
        );

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward_lines(stdout, logs.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward_lines(stderr, logs));
        }

        let outcome = tokio::select! {
            status = child.wait() => {
                let status = status?;
                if status.success() {
                    RunOutcome::Succeeded
                } else {
                    RunOutcome::Failed { code: status.code() }
                }
            }
            _ = stop => {
                debug!(profile = %request.profile, "Stopping Kometa");
                if let Err(e) = child.kill().await {
                    warn!(error = %e, "Failed to kill Kometa process");
                }
                RunOutcome::Cancelled
            }
        };

        // a killed process may leave grandchildren holding the pipes open
        for reader in readers {
            if outcome == RunOutcome::Cancelled {
                reader.abort();
            } else {
                let _ = reader.await;
            }
        }

        info!(profile = %request.profile, outcome = ?outcome, "Kometa finished");
        Ok(outcome)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn runner(command: &str, args: &[&str]) -> KometaProcessRunner {
        KometaProcessRunner {
            command: command.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: None,
        }
    }

    fn request() -> RunRequest {
        RunRequest {
            profile: "Foo".to_string(),
            config_path: PathBuf::from("config.yml"),
        }
    }

    #[tokio::test]
    async fn test_output_lines_are_forwarded() {
        // `echo --config config.yml done`
        let runner = runner("echo", &["done"]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        let outcome = runner.run(request(), tx, stop_rx).await.unwrap();
        assert_eq!(outcome, RunOutcome::Succeeded);
        assert_eq!(rx.recv().await.unwrap(), "--config config.yml done");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let runner = runner("false", &[]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        let outcome = runner.run(request(), tx, stop_rx).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_execution_error() {
        let runner = runner("definitely-not-kometa-binary", &[]);
        let (tx, _rx) = mpsc::unbounded_channel();
        let (_stop_tx, stop_rx) = oneshot::channel();

        let err = runner.run(request(), tx, stop_rx).await.unwrap_err();
        assert!(matches!(err, WizardError::Execution(_)));
    }

    #[tokio::test]
    async fn test_stop_kills_the_process() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("slow-kometa");
        std::fs::write(&script, "#!/bin/sh\necho started\nexec sleep 30\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let runner = runner(script.to_str().unwrap(), &[]);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move { runner.run(request(), tx, stop_rx).await });

        assert_eq!(rx.recv().await.unwrap(), "started");
        stop_tx.send(()).unwrap();

        let outcome = tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(outcome, RunOutcome::Cancelled);
    }
}
