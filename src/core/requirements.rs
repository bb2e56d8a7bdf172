//! Host readiness check
//!
//! Answers "can this machine run Kometa for this profile?": is the Kometa
//! command on hand, and does the profile's root directory exist.

use crate::core::config::ExecutionConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequirementsReport {
    pub hostname: String,
    pub kometa_command: String,
    pub kometa_available: bool,
    pub kometa_version: Option<String>,
    /// `None` when no profile root was given
    pub root_directory_exists: Option<bool>,
    pub problems: Vec<String>,
}

impl RequirementsReport {
    pub fn is_ready(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Probe the host
pub async fn check_requirements(config: &ExecutionConfig, root: Option<&Path>) -> RequirementsReport {
    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string());

    let mut problems = Vec::new();
    let kometa_version = probe_version(&config.kometa_command).await;
    match &kometa_version {
        Ok(_) => {}
        Err(reason) => problems.push(format!("Kometa is not available: {}", reason)),
    }

    let root_directory_exists = match root {
        Some(dir) => {
            let exists = tokio::fs::metadata(dir)
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false);
            if !exists {
                problems.push(format!("Root directory {} does not exist", dir.display()));
            }
            Some(exists)
        }
        None => None,
    };

    RequirementsReport {
        hostname,
        kometa_command: config.kometa_command.clone(),
        kometa_available: kometa_version.is_ok(),
        kometa_version: kometa_version.ok().flatten(),
        root_directory_exists,
        problems,
    }
}

/// `Ok(None)` means the command ran but printed nothing usable
async fn probe_version(command: &str) -> Result<Option<String>, String> {
    let output = Command::new(command)
        .arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(VERSION_PROBE_TIMEOUT, output).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return Err(e.to_string()),
        Err(_) => return Err("version check timed out".to_string()),
    };

    if !output.status.success() {
        return Err(format!("'{} --version' exited with {}", command, output.status));
    }

    let version = String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string);
    debug!(command, version = ?version, "Kometa version probed");
    Ok(version)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn execution(command: &str) -> ExecutionConfig {
        ExecutionConfig {
            kometa_command: command.to_string(),
            kometa_args: Vec::new(),
            working_dir: None,
        }
    }

    #[tokio::test]
    async fn test_missing_command_is_reported() {
        let report = check_requirements(&execution("definitely-not-kometa-binary"), None).await;
        assert!(!report.kometa_available);
        assert!(!report.is_ready());
        assert_eq!(report.root_directory_exists, None);
        assert!(!report.hostname.is_empty());
    }

    #[tokio::test]
    async fn test_available_command_and_root() {
        let dir = tempfile::tempdir().unwrap();
        let report = check_requirements(&execution("echo"), Some(dir.path())).await;
        assert!(report.kometa_available);
        assert!(report.kometa_version.is_some());
        assert_eq!(report.root_directory_exists, Some(true));
        assert!(report.is_ready());
    }

    #[tokio::test]
    async fn test_missing_root_is_a_problem() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let report = check_requirements(&execution("echo"), Some(&missing)).await;
        assert_eq!(report.root_directory_exists, Some(false));
        assert_eq!(report.problems.len(), 1);
    }
}
