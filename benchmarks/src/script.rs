//! Service-provided test scripts
//!
//! A service directory may ship its own smoke test. When the configured
//! script exists it is run from that directory after the synthesis battery,
//! and its exit status and output tails are kept for the report.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::time;
use tracing::{info, warn};

use crate::config::{RunnerSettings, ServiceDefinition};
use crate::utils::Timer;

const STDOUT_TAIL: usize = 2000;
const STDERR_TAIL: usize = 1000;

/// What happened when the service's test script ran
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptOutcome {
    /// The script file exists in the service directory
    pub available: bool,
    pub success: bool,
    pub exit_code: Option<i32>,
    pub duration_secs: Option<f64>,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl ScriptOutcome {
    fn failed(error: String, duration_secs: Option<f64>) -> Self {
        Self {
            available: true,
            duration_secs,
            error: Some(error),
            ..Self::default()
        }
    }
}

/// Run `settings.test_script` from the service directory, if it exists
pub async fn run_test_script(service: &ServiceDefinition, settings: &RunnerSettings) -> ScriptOutcome {
    let script = service.directory.join(&settings.test_script);
    if !script.is_file() {
        return ScriptOutcome::default();
    }

    info!(service = %service.id, script = %settings.test_script, "Running service test script");
    let timer = Timer::start();

    let child = Command::new(&settings.script_interpreter)
        .arg(&settings.test_script)
        .current_dir(&service.directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match time::timeout(settings.script_timeout(), child).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            warn!(service = %service.id, "Could not launch test script: {}", e);
            return ScriptOutcome::failed(
                format!("failed to launch {}: {}", settings.script_interpreter, e),
                None,
            );
        }
        Err(_) => {
            warn!(service = %service.id, "Test script timed out");
            return ScriptOutcome::failed(
                format!("timed out after {}s", settings.script_timeout_secs),
                Some(timer.elapsed_secs()),
            );
        }
    };

    let outcome = ScriptOutcome {
        available: true,
        success: output.status.success(),
        exit_code: output.status.code(),
        duration_secs: Some(timer.elapsed_secs()),
        stdout: tail(&String::from_utf8_lossy(&output.stdout), STDOUT_TAIL),
        stderr: tail(&String::from_utf8_lossy(&output.stderr), STDERR_TAIL),
        error: None,
    };

    if outcome.success {
        info!(service = %service.id, "Test script passed");
    } else {
        warn!(service = %service.id, exit_code = ?outcome.exit_code, "Test script failed");
    }
    outcome
}

/// Last `limit` characters of `text`
fn tail(text: &str, limit: usize) -> String {
    let count = text.chars().count();
    text.chars().skip(count.saturating_sub(limit)).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell_settings(script: &str, timeout_secs: u64) -> RunnerSettings {
        RunnerSettings {
            test_script: script.to_string(),
            script_interpreter: "sh".to_string(),
            script_timeout_secs: timeout_secs,
            ..RunnerSettings::default()
        }
    }

    fn service_with_script(dir: &std::path::Path, name: &str, body: &str) -> ServiceDefinition {
        std::fs::write(dir.join(name), body).unwrap();
        ServiceDefinition::new("stub", "Stub", "http://localhost:9000", dir)
    }

    #[tokio::test]
    async fn test_missing_script_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let service = ServiceDefinition::new("stub", "Stub", "http://localhost:9000", dir.path());

        let outcome = run_test_script(&service, &shell_settings("check.sh", 5)).await;
        assert_eq!(outcome, ScriptOutcome::default());
        assert!(!outcome.available);
    }

    #[tokio::test]
    async fn test_captures_output_and_status() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_script(dir.path(), "check.sh", "echo synthesized\necho slow model >&2\n");

        let outcome = run_test_script(&service, &shell_settings("check.sh", 5)).await;
        assert!(outcome.available);
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.stdout.trim(), "synthesized");
        assert_eq!(outcome.stderr.trim(), "slow model");
        assert!(outcome.duration_secs.is_some());
    }

    #[tokio::test]
    async fn test_runs_from_service_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "here").unwrap();
        let service = service_with_script(dir.path(), "check.sh", "cat marker.txt\nexit 3\n");

        let outcome = run_test_script(&service, &shell_settings("check.sh", 5)).await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.stdout, "here");
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with_script(dir.path(), "check.sh", "sleep 10\n");

        let outcome = run_test_script(&service, &shell_settings("check.sh", 1)).await;
        assert!(outcome.available);
        assert!(!outcome.success);
        assert_eq!(outcome.error.as_deref(), Some("timed out after 1s"));
    }

    #[test]
    fn test_tail_keeps_last_chars() {
        assert_eq!(tail("abcdef", 3), "def");
        assert_eq!(tail("ab", 3), "ab");
        assert_eq!(tail("ñandú", 2), "dú");
    }
}
