//! External command execution.
//!
//! Every probe that shells out goes through [`CommandRunner`]. The contract
//! is deliberately total: `run` never returns an error to the caller. A spawn
//! or IO failure is captured in the output's `error` field with exit code
//! 255, and a timeout kills the child and reports the same way. A single
//! failed invocation is a single failed check result; there are no retries at
//! this layer.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one command invocation.
#[derive(Debug, Clone, Default)]
pub struct CmdOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Non-empty when the command could not be run at all (spawn failure,
    /// IO error, timeout). `exit_code` is 255 in that case.
    pub error: String,
}

impl CmdOutput {
    /// Non-zero exit or a launch failure.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.exit_code != 0 || !self.error.is_empty()
    }

    /// Non-empty stdout lines.
    #[must_use]
    pub fn stdout_lines(&self) -> Vec<&str> {
        self.stdout.lines().filter(|l| !l.is_empty()).collect()
    }

    fn launch_failure(error: String) -> Self {
        Self {
            exit_code: 255,
            error,
            ..Self::default()
        }
    }
}

/// Capability to run a shell command with a timeout.
///
/// Checks hold this behind an `Arc<dyn CommandRunner>` so tests can count
/// and script invocations.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, cmd: &str, timeout: Duration) -> CmdOutput;
}

/// Production runner: spawns `sh -c <cmd>` and waits up to the timeout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, cmd: &str, timeout: Duration) -> CmdOutput {
        debug!(cmd, timeout_secs = timeout.as_secs(), "running command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                debug!(cmd, %err, "command failed to launch");
                return CmdOutput::launch_failure(err.to_string());
            }
            Err(_) => {
                debug!(cmd, "command timed out");
                return CmdOutput::launch_failure(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                ));
            }
        };

        let result = CmdOutput {
            exit_code: output.status.code().unwrap_or(255),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            error: String::new(),
        };

        debug!(
            cmd,
            rc = result.exit_code,
            stdout = %result.stdout.replace('\n', "\\n"),
            stderr = %result.stderr.replace('\n', "\\n"),
            "command finished"
        );

        result
    }
}

/// ssh prefix used by every remote probe: short connect timeout, no host key
/// prompt blocking an unattended run.
#[must_use]
pub fn ssh_prefix(host: &str, timeout: Duration) -> String {
    format!(
        "ssh -o ConnectTimeout={} -o StrictHostKeyChecking=no {} ",
        timeout.as_secs(),
        host
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_on_nonzero_exit() {
        let out = CmdOutput {
            exit_code: 1,
            ..CmdOutput::default()
        };
        assert!(out.failed());
    }

    #[test]
    fn failed_on_launch_error() {
        let out = CmdOutput::launch_failure("no such file".to_string());
        assert!(out.failed());
        assert_eq!(out.exit_code, 255);
    }

    #[test]
    fn stdout_lines_skips_empty() {
        let out = CmdOutput {
            exit_code: 0,
            stdout: "a\n\nb\n".to_string(),
            ..CmdOutput::default()
        };
        assert_eq!(out.stdout_lines(), vec!["a", "b"]);
    }

    #[test]
    fn ssh_prefix_carries_timeout() {
        let prefix = ssh_prefix("node01", Duration::from_secs(7));
        assert!(prefix.starts_with("ssh -o ConnectTimeout=7"));
        assert!(prefix.ends_with("node01 "));
    }

    #[tokio::test]
    async fn shell_runner_captures_exit_code() {
        let out = ShellRunner.run("exit 3", Duration::from_secs(5)).await;
        assert_eq!(out.exit_code, 3);
        assert!(out.error.is_empty());
    }

    #[tokio::test]
    async fn shell_runner_captures_stdout() {
        let out = ShellRunner.run("printf hello", Duration::from_secs(5)).await;
        assert_eq!(out.stdout, "hello");
        assert!(!out.failed());
    }

    #[tokio::test]
    async fn shell_runner_times_out() {
        let out = ShellRunner.run("sleep 5", Duration::from_millis(50)).await;
        assert!(out.failed());
        assert!(out.error.contains("timed out"));
    }
}
