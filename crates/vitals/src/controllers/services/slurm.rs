//! Workload scheduler stack checkers: controller, accounting, auth.

use async_trait::async_trait;

use super::{ServiceChecker, ServiceContext};

pub struct Slurmctld {
    ctx: ServiceContext,
}

impl Slurmctld {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Slurmctld {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!("{}scontrol ping", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() {
            return (false, format!("'{cmd}' exit code is not 0"));
        }
        // expected shape: "Slurmctld(primary) at ctrl1 is UP"
        let first = out.stdout_lines().first().map_or(String::new(), |l| (*l).to_string());
        let healthy = first.starts_with("Slurmctld(") && first.trim_end().ends_with("UP");
        if !healthy {
            return (false, format!("'{cmd}' did not report the controller UP"));
        }
        (true, String::new())
    }
}

pub struct Slurmdbd {
    ctx: ServiceContext,
}

impl Slurmdbd {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Slurmdbd {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!("{}sacctmgr -n list cluster", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        let has_cluster = out
            .stdout_lines()
            .first()
            .is_some_and(|line| line.split_whitespace().count() >= 2);
        if out.failed() || !has_cluster {
            return (false, format!("'{cmd}' returned no clusters configured"));
        }
        (true, String::new())
    }
}

pub struct Munge {
    ctx: ServiceContext,
}

impl Munge {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Munge {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!("{}munge -n | unmunge", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        let status = out
            .stdout_lines()
            .first()
            .and_then(|line| line.split_whitespace().nth(1))
            .unwrap_or_default()
            .to_string();
        if out.failed() || status != "Success" {
            return (false, format!("'{cmd}' returned error"));
        }
        (true, String::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::exec::{CmdOutput, MockCommandRunner};

    fn ctx_with(stdout: &'static str, rc: i32) -> ServiceContext {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(move |_, _| CmdOutput {
            exit_code: rc,
            stdout: stdout.to_string(),
            ..CmdOutput::default()
        });
        ServiceContext {
            runner: Arc::new(runner),
            timeout: Duration::from_secs(2),
            host: None,
            provision_url: None,
        }
    }

    #[tokio::test]
    async fn controller_up_passes() {
        let checker = Slurmctld {
            ctx: ctx_with("Slurmctld(primary) at ctrl1 is UP\n", 0),
        };
        assert!(checker.probe().await.0);
    }

    #[tokio::test]
    async fn controller_down_fails() {
        let checker = Slurmctld {
            ctx: ctx_with("Slurmctld(primary) at ctrl1 is DOWN\n", 0),
        };
        let (ok, comment) = checker.probe().await;
        assert!(!ok);
        assert!(comment.contains("did not report"));
    }

    #[tokio::test]
    async fn accounting_with_cluster_passes() {
        let checker = Slurmdbd {
            ctx: ctx_with("   cluster  10.1.0.1  6817  ...\n", 0),
        };
        assert!(checker.probe().await.0);
    }

    #[tokio::test]
    async fn accounting_without_cluster_fails() {
        let checker = Slurmdbd {
            ctx: ctx_with("", 0),
        };
        assert!(!checker.probe().await.0);
    }

    #[tokio::test]
    async fn munge_roundtrip_passes() {
        let checker = Munge {
            ctx: ctx_with("STATUS: Success (0)\nENCODE_HOST: ctrl1\n", 0),
        };
        assert!(checker.probe().await.0);
    }

    #[tokio::test]
    async fn munge_error_fails() {
        let checker = Munge {
            ctx: ctx_with("unmunge: Error: Invalid credential\n", 1),
        };
        assert!(!checker.probe().await.0);
    }
}
