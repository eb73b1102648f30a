//! Node reachability and filesystem health.
//!
//! The broadest check: can the node be resolved, pinged, reached over ssh,
//! and are its mountpoints alive. The chain is strictly ordered; the first
//! failing step ends the check so the table can show how far the node got.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::checks::{Check, CheckContext};
use crate::exec::{ssh_prefix, CommandRunner};
use crate::fanout::Fanout;
use crate::record::{Category, RecordBuilder, StatusRecord};

/// Mount units every host has; not worth probing.
const STOCK_MOUNT_UNITS: &[&str] = &["-.mount", "run-user-0.mount"];
const MOUNT_PROBES: usize = 10;

pub struct HealthCheck {
    node: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl HealthCheck {
    #[must_use]
    pub fn new(ctx: &CheckContext) -> Self {
        Self {
            node: ctx.node.name.clone(),
            timeout: ctx.timeout,
            runner: Arc::clone(&ctx.runner),
        }
    }

    async fn check_resolve(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("resolve");
        let cmd = format!("host -W {} {}", self.timeout.as_secs(), self.node);
        let out = self.runner.run(&cmd, self.timeout).await;
        if out.failed() {
            rec.set_details(out.stdout.trim().to_string());
        }
        !out.failed()
    }

    async fn check_ping(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("ping");
        let cmd = format!("ping -c1 -w{} {}", self.timeout.as_secs(), self.node);
        let out = self.runner.run(&cmd, self.timeout).await;
        if out.failed() {
            // the statistics line carries the loss summary
            let lines = out.stdout_lines();
            if let Some(line) = lines.iter().rev().nth(1) {
                rec.set_details((*line).to_string());
            }
        }
        !out.failed()
    }

    async fn check_ssh_port(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("ssh port");
        let addr = format!("{}:22", self.node);
        let connect = tokio::net::TcpStream::connect(addr);
        let open = matches!(tokio::time::timeout(self.timeout, connect).await, Ok(Ok(_)));
        if !open {
            rec.set_details("Port 22 is closed".to_string());
        }
        open
    }

    async fn check_ssh(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("ssh");
        let cmd = format!("{}uname", ssh_prefix(&self.node, self.timeout));
        let out = self.runner.run(&cmd, self.timeout).await;
        !out.failed()
    }

    /// Discover the node's mount units over ssh, then stat every mountpoint
    /// concurrently. A hung filesystem shows up as a stat timeout, not a hung
    /// status run.
    async fn check_mounts(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("mounts");
        let prefix = ssh_prefix(&self.node, self.timeout);
        let cmd = format!("{prefix}systemctl --type mount --all --no-legend");
        let out = self.runner.run(&cmd, self.timeout).await;
        if out.failed() {
            return false;
        }

        let mut mounts = Vec::new();
        for line in out.stdout_lines() {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 5 {
                continue;
            }
            let (unit, path) = (fields[0], fields[4]);
            if path.starts_with('/') && !STOCK_MOUNT_UNITS.contains(&unit) {
                mounts.push(path.to_string());
            }
        }
        debug!(node = %self.node, ?mounts, "discovered mounts");

        let items: Vec<(String, String)> =
            mounts.into_iter().map(|m| (m.clone(), m)).collect();
        let runner = Arc::clone(&self.runner);
        let node = self.node.clone();
        let timeout = self.timeout;
        let Ok(results) = Fanout::new(MOUNT_PROBES)
            .run(items, move |mount| {
                let runner = Arc::clone(&runner);
                let prefix = ssh_prefix(&node, timeout);
                async move {
                    let cmd = format!("{prefix}cat /proc/mounts | grep -q '{mount}'");
                    if runner.run(&cmd, timeout).await.failed() {
                        return false;
                    }
                    let cmd = format!("{prefix}stat -t {mount}");
                    !runner.run(&cmd, timeout).await.failed()
                }
            })
            .await
        else {
            return false;
        };

        let broken: Vec<String> = results
            .into_iter()
            .filter(|(_, ok)| !ok)
            .map(|(mount, _)| mount)
            .collect();
        if !broken.is_empty() {
            rec.set_details(format!("FAIL:{}", broken.join(",")));
            return false;
        }
        true
    }
}

#[async_trait]
impl Check for HealthCheck {
    fn column(&self) -> &'static str {
        "health"
    }

    async fn status(&self) -> StatusRecord {
        debug!(node = %self.node, "health check started");
        let mut rec = RecordBuilder::new(self.column());

        if !self.check_resolve(&mut rec).await {
            return rec.fail();
        }
        rec.set_status("DOWN");

        if !self.check_ping(&mut rec).await {
            return rec.fail();
        }
        if !self.check_ssh_port(&mut rec).await {
            return rec.fail();
        }
        rec.set_category(Category::Down);

        if !self.check_ssh(&mut rec).await {
            return rec.fail();
        }
        rec.set_status("AVAIL");
        rec.set_category(Category::Warn);

        if !self.check_mounts(&mut rec).await {
            rec.set_status("NO_FS");
            return rec.fail();
        }

        rec.set_status("OK");
        rec.set_category(Category::Good);
        rec.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::NodeTarget;
    use crate::exec::{CmdOutput, MockCommandRunner};

    fn check_with(runner: MockCommandRunner) -> HealthCheck {
        let ctx = CheckContext {
            node: NodeTarget::bare("node01"),
            timeout: Duration::from_secs(2),
            runner: Arc::new(runner),
            slurm: None,
            zabbix: None,
            provision: None,
        };
        HealthCheck::new(&ctx)
    }

    fn ok_output() -> CmdOutput {
        CmdOutput {
            exit_code: 0,
            ..CmdOutput::default()
        }
    }

    fn failed_output() -> CmdOutput {
        CmdOutput {
            exit_code: 1,
            ..CmdOutput::default()
        }
    }

    #[tokio::test]
    async fn resolve_failure_stops_the_chain() {
        let mut runner = MockCommandRunner::new();
        // exactly one invocation: the resolver; no later probe runs
        runner
            .expect_run()
            .times(1)
            .returning(|_, _| failed_output());

        let rec = check_with(runner).status().await;
        assert_eq!(rec.status, "UNKN");
        assert_eq!(rec.category, Category::Unkn);
        assert_eq!(rec.info, "resolve");
        assert_eq!(rec.history, vec!["resolve"]);
    }

    #[tokio::test]
    async fn ping_failure_reports_down() {
        let mut runner = MockCommandRunner::new();
        let mut seq = mockall::Sequence::new();
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| ok_output());
        runner
            .expect_run()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _| failed_output());

        let rec = check_with(runner).status().await;
        assert_eq!(rec.status, "DOWN");
        assert_eq!(rec.info, "ping");
        assert_eq!(rec.history, vec!["resolve", "ping"]);
    }

    #[tokio::test]
    async fn history_names_every_attempted_step() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|cmd, _| {
            if cmd.contains("ping") {
                failed_output()
            } else {
                ok_output()
            }
        });

        let rec = check_with(runner).status().await;
        assert_eq!(rec.history.last().map(String::as_str), Some("ping"));
        assert!(!rec.history.contains(&"ssh".to_string()));
    }
}
