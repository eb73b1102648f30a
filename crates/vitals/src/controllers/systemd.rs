//! Systemd unit verification, local or over ssh.
//!
//! Two expectations make up a unit verdict: whether autostart should be
//! enabled (cluster-managed units must be disabled, pacemaker owns them) and
//! whether the unit should be running on the probed host. A unit that is up
//! and expected up graduates to its functional checker.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::controllers::services::{self, ServiceContext};
use crate::exec::{ssh_prefix, CommandRunner};
use crate::record::{Category, RecordBuilder};

pub struct SystemdProbe {
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
    /// Base URL of the provisioning service, for the boot-endpoint checker.
    provision_url: Option<String>,
}

impl SystemdProbe {
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        timeout: Duration,
        provision_url: Option<String>,
    ) -> Self {
        Self {
            runner,
            timeout,
            provision_url,
        }
    }

    fn prefix(&self, host: Option<&str>) -> String {
        host.map(|h| ssh_prefix(h, self.timeout)).unwrap_or_default()
    }

    /// Verify a unit against the given expectations, refining `rec` in place.
    pub async fn verify_unit(
        &self,
        rec: &mut RecordBuilder,
        unit: &str,
        host: Option<&str>,
        need_started: bool,
        need_enabled: bool,
    ) {
        let prefix = self.prefix(host);

        let cmd = format!("{prefix}systemctl is-enabled {unit}");
        let out = self.runner.run(&cmd, self.timeout).await;
        let is_enabled = out.stdout.trim();

        if need_enabled && is_enabled != "enabled" {
            rec.set_status("ERR");
            rec.set_category(Category::Error);
            rec.set_info("systemd");
            rec.set_details("Autostart is disabled for the unit.");
        }
        if !need_enabled && is_enabled != "disabled" {
            rec.set_status("ERR");
            rec.set_category(Category::Error);
            rec.set_info("systemd");
            rec.set_details("Autostart is enabled for the unit.");
        }

        let cmd = format!("{prefix}systemctl status {unit}");
        let is_started = !self.runner.run(&cmd, self.timeout).await.failed();

        if need_started && !is_started {
            rec.set_status("ERR");
            rec.set_category(Category::Error);
            rec.set_info("systemd");
            rec.set_details("Unit should run on this host.");
            return;
        }
        if !need_started && is_started {
            rec.set_status("ERR");
            rec.set_category(Category::Error);
            rec.set_info("systemd");
            rec.set_details("Unit should not run on this host.");
            return;
        }
        if !is_started {
            return;
        }

        rec.set_status("UP");
        rec.set_category(Category::Good);
        rec.set_info("");
        self.run_functional(rec, unit, host).await;
    }

    /// Verify a unit the cluster manager owns.
    ///
    /// Pacemaker-managed units must have autostart disabled (pacemaker
    /// starts them), and their running state must match what placement
    /// expects on this host.
    pub async fn verify_pacemaker_unit(
        &self,
        rec: &mut RecordBuilder,
        unit: &str,
        host: &str,
        expect_running: bool,
    ) {
        let prefix = self.prefix(Some(host));

        let cmd = format!("{prefix}systemctl is-enabled {unit}");
        let out = self.runner.run(&cmd, self.timeout).await;
        if out.stdout.trim() != "disabled" {
            rec.set_status("ERR");
            rec.set_category(Category::Error);
            rec.set_info("systemd");
            rec.set_details("Unit expecting to be disabled in pacemaker");
        }

        let cmd = format!("{prefix}systemctl status {unit}");
        let is_started = !self.runner.run(&cmd, self.timeout).await.failed();

        if expect_running {
            debug!(unit, host, "unit expected to be running");
            if !is_started {
                rec.set_status("DOWN");
                rec.set_category(Category::Error);
                rec.set_info("systemd");
                rec.set_details("Unit is expecting to be running");
                return;
            }
            self.run_functional(rec, unit, Some(host)).await;
        } else {
            debug!(unit, host, "unit expected to be stopped");
            if is_started {
                rec.set_status("ERR");
                rec.set_category(Category::Error);
                rec.set_info("systemd");
                rec.set_details("Unit is expecting to be stopped");
            }
        }
    }

    /// Run the unit's functional checker, if one is registered. A unit
    /// without a checker keeps its systemd verdict.
    pub async fn run_functional(&self, rec: &mut RecordBuilder, unit: &str, host: Option<&str>) {
        let ctx = ServiceContext {
            runner: Arc::clone(&self.runner),
            timeout: self.timeout,
            host: host.map(ToString::to_string),
            provision_url: self.provision_url.clone(),
        };
        let Some(checker) = services::lookup(unit, &ctx) else {
            debug!(unit, "no functional checker registered");
            return;
        };

        let (ok, comment) = checker.probe().await;
        if ok {
            rec.set_status("WORKS");
            rec.set_category(Category::Good);
        } else {
            rec.set_status("DOWN");
            rec.set_category(Category::Error);
            rec.set_info("functional checker");
            rec.push_details(&comment);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{CmdOutput, MockCommandRunner};

    fn output(rc: i32, stdout: &str) -> CmdOutput {
        CmdOutput {
            exit_code: rc,
            stdout: stdout.to_string(),
            ..CmdOutput::default()
        }
    }

    fn probe(runner: MockCommandRunner) -> SystemdProbe {
        SystemdProbe::new(Arc::new(runner), Duration::from_secs(2), None)
    }

    #[tokio::test]
    async fn stopped_unit_expected_running_is_an_error() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|cmd, _| {
            if cmd.contains("is-enabled") {
                output(0, "enabled\n")
            } else {
                output(3, "")
            }
        });

        let mut rec = RecordBuilder::new("ctrl1");
        probe(runner)
            .verify_unit(&mut rec, "rsyslog", None, true, true)
            .await;
        let rec = rec.build();
        assert_eq!(rec.status, "ERR");
        assert_eq!(rec.category, Category::Error);
        assert_eq!(rec.info, "systemd");
    }

    #[tokio::test]
    async fn running_unit_expected_stopped_is_an_error() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|cmd, _| {
            if cmd.contains("is-enabled") {
                output(0, "disabled\n")
            } else {
                output(0, "active")
            }
        });

        let mut rec = RecordBuilder::new("ctrl1");
        probe(runner)
            .verify_unit(&mut rec, "rsyslog", None, false, false)
            .await;
        let rec = rec.build();
        assert_eq!(rec.status, "ERR");
        assert!(rec.details.contains("should not run"));
    }

    #[tokio::test]
    async fn healthy_unit_without_checker_reports_up() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().returning(|cmd, _| {
            if cmd.contains("is-enabled") {
                output(0, "enabled\n")
            } else {
                output(0, "active")
            }
        });

        let mut rec = RecordBuilder::new("ctrl1");
        probe(runner)
            .verify_unit(&mut rec, "rsyslog", None, true, true)
            .await;
        let rec = rec.build();
        assert_eq!(rec.status, "UP");
        assert_eq!(rec.category, Category::Good);
    }

    #[tokio::test]
    async fn remote_probe_uses_ssh() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|cmd, _| cmd.starts_with("ssh -o ConnectTimeout="))
            .returning(|cmd, _| {
                if cmd.contains("is-enabled") {
                    output(0, "enabled\n")
                } else {
                    output(0, "active")
                }
            });

        let mut rec = RecordBuilder::new("ctrl2");
        probe(runner)
            .verify_unit(&mut rec, "rsyslog", Some("ctrl2"), true, true)
            .await;
        assert_eq!(rec.build().status, "UP");
    }
}
