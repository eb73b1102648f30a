//! Functional service checkers.
//!
//! A systemd unit can be active and still broken. These checkers exercise
//! the service behind the unit (a DNS query, a database round-trip, a
//! scheduler ping) and return a verdict plus a one-line comment. Lookup is
//! by unit name; a unit without a checker simply keeps its systemd verdict.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::exec::{ssh_prefix, CommandRunner};

mod chronyd;
mod database;
mod dns;
mod slurm;
mod sshd;
mod webboot;

/// What a checker needs to probe a service, locally or over ssh.
#[derive(Clone)]
pub struct ServiceContext {
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    /// Probe over ssh on this host; `None` means the local machine.
    pub host: Option<String>,
    /// Provisioning service base URL, for the boot endpoint checker.
    pub provision_url: Option<String>,
}

impl ServiceContext {
    fn cmd_prefix(&self) -> String {
        self.host
            .as_deref()
            .map(|h| ssh_prefix(h, self.timeout))
            .unwrap_or_default()
    }
}

/// Capability of a functional service checker.
#[async_trait]
pub trait ServiceChecker: Send + Sync {
    /// Probe the service. Returns ok plus a comment describing the failure.
    async fn probe(&self) -> (bool, String);
}

/// Find the checker for a systemd unit, if one is registered.
#[must_use]
pub fn lookup(unit: &str, ctx: &ServiceContext) -> Option<Box<dyn ServiceChecker>> {
    match unit {
        "chronyd" => Some(Box::new(chronyd::Chronyd::new(ctx))),
        "named" => Some(Box::new(dns::Named::new(ctx))),
        "sshd" => Some(Box::new(sshd::Sshd::new(ctx))),
        "mariadb" => Some(Box::new(database::Mariadb::new(ctx))),
        "mongod" => Some(Box::new(database::Mongod::new(ctx))),
        "munge" => Some(Box::new(slurm::Munge::new(ctx))),
        "slurmctld" => Some(Box::new(slurm::Slurmctld::new(ctx))),
        "slurmdbd" => Some(Box::new(slurm::Slurmdbd::new(ctx))),
        // nginx fronts the PXE boot endpoint on a controller
        "nginx" => Some(Box::new(webboot::WebBoot::new(ctx))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::MockCommandRunner;

    fn ctx() -> ServiceContext {
        ServiceContext {
            runner: Arc::new(MockCommandRunner::new()),
            timeout: Duration::from_secs(2),
            host: None,
            provision_url: None,
        }
    }

    #[test]
    fn known_units_have_checkers() {
        for unit in ["chronyd", "named", "sshd", "mariadb", "mongod", "munge", "slurmctld"] {
            assert!(lookup(unit, &ctx()).is_some(), "{unit} missing");
        }
    }

    #[test]
    fn unknown_units_have_none() {
        assert!(lookup("rsyslog", &ctx()).is_none());
        assert!(lookup("firewalld", &ctx()).is_none());
    }

    #[test]
    fn remote_context_builds_ssh_prefix() {
        let mut remote = ctx();
        remote.host = Some("ctrl2".to_string());
        assert!(remote.cmd_prefix().starts_with("ssh -o ConnectTimeout=2"));
        assert!(ctx().cmd_prefix().is_empty());
    }
}
