//! Health checks and their registry.
//!
//! A check is one probe for one host, returning a normalized
//! [`StatusRecord`]. Implementations follow the fail-fast chain contract:
//! sub-probes run in order, each is named in the record's history, and the
//! first failure ends the check with `info` naming the step that broke.
//!
//! Dispatch is by exact name through a static registry populated at process
//! start; an unknown check name is a configuration error rejected before any
//! work is scheduled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::VitalsError;
use crate::exec::CommandRunner;
use crate::record::StatusRecord;

pub mod health;
pub mod ipmi;
pub mod provision;
pub mod slurm;
pub mod zabbix;

/// One host to check, with the out-of-band addresses the probes need.
#[derive(Debug, Clone, Default)]
pub struct NodeTarget {
    /// Short node name, used as the row key.
    pub name: String,
    /// Name the monitoring system knows the node by (usually the FQDN).
    pub hostname: String,
    /// Management controller address, empty when unconfigured.
    pub bmc_address: String,
    pub bmc_username: String,
    pub bmc_password: String,
}

impl NodeTarget {
    /// A target known only by name (positional host argument).
    #[must_use]
    pub fn bare(name: &str) -> Self {
        Self {
            name: name.to_string(),
            hostname: name.to_string(),
            ..Self::default()
        }
    }
}

/// Everything a check factory may need. Shared state (scheduler snapshot,
/// API clients) is fetched once per run by the controller and handed in
/// read-only.
#[derive(Clone)]
pub struct CheckContext {
    pub node: NodeTarget,
    pub timeout: Duration,
    pub runner: Arc<dyn CommandRunner>,
    pub slurm: Option<Arc<slurm::SlurmStates>>,
    pub zabbix: Option<Arc<zabbix::ZabbixClient>>,
    pub provision: Option<Arc<provision::ProvisionClient>>,
}

/// Capability every concrete check implements.
#[async_trait]
pub trait Check: Send + Sync {
    /// Column key this check reports under.
    fn column(&self) -> &'static str;

    /// Run the probe chain and return the normalized result. Never fails:
    /// transport problems become DOWN/ERROR records, not errors.
    async fn status(&self) -> StatusRecord;
}

type Factory = fn(&CheckContext) -> Box<dyn Check>;

fn health_factory(ctx: &CheckContext) -> Box<dyn Check> {
    Box::new(health::HealthCheck::new(ctx))
}

fn ipmi_factory(ctx: &CheckContext) -> Box<dyn Check> {
    Box::new(ipmi::IpmiCheck::new(ctx))
}

fn slurm_factory(ctx: &CheckContext) -> Box<dyn Check> {
    Box::new(slurm::SlurmCheck::new(ctx))
}

fn provision_factory(ctx: &CheckContext) -> Box<dyn Check> {
    Box::new(provision::ProvisionCheck::new(ctx))
}

fn zabbix_factory(ctx: &CheckContext) -> Box<dyn Check> {
    Box::new(zabbix::ZabbixCheck::new(ctx))
}

/// Static check registry: name to factory, looked up by exact key.
const REGISTRY: &[(&str, Factory)] = &[
    ("health", health_factory),
    ("ipmi", ipmi_factory),
    ("slurm", slurm_factory),
    ("provision", provision_factory),
    ("zabbix", zabbix_factory),
];

/// All registered check names, in registry order.
#[must_use]
pub fn names() -> Vec<&'static str> {
    REGISTRY.iter().map(|(name, _)| *name).collect()
}

/// Validate requested check names against the registry.
///
/// Preserves first-occurrence order, drops duplicates, and rejects unknown
/// names as a startup error.
pub fn resolve(requested: &[String]) -> Result<Vec<&'static str>, VitalsError> {
    let mut selected: Vec<&'static str> = Vec::new();
    for name in requested {
        let Some((canonical, _)) = REGISTRY.iter().find(|(key, _)| key == name) else {
            return Err(VitalsError::UnknownCheck(
                name.clone(),
                names().join(", "),
            ));
        };
        if !selected.contains(canonical) {
            selected.push(canonical);
        }
    }
    Ok(selected)
}

/// Construct a check by registry name.
#[must_use]
pub fn build(name: &str, ctx: &CheckContext) -> Option<Box<dyn Check>> {
    REGISTRY
        .iter()
        .find(|(key, _)| *key == name)
        .map(|(_, factory)| factory(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_lists_all_checks() {
        assert_eq!(
            names(),
            vec!["health", "ipmi", "slurm", "provision", "zabbix"]
        );
    }

    #[test]
    fn resolve_preserves_order_and_dedups() {
        let requested = vec![
            "ipmi".to_string(),
            "health".to_string(),
            "ipmi".to_string(),
        ];
        let selected = resolve(&requested).unwrap();
        assert_eq!(selected, vec!["ipmi", "health"]);
    }

    #[test]
    fn resolve_rejects_unknown_names() {
        let requested = vec!["health".to_string(), "bogus".to_string()];
        let err = resolve(&requested).unwrap_err();
        assert!(matches!(err, VitalsError::UnknownCheck(name, _) if name == "bogus"));
    }
}
