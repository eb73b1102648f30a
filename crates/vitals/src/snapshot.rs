//! Cluster manager snapshot.
//!
//! Point-in-time, read-only view of the nodes and resources the cluster
//! manager reports. Parsed once per run from `crm_mon -r -1 -X`; worker
//! tasks only ever share it by reference.
//!
//! Absence of a cluster manager is not an error: a missing binary, a stopped
//! cluster or unparsable output all signal "non-HA mode" and the caller falls
//! back accordingly.

use std::time::Duration;

use tracing::debug;

use crate::exec::CommandRunner;

const CRM_MON_CMD: &str = "crm_mon -r -1 -X";
/// Shell "command not found".
const RC_NOT_FOUND: i32 = 127;
/// crm_mon's exit code when the cluster stack is stopped.
const RC_STOPPED: i32 = 107;

/// One cluster node as reported by the cluster manager.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub id: String,
    pub name: String,
    pub online: bool,
    pub standby: bool,
    pub maintenance: bool,
    pub resources_running: u32,
}

/// One cluster-managed resource, with the nodes currently hosting it.
#[derive(Debug, Clone)]
pub struct ClusterResource {
    pub id: String,
    pub resource_agent: String,
    pub role: String,
    pub managed: bool,
    pub orphaned: bool,
    pub failed: bool,
    pub active: bool,
    pub blocked: bool,
    /// Node ids the resource is currently running on.
    pub running_on: Vec<String>,
}

impl ClusterResource {
    /// Agent class, e.g. `systemd` for `systemd:sshd`, `ocf::heartbeat` for
    /// `ocf::heartbeat:IPaddr2`.
    #[must_use]
    pub fn agent_class(&self) -> &str {
        self.resource_agent
            .rsplit_once(':')
            .map_or("", |(class, _)| class)
    }

    /// Agent kind: the last segment of the agent name (`sshd`, `drbd`, ...).
    #[must_use]
    pub fn agent_kind(&self) -> &str {
        self.resource_agent
            .rsplit_once(':')
            .map_or(self.resource_agent.as_str(), |(_, kind)| kind)
    }
}

/// Parsed cluster state, immutable for the remainder of the run.
#[derive(Debug, Clone)]
pub struct ClusterSnapshot {
    pub nodes: Vec<ClusterNode>,
    pub resources: Vec<ClusterResource>,
}

impl ClusterSnapshot {
    /// Query the cluster manager once. `None` means non-HA mode.
    pub async fn detect(runner: &dyn CommandRunner, timeout: Duration) -> Option<Self> {
        let out = runner.run(CRM_MON_CMD, timeout).await;
        if out.exit_code == RC_NOT_FOUND {
            debug!("cluster manager not installed, non-HA mode");
            return None;
        }
        if out.exit_code == RC_STOPPED {
            debug!("cluster stack stopped, non-HA mode");
            return None;
        }
        Self::parse(&out.stdout)
    }

    /// Parse `crm_mon` XML. `None` for anything that is not a well-formed
    /// status document.
    #[must_use]
    pub fn parse(xml: &str) -> Option<Self> {
        let doc = match roxmltree::Document::parse(xml) {
            Ok(doc) => doc,
            Err(err) => {
                debug!(%err, "unparsable cluster manager output");
                return None;
            }
        };

        let root = doc.root_element();
        if root.tag_name().name() != "crm_mon" {
            debug!(tag = root.tag_name().name(), "unexpected document root");
            return None;
        }

        let nodes_el = root.children().find(|n| n.has_tag_name("nodes"))?;
        let nodes: Vec<ClusterNode> = nodes_el
            .children()
            .filter(|n| n.has_tag_name("node"))
            .map(|n| ClusterNode {
                id: attr(&n, "id"),
                name: attr(&n, "name"),
                online: bool_attr(&n, "online"),
                standby: bool_attr(&n, "standby"),
                maintenance: bool_attr(&n, "maintenance"),
                resources_running: attr(&n, "resources_running").parse().unwrap_or(0),
            })
            .collect();

        let mut resources = Vec::new();
        if let Some(resources_el) = root.children().find(|n| n.has_tag_name("resources")) {
            // resources may sit at top level or nested in clone/group wrappers
            for res in resources_el
                .descendants()
                .filter(|n| n.has_tag_name("resource"))
            {
                let running_on = res
                    .children()
                    .filter(|n| n.has_tag_name("node"))
                    .map(|n| attr(&n, "id"))
                    .collect();
                resources.push(ClusterResource {
                    id: attr(&res, "id"),
                    resource_agent: attr(&res, "resource_agent"),
                    role: attr(&res, "role"),
                    managed: bool_attr(&res, "managed"),
                    orphaned: bool_attr(&res, "orphaned"),
                    failed: bool_attr(&res, "failed"),
                    active: bool_attr(&res, "active"),
                    blocked: bool_attr(&res, "blocked"),
                    running_on,
                });
            }
        }

        Some(Self { nodes, resources })
    }

    /// Node name for a node id.
    #[must_use]
    pub fn node_name(&self, id: &str) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.name.as_str())
    }

    /// Node names in cluster order.
    #[must_use]
    pub fn node_names(&self) -> Vec<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }
}

fn attr(node: &roxmltree::Node<'_, '_>, name: &str) -> String {
    node.attribute(name).unwrap_or_default().to_string()
}

fn bool_attr(node: &roxmltree::Node<'_, '_>, name: &str) -> bool {
    node.attribute(name) == Some("true")
}
