//! HA controller report.
//!
//! Columns are the cluster nodes; rows are the connectivity probe, the
//! cluster-node state, one row per cluster-managed resource, and the
//! configured default services the cluster does not claim.
//!
//! Connectivity is probed exactly once per host before fan-out begins. The
//! resulting downed-host set is read-only for the rest of the run: every
//! probe scheduled against a known-down host returns its record untouched
//! instead of re-attempting the connection.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::Settings;
use crate::controllers::longest_key;
use crate::controllers::placement::resource_state;
use crate::controllers::systemd::SystemdProbe;
use crate::error::VitalsError;
use crate::exec::{ssh_prefix, CommandRunner};
use crate::fanout::Fanout;
use crate::record::{Category, RecordBuilder, StatusRecord};
use crate::render::{StatusTable, TableSpec};
use crate::snapshot::{ClusterResource, ClusterSnapshot};

const CONNECTIVITY_ROW: &str = "ssh";
const NODE_STATE_ROW: &str = "HA";

pub struct HaController {
    snapshot: Arc<ClusterSnapshot>,
    settings: Settings,
    services: Vec<String>,
    runner: Arc<dyn CommandRunner>,
    provision_url: Option<String>,
}

impl HaController {
    #[must_use]
    pub fn new(
        snapshot: ClusterSnapshot,
        settings: Settings,
        services: Vec<String>,
        runner: Arc<dyn CommandRunner>,
        provision_url: Option<String>,
    ) -> Self {
        Self {
            snapshot: Arc::new(snapshot),
            settings,
            services,
            runner,
            provision_url,
        }
    }

    /// Default services minus the units the cluster manager already owns.
    fn unclaimed_services(&self) -> Vec<String> {
        let claimed: Vec<&str> = self
            .snapshot
            .resources
            .iter()
            .filter(|r| r.agent_class() == "systemd")
            .map(ClusterResource::agent_kind)
            .collect();
        self.services
            .iter()
            .filter(|s| !claimed.contains(&s.as_str()))
            .cloned()
            .collect()
    }

    pub async fn run(&self) -> Result<(), VitalsError> {
        let node_names = self.snapshot.node_names();
        if node_names.is_empty() {
            return Err(VitalsError::NoNodes);
        }
        let services = self.unclaimed_services();
        let timeout = self.settings.timeout;

        let mut index_keys: Vec<&str> = vec![CONNECTIVITY_ROW, NODE_STATE_ROW];
        index_keys.extend(self.snapshot.resources.iter().map(|r| r.id.as_str()));
        index_keys.extend(services.iter().map(String::as_str));

        let spec = TableSpec {
            index_label: "Checks".to_string(),
            index_width: longest_key(index_keys),
            columns: node_names.clone(),
            status_col: self.settings.status_col,
            details_col: self.settings.details_col,
            verbose: self.settings.verbose,
            no_table: self.settings.no_table,
            no_statusbar: self.settings.no_statusbar,
            total: self.snapshot.resources.len() + services.len(),
            scheme: self.settings.scheme,
        };
        let table = Arc::new(Mutex::new(StatusTable::new(spec)));
        {
            let mut out = table.lock().expect("renderer mutex poisoned");
            out.header();
            out.statusbar(false);
        }

        let downed = Arc::new(self.probe_connectivity(&table, &node_names).await);
        self.node_state_row(&table);

        let probe = Arc::new(SystemdProbe::new(
            Arc::clone(&self.runner),
            timeout,
            self.provision_url.clone(),
        ));
        let outer = Fanout::new(self.settings.fanout);

        // one row per cluster resource
        let items: Vec<(String, ClusterResource)> = self
            .snapshot
            .resources
            .iter()
            .map(|r| (r.id.clone(), r.clone()))
            .collect();
        outer
            .run(items, {
                let table = Arc::clone(&table);
                let snapshot = Arc::clone(&self.snapshot);
                let downed = Arc::clone(&downed);
                let probe = Arc::clone(&probe);
                let runner = Arc::clone(&self.runner);
                move |res: ClusterResource| {
                    let table = Arc::clone(&table);
                    let snapshot = Arc::clone(&snapshot);
                    let downed = Arc::clone(&downed);
                    let probe = Arc::clone(&probe);
                    let runner = Arc::clone(&runner);
                    async move {
                        let records =
                            resource_row(&res, &snapshot, &downed, &probe, &runner, timeout).await;
                        let mut out = table.lock().expect("renderer mutex poisoned");
                        out.line(&res.id, &records);
                        out.statusbar(true);
                    }
                }
            })
            .await?;

        // default services on every node
        let items: Vec<(String, String)> =
            services.iter().map(|s| (s.clone(), s.clone())).collect();
        outer
            .run(items, {
                let table = Arc::clone(&table);
                let downed = Arc::clone(&downed);
                let probe = Arc::clone(&probe);
                let node_names = node_names.clone();
                move |service: String| {
                    let table = Arc::clone(&table);
                    let downed = Arc::clone(&downed);
                    let probe = Arc::clone(&probe);
                    let node_names = node_names.clone();
                    async move {
                        let mut records = Vec::with_capacity(node_names.len());
                        for name in &node_names {
                            if downed.contains(name) {
                                records.push(StatusRecord::unknown(name));
                                continue;
                            }
                            let mut rec = RecordBuilder::new(name);
                            probe
                                .verify_unit(&mut rec, &service, Some(name), true, true)
                                .await;
                            records.push(rec.build());
                        }
                        let mut out = table.lock().expect("renderer mutex poisoned");
                        out.line(&service, &records);
                        out.statusbar(true);
                    }
                }
            })
            .await?;

        table.lock().expect("renderer mutex poisoned").separator();
        Ok(())
    }

    /// One connection attempt per host for the whole run; renders the ssh
    /// row and returns the set of unreachable hosts.
    async fn probe_connectivity(
        &self,
        table: &Mutex<StatusTable>,
        node_names: &[String],
    ) -> HashSet<String> {
        let timeout = self.settings.timeout;
        let mut downed = HashSet::new();
        let mut records = Vec::with_capacity(node_names.len());

        for name in node_names {
            let cmd = format!("{}uname", ssh_prefix(name, timeout));
            let out = self.runner.run(&cmd, timeout).await;
            let mut rec = RecordBuilder::new(name);
            if out.failed() {
                rec.set_status("DOWN");
                rec.set_category(Category::Bad);
                downed.insert(name.clone());
            } else {
                rec.set_status("OK");
                rec.set_category(Category::Good);
            }
            records.push(rec.build());
        }

        debug!(?downed, "unreachable hosts cached for this run");
        table
            .lock()
            .expect("renderer mutex poisoned")
            .line(CONNECTIVITY_ROW, &records);
        downed
    }

    /// Cluster-node state row: offline beats maintenance beats standby.
    fn node_state_row(&self, table: &Mutex<StatusTable>) {
        let mut records = Vec::with_capacity(self.snapshot.nodes.len());
        for node in &self.snapshot.nodes {
            let mut rec = RecordBuilder::new(&node.name);
            if !node.online {
                rec.set_status("DOWN");
                rec.set_category(Category::Down);
            } else if node.maintenance {
                rec.set_status("MAINT");
                rec.set_category(Category::Warn);
            } else if node.standby {
                rec.set_status("STNDBY");
                rec.set_category(Category::Warn);
            } else {
                rec.set_status("OK");
                // an online node running nothing deserves a second look
                rec.set_category(if node.resources_running > 0 {
                    Category::Good
                } else {
                    Category::Warn
                });
            }
            rec.set_info(node.resources_running.to_string());
            records.push(rec.build());
        }
        table
            .lock()
            .expect("renderer mutex poisoned")
            .line(NODE_STATE_ROW, &records);
    }
}

/// Build the record set for one resource row across all cluster nodes.
async fn resource_row(
    res: &ClusterResource,
    snapshot: &ClusterSnapshot,
    downed: &HashSet<String>,
    probe: &SystemdProbe,
    runner: &Arc<dyn CommandRunner>,
    timeout: std::time::Duration,
) -> Vec<StatusRecord> {
    let mut records = Vec::with_capacity(snapshot.nodes.len());
    for node in &snapshot.nodes {
        let mut rec = RecordBuilder::new(&node.name);
        rec.set_details(format!(
            "{} role={} running_on={:?}",
            res.resource_agent, res.role, res.running_on
        ));

        resource_state(res, &node.id).apply(&mut rec);
        let expect_running = rec.category() == Category::Good;

        if !downed.contains(&node.name) {
            if res.agent_class() == "systemd" {
                probe
                    .verify_pacemaker_unit(&mut rec, res.agent_kind(), &node.name, expect_running)
                    .await;
            }
            if res.agent_kind() == "drbd" {
                check_drbd(&mut rec, &node.name, runner, timeout).await;
            }
        }
        records.push(rec.build());
    }
    records
}

/// Replication state must be UpToDate on every node carrying the device.
async fn check_drbd(
    rec: &mut RecordBuilder,
    host: &str,
    runner: &Arc<dyn CommandRunner>,
    timeout: std::time::Duration,
) {
    let cmd = format!("{}drbd-overview", ssh_prefix(host, timeout));
    let out = runner.run(&cmd, timeout).await;
    if out.failed() {
        rec.set_status("ERR");
        rec.set_category(Category::Error);
        rec.set_details(format!("'{cmd}' returned non-zero exit code"));
        return;
    }

    let up_to_date = out.stdout_lines().first().is_some_and(|line| {
        line.split_whitespace()
            .nth(3)
            .is_some_and(|field| field.starts_with("UpToDate"))
    });
    if !up_to_date {
        rec.set_status("ERR");
        rec.set_category(Category::Error);
        rec.set_details("DRBD state is not UpToDate");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::ClusterNode;

    fn snapshot_with_services(units: &[&str]) -> ClusterSnapshot {
        ClusterSnapshot {
            nodes: vec![ClusterNode {
                id: "1".to_string(),
                name: "ctrl1".to_string(),
                online: true,
                standby: false,
                maintenance: false,
                resources_running: 1,
            }],
            resources: units
                .iter()
                .map(|unit| ClusterResource {
                    id: format!("res-{unit}"),
                    resource_agent: format!("systemd:{unit}"),
                    role: "Started".to_string(),
                    managed: true,
                    orphaned: false,
                    failed: false,
                    active: true,
                    blocked: false,
                    running_on: vec!["1".to_string()],
                })
                .collect(),
        }
    }

    #[test]
    fn cluster_claimed_units_leave_the_default_list() {
        let controller = HaController::new(
            snapshot_with_services(&["sshd", "chronyd"]),
            Settings::default(),
            vec!["sshd".to_string(), "chronyd".to_string(), "rsyslog".to_string()],
            Arc::new(crate::exec::ShellRunner),
            None,
        );
        assert_eq!(controller.unclaimed_services(), vec!["rsyslog"]);
    }

    #[tokio::test]
    async fn downed_host_skips_resource_probes() {
        use crate::exec::MockCommandRunner;

        let snapshot = snapshot_with_services(&["sshd"]);
        let res = snapshot.resources[0].clone();
        let downed: HashSet<String> = ["ctrl1".to_string()].into();

        let mut mock = MockCommandRunner::new();
        // no command may run against a host already known to be down
        mock.expect_run().times(0);
        let runner: Arc<dyn CommandRunner> = Arc::new(mock);
        let probe = SystemdProbe::new(Arc::clone(&runner), Settings::default().timeout, None);

        let records = resource_row(
            &res,
            &snapshot,
            &downed,
            &probe,
            &runner,
            Settings::default().timeout,
        )
        .await;
        // placement still classifies, only the remote probes are skipped
        assert_eq!(records[0].status, "UP");
        assert_eq!(records[0].category, Category::Good);
    }
}
