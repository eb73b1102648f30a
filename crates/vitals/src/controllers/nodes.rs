//! Node status report: one row per node, one column per selected check.
//!
//! Shared lookups (the scheduler snapshot, API clients) are fetched once
//! before fan-out so a large cluster does not hammer the services once per
//! node. Each node worker fans its checks out on the smaller inner pool and
//! renders its row under the output mutex as soon as the records are in.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::checks::{self, provision::ProvisionClient, slurm, zabbix::ZabbixClient};
use crate::checks::{CheckContext, NodeTarget};
use crate::config::{FileConfig, Settings};
use crate::controllers::longest_key;
use crate::error::VitalsError;
use crate::exec::CommandRunner;
use crate::fanout::Fanout;
use crate::record::StatusRecord;
use crate::render::{StatusTable, TableSpec};

pub struct NodesController {
    targets: Vec<NodeTarget>,
    checks: Vec<&'static str>,
    settings: Settings,
    config: FileConfig,
    runner: Arc<dyn CommandRunner>,
}

impl NodesController {
    #[must_use]
    pub fn new(
        targets: Vec<NodeTarget>,
        checks: Vec<&'static str>,
        settings: Settings,
        config: FileConfig,
        runner: Arc<dyn CommandRunner>,
    ) -> Self {
        Self {
            targets,
            checks,
            settings,
            config,
            runner,
        }
    }

    pub async fn run(&self) -> Result<(), VitalsError> {
        if self.targets.is_empty() {
            return Err(VitalsError::NoNodes);
        }

        let timeout = self.settings.timeout;
        let mut columns = self.checks.clone();

        // one scheduler query for the whole run, not one per node
        let slurm_states = if columns.contains(&"slurm") {
            let states = slurm::fetch_sinfo(self.runner.as_ref(), timeout).await;
            if states.is_empty() {
                columns.retain(|c| *c != "slurm");
                None
            } else {
                Some(Arc::new(states))
            }
        } else {
            None
        };
        let zabbix = columns
            .contains(&"zabbix")
            .then(|| Arc::new(ZabbixClient::new(&self.config.zabbix, timeout)));
        let provision = columns
            .contains(&"provision")
            .then(|| Arc::new(ProvisionClient::new(&self.config.provision, timeout)));

        if columns.is_empty() {
            return Err(VitalsError::Config(
                "no checks left to run after dropping unavailable ones".to_string(),
            ));
        }

        let spec = TableSpec {
            index_label: "Node".to_string(),
            index_width: longest_key(self.targets.iter().map(|t| t.name.as_str())),
            columns: columns.iter().map(ToString::to_string).collect(),
            status_col: self.settings.status_col,
            details_col: self.settings.details_col,
            verbose: self.settings.verbose,
            no_table: self.settings.no_table,
            no_statusbar: self.settings.no_statusbar,
            total: self.targets.len(),
            scheme: self.settings.scheme,
        };
        let table = Arc::new(Mutex::new(StatusTable::new(spec)));

        let sorted = self.settings.sorted;
        if !sorted {
            let mut out = table.lock().expect("renderer mutex poisoned");
            out.header();
            out.statusbar(false);
        }

        let outer = Fanout::new(self.settings.fanout);
        let inner = outer.inner();
        let items: Vec<(String, NodeTarget)> = self
            .targets
            .iter()
            .map(|t| (t.name.clone(), t.clone()))
            .collect();

        debug!(nodes = items.len(), checks = columns.len(), "dispatching node checks");

        let results = outer
            .run(items, {
                let table = Arc::clone(&table);
                let runner = Arc::clone(&self.runner);
                let columns = columns.clone();
                move |target: NodeTarget| {
                    let table = Arc::clone(&table);
                    let runner = Arc::clone(&runner);
                    let columns = columns.clone();
                    let slurm_states = slurm_states.clone();
                    let zabbix = zabbix.clone();
                    let provision = provision.clone();
                    async move {
                        let ctx = CheckContext {
                            node: target.clone(),
                            timeout,
                            runner,
                            slurm: slurm_states,
                            zabbix,
                            provision,
                        };
                        let work: Vec<(&'static str, _)> = columns
                            .iter()
                            .filter_map(|name| {
                                checks::build(name, &ctx).map(|check| (*name, check))
                            })
                            .collect();

                        let records: Vec<StatusRecord> = match inner
                            .run(work, |check| async move { check.status().await })
                            .await
                        {
                            Ok(results) => results.into_iter().map(|(_, rec)| rec).collect(),
                            Err(_) => return Vec::new(),
                        };

                        let mut out = table.lock().expect("renderer mutex poisoned");
                        if !sorted {
                            out.line(&target.name, &records);
                        }
                        out.statusbar(true);
                        records
                    }
                }
            })
            .await?;

        if sorted {
            let mut rows = results;
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            let mut out = table.lock().expect("renderer mutex poisoned");
            out.header();
            for (node, records) in &rows {
                out.line(node, records);
            }
        }

        table.lock().expect("renderer mutex poisoned").separator();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_node_list_is_rejected() {
        let controller = NodesController::new(
            Vec::new(),
            vec!["health"],
            Settings::default(),
            FileConfig::default(),
            Arc::new(crate::exec::ShellRunner),
        );
        let err = tokio::runtime::Runtime::new()
            .unwrap()
            .block_on(controller.run())
            .unwrap_err();
        assert!(matches!(err, VitalsError::NoNodes));
    }
}
