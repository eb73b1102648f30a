//! Workload scheduler node state.
//!
//! Classifies a node against a `sinfo` snapshot fetched once per run, so a
//! thousand-node report costs one scheduler query instead of a thousand.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::checks::{Check, CheckContext};
use crate::exec::CommandRunner;
use crate::record::{Category, RecordBuilder, StatusRecord};

/// Node name to scheduler states (a node can sit in several partitions).
pub type SlurmStates = HashMap<String, BTreeSet<String>>;

const SINFO_CMD: &str = r#"sinfo -N -o "%N %6T""#;

const IDLE_STATES: &[&str] = &["IDLE"];
const WORKING_STATES: &[&str] = &["ALLOCATED", "ALLOCATED+", "COMPLETING", "MIXED", "RESERVED"];
/// State suffixes sinfo uses for unreachable/draining/powered-down nodes.
const ERROR_TAGS: &[char] = &['*', '~', '#', '$', '@'];

/// Fetch the scheduler's view of every node. Empty map when the scheduler
/// is unavailable; the caller then drops the check from the column set.
pub async fn fetch_sinfo(runner: &dyn CommandRunner, timeout: Duration) -> SlurmStates {
    let out = runner.run(SINFO_CMD, timeout).await;
    let mut states = SlurmStates::new();
    if out.failed() {
        debug!("sinfo unavailable, scheduler column will be dropped");
        return states;
    }
    for line in out.stdout_lines().into_iter().skip(1) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 2 {
            continue;
        }
        states
            .entry(fields[0].to_string())
            .or_default()
            .insert(fields[1].to_string());
    }
    states
}

pub struct SlurmCheck {
    node: String,
    states: Arc<SlurmStates>,
}

impl SlurmCheck {
    #[must_use]
    pub fn new(ctx: &CheckContext) -> Self {
        Self {
            node: ctx.node.name.clone(),
            states: ctx.slurm.clone().unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Check for SlurmCheck {
    fn column(&self) -> &'static str {
        "slurm"
    }

    async fn status(&self) -> StatusRecord {
        let mut rec = RecordBuilder::new(self.column());

        let Some(states) = self.states.get(&self.node) else {
            return rec.build();
        };
        let status: String = states
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("/");
        rec.set_status(status.clone());

        let upper = status.to_uppercase();
        if IDLE_STATES.contains(&upper.as_str()) {
            rec.set_category(Category::Good);
        }
        if WORKING_STATES.contains(&upper.as_str()) {
            rec.set_category(Category::Busy);
        }
        if status
            .chars()
            .last()
            .is_some_and(|tag| ERROR_TAGS.contains(&tag))
        {
            rec.set_category(Category::Error);
        }
        rec.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::NodeTarget;
    use crate::exec::{CmdOutput, MockCommandRunner};

    fn check_for(node: &str, states: SlurmStates) -> SlurmCheck {
        SlurmCheck {
            node: node.to_string(),
            states: Arc::new(states),
        }
    }

    fn states_of(node: &str, state: &str) -> SlurmStates {
        let mut map = SlurmStates::new();
        map.entry(node.to_string())
            .or_default()
            .insert(state.to_string());
        map
    }

    #[tokio::test]
    async fn idle_node_is_good() {
        let rec = check_for("node01", states_of("node01", "idle")).status().await;
        assert_eq!(rec.status, "idle");
        assert_eq!(rec.category, Category::Good);
    }

    #[tokio::test]
    async fn allocated_node_is_busy() {
        let rec = check_for("node01", states_of("node01", "mixed")).status().await;
        assert_eq!(rec.category, Category::Busy);
    }

    #[tokio::test]
    async fn drained_node_is_an_error() {
        let rec = check_for("node01", states_of("node01", "drain*"))
            .status()
            .await;
        assert_eq!(rec.category, Category::Error);
    }

    #[tokio::test]
    async fn unlisted_node_stays_unknown() {
        let rec = check_for("node99", states_of("node01", "idle")).status().await;
        assert_eq!(rec.status, "UNKN");
        assert_eq!(rec.category, Category::Unkn);
    }

    #[tokio::test]
    async fn sinfo_parses_per_node_states() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_, _| CmdOutput {
            exit_code: 0,
            stdout: "NODELIST STATE\nnode01 idle\nnode02 mixed\nnode02 drain*\n".to_string(),
            ..CmdOutput::default()
        });
        let states = fetch_sinfo(&runner, Duration::from_secs(5)).await;
        assert_eq!(states["node01"], BTreeSet::from(["idle".to_string()]));
        assert_eq!(states["node02"].len(), 2);
    }

    #[tokio::test]
    async fn sinfo_failure_yields_empty_map() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(|_, _| CmdOutput {
            exit_code: 1,
            ..CmdOutput::default()
        });
        assert!(fetch_sinfo(&runner, Duration::from_secs(5)).await.is_empty());
    }
}
