//! Cluster status CLI.
//!
//! Discovers the row universe for the selected report, fans the checks out
//! and prints the status table. Failed checks show up in the table, not in
//! the exit code; only an interrupted run exits non-zero.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use vitals::checks::provision::ProvisionClient;
use vitals::checks::{self, NodeTarget};
use vitals::config::{self, FileConfig, Settings, DEFAULT_CONFIG_PATH};
use vitals::controllers::events::EventsController;
use vitals::controllers::ha::HaController;
use vitals::controllers::nodes::NodesController;
use vitals::controllers::nonha::NonHaController;
use vitals::exec::ShellRunner;
use vitals::hostlist;
use vitals::scheme::ColorScheme;
use vitals::snapshot::ClusterSnapshot;

/// Show status of nodes and controllers of the cluster
#[derive(Parser)]
#[command(name = "vitals")]
#[command(about = "Show status of nodes and controllers of the cluster")]
#[command(version)]
struct Cli {
    /// Hosts to report on; hostlist expressions like node[01-04] expand
    hosts: Vec<String>,

    #[command(subcommand)]
    command: Option<Command>,

    /// Restrict node discovery to one provisioning group
    #[arg(long, short = 'g', global = true)]
    group: Option<String>,

    /// Checks to run, comma-separated
    #[arg(long, short = 'c', global = true, value_delimiter = ',')]
    checks: Vec<String>,

    /// Number of checks running simultaneously
    #[arg(long, short = 'w', global = true)]
    fanout: Option<usize>,

    /// Timeout for every external call, in seconds
    #[arg(long, short = 't', global = true)]
    timeout: Option<u64>,

    /// Width of the status columns
    #[arg(long, short = 'S', global = true)]
    status_column: Option<usize>,

    /// Width of the details columns; 0 derives it from the terminal
    #[arg(long, short = 'D', global = true)]
    details_column: Option<usize>,

    /// Show details of failed checks
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Debug output
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Buffer the output and sort it by row key instead of streaming
    #[arg(long, short = 's', global = true)]
    sorted_output: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Drop table borders and separators
    #[arg(long, global = true)]
    no_table: bool,

    /// Do not draw the progress line
    #[arg(long, global = true)]
    no_statusbar: bool,

    /// Show only rows in which every check is healthy
    #[arg(long, global = true)]
    show_only_green: bool,

    /// Show only rows in which some check is not healthy
    #[arg(long, global = true, conflicts_with = "show_only_green")]
    show_only_non_green: bool,

    /// Display unknown results in the healthy color
    #[arg(long, global = true)]
    cast_unkn_as_good: bool,

    /// Config file path
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Command {
    /// Node status report, one row per node (default)
    Nodes {
        /// Hosts to report on; hostlist expressions expand
        hosts: Vec<String>,
    },
    /// Controller status: HA layout when a cluster manager answers,
    /// standalone service list otherwise
    Controllers,
    /// Unacknowledged monitoring events across the cluster
    Events,
}

/// CLI flags win over config-file values win over built-in defaults.
fn merge_settings(cli: &Cli, file: &FileConfig) -> Settings {
    let defaults = Settings::default();
    Settings {
        fanout: cli.fanout.or(file.cli.fanout).unwrap_or(defaults.fanout),
        timeout: Duration::from_secs(
            cli.timeout
                .or(file.cli.timeout)
                .unwrap_or(defaults.timeout.as_secs()),
        ),
        status_col: cli
            .status_column
            .or(file.cli.status_column)
            .unwrap_or(defaults.status_col),
        details_col: cli
            .details_column
            .or(file.cli.details_column)
            .unwrap_or(defaults.details_col),
        verbose: cli.verbose,
        sorted: cli.sorted_output,
        no_table: cli.no_table,
        no_statusbar: cli.no_statusbar,
        scheme: ColorScheme::new(
            cli.cast_unkn_as_good,
            cli.show_only_non_green,
            cli.show_only_green,
        ),
    }
}

/// Positional hosts when given, the provisioning inventory otherwise.
async fn node_targets(
    hosts: &[String],
    group: Option<&str>,
    config: &FileConfig,
    timeout: Duration,
) -> Vec<NodeTarget> {
    if !hosts.is_empty() {
        return hosts
            .iter()
            .flat_map(|expr| hostlist::expand(expr))
            .map(|name| NodeTarget::bare(&name))
            .collect();
    }

    let client = ProvisionClient::new(&config.provision, timeout);
    match client.nodes(group).await {
        Ok(nodes) => nodes,
        Err(err) => {
            warn!(%err, "provisioning service unavailable, no node inventory");
            Vec::new()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.debug { "vitals=debug" } else { "vitals=warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let file = config::load(&cli.config);
    let settings = merge_settings(&cli, &file);
    let runner = Arc::new(ShellRunner);

    match &cli.command {
        None | Some(Command::Nodes { .. }) => {
            let mut hosts = cli.hosts.clone();
            if let Some(Command::Nodes { hosts: sub_hosts }) = &cli.command {
                hosts.extend(sub_hosts.iter().cloned());
            }

            let requested = if cli.checks.is_empty() {
                checks::names().iter().map(ToString::to_string).collect()
            } else {
                cli.checks.clone()
            };
            let selected = checks::resolve(&requested)?;

            let targets =
                node_targets(&hosts, cli.group.as_deref(), &file, settings.timeout).await;
            NodesController::new(targets, selected, settings, file, runner)
                .run()
                .await
                .context("node status run failed")?;
        }
        Some(Command::Controllers) => {
            let services = file.controllers.services.clone();
            let provision_url = Some(file.provision.url.clone());
            match ClusterSnapshot::detect(runner.as_ref(), settings.timeout).await {
                Some(snapshot) => {
                    HaController::new(snapshot, settings, services, runner, provision_url)
                        .run()
                        .await
                        .context("HA controller status run failed")?;
                }
                None => {
                    NonHaController::new(services, settings, runner, provision_url)
                        .run()
                        .await
                        .context("controller status run failed")?;
                }
            }
        }
        Some(Command::Events) => {
            EventsController::new(settings, file.zabbix.clone())
                .run()
                .await
                .context("event summary failed")?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_display_flags() {
        let cli = Cli::parse_from([
            "vitals",
            "--no-color",
            "--show-only-non-green",
            "--cast-unkn-as-good",
            "node[01-02]",
        ]);
        assert!(cli.no_color);
        assert!(cli.show_only_non_green);
        assert_eq!(cli.hosts, vec!["node[01-02]"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn cli_splits_check_list() {
        let cli = Cli::parse_from(["vitals", "--checks", "health,ipmi"]);
        assert_eq!(cli.checks, vec!["health", "ipmi"]);
    }

    #[test]
    fn green_filters_conflict() {
        let err = Cli::try_parse_from([
            "vitals",
            "--show-only-green",
            "--show-only-non-green",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn cli_flags_override_file_values() {
        let cli = Cli::parse_from(["vitals", "--fanout", "50", "--timeout", "3"]);
        let mut file = FileConfig::default();
        file.cli.fanout = Some(20);
        file.cli.status_column = Some(22);

        let settings = merge_settings(&cli, &file);
        assert_eq!(settings.fanout, 50);
        assert_eq!(settings.timeout, Duration::from_secs(3));
        // file value applies where the flag is absent
        assert_eq!(settings.status_col, 22);
        // built-in default where neither is set
        assert_eq!(settings.details_col, 0);
    }

    #[tokio::test]
    async fn positional_hosts_expand_without_discovery() {
        let targets = node_targets(
            &["node[01-02]".to_string(), "login1".to_string()],
            None,
            &FileConfig::default(),
            Duration::from_secs(1),
        )
        .await;
        let names: Vec<&str> = targets.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["node01", "node02", "login1"]);
    }
}
