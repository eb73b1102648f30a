//! Configuration: YAML file, merged defaults, per-run settings.
//!
//! The config file is optional and sectioned by subsystem. Anything wrong
//! with it (missing, unreadable, malformed) degrades to built-in defaults
//! with a warning; a bad config file never kills a status run.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::scheme::ColorScheme;

/// Default location of the config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/vitals.yaml";

/// Services checked on every controller when the cluster manager does not
/// claim them. Overridable via the `controllers.services` config key.
pub const DEFAULT_SERVICES: &[&str] = &[
    "named",
    "dhcpd",
    "chronyd",
    "sshd",
    "fail2ban",
    "firewalld",
    "nginx",
    "mariadb",
    "mongod",
    "nfs-server",
    "slapd",
    "zabbix-server",
    "zabbix-agent",
    "sssd",
    "slurmctld",
    "munge",
    "rsyslog",
];

const FALLBACK_ZABBIX_PASSWORD: &str = "zabbix";

/// Top-level config file shape, sections keyed by subsystem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub cli: CliDefaults,
    pub controllers: ControllersConfig,
    pub zabbix: ZabbixConfig,
    pub provision: ProvisionConfig,
}

/// File-level defaults for CLI options; flags on the command line win.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliDefaults {
    pub fanout: Option<usize>,
    pub timeout: Option<u64>,
    pub status_column: Option<usize>,
    pub details_column: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ControllersConfig {
    pub services: Vec<String>,
}

impl Default for ControllersConfig {
    fn default() -> Self {
        Self {
            services: DEFAULT_SERVICES.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Zabbix API endpoint and credentials.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ZabbixConfig {
    pub url: String,
    pub username: String,
    pub password: Option<String>,
    /// On-disk credentials file, read once at startup.
    pub password_file: String,
}

impl Default for ZabbixConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost/zabbix/api_jsonrpc.php".to_string(),
            username: "Admin".to_string(),
            password: None,
            password_file: "/etc/vitals/zabbix-admin.txt".to_string(),
        }
    }
}

impl ZabbixConfig {
    /// Password from the config, the credentials file, or the stock default,
    /// in that order.
    #[must_use]
    pub fn resolve_password(&self) -> String {
        if let Some(password) = &self.password {
            return password.clone();
        }
        match std::fs::read_to_string(&self.password_file) {
            Ok(contents) => contents
                .lines()
                .next()
                .unwrap_or(FALLBACK_ZABBIX_PASSWORD)
                .trim()
                .to_string(),
            Err(err) => {
                debug!(file = %self.password_file, %err, "no password file, using default");
                FALLBACK_ZABBIX_PASSWORD.to_string()
            }
        }
    }
}

/// Provisioning service API endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    pub url: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:7050".to_string(),
        }
    }
}

/// Load the config file, degrading to defaults on any problem.
#[must_use]
pub fn load(path: &Path) -> FileConfig {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            debug!(path = %path.display(), %err, "no config file, using defaults");
            return FileConfig::default();
        }
    };
    match serde_yaml::from_str(&contents) {
        Ok(config) => config,
        Err(err) => {
            warn!(path = %path.display(), %err, "malformed config file, using defaults");
            FileConfig::default()
        }
    }
}

/// Per-run settings after merging CLI flags over file values over defaults.
/// Constructed once in `main`, immutable afterwards.
#[derive(Debug, Clone)]
pub struct Settings {
    pub fanout: usize,
    pub timeout: Duration,
    pub status_col: usize,
    pub details_col: usize,
    pub verbose: bool,
    pub sorted: bool,
    pub no_table: bool,
    pub no_statusbar: bool,
    pub scheme: ColorScheme,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fanout: 10,
            timeout: Duration::from_secs(10),
            status_col: 15,
            details_col: 0,
            verbose: false,
            sorted: false,
            no_table: false,
            no_statusbar: false,
            scheme: ColorScheme::default(),
        }
    }
}
