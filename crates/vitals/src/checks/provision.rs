//! Provisioning service client and install-status check.
//!
//! The provisioning service knows the node inventory (including BMC
//! credentials) and each node's install state. The client wraps its JSON
//! HTTP API; controllers use it for node discovery and the `provision`
//! check reports per-node install status.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::checks::{Check, CheckContext, NodeTarget};
use crate::config::ProvisionConfig;
use crate::record::{Category, RecordBuilder, StatusRecord};

const INSTALLED_STATUS: &str = "install.success";

#[derive(Debug, Clone, Deserialize)]
struct NodeEntry {
    name: String,
    #[serde(default)]
    hostname: Option<String>,
    #[serde(default)]
    bmc: Option<BmcEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct BmcEntry {
    #[serde(default)]
    address: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Deserialize)]
struct NodeStatusBody {
    status: String,
}

/// Client for the provisioning service API.
#[derive(Debug, Clone)]
pub struct ProvisionClient {
    base: String,
    http: reqwest::Client,
}

impl ProvisionClient {
    #[must_use]
    pub fn new(config: &ProvisionConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            base: config.url.trim_end_matches('/').to_string(),
            http,
        }
    }

    /// Node inventory, optionally restricted to one group.
    pub async fn nodes(&self, group: Option<&str>) -> Result<Vec<NodeTarget>, reqwest::Error> {
        let url = match group {
            Some(group) => format!("{}/groups/{}/nodes", self.base, group),
            None => format!("{}/nodes", self.base),
        };
        let entries: Vec<NodeEntry> = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let bmc = entry.bmc.unwrap_or(BmcEntry {
                    address: String::new(),
                    username: String::new(),
                    password: String::new(),
                });
                NodeTarget {
                    hostname: entry.hostname.unwrap_or_else(|| entry.name.clone()),
                    name: entry.name,
                    bmc_address: bmc.address,
                    bmc_username: bmc.username,
                    bmc_password: bmc.password,
                }
            })
            .collect())
    }

    /// Install status string for one node; `None` when the service is
    /// unreachable or the node is unknown to it.
    pub async fn node_status(&self, node: &str) -> Option<String> {
        let url = format!("{}/nodes/{}/status", self.base, node);
        let response = match self.http.get(&url).send().await {
            Ok(response) => response,
            Err(err) => {
                debug!(node, %err, "provisioning service unreachable");
                return None;
            }
        };
        let body: NodeStatusBody = match response.error_for_status().ok()?.json().await {
            Ok(body) => body,
            Err(err) => {
                debug!(node, %err, "unexpected provisioning status payload");
                return None;
            }
        };
        Some(body.status)
    }
}

/// Install-status check for one node.
pub struct ProvisionCheck {
    node: String,
    client: Option<Arc<ProvisionClient>>,
}

impl ProvisionCheck {
    #[must_use]
    pub fn new(ctx: &CheckContext) -> Self {
        Self {
            node: ctx.node.name.clone(),
            client: ctx.provision.clone(),
        }
    }
}

#[async_trait]
impl Check for ProvisionCheck {
    fn column(&self) -> &'static str {
        "provision"
    }

    async fn status(&self) -> StatusRecord {
        let mut rec = RecordBuilder::new(self.column());
        rec.step("status");

        let Some(client) = &self.client else {
            return rec.fail();
        };
        let Some(status) = client.node_status(&self.node).await else {
            return rec.fail();
        };

        rec.set_status(status.clone());
        if status == INSTALLED_STATUS {
            rec.set_category(Category::Good);
        } else {
            rec.set_category(Category::Busy);
        }
        rec.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_entry_maps_to_target() {
        let json = r#"[{"name": "node01", "hostname": "node01.cluster",
                        "bmc": {"address": "10.1.0.1", "username": "admin", "password": "s"}},
                       {"name": "node02"}]"#;
        let entries: Vec<NodeEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].bmc.as_ref().unwrap().address, "10.1.0.1");
        assert!(entries[1].bmc.is_none());
        assert_eq!(entries[1].hostname, None);
    }

    #[tokio::test]
    async fn missing_client_fails_on_status_step() {
        let check = ProvisionCheck {
            node: "node01".to_string(),
            client: None,
        };
        let rec = check.status().await;
        assert_eq!(rec.status, "UNKN");
        assert_eq!(rec.info, "status");
    }
}
