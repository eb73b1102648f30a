//! Monitoring system (Zabbix) client and event severity check.
//!
//! Talks JSON-RPC to the monitoring API. The per-node check walks the
//! login → host lookup → problem query → trigger query pipeline, each RPC
//! a named sub-probe; the cluster-wide event listing feeds the events
//! summary report.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::checks::{Check, CheckContext};
use crate::config::ZabbixConfig;
use crate::record::{Category, RecordBuilder, StatusRecord};

/// Zabbix severities run 0 (not classified) to 5 (disaster).
const SEVERITY_LABELS: &[&str] = &["NA", "INF", "WARN", "AVE", "HIGH", "DISA"];

/// Display label for an event priority.
#[must_use]
pub fn priority_label(priority: i64) -> &'static str {
    usize::try_from(priority)
        .ok()
        .and_then(|p| SEVERITY_LABELS.get(p).copied())
        .unwrap_or("UNKN")
}

/// Status and category for the worst event priority seen on a host.
#[must_use]
pub fn classify_priority(priority: i64) -> (&'static str, Category) {
    if priority > 2 {
        ("ERR", Category::Error)
    } else if priority > 1 {
        ("WARN", Category::Warn)
    } else {
        ("OK", Category::Good)
    }
}

/// One unacknowledged event attributed to a host.
#[derive(Debug, Clone)]
pub struct ZabbixEvent {
    pub priority: i64,
    pub host: String,
    pub description: String,
}

/// JSON-RPC client for the monitoring API. Credentials are resolved once at
/// construction; one client is shared read-only by all workers.
#[derive(Debug, Clone)]
pub struct ZabbixClient {
    url: String,
    username: String,
    password: String,
    http: reqwest::Client,
}

impl ZabbixClient {
    #[must_use]
    pub fn new(config: &ZabbixConfig, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.resolve_password(),
            http,
        }
    }

    async fn rpc(
        &self,
        method: &str,
        params: Value,
        auth: Option<&str>,
        id: u32,
    ) -> Result<Value, String> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "auth": auth,
            "id": id,
        });
        debug!(method, "monitoring API request");

        let response = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|err| format!("{method}: {err}"))?;
        let answer: Value = response
            .json()
            .await
            .map_err(|err| format!("{method}: {err}"))?;

        match answer.get("result") {
            Some(result) => Ok(result.clone()),
            None => Err(format!("monitoring API returned no result on {method}: {answer}")),
        }
    }

    pub async fn login(&self) -> Result<String, String> {
        let params = json!({"user": self.username, "password": self.password});
        let result = self.rpc("user.login", params, None, 1).await?;
        result
            .as_str()
            .map(ToString::to_string)
            .ok_or_else(|| "user.login returned no token".to_string())
    }

    /// Host id for a hostname; `Ok(None)` when the monitoring system has no
    /// record of the host.
    pub async fn host_id(&self, token: &str, hostname: &str) -> Result<Option<String>, String> {
        let params = json!({"filter": {"host": [hostname]}});
        let result = self.rpc("host.get", params, Some(token), 2).await?;
        let hosts = result.as_array().cloned().unwrap_or_default();
        // duplicate registrations happen; take the newest record
        let latest = hosts.into_iter().max_by_key(|h| {
            h["hostid"]
                .as_str()
                .and_then(|id| id.parse::<i64>().ok())
                .unwrap_or(0)
        });
        Ok(latest.and_then(|h| h["hostid"].as_str().map(ToString::to_string)))
    }

    /// Unacknowledged problems, optionally restricted to one host.
    pub async fn problems(
        &self,
        token: &str,
        host_id: Option<&str>,
    ) -> Result<Vec<Value>, String> {
        let mut params = json!({
            "acknowledged": false,
            "severities": [0, 1, 2, 3, 4, 5],
            "output": "extend",
            "sortfield": ["eventid"],
            "sortorder": "DESC",
        });
        if let Some(host_id) = host_id {
            params["hostids"] = json!(host_id);
        }
        let result = self.rpc("problem.get", params, Some(token), 3).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Triggers behind a set of problems, worst priority first.
    pub async fn triggers(
        &self,
        token: &str,
        trigger_ids: &[String],
        host_id: Option<&str>,
    ) -> Result<Vec<Value>, String> {
        let mut params = json!({
            "triggerids": trigger_ids,
            "output": ["priority", "description"],
            "sortfield": ["priority"],
            "sortorder": "DESC",
            "selectHosts": "extend",
        });
        if let Some(host_id) = host_id {
            params["hostids"] = json!(host_id);
        }
        let result = self.rpc("trigger.get", params, Some(token), 4).await?;
        Ok(result.as_array().cloned().unwrap_or_default())
    }

    /// Every unacknowledged event across the cluster, one entry per
    /// (trigger, host) pair. `None` when the monitoring API is unavailable.
    pub async fn cluster_events(&self) -> Option<Vec<ZabbixEvent>> {
        let token = match self.login().await {
            Ok(token) => token,
            Err(err) => {
                debug!(%err, "monitoring API login failed");
                return None;
            }
        };
        let problems = match self.problems(&token, None).await {
            Ok(problems) => problems,
            Err(err) => {
                debug!(%err, "problem query failed");
                return None;
            }
        };
        if problems.is_empty() {
            return Some(Vec::new());
        }

        let trigger_ids: Vec<String> = problems
            .iter()
            .filter_map(|p| p["objectid"].as_str().map(ToString::to_string))
            .collect();
        let triggers = match self.triggers(&token, &trigger_ids, None).await {
            Ok(triggers) => triggers,
            Err(err) => {
                debug!(%err, "trigger query failed");
                return None;
            }
        };

        let mut events = Vec::new();
        for trigger in triggers {
            let priority = parse_priority(&trigger["priority"]);
            let description = trigger["description"].as_str().unwrap_or_default();
            for host in trigger["hosts"].as_array().cloned().unwrap_or_default() {
                events.push(ZabbixEvent {
                    priority,
                    host: host["host"].as_str().unwrap_or_default().to_string(),
                    description: description.to_string(),
                });
            }
        }
        Some(events)
    }
}

/// Priorities arrive as strings or numbers depending on the API version.
fn parse_priority(value: &Value) -> i64 {
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0)
}

/// Per-node event severity check.
pub struct ZabbixCheck {
    node: String,
    hostname: String,
    client: Option<Arc<ZabbixClient>>,
}

impl ZabbixCheck {
    #[must_use]
    pub fn new(ctx: &CheckContext) -> Self {
        Self {
            node: ctx.node.name.clone(),
            hostname: ctx.node.hostname.clone(),
            client: ctx.zabbix.clone(),
        }
    }
}

#[async_trait]
impl Check for ZabbixCheck {
    fn column(&self) -> &'static str {
        "zabbix"
    }

    async fn status(&self) -> StatusRecord {
        debug!(node = %self.node, "zabbix check started");
        let mut rec = RecordBuilder::new(self.column());

        let Some(client) = &self.client else {
            rec.step("user.login");
            return rec.fail();
        };

        rec.step("user.login");
        let token = match client.login().await {
            Ok(token) => token,
            Err(err) => {
                rec.push_details(&err);
                return rec.fail();
            }
        };

        rec.step("host.get");
        let host_id = match client.host_id(&token, &self.hostname).await {
            Ok(Some(host_id)) => host_id,
            Ok(None) => {
                rec.set_details("monitoring has no record of this host");
                return rec.fail();
            }
            Err(err) => {
                rec.push_details(&err);
                return rec.fail();
            }
        };

        rec.step("problem.get");
        let problems = match client.problems(&token, Some(&host_id)).await {
            Ok(problems) => problems,
            Err(err) => {
                rec.push_details(&err);
                return rec.fail();
            }
        };
        if problems.is_empty() {
            rec.set_status("OK");
            rec.set_category(Category::Good);
            return rec.build();
        }

        rec.step("trigger.get");
        let trigger_ids: Vec<String> = problems
            .iter()
            .filter_map(|p| p["objectid"].as_str().map(ToString::to_string))
            .collect();
        let triggers = match client.triggers(&token, &trigger_ids, Some(&host_id)).await {
            Ok(triggers) => triggers,
            Err(err) => {
                rec.push_details(&err);
                return rec.fail();
            }
        };

        let descriptions: Vec<&str> = triggers
            .iter()
            .filter_map(|t| t["description"].as_str())
            .collect();
        rec.set_details(descriptions.join(" / "));

        let worst = triggers.first().map_or(-1, |t| parse_priority(&t["priority"]));
        let (status, category) = classify_priority(worst);
        rec.set_status(status);
        rec.set_category(category);
        rec.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_labels() {
        assert_eq!(priority_label(0), "NA");
        assert_eq!(priority_label(2), "WARN");
        assert_eq!(priority_label(5), "DISA");
        assert_eq!(priority_label(9), "UNKN");
        assert_eq!(priority_label(-1), "UNKN");
    }

    #[test]
    fn severity_classification_boundaries() {
        assert_eq!(classify_priority(5), ("ERR", Category::Error));
        assert_eq!(classify_priority(3), ("ERR", Category::Error));
        assert_eq!(classify_priority(2), ("WARN", Category::Warn));
        assert_eq!(classify_priority(1), ("OK", Category::Good));
        assert_eq!(classify_priority(-1), ("OK", Category::Good));
    }

    #[test]
    fn priorities_parse_from_both_shapes() {
        assert_eq!(parse_priority(&json!("4")), 4);
        assert_eq!(parse_priority(&json!(4)), 4);
        assert_eq!(parse_priority(&json!(null)), 0);
    }

    #[tokio::test]
    async fn missing_client_fails_on_login_step() {
        let check = ZabbixCheck {
            node: "node01".to_string(),
            hostname: "node01.cluster".to_string(),
            client: None,
        };
        let rec = check.status().await;
        assert_eq!(rec.info, "user.login");
        assert_eq!(rec.category, Category::Unkn);
    }
}
