//! Management controller (BMC) health.
//!
//! Probes the node's BMC out-of-band: RMCP presence ping on the IPMI UDP
//! port, ICMP reachability, then the chassis power state via `ipmitool`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::checks::{Check, CheckContext};
use crate::exec::CommandRunner;
use crate::record::{Category, RecordBuilder, StatusRecord};

/// RMCP presence ping datagram (ASF message type 0x80).
const RMCP_PING: [u8; 23] = [
    0x06, 0x00, 0xff, 0x07, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x20,
    0x18, 0xc8, 0x81, 0x00, 0x38, 0x8e, 0x04, 0xb5,
];
const IPMI_PORT: u16 = 623;

pub struct IpmiCheck {
    node: String,
    address: String,
    username: String,
    password: String,
    timeout: Duration,
    runner: Arc<dyn CommandRunner>,
}

impl IpmiCheck {
    #[must_use]
    pub fn new(ctx: &CheckContext) -> Self {
        Self {
            node: ctx.node.name.clone(),
            address: ctx.node.bmc_address.clone(),
            username: ctx.node.bmc_username.clone(),
            password: ctx.node.bmc_password.clone(),
            timeout: ctx.timeout,
            runner: Arc::clone(&ctx.runner),
        }
    }

    fn check_configured(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("config");
        !self.address.is_empty() && !self.username.is_empty() && !self.password.is_empty()
    }

    async fn check_udp_ping(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("udp_ping");
        let Ok(socket) = tokio::net::UdpSocket::bind("0.0.0.0:0").await else {
            return false;
        };
        if socket
            .send_to(&RMCP_PING, (self.address.as_str(), IPMI_PORT))
            .await
            .is_err()
        {
            return false;
        }
        let mut buf = [0u8; 1024];
        matches!(
            tokio::time::timeout(self.timeout, socket.recv_from(&mut buf)).await,
            Ok(Ok(_))
        )
    }

    async fn check_ping(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("ping");
        let cmd = format!("ping -c1 -w{} {}", self.timeout.as_secs(), self.address);
        !self.runner.run(&cmd, self.timeout).await.failed()
    }

    async fn check_power(&self, rec: &mut RecordBuilder) -> bool {
        rec.step("power");
        let cmd = format!(
            "ipmitool -I lanplus -H {} -U {} -P {} chassis status",
            self.address, self.username, self.password
        );
        let out = self.runner.run(&cmd, self.timeout).await;
        for line in out.stdout_lines() {
            if let Some(state) = line.strip_prefix("System Power") {
                let state = state.trim_start_matches([':', ' ']).trim();
                rec.set_status(state.to_uppercase());
            }
        }
        !out.failed()
    }
}

#[async_trait]
impl Check for IpmiCheck {
    fn column(&self) -> &'static str {
        "ipmi"
    }

    async fn status(&self) -> StatusRecord {
        debug!(node = %self.node, bmc = %self.address, "ipmi check started");
        let mut rec = RecordBuilder::new(self.column());

        if !self.check_configured(&mut rec) {
            return rec.fail();
        }
        if !self.check_udp_ping(&mut rec).await {
            return rec.fail();
        }
        if !self.check_ping(&mut rec).await {
            return rec.fail();
        }
        rec.set_category(Category::Warn);

        if !self.check_power(&mut rec).await {
            return rec.fail();
        }
        match rec.status() {
            "ON" => rec.set_category(Category::Good),
            "OFF" => rec.set_category(Category::Down),
            _ => {}
        }
        rec.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::NodeTarget;
    use crate::exec::MockCommandRunner;

    #[tokio::test]
    async fn unconfigured_bmc_fails_on_the_config_step() {
        let mut runner = MockCommandRunner::new();
        // no command may be issued for an unconfigured BMC
        runner.expect_run().times(0);

        let ctx = CheckContext {
            node: NodeTarget::bare("node01"),
            timeout: Duration::from_secs(1),
            runner: Arc::new(runner),
            slurm: None,
            zabbix: None,
            provision: None,
        };
        let rec = IpmiCheck::new(&ctx).status().await;
        assert_eq!(rec.status, "UNKN");
        assert_eq!(rec.category, Category::Unkn);
        assert_eq!(rec.info, "config");
        assert_eq!(rec.history, vec!["config"]);
    }

    #[test]
    fn power_line_parsing() {
        let mut rec = RecordBuilder::new("ipmi");
        let line = "System Power         : on";
        if let Some(state) = line.strip_prefix("System Power") {
            rec.set_status(state.trim_start_matches([':', ' ']).trim().to_uppercase());
        }
        assert_eq!(rec.status(), "ON");
    }
}
