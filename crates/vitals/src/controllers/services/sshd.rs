//! ssh daemon checker: a loopback login must work, not just the port.

use async_trait::async_trait;

use super::{ServiceChecker, ServiceContext};

pub struct Sshd {
    ctx: ServiceContext,
}

impl Sshd {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Sshd {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!("{}ssh localhost uptime", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() || out.stdout_lines().is_empty() {
            return (false, format!("'{cmd}' returned unexpected result"));
        }
        (true, String::new())
    }
}
