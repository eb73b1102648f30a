//! Time synchronization checker.

use async_trait::async_trait;

use super::{ServiceChecker, ServiceContext};

/// Reference id chronyc reports when the clock is not synchronised to any
/// external source (see chronyc(1)).
const UNSYNCED_REF_ID: &str = "7F7F0101";

pub struct Chronyd {
    ctx: ServiceContext,
}

impl Chronyd {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Chronyd {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!("{}chronyc tracking", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() {
            return (false, format!("'{cmd}' exit code is not 0"));
        }

        let lines = out.stdout_lines();
        let Some(first) = lines.first() else {
            return (false, format!("'{cmd}' returned no output"));
        };
        let fields: Vec<&str> = first.split_whitespace().collect();
        if fields.get(3) == Some(&UNSYNCED_REF_ID) {
            return (
                false,
                "Clock is not synchronised to any external source.".to_string(),
            );
        }

        let cmd = format!("{}chronyc sources", self.ctx.cmd_prefix());
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() {
            return (false, format!("'{cmd}' exit code is not 0"));
        }

        let lines = out.stdout_lines();
        let sources: usize = lines
            .first()
            .and_then(|l| l.split_whitespace().last())
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        if sources < 1 {
            return (false, format!("'{cmd}' did not return number of sources"));
        }

        // the currently selected source is starred in column two
        let synced = lines
            .iter()
            .rev()
            .take(sources)
            .any(|line| line.chars().nth(1) == Some('*'));
        if !synced {
            return (false, format!("'{cmd}' returned no currently synced servers"));
        }

        (true, String::new())
    }
}
