//! Name server checker.

use async_trait::async_trait;

use super::{ServiceChecker, ServiceContext};

const EXPECTED_ANSWER: &str = "127.0.0.1";

pub struct Named {
    ctx: ServiceContext,
}

impl Named {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Named {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!(
            "{}dig +tries=1 +time={} +short @localhost localhost",
            self.ctx.cmd_prefix(),
            self.ctx.timeout.as_secs()
        );
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() || out.stdout.trim() != EXPECTED_ANSWER {
            return (false, format!("'{cmd}' did not return '{EXPECTED_ANSWER}'"));
        }
        (true, String::new())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::exec::{CmdOutput, MockCommandRunner};

    fn checker(stdout: &str, rc: i32) -> Named {
        let mut runner = MockCommandRunner::new();
        let stdout = stdout.to_string();
        runner.expect_run().times(1).returning(move |_, _| CmdOutput {
            exit_code: rc,
            stdout: stdout.clone(),
            ..CmdOutput::default()
        });
        Named {
            ctx: ServiceContext {
                runner: Arc::new(runner),
                timeout: Duration::from_secs(2),
                host: None,
                provision_url: None,
            },
        }
    }

    #[tokio::test]
    async fn loopback_answer_passes() {
        let (ok, _) = checker("127.0.0.1\n", 0).probe().await;
        assert!(ok);
    }

    #[tokio::test]
    async fn wrong_answer_fails() {
        let (ok, comment) = checker("10.0.0.1\n", 0).probe().await;
        assert!(!ok);
        assert!(comment.contains("did not return"));
    }

    #[tokio::test]
    async fn resolver_error_fails() {
        let (ok, _) = checker("", 9).probe().await;
        assert!(!ok);
    }
}
