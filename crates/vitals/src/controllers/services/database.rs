//! Database round-trip checkers.
//!
//! Both probes push a magic number through the database client and expect it
//! back, which exercises the listener, authentication and the query path in
//! one shot.

use async_trait::async_trait;

use super::{ServiceChecker, ServiceContext};

const MARIADB_ECHO: &str = "123";
const MONGO_PING: &str = "111222333";

pub struct Mariadb {
    ctx: ServiceContext,
}

impl Mariadb {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Mariadb {
    async fn probe(&self) -> (bool, String) {
        let prefix = self.ctx.cmd_prefix();
        let query = format!("mysql -e 'select {MARIADB_ECHO};' -s -r");
        // the quoting survives the ssh hop
        let cmd = if prefix.is_empty() {
            query
        } else {
            format!("{prefix}\"{query}\"")
        };
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        if out.failed() || out.stdout.trim() != MARIADB_ECHO {
            return (false, format!("'{cmd}' returned unexpected result"));
        }
        (true, String::new())
    }
}

pub struct Mongod {
    ctx: ServiceContext,
}

impl Mongod {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self { ctx: ctx.clone() }
    }
}

#[async_trait]
impl ServiceChecker for Mongod {
    async fn probe(&self) -> (bool, String) {
        let cmd = format!(
            "{}mongo --quiet --eval '{{ping: {MONGO_PING}}}'",
            self.ctx.cmd_prefix()
        );
        let out = self.ctx.runner.run(&cmd, self.ctx.timeout).await;
        let answered = out
            .stdout_lines()
            .last()
            .is_some_and(|line| line.contains(MONGO_PING));
        if out.failed() || !answered {
            return (false, format!("'{cmd}' returned no ping"));
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

    fn ctx_with(stdout: &'static str, rc: i32) -> ServiceContext {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(1).returning(move |_, _| CmdOutput {
            exit_code: rc,
            stdout: stdout.to_string(),
            ..CmdOutput::default()
        });
        ServiceContext {
            runner: Arc::new(runner),
            timeout: Duration::from_secs(2),
            host: None,
            provision_url: None,
        }
    }

    #[tokio::test]
    async fn mariadb_echo_passes() {
        let checker = Mariadb {
            ctx: ctx_with("123\n", 0),
        };
        assert!(checker.probe().await.0);
    }

    #[tokio::test]
    async fn mariadb_wrong_echo_fails() {
        let checker = Mariadb {
            ctx: ctx_with("ERROR 2002 (HY000)\n", 1),
        };
        assert!(!checker.probe().await.0);
    }

    #[tokio::test]
    async fn mongo_ping_passes() {
        let checker = Mongod {
            ctx: ctx_with("{ \"ping\" : 111222333 }\n", 0),
        };
        assert!(checker.probe().await.0);
    }

    #[tokio::test]
    async fn mongo_silence_fails() {
        let checker = Mongod {
            ctx: ctx_with("", 0),
        };
        assert!(!checker.probe().await.0);
    }
}
