//! PXE boot endpoint checker.
//!
//! The web server on a controller fronts the provisioning service's boot
//! endpoint; a healthy one answers an iPXE script.

use async_trait::async_trait;
use tracing::debug;

use super::{ServiceChecker, ServiceContext};

const IPXE_MAGIC: &str = "#!ipxe";

pub struct WebBoot {
    url: Option<String>,
    timeout: std::time::Duration,
}

impl WebBoot {
    #[must_use]
    pub fn new(ctx: &ServiceContext) -> Self {
        Self {
            url: ctx
                .provision_url
                .as_ref()
                .map(|base| format!("{}/boot", base.trim_end_matches('/'))),
            timeout: ctx.timeout,
        }
    }
}

#[async_trait]
impl ServiceChecker for WebBoot {
    async fn probe(&self) -> (bool, String) {
        let Some(url) = &self.url else {
            return (false, "provisioning URL is not configured".to_string());
        };

        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .unwrap_or_default();
        let body = match client.get(url).send().await {
            Ok(response) if response.status().is_success() => {
                response.text().await.unwrap_or_default()
            }
            Ok(response) => {
                debug!(url, status = %response.status(), "boot endpoint error");
                return (false, format!("answer from '{url}' is wrong"));
            }
            Err(err) => {
                debug!(url, %err, "boot endpoint unreachable");
                return (false, format!("answer from '{url}' is wrong"));
            }
        };

        if body.lines().next() == Some(IPXE_MAGIC) {
            (true, String::new())
        } else {
            (false, format!("answer from '{url}' is wrong"))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::exec::MockCommandRunner;

    #[tokio::test]
    async fn missing_url_fails_with_comment() {
        let ctx = ServiceContext {
            runner: Arc::new(MockCommandRunner::new()),
            timeout: Duration::from_secs(1),
            host: None,
            provision_url: None,
        };
        let (ok, comment) = WebBoot::new(&ctx).probe().await;
        assert!(!ok);
        assert!(comment.contains("not configured"));
    }

    #[test]
    fn boot_url_is_derived_from_base() {
        let ctx = ServiceContext {
            runner: Arc::new(MockCommandRunner::new()),
            timeout: Duration::from_secs(1),
            host: None,
            provision_url: Some("http://localhost:7050/".to_string()),
        };
        assert_eq!(
            WebBoot::new(&ctx).url.as_deref(),
            Some("http://localhost:7050/boot")
        );
    }
}
