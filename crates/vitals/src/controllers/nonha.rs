//! Standalone controller report.
//!
//! Fallback when no cluster manager is present: every configured service is
//! checked on the local host only, one row per service.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::config::Settings;
use crate::controllers::longest_key;
use crate::controllers::systemd::SystemdProbe;
use crate::error::VitalsError;
use crate::exec::CommandRunner;
use crate::fanout::Fanout;
use crate::record::RecordBuilder;
use crate::render::{StatusTable, TableSpec};

pub struct NonHaController {
    services: Vec<String>,
    settings: Settings,
    runner: Arc<dyn CommandRunner>,
    provision_url: Option<String>,
}

impl NonHaController {
    #[must_use]
    pub fn new(
        services: Vec<String>,
        settings: Settings,
        runner: Arc<dyn CommandRunner>,
        provision_url: Option<String>,
    ) -> Self {
        Self {
            services,
            settings,
            runner,
            provision_url,
        }
    }

    pub async fn run(&self) -> Result<(), VitalsError> {
        if self.services.is_empty() {
            return Err(VitalsError::Config(
                "service list is empty, nothing to check".to_string(),
            ));
        }
        let timeout = self.settings.timeout;

        let host = {
            let out = self.runner.run("uname -n", timeout).await;
            let name = out.stdout.trim().to_string();
            if name.is_empty() {
                "localhost".to_string()
            } else {
                name
            }
        };
        debug!(host, services = self.services.len(), "standalone controller report");

        let spec = TableSpec {
            index_label: "Service".to_string(),
            index_width: longest_key(self.services.iter().map(String::as_str)),
            columns: vec![host.clone()],
            status_col: self.settings.status_col,
            details_col: self.settings.details_col,
            verbose: self.settings.verbose,
            no_table: self.settings.no_table,
            no_statusbar: self.settings.no_statusbar,
            total: self.services.len(),
            scheme: self.settings.scheme,
        };
        let table = Arc::new(Mutex::new(StatusTable::new(spec)));
        {
            let mut out = table.lock().expect("renderer mutex poisoned");
            out.header();
            out.statusbar(false);
        }

        let probe = Arc::new(SystemdProbe::new(
            Arc::clone(&self.runner),
            timeout,
            self.provision_url.clone(),
        ));

        let items: Vec<(String, String)> = self
            .services
            .iter()
            .map(|s| (s.clone(), s.clone()))
            .collect();
        Fanout::new(self.settings.fanout)
            .run(items, {
                let table = Arc::clone(&table);
                let probe = Arc::clone(&probe);
                let host = host.clone();
                move |service: String| {
                    let table = Arc::clone(&table);
                    let probe = Arc::clone(&probe);
                    let host = host.clone();
                    async move {
                        let mut rec = RecordBuilder::new(&host);
                        probe.verify_unit(&mut rec, &service, None, true, true).await;
                        let rec = rec.build();
                        let mut out = table.lock().expect("renderer mutex poisoned");
                        out.line(&service, std::slice::from_ref(&rec));
                        out.statusbar(true);
                    }
                }
            })
            .await?;

        table.lock().expect("renderer mutex poisoned").separator();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_service_list_is_rejected() {
        let controller = NonHaController::new(
            Vec::new(),
            Settings::default(),
            Arc::new(crate::exec::ShellRunner),
            None,
        );
        assert!(matches!(
            controller.run().await.unwrap_err(),
            VitalsError::Config(_)
        ));
    }
}
