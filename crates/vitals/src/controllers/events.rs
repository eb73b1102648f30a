//! Cluster-wide monitoring event summary.
//!
//! One row per unacknowledged event, keyed by host, with the event priority
//! as the single status column. Details are always shown here; a priority
//! label without its description is useless.

use crate::checks::zabbix::{classify_priority, priority_label, ZabbixClient};
use crate::config::{Settings, ZabbixConfig};
use crate::controllers::longest_key;
use crate::error::VitalsError;
use crate::record::RecordBuilder;
use crate::render::{StatusTable, TableSpec};

const PRIORITY_COLUMN: &str = "priority";

pub struct EventsController {
    settings: Settings,
    zabbix: ZabbixConfig,
}

impl EventsController {
    #[must_use]
    pub fn new(settings: Settings, zabbix: ZabbixConfig) -> Self {
        Self { settings, zabbix }
    }

    pub async fn run(&self) -> Result<(), VitalsError> {
        let client = ZabbixClient::new(&self.zabbix, self.settings.timeout);
        let Some(mut events) = client.cluster_events().await else {
            return Err(VitalsError::Config(
                "monitoring API is unavailable".to_string(),
            ));
        };
        if events.is_empty() {
            println!("No unacknowledged events.");
            return Ok(());
        }
        events.sort_by(|a, b| a.host.cmp(&b.host));

        let spec = TableSpec {
            index_label: "Node".to_string(),
            index_width: longest_key(events.iter().map(|e| e.host.as_str())),
            columns: vec![PRIORITY_COLUMN.to_string()],
            status_col: self.settings.status_col,
            details_col: self.settings.details_col,
            // the description is the point of this report
            verbose: true,
            no_table: self.settings.no_table,
            no_statusbar: true,
            total: events.len(),
            scheme: self.settings.scheme,
        };
        let mut table = StatusTable::new(spec);

        table.header();
        for event in &events {
            let mut rec = RecordBuilder::new(PRIORITY_COLUMN);
            rec.set_status(priority_label(event.priority));
            rec.set_category(classify_priority(event.priority).1);
            rec.set_details(event.description.clone());
            table.line(&event.host, &[rec.build()]);
        }
        table.separator();
        Ok(())
    }
}
