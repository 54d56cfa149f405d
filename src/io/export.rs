use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;

use crate::application::LedgerService;
use crate::domain::{Balance, HistoryEntry};

/// Full ledger snapshot for JSON export
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub balances: Vec<Balance>,
    pub history: Vec<HistoryEntry>,
}

/// Exporter for writing ledger state in various formats
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// Export balances to CSV format
    pub fn balances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let balances = self.service.list_balances();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["user_id", "amount", "updated_at"])?;
        for balance in &balances {
            csv_writer.write_record([
                balance.user_id.to_string(),
                balance.amount.to_string(),
                balance.updated_at.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    /// Export committed history to CSV format, ordered by entry id
    pub fn history_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let entries = self.service.list_history();
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "user_id", "kind", "amount", "timestamp"])?;
        for entry in &entries {
            csv_writer.write_record([
                entry.id.to_string(),
                entry.user_id.to_string(),
                entry.kind.as_str().to_string(),
                entry.amount.to_string(),
                entry.timestamp.to_rfc3339(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(entries.len())
    }

    /// Build a snapshot of the whole ledger
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            balances: self.service.list_balances(),
            history: self.service.list_history(),
        }
    }

    /// Export the whole ledger as pretty-printed JSON
    pub fn snapshot_json<W: Write>(&self, writer: W) -> Result<LedgerSnapshot> {
        let snapshot = self.snapshot();
        serde_json::to_writer_pretty(writer, &snapshot)?;
        Ok(snapshot)
    }
}
