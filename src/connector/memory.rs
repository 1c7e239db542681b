//! In-memory connector store for tests and ephemeral deployments.

use super::{ConnectorRecord, ConnectorStore};
use crate::health::HealthCheckResult;
use anyhow::{anyhow, Result};
use dashmap::DashMap;

#[derive(Default)]
pub struct MemoryConnectorStore {
    records: DashMap<String, ConnectorRecord>,
}

impl MemoryConnectorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConnectorStore for MemoryConnectorStore {
    fn get(&self, key: &str) -> Result<Option<ConnectorRecord>> {
        Ok(self.records.get(key).map(|r| r.clone()))
    }

    fn list(&self) -> Result<Vec<ConnectorRecord>> {
        let mut records: Vec<ConnectorRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(records)
    }

    fn list_enabled(&self) -> Result<Vec<ConnectorRecord>> {
        Ok(self.list()?.into_iter().filter(|r| r.enabled).collect())
    }

    fn upsert(&self, record: &ConnectorRecord) -> Result<()> {
        self.records.insert(record.key.clone(), record.clone());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.records.remove(key).is_some())
    }

    fn record_health(&self, key: &str, result: &HealthCheckResult) -> Result<()> {
        let mut entry = self
            .records
            .get_mut(key)
            .ok_or_else(|| anyhow!("No connector with key '{}'", key))?;
        entry.last_health_at = Some(result.checked_at);
        entry.last_health = Some(result.clone());
        Ok(())
    }
}
