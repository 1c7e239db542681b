//! Durable connector store backed by SQLite.
//!
//! Configs are encrypted at rest with AES-256-GCM because they carry provider
//! secrets (client secrets, bind passwords). `meta` and cached health results
//! hold no secrets and are stored as plain JSON.

use super::{encryption, ConnectorKind, ConnectorRecord, ConnectorStore};
use crate::health::HealthCheckResult;
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::Mutex;

/// Encrypted connector storage.
///
/// # Schema
/// ```sql
/// CREATE TABLE connectors (
///     id INTEGER PRIMARY KEY,
///     connector_key TEXT NOT NULL UNIQUE,
///     name TEXT NOT NULL,
///     kind TEXT NOT NULL,
///     enabled INTEGER NOT NULL,
///     config TEXT NOT NULL,         -- Encrypted JSON object
///     config_nonce TEXT NOT NULL,   -- Nonce for config
///     meta TEXT,                    -- Plain JSON (optional)
///     last_health_at TEXT,          -- ISO 8601 timestamp (optional)
///     last_health TEXT,             -- Cached HealthCheckResult JSON (optional)
///     created_at TEXT NOT NULL,
///     updated_at TEXT NOT NULL
/// );
/// ```
///
/// # Thread Safety
/// The connection is wrapped in a Mutex; SQLite itself runs in serialized
/// mode, and its ACID guarantees prevent partial writes.
pub struct SqliteConnectorStore {
    conn: Mutex<Connection>,
    encryption_key: Vec<u8>,
}

impl SqliteConnectorStore {
    /// Creates or opens a connector store.
    ///
    /// `encryption_key` is the base64-encoded 32-byte master key.
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: &str) -> Result<Self> {
        let key_bytes =
            encryption::validate_key(encryption_key).context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS connectors (
                id INTEGER PRIMARY KEY,
                connector_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                enabled INTEGER NOT NULL,
                config TEXT NOT NULL,
                config_nonce TEXT NOT NULL,
                meta TEXT,
                last_health_at TEXT,
                last_health TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Failed to create connectors table")?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_connector_key ON connectors(connector_key)",
            [],
        )
        .context("Failed to create index")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key: key_bytes,
        })
    }

    fn row_to_record(&self, row: &Row<'_>) -> Result<ConnectorRecord> {
        let key: String = row.get("connector_key")?;
        let name: String = row.get("name")?;
        let kind_str: String = row.get("kind")?;
        let enabled: bool = row.get("enabled")?;
        let config_cipher: String = row.get("config")?;
        let config_nonce: String = row.get("config_nonce")?;
        let meta_json: Option<String> = row.get("meta")?;
        let last_health_at: Option<String> = row.get("last_health_at")?;
        let last_health_json: Option<String> = row.get("last_health")?;

        let kind = ConnectorKind::parse(&kind_str)
            .map_err(|e| anyhow!("Corrupt kind column for '{}': {}", key, e))?;

        let config_plain = encryption::decrypt(&config_cipher, &config_nonce, &self.encryption_key)
            .with_context(|| format!("Failed to decrypt config for '{}'", key))?;
        let config = serde_json::from_str(&config_plain)
            .with_context(|| format!("Corrupt config JSON for '{}'", key))?;

        let meta = match meta_json {
            Some(raw) => Some(serde_json::from_str(&raw).context("Corrupt meta JSON")?),
            None => None,
        };

        let last_health_at = match last_health_at {
            Some(raw) => Some(
                DateTime::parse_from_rfc3339(&raw)
                    .context("Corrupt last_health_at timestamp")?
                    .with_timezone(&Utc),
            ),
            None => None,
        };

        let last_health = match last_health_json {
            Some(raw) => {
                Some(serde_json::from_str(&raw).context("Corrupt cached health result")?)
            }
            None => None,
        };

        Ok(ConnectorRecord {
            key,
            name,
            kind,
            enabled,
            config,
            meta,
            last_health_at,
            last_health,
        })
    }

    fn query_records(&self, sql: &str) -> Result<Vec<ConnectorRecord>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        let mut stmt = conn.prepare(sql).context("Failed to prepare query")?;
        let mut rows = stmt.query([]).context("Query failed")?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().context("Row fetch failed")? {
            records.push(self.row_to_record(row)?);
        }
        Ok(records)
    }
}

impl ConnectorStore for SqliteConnectorStore {
    fn get(&self, key: &str) -> Result<Option<ConnectorRecord>> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        let mut stmt = conn
            .prepare("SELECT * FROM connectors WHERE connector_key = ?1")
            .context("Failed to prepare query")?;
        let mut rows = stmt.query(params![key]).context("Query failed")?;

        match rows.next().context("Row fetch failed")? {
            Some(row) => Ok(Some(self.row_to_record(row)?)),
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<ConnectorRecord>> {
        self.query_records("SELECT * FROM connectors ORDER BY connector_key")
    }

    fn list_enabled(&self) -> Result<Vec<ConnectorRecord>> {
        self.query_records("SELECT * FROM connectors WHERE enabled = 1 ORDER BY connector_key")
    }

    fn upsert(&self, record: &ConnectorRecord) -> Result<()> {
        let config_plain =
            serde_json::to_string(&record.config).context("Failed to serialize config")?;
        let (config_cipher, config_nonce) =
            encryption::encrypt(&config_plain, &self.encryption_key)
                .context("Failed to encrypt config")?;

        let meta_json = match &record.meta {
            Some(meta) => Some(serde_json::to_string(meta).context("Failed to serialize meta")?),
            None => None,
        };
        let last_health_at = record.last_health_at.map(|t| t.to_rfc3339());
        let last_health_json = match &record.last_health {
            Some(result) => {
                Some(serde_json::to_string(result).context("Failed to serialize health result")?)
            }
            None => None,
        };
        let now = Utc::now().to_rfc3339();

        let conn = self.conn.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        conn.execute(
            r#"
            INSERT INTO connectors
                (connector_key, name, kind, enabled, config, config_nonce,
                 meta, last_health_at, last_health, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(connector_key) DO UPDATE SET
                name = ?2, kind = ?3, enabled = ?4, config = ?5,
                config_nonce = ?6, meta = ?7, last_health_at = ?8,
                last_health = ?9, updated_at = ?10
            "#,
            params![
                record.key,
                record.name,
                record.kind.as_str(),
                record.enabled,
                config_cipher,
                config_nonce,
                meta_json,
                last_health_at,
                last_health_json,
                now,
            ],
        )
        .context("Failed to upsert connector")?;

        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let conn = self.conn.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        let affected = conn
            .execute("DELETE FROM connectors WHERE connector_key = ?1", params![key])
            .context("Failed to delete connector")?;
        Ok(affected > 0)
    }

    fn record_health(&self, key: &str, result: &HealthCheckResult) -> Result<()> {
        let result_json =
            serde_json::to_string(result).context("Failed to serialize health result")?;

        let conn = self.conn.lock().map_err(|_| anyhow!("Store lock poisoned"))?;
        let affected = conn
            .execute(
                r#"
                UPDATE connectors
                SET last_health = ?2, last_health_at = ?3, updated_at = ?3
                WHERE connector_key = ?1
                "#,
                params![key, result_json, result.checked_at.to_rfc3339()],
            )
            .context("Failed to record health result")?;

        if affected == 0 {
            return Err(anyhow!("No connector with key '{}'", key));
        }
        Ok(())
    }
}
