//! # Settings Repository
//!
//! Key-value settings backing [`ModuleSettings`].

use chrono::Utc;
use sqlx::SqliteConnection;
use std::collections::HashMap;
use tracing::debug;

use crate::error::DbResult;
use tally_core::settings::{ModuleSettings, SettingKey};

pub struct SettingsRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> SettingsRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        SettingsRepository { conn }
    }

    pub async fn get(&mut self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&mut *self.conn)
            .await?;
        Ok(value)
    }

    /// Inserts or replaces a setting.
    pub async fn set(&mut self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, value = %value, "Writing setting");

        sqlx::query(
            r#"
            INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn all(&mut self) -> DbResult<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM settings")
            .fetch_all(&mut *self.conn)
            .await?;
        Ok(rows.into_iter().collect())
    }

    /// Reads every stored setting once and resolves the module toggles.
    pub async fn module_settings(&mut self) -> DbResult<ModuleSettings> {
        let stored = self.all().await?;
        Ok(ModuleSettings::resolve(|key| stored.get(key).cloned()))
    }

    pub async fn mark_coa_seeded(&mut self) -> DbResult<()> {
        self.set(SettingKey::CoaSeeded.key(), "true").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_set_overwrites_and_resolves() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = SettingsRepository::new(&mut conn);

        repo.set("modules.accounting.enabled", "false").await.unwrap();
        assert!(!repo.module_settings().await.unwrap().accounting_enabled);

        repo.set("accounting.enabled", "true").await.unwrap();
        repo.set("accounting.enabled", "false").await.unwrap();
        assert_eq!(repo.get("accounting.enabled").await.unwrap().as_deref(), Some("false"));
        assert_eq!(repo.all().await.unwrap().len(), 2);
    }
}
