//! # Audit Repository
//!
//! Append-only audit rows, written after the business transaction commits.

use chrono::Utc;
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::error::DbResult;
use tally_core::AuditEvent;

#[derive(Debug, Clone)]
pub struct NewAuditEvent {
    pub user_id: i64,
    pub action: String,
    pub entity_type: String,
    pub entity_id: i64,
    pub description: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

pub struct AuditRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> AuditRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        AuditRepository { conn }
    }

    pub async fn insert(&mut self, event: &NewAuditEvent) -> DbResult<AuditEvent> {
        let metadata = event.metadata.as_ref().map(|m| m.to_string());

        let created = sqlx::query_as::<_, AuditEvent>(
            r#"
            INSERT INTO audit_logs (
                event_id, user_id, action, entity_type, entity_id, description, metadata, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(event.user_id)
        .bind(&event.action)
        .bind(&event.entity_type)
        .bind(event.entity_id)
        .bind(&event.description)
        .bind(metadata)
        .bind(Utc::now())
        .fetch_one(&mut *self.conn)
        .await?;

        Ok(created)
    }

    /// Audit rows for one entity, oldest first.
    pub async fn list_for_entity(&mut self, entity_type: &str, entity_id: i64) -> DbResult<Vec<AuditEvent>> {
        let events = sqlx::query_as::<_, AuditEvent>(
            "SELECT * FROM audit_logs WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id",
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&mut *self.conn)
        .await?;
        Ok(events)
    }

    pub async fn count_by_action(&mut self, action: &str) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs WHERE action = ?1")
            .bind(action)
            .fetch_one(&mut *self.conn)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    #[tokio::test]
    async fn test_insert_serializes_metadata() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let mut conn = db.acquire().await.unwrap();
        let mut repo = AuditRepository::new(&mut conn);

        let event = repo
            .insert(&NewAuditEvent {
                user_id: 3,
                action: "sale:create".into(),
                entity_type: "sale".into(),
                entity_id: 10,
                description: Some("Sale INV-1".into()),
                metadata: Some(serde_json::json!({ "total": 1500 })),
            })
            .await
            .unwrap();

        assert_eq!(event.event_id.len(), 36);
        let metadata: serde_json::Value = serde_json::from_str(event.metadata.as_deref().unwrap()).unwrap();
        assert_eq!(metadata["total"], 1500);

        assert_eq!(repo.list_for_entity("sale", 10).await.unwrap().len(), 1);
        assert_eq!(repo.count_by_action("sale:create").await.unwrap(), 1);
    }
}
