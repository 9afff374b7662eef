//! # Audit Logger
//!
//! Best-effort audit trail written after a business transaction commits.
//! A failed write is logged and dropped; it never reaches the caller.

use serde_json::Value;
use tracing::{debug, warn};

use crate::pool::Database;
use crate::repository::audit::NewAuditEvent;
use crate::repository::AuditRepository;

/// Audit actions recorded by the engine.
pub mod actions {
    pub const SALE_CREATE: &str = "sale:create";
    pub const PURCHASE_CREATE: &str = "purchase:create";
    pub const PAYMENT_CREATE: &str = "payment:create";
    pub const INVENTORY_ADJUST: &str = "inventory:adjust";
    pub const JOURNAL_POST: &str = "journal:post";
    pub const JOURNAL_REVERSE: &str = "journal:reverse";
}

#[derive(Debug, Clone)]
pub struct AuditLogger {
    db: Database,
}

impl AuditLogger {
    pub fn new(db: Database) -> Self {
        AuditLogger { db }
    }

    /// Writes one audit row. Must only be called after commit.
    pub async fn record(
        &self,
        user_id: Option<i64>,
        action: &str,
        entity_type: &str,
        entity_id: i64,
        description: impl Into<String>,
        metadata: Value,
    ) {
        let event = NewAuditEvent {
            user_id: user_id.unwrap_or(0),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            description: Some(description.into()),
            metadata: Some(metadata),
        };

        let result = match self.db.acquire().await {
            Ok(mut conn) => AuditRepository::new(&mut conn).insert(&event).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(row) => debug!(action = %action, entity_id, audit_id = row.id, "Audit recorded"),
            Err(e) => warn!(action = %action, entity_id, error = %e, "Audit write failed, ignoring"),
        }
    }
}
