//! Audit trail for privileged mutations.
//!
//! Records are only ever written through an open [`StoreTransaction`] so that
//! the audit row commits or rolls back together with the mutation it documents.

use crate::error::CreditError;
use crate::models::{ActorMeta, AuditRecord, ListAuditFilter, NewAuditRecord};
use crate::services::pagination::Page;
use crate::services::store::{CreditStore, StoreTransaction};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::instrument;

/// Page of audit records, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPage {
    pub records: Vec<AuditRecord>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct AuditService {
    store: Arc<dyn CreditStore>,
}

impl AuditService {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self { store }
    }

    /// Append an audit record inside `tx`. Empty IP or user agent is stored as absent.
    #[allow(clippy::too_many_arguments)]
    pub async fn write_with_tx(
        &self,
        tx: &mut dyn StoreTransaction,
        actor_id: i64,
        action: &str,
        target_type: &str,
        target_id: &str,
        before: Option<Value>,
        after: Option<Value>,
        meta: &ActorMeta,
    ) -> Result<AuditRecord, CreditError> {
        let record = NewAuditRecord {
            actor_id,
            action: action.to_string(),
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            before_json: before,
            after_json: after,
            ip: non_empty(&meta.ip),
            user_agent: non_empty(&meta.user_agent),
        };
        tx.insert_audit(record).await
    }

    /// List audit records, newest first.
    #[instrument(skip(self, filter))]
    pub async fn list_records(
        &self,
        filter: &ListAuditFilter,
        page: i64,
        page_size: i64,
    ) -> Result<AuditPage, CreditError> {
        let page = Page::new(page, page_size);
        let (records, total) = self
            .store
            .list_audit_records(filter, page.limit(), page.offset())
            .await?;
        Ok(AuditPage {
            records,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Single-field snapshot, e.g. `{"credits": 10}`.
pub fn field_snapshot(field: &str, value: impl Into<Value>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(field.to_string(), value.into());
    Value::Object(map)
}
