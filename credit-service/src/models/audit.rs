//! Audit record model for privileged mutations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const ACTION_RECHARGE: &str = "billing.recharge";
pub const ACTION_UPDATE_STATUS: &str = "user.update_status";
pub const ACTION_UPDATE_ROLE: &str = "user.update_role";

pub const TARGET_USER: &str = "user";

/// Immutable before/after snapshot of a privileged mutation.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: i64,
    pub actor_id: i64,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub before_json: Option<serde_json::Value>,
    pub after_json: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Who performed a mutation and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorMeta {
    pub ip: String,
    pub user_agent: String,
}

impl ActorMeta {
    pub fn new(ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Input for appending an audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub actor_id: i64,
    pub action: String,
    pub target_type: String,
    pub target_id: String,
    pub before_json: Option<serde_json::Value>,
    pub after_json: Option<serde_json::Value>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Filter parameters for listing audit records.
#[derive(Debug, Clone, Default)]
pub struct ListAuditFilter {
    pub actor_id: Option<i64>,
    pub action: Option<String>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
}

impl ListAuditFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.actor_id.map_or(true, |id| record.actor_id == id)
            && self.action.as_deref().map_or(true, |a| record.action == a)
            && self
                .target_type
                .as_deref()
                .map_or(true, |t| record.target_type == t)
            && self
                .target_id
                .as_deref()
                .map_or(true, |t| record.target_id == t)
    }
}
