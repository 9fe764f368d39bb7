//! Account model: one prepaid credit balance per user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Account status. Disabled accounts keep their balance and ledger history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    Active,
    Disabled,
}

impl UserStatus {
    /// Parse a caller-supplied status. Only the supported set is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "disabled" => Some(Self::Disabled),
            _ => None,
        }
    }

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Vip,
    /// Legacy administrator role, still honoured.
    Admin,
    PlatformAdmin,
}

impl UserRole {
    /// Parse a caller-supplied role. Only the supported set is accepted.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "user" => Some(Self::User),
            "vip" => Some(Self::Vip),
            "admin" => Some(Self::Admin),
            "platform_admin" => Some(Self::PlatformAdmin),
            _ => None,
        }
    }

    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Vip => "vip",
            Self::Admin => "admin",
            Self::PlatformAdmin => "platform_admin",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin | Self::PlatformAdmin)
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Credit account. `balance` is never negative and always equals the sum of
/// the account's ledger entries.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    pub balance: i64,
    pub status: UserStatus,
    pub role: UserRole,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

/// Input for opening a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub user_id: i64,
    pub role: UserRole,
    pub status: UserStatus,
}

impl NewAccount {
    /// A regular active user.
    pub fn user(user_id: i64) -> Self {
        Self {
            user_id,
            role: UserRole::User,
            status: UserStatus::Active,
        }
    }
}
