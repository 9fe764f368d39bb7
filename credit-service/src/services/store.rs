//! Storage seam shared by the PostgreSQL and in-memory backends.
//!
//! Protocol logic (sufficiency checks, entry construction, audit snapshots,
//! refund idempotency) lives in the services and is written once against
//! these traits. A backend only has to provide an exclusive per-account lock
//! that is held from `lock_account` until the transaction commits or drops,
//! and all-or-nothing visibility of the writes made inside it.

use crate::error::CreditError;
use crate::models::{
    Account, AuditRecord, ConfigOwner, EntrySide, LedgerEntry, ListAuditFilter, NewAccount,
    NewAuditRecord, NewLedgerEntry, NewProviderConfig, ProviderConfig, ServiceType, UpdateProviderConfig,
    UserRole, UserStatus,
};
use async_trait::async_trait;

/// One atomic unit of work. Dropping without `commit` rolls back.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Lock the account row exclusively and return its current state.
    async fn lock_account(&mut self, user_id: i64) -> Result<Option<Account>, CreditError>;

    async fn set_balance(&mut self, user_id: i64, balance: i64) -> Result<(), CreditError>;

    async fn set_status(&mut self, user_id: i64, status: UserStatus) -> Result<(), CreditError>;

    async fn set_role(&mut self, user_id: i64, role: UserRole) -> Result<(), CreditError>;

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, CreditError>;

    async fn insert_audit(&mut self, record: NewAuditRecord) -> Result<AuditRecord, CreditError>;

    /// Most recent entry on one side of a reservation.
    async fn find_reservation_entry(
        &mut self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError>;

    async fn commit(self: Box<Self>) -> Result<(), CreditError>;
}

/// Durable state: accounts, ledger entries, audit records, provider configs.
#[async_trait]
pub trait CreditStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, CreditError>;

    async fn health_check(&self) -> Result<(), CreditError>;

    // -------------------------------------------------------------------------
    // Accounts
    // -------------------------------------------------------------------------

    async fn create_account(&self, input: &NewAccount) -> Result<Account, CreditError>;

    async fn get_account(&self, user_id: i64) -> Result<Option<Account>, CreditError>;

    /// Newest first. Returns the page and the total count.
    async fn list_accounts(&self, limit: i64, offset: i64)
        -> Result<(Vec<Account>, i64), CreditError>;

    // -------------------------------------------------------------------------
    // Ledger and audit reads (unlocked)
    // -------------------------------------------------------------------------

    /// Newest first, optionally for one user. Returns the page and the total count.
    async fn list_entries(
        &self,
        user_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerEntry>, i64), CreditError>;

    async fn find_reservation_entry(
        &self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError>;

    async fn list_audit_records(
        &self,
        filter: &ListAuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditRecord>, i64), CreditError>;

    // -------------------------------------------------------------------------
    // Provider configs
    // -------------------------------------------------------------------------

    async fn create_config(
        &self,
        owner: ConfigOwner,
        input: &NewProviderConfig,
    ) -> Result<ProviderConfig, CreditError>;

    /// Configs belonging to exactly `owner`, ordered by priority desc then id asc.
    async fn list_configs(
        &self,
        owner: ConfigOwner,
        service_type: Option<ServiceType>,
        active_only: bool,
    ) -> Result<Vec<ProviderConfig>, CreditError>;

    /// `None` when the row does not exist or belongs to another owner.
    async fn update_config(
        &self,
        owner: ConfigOwner,
        config_id: i64,
        patch: &UpdateProviderConfig,
    ) -> Result<Option<ProviderConfig>, CreditError>;

    /// `false` when the row does not exist or belongs to another owner.
    async fn delete_config(&self, owner: ConfigOwner, config_id: i64) -> Result<bool, CreditError>;
}
