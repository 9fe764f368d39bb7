//! Privileged account mutations. Each one commits together with its audit record.

use crate::error::CreditError;
use crate::models::{
    Account, ActorMeta, LedgerEntry, NewAccount, UserRole, UserStatus, ACTION_UPDATE_ROLE,
    ACTION_UPDATE_STATUS, TARGET_USER,
};
use crate::services::audit::{field_snapshot, AuditService};
use crate::services::ledger::{lock_existing, CreditLedger};
use crate::services::metrics::{record_error, record_operation};
use crate::services::pagination::Page;
use crate::services::store::CreditStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Page of accounts, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPage {
    pub accounts: Vec<Account>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn CreditStore>,
    audit: AuditService,
    ledger: CreditLedger,
}

impl AdminService {
    pub fn new(store: Arc<dyn CreditStore>, audit: AuditService, ledger: CreditLedger) -> Self {
        Self {
            store,
            audit,
            ledger,
        }
    }

    /// Set a user's status. `status` must be `active` or `disabled`.
    #[instrument(skip(self, meta))]
    pub async fn update_user_status(
        &self,
        admin_id: i64,
        user_id: i64,
        status: &str,
        meta: &ActorMeta,
    ) -> Result<Account, CreditError> {
        let result = match UserStatus::parse(status) {
            Some(status) => self.apply_status(admin_id, user_id, status, meta).await,
            None => Err(CreditError::InvalidStatus(status.to_string())),
        };
        self.observe("update_status", result)
    }

    async fn apply_status(
        &self,
        admin_id: i64,
        user_id: i64,
        status: UserStatus,
        meta: &ActorMeta,
    ) -> Result<Account, CreditError> {
        let mut tx = self.store.begin().await?;
        let mut account = lock_existing(tx.as_mut(), user_id).await?;
        let before = account.status;

        tx.set_status(user_id, status).await?;
        self.audit
            .write_with_tx(
                tx.as_mut(),
                admin_id,
                ACTION_UPDATE_STATUS,
                TARGET_USER,
                &user_id.to_string(),
                Some(field_snapshot("status", before.as_str())),
                Some(field_snapshot("status", status.as_str())),
                meta,
            )
            .await?;
        tx.commit().await?;

        info!(
            admin_id = admin_id,
            user_id = user_id,
            before = %before,
            after = %status,
            "User status updated"
        );
        account.status = status;
        Ok(account)
    }

    /// Set a user's role. `role` must be `user`, `vip`, `admin` or `platform_admin`.
    #[instrument(skip(self, meta))]
    pub async fn update_user_role(
        &self,
        admin_id: i64,
        user_id: i64,
        role: &str,
        meta: &ActorMeta,
    ) -> Result<Account, CreditError> {
        let result = match UserRole::parse(role) {
            Some(role) => self.apply_role(admin_id, user_id, role, meta).await,
            None => Err(CreditError::InvalidRole(role.to_string())),
        };
        self.observe("update_role", result)
    }

    async fn apply_role(
        &self,
        admin_id: i64,
        user_id: i64,
        role: UserRole,
        meta: &ActorMeta,
    ) -> Result<Account, CreditError> {
        let mut tx = self.store.begin().await?;
        let mut account = lock_existing(tx.as_mut(), user_id).await?;
        let before = account.role;

        tx.set_role(user_id, role).await?;
        self.audit
            .write_with_tx(
                tx.as_mut(),
                admin_id,
                ACTION_UPDATE_ROLE,
                TARGET_USER,
                &user_id.to_string(),
                Some(field_snapshot("role", before.as_str())),
                Some(field_snapshot("role", role.as_str())),
                meta,
            )
            .await?;
        tx.commit().await?;

        info!(
            admin_id = admin_id,
            user_id = user_id,
            before = %before,
            after = %role,
            "User role updated"
        );
        account.role = role;
        Ok(account)
    }

    /// Top up a user's balance. See [`CreditLedger::recharge`].
    pub async fn recharge_credits(
        &self,
        admin_id: i64,
        user_id: i64,
        amount: i64,
        note: &str,
        meta: &ActorMeta,
    ) -> Result<(Account, LedgerEntry), CreditError> {
        self.ledger
            .recharge(admin_id, user_id, amount, note, meta)
            .await
    }

    pub async fn list_accounts(&self, page: i64, page_size: i64) -> Result<AccountPage, CreditError> {
        let page = Page::new(page, page_size);
        let (accounts, total) = self
            .store
            .list_accounts(page.limit(), page.offset())
            .await?;
        Ok(AccountPage {
            accounts,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    /// Open a zero-balance account.
    #[instrument(skip(self, input), fields(user_id = input.user_id))]
    pub async fn open_account(&self, input: &NewAccount) -> Result<Account, CreditError> {
        let account = self.store.create_account(input).await?;
        info!(user_id = account.user_id, role = %account.role, "Account opened");
        Ok(account)
    }

    fn observe(
        &self,
        operation: &str,
        result: Result<Account, CreditError>,
    ) -> Result<Account, CreditError> {
        match &result {
            Ok(_) => record_operation(operation, 0),
            Err(e) => {
                record_error(operation, e.error_type());
                if e.is_user_facing() {
                    warn!(operation = operation, error = %e, "Admin mutation rejected");
                } else {
                    error!(operation = operation, error = %e, "Admin mutation failed");
                }
            }
        }
        result
    }
}
