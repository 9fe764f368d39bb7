//! Credit ledger: the single point of balance mutation.
//!
//! Every mutation locks the account row, checks and updates the balance and
//! appends a ledger entry inside one store transaction, so the balance always
//! equals the sum of the account's entries and never goes negative.

use crate::error::CreditError;
use crate::models::{
    Account, ActorMeta, EntryKind, EntryPage, EntrySide, LedgerEntry, NewLedgerEntry,
    ServiceType, ACTION_RECHARGE, MAX_DESCRIPTION_CHARS, TARGET_USER,
};
use crate::services::audit::{field_snapshot, AuditService};
use crate::services::metrics::{record_error, record_operation};
use crate::services::pagination::Page;
use crate::services::store::{CreditStore, StoreTransaction};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_FRAME_PROMPT_CREDITS: i64 = 10;
pub const DEFAULT_IMAGE_GENERATION_CREDITS: i64 = 5;

const DEFAULT_RECHARGE_NOTE: &str = "admin recharge";

/// Fixed prices for operations billed by direct consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedCosts {
    pub frame_prompt: i64,
    pub image_generation: i64,
}

impl FixedCosts {
    /// Non-positive values fall back to the defaults.
    pub fn new(frame_prompt: i64, image_generation: i64) -> Self {
        Self {
            frame_prompt: if frame_prompt > 0 {
                frame_prompt
            } else {
                DEFAULT_FRAME_PROMPT_CREDITS
            },
            image_generation: if image_generation > 0 {
                image_generation
            } else {
                DEFAULT_IMAGE_GENERATION_CREDITS
            },
        }
    }
}

impl Default for FixedCosts {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_PROMPT_CREDITS, DEFAULT_IMAGE_GENERATION_CREDITS)
    }
}

/// Entry description cut to the column width on a char boundary.
fn entry_description(text: &str) -> Option<String> {
    Some(text.chars().take(MAX_DESCRIPTION_CHARS).collect())
}

/// `"resource:id"` detail string attached to consumption entries.
pub fn billing_detail(resource: &str, id: impl std::fmt::Display) -> String {
    format!("{}:{}", resource, id)
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
    audit: AuditService,
    costs: FixedCosts,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>, audit: AuditService, costs: FixedCosts) -> Self {
        Self {
            store,
            audit,
            costs,
        }
    }

    /// Configured fixed costs.
    pub fn costs(&self) -> FixedCosts {
        self.costs
    }

    /// Current account state (unlocked read).
    pub async fn account(&self, user_id: i64) -> Result<Account, CreditError> {
        self.store
            .get_account(user_id)
            .await?
            .ok_or_else(|| CreditError::NotFound(format!("account {}", user_id)))
    }

    // -------------------------------------------------------------------------
    // Debits
    // -------------------------------------------------------------------------

    /// Debit `cost` credits immediately. A non-positive cost is a no-op.
    #[instrument(skip(self, detail), fields(user_id = user_id, cost = cost, kind = %kind))]
    pub async fn consume(
        &self,
        user_id: i64,
        cost: i64,
        kind: EntryKind,
        detail: &str,
    ) -> Result<(), CreditError> {
        if cost <= 0 {
            return Ok(());
        }

        let entry = NewLedgerEntry {
            user_id,
            amount: -cost,
            kind,
            reference_id: None,
            service_type: None,
            model: None,
            description: entry_description(detail),
        };

        match self.debit(user_id, cost, entry).await {
            Ok(_) => {
                record_operation("consume", cost);
                info!(user_id = user_id, cost = cost, kind = %kind, "Credits consumed");
                Ok(())
            }
            Err(e) => Err(self.observe_failure("consume", e)),
        }
    }

    pub async fn consume_for_frame_prompt(&self, user_id: i64, detail: &str) -> Result<(), CreditError> {
        self.consume(
            user_id,
            self.costs.frame_prompt,
            EntryKind::GenerateFramePrompt,
            detail,
        )
        .await
    }

    pub async fn consume_for_image_generation(
        &self,
        user_id: i64,
        detail: &str,
    ) -> Result<(), CreditError> {
        self.consume(
            user_id,
            self.costs.image_generation,
            EntryKind::GenerateImage,
            detail,
        )
        .await
    }

    /// Reserve credits for one model call. Returns the reservation reference,
    /// or `None` when there is nothing to charge. Pass the reference to
    /// [`refund`](Self::refund) if the call fails.
    #[instrument(skip(self, detail), fields(user_id = user_id, service_type = %service_type, model = %model, cost = cost))]
    pub async fn reserve(
        &self,
        user_id: i64,
        service_type: ServiceType,
        model: &str,
        cost: i64,
        detail: &str,
    ) -> Result<Option<String>, CreditError> {
        if cost <= 0 {
            return Ok(None);
        }

        let reference_id = Uuid::new_v4().to_string();
        let entry = NewLedgerEntry {
            user_id,
            amount: -cost,
            kind: service_type.reserve_kind(),
            reference_id: Some(reference_id.clone()),
            service_type: Some(service_type),
            model: Some(model.to_string()),
            description: entry_description(detail),
        };

        match self.debit(user_id, cost, entry).await {
            Ok(_) => {
                record_operation("reserve", cost);
                info!(
                    user_id = user_id,
                    cost = cost,
                    reference_id = %reference_id,
                    "Credits reserved"
                );
                Ok(Some(reference_id))
            }
            Err(e) => Err(self.observe_failure("reserve", e)),
        }
    }

    /// Lock, check sufficiency, decrement and append in one transaction.
    async fn debit(
        &self,
        user_id: i64,
        cost: i64,
        entry: NewLedgerEntry,
    ) -> Result<LedgerEntry, CreditError> {
        let mut tx = self.store.begin().await?;

        let account = lock_existing(tx.as_mut(), user_id).await?;
        if account.balance < cost {
            return Err(CreditError::InsufficientCredits {
                required: cost,
                available: account.balance,
            });
        }

        tx.set_balance(user_id, account.balance - cost).await?;
        let created = tx.insert_entry(entry).await?;
        tx.commit().await?;

        Ok(created)
    }

    // -------------------------------------------------------------------------
    // Credits
    // -------------------------------------------------------------------------

    /// Reverse a reservation. Idempotent: an empty, unknown or already
    /// refunded reference is a successful no-op.
    #[instrument(skip(self))]
    pub async fn refund(&self, reference_id: &str) -> Result<(), CreditError> {
        if reference_id.is_empty() {
            return Ok(());
        }

        match self.refund_inner(reference_id).await {
            Ok(Some(entry)) => {
                record_operation("refund", entry.amount);
                info!(
                    user_id = entry.user_id,
                    amount = entry.amount,
                    reference_id = %reference_id,
                    "Credits refunded"
                );
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => Err(self.observe_failure("refund", e)),
        }
    }

    async fn refund_inner(&self, reference_id: &str) -> Result<Option<LedgerEntry>, CreditError> {
        if self
            .store
            .find_reservation_entry(reference_id, EntrySide::Credit)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let Some(reserved) = self
            .store
            .find_reservation_entry(reference_id, EntrySide::Debit)
            .await?
        else {
            warn!(reference_id = %reference_id, "Refund requested for unknown reservation");
            return Ok(None);
        };

        let service_type = reserved.service_type.ok_or_else(|| {
            CreditError::InvalidServiceType(format!("reservation {} has no service type", reference_id))
        })?;

        let mut tx = self.store.begin().await?;
        let account = lock_existing(tx.as_mut(), reserved.user_id).await?;

        // Re-check under the account lock: a concurrent refund may have won.
        if tx
            .find_reservation_entry(reference_id, EntrySide::Credit)
            .await?
            .is_some()
        {
            return Ok(None);
        }

        let amount = -reserved.amount;
        let restored = account
            .balance
            .checked_add(amount)
            .ok_or(CreditError::InvalidAmount(amount))?;
        tx.set_balance(reserved.user_id, restored).await?;
        let created = tx
            .insert_entry(NewLedgerEntry {
                user_id: reserved.user_id,
                amount,
                kind: service_type.refund_kind(),
                reference_id: Some(reference_id.to_string()),
                service_type: Some(service_type),
                model: reserved.model.clone(),
                description: entry_description(&format!(
                    "refund: {}",
                    reserved.description.as_deref().unwrap_or_default()
                )),
            })
            .await?;
        tx.commit().await?;

        Ok(Some(created))
    }

    /// Administrative top-up. The balance change, the ledger entry and the
    /// audit record commit together.
    #[instrument(skip(self, note, meta), fields(admin_id = admin_id, user_id = user_id, amount = amount))]
    pub async fn recharge(
        &self,
        admin_id: i64,
        user_id: i64,
        amount: i64,
        note: &str,
        meta: &ActorMeta,
    ) -> Result<(Account, LedgerEntry), CreditError> {
        if amount <= 0 {
            return Err(self.observe_failure("recharge", CreditError::InvalidAmount(amount)));
        }

        match self.recharge_inner(admin_id, user_id, amount, note, meta).await {
            Ok(result) => {
                record_operation("recharge", amount);
                info!(
                    admin_id = admin_id,
                    user_id = user_id,
                    amount = amount,
                    "Admin recharged user"
                );
                Ok(result)
            }
            Err(e) => Err(self.observe_failure("recharge", e)),
        }
    }

    async fn recharge_inner(
        &self,
        admin_id: i64,
        user_id: i64,
        amount: i64,
        note: &str,
        meta: &ActorMeta,
    ) -> Result<(Account, LedgerEntry), CreditError> {
        let mut tx = self.store.begin().await?;
        let mut account = lock_existing(tx.as_mut(), user_id).await?;

        let before = account.balance;
        let after = before
            .checked_add(amount)
            .ok_or(CreditError::InvalidAmount(amount))?;
        tx.set_balance(user_id, after).await?;

        let description = if note.trim().is_empty() {
            DEFAULT_RECHARGE_NOTE
        } else {
            note
        };
        let entry = tx
            .insert_entry(NewLedgerEntry {
                user_id,
                amount,
                kind: EntryKind::Recharge,
                reference_id: None,
                service_type: None,
                model: None,
                description: entry_description(description),
            })
            .await?;

        self.audit
            .write_with_tx(
                tx.as_mut(),
                admin_id,
                ACTION_RECHARGE,
                TARGET_USER,
                &user_id.to_string(),
                Some(field_snapshot("credits", before)),
                Some(field_snapshot("credits", after)),
                meta,
            )
            .await?;

        tx.commit().await?;

        account.balance = after;
        Ok((account, entry))
    }

    // -------------------------------------------------------------------------
    // Reads
    // -------------------------------------------------------------------------

    /// List ledger entries newest first, for one user or for everyone.
    #[instrument(skip(self))]
    pub async fn list_entries(
        &self,
        user_id: Option<i64>,
        page: i64,
        page_size: i64,
    ) -> Result<EntryPage, CreditError> {
        let page = Page::new(page, page_size);
        let (entries, total) = self
            .store
            .list_entries(user_id, page.limit(), page.offset())
            .await?;
        Ok(EntryPage {
            entries,
            total,
            page: page.page,
            page_size: page.page_size,
        })
    }

    fn observe_failure(&self, operation: &str, err: CreditError) -> CreditError {
        record_error(operation, err.error_type());
        if err.is_user_facing() {
            warn!(operation = operation, error = %err, "Credit operation rejected");
        } else {
            error!(operation = operation, error = %err, "Credit operation failed");
        }
        err
    }
}

/// Lock the account row, failing with `NotFound` when it does not exist.
pub(crate) async fn lock_existing(
    tx: &mut dyn StoreTransaction,
    user_id: i64,
) -> Result<Account, CreditError> {
    tx.lock_account(user_id)
        .await?
        .ok_or_else(|| CreditError::NotFound(format!("account {}", user_id)))
}
