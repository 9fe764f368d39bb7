//! In-process backend.
//!
//! A transaction holds the store-wide async mutex from `begin` until it is
//! committed or dropped, so every transaction is serializable. Its writes
//! are buffered and only applied on commit; a dropped transaction leaves no
//! trace. Used by tests and by deployments that run without PostgreSQL.

use crate::error::CreditError;
use crate::models::{
    Account, AuditRecord, ConfigOwner, EntryKind, EntrySide, LedgerEntry, ListAuditFilter,
    NewAccount, NewAuditRecord, NewLedgerEntry, NewProviderConfig, ProviderConfig, ServiceType,
    UpdateProviderConfig, UserRole, UserStatus, MAX_DESCRIPTION_CHARS,
};
use crate::services::store::{CreditStore, StoreTransaction};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<i64, Account>,
    entries: Vec<LedgerEntry>,
    audit_records: Vec<AuditRecord>,
    configs: Vec<ProviderConfig>,
    next_entry_id: i64,
    next_audit_id: i64,
    next_config_id: i64,
}

impl MemoryState {
    fn find_reservation_entry(&self, reference_id: &str, side: EntrySide) -> Option<LedgerEntry> {
        latest_reservation_entry(&self.entries, reference_id, side)
    }
}

fn latest_reservation_entry(
    entries: &[LedgerEntry],
    reference_id: &str,
    side: EntrySide,
) -> Option<LedgerEntry> {
    entries
        .iter()
        .rev()
        .find(|e| e.reference_id.as_deref() == Some(reference_id) && side.matches(e.amount))
        .cloned()
}

/// In-memory credit store.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an account with an opening balance, recorded as a recharge entry
    /// so the balance still equals the sum of the account's entries.
    pub async fn seed_account(&self, input: &NewAccount, balance: i64) -> Account {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let account = Account {
            user_id: input.user_id,
            balance,
            status: input.status,
            role: input.role,
            created_utc: now,
            updated_utc: now,
        };
        state.accounts.insert(input.user_id, account.clone());
        if balance != 0 {
            state.next_entry_id += 1;
            let entry_id = state.next_entry_id;
            state.entries.push(LedgerEntry {
                entry_id,
                user_id: input.user_id,
                amount: balance,
                kind: EntryKind::Recharge,
                reference_id: None,
                service_type: None,
                model: None,
                description: Some("opening balance".to_string()),
                created_utc: now,
            });
        }
        account
    }
}

#[async_trait]
impl CreditStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, CreditError> {
        let guard = self.state.clone().lock_owned().await;
        Ok(Box::new(MemoryTransaction {
            guard,
            accounts: BTreeMap::new(),
            entries: Vec::new(),
            audit_records: Vec::new(),
        }))
    }

    async fn health_check(&self) -> Result<(), CreditError> {
        Ok(())
    }

    async fn create_account(&self, input: &NewAccount) -> Result<Account, CreditError> {
        let mut state = self.state.lock().await;
        if state.accounts.contains_key(&input.user_id) {
            return Err(CreditError::Database(anyhow::anyhow!(
                "Account for user {} already exists",
                input.user_id
            )));
        }
        let now = Utc::now();
        let account = Account {
            user_id: input.user_id,
            balance: 0,
            status: input.status,
            role: input.role,
            created_utc: now,
            updated_utc: now,
        };
        state.accounts.insert(input.user_id, account.clone());
        Ok(account)
    }

    async fn get_account(&self, user_id: i64) -> Result<Option<Account>, CreditError> {
        Ok(self.state.lock().await.accounts.get(&user_id).cloned())
    }

    async fn list_accounts(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Account>, i64), CreditError> {
        let state = self.state.lock().await;
        let total = state.accounts.len() as i64;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| {
            b.created_utc
                .cmp(&a.created_utc)
                .then(b.user_id.cmp(&a.user_id))
        });
        Ok((paginate(accounts, limit, offset), total))
    }

    async fn list_entries(
        &self,
        user_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerEntry>, i64), CreditError> {
        let state = self.state.lock().await;
        let matching: Vec<LedgerEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| user_id.map_or(true, |id| e.user_id == id))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        Ok((paginate(matching, limit, offset), total))
    }

    async fn find_reservation_entry(
        &self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError> {
        Ok(self
            .state
            .lock()
            .await
            .find_reservation_entry(reference_id, side))
    }

    async fn list_audit_records(
        &self,
        filter: &ListAuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditRecord>, i64), CreditError> {
        let state = self.state.lock().await;
        let matching: Vec<AuditRecord> = state
            .audit_records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect();
        let total = matching.len() as i64;
        Ok((paginate(matching, limit, offset), total))
    }

    async fn create_config(
        &self,
        owner: ConfigOwner,
        input: &NewProviderConfig,
    ) -> Result<ProviderConfig, CreditError> {
        let mut state = self.state.lock().await;
        state.next_config_id += 1;
        let now = Utc::now();
        let config = ProviderConfig {
            config_id: state.next_config_id,
            owner,
            service_type: input.service_type,
            provider: input.provider.clone(),
            name: input.name.clone(),
            base_url: input.base_url.clone(),
            secret: input.secret.clone(),
            models: input.models.clone(),
            priority: input.priority,
            is_default: input.is_default,
            is_active: input.is_active,
            credit_cost: input.credit_cost,
            settings: input.settings.clone(),
            created_utc: now,
            updated_utc: now,
        };
        state.configs.push(config.clone());
        Ok(config)
    }

    async fn list_configs(
        &self,
        owner: ConfigOwner,
        service_type: Option<ServiceType>,
        active_only: bool,
    ) -> Result<Vec<ProviderConfig>, CreditError> {
        let state = self.state.lock().await;
        let mut configs: Vec<ProviderConfig> = state
            .configs
            .iter()
            .filter(|c| c.owner == owner)
            .filter(|c| service_type.map_or(true, |st| c.service_type == st))
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        configs.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.config_id.cmp(&b.config_id))
        });
        Ok(configs)
    }

    async fn update_config(
        &self,
        owner: ConfigOwner,
        config_id: i64,
        patch: &UpdateProviderConfig,
    ) -> Result<Option<ProviderConfig>, CreditError> {
        let mut state = self.state.lock().await;
        let Some(config) = state
            .configs
            .iter_mut()
            .find(|c| c.config_id == config_id && c.owner == owner)
        else {
            return Ok(None);
        };
        patch.apply_to(config);
        config.updated_utc = Utc::now();
        Ok(Some(config.clone()))
    }

    async fn delete_config(&self, owner: ConfigOwner, config_id: i64) -> Result<bool, CreditError> {
        let mut state = self.state.lock().await;
        let before = state.configs.len();
        state
            .configs
            .retain(|c| !(c.config_id == config_id && c.owner == owner));
        Ok(state.configs.len() < before)
    }
}

fn paginate<T>(items: Vec<T>, limit: i64, offset: i64) -> Vec<T> {
    items
        .into_iter()
        .skip(offset.max(0) as usize)
        .take(limit.max(0) as usize)
        .collect()
}

/// Transaction holding the store lock. Touched accounts and new rows are
/// buffered here and applied to the shared state on commit.
pub struct MemoryTransaction {
    guard: OwnedMutexGuard<MemoryState>,
    accounts: BTreeMap<i64, Account>,
    entries: Vec<LedgerEntry>,
    audit_records: Vec<AuditRecord>,
}

impl MemoryTransaction {
    fn account_mut(&mut self, user_id: i64) -> Result<&mut Account, CreditError> {
        match self.accounts.entry(user_id) {
            Entry::Occupied(slot) => Ok(slot.into_mut()),
            Entry::Vacant(slot) => {
                let account = self
                    .guard
                    .accounts
                    .get(&user_id)
                    .cloned()
                    .ok_or_else(|| CreditError::NotFound(format!("account {}", user_id)))?;
                Ok(slot.insert(account))
            }
        }
    }

    fn reservation_entry(&self, reference_id: &str, side: EntrySide) -> Option<LedgerEntry> {
        latest_reservation_entry(&self.entries, reference_id, side)
            .or_else(|| self.guard.find_reservation_entry(reference_id, side))
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn lock_account(&mut self, user_id: i64) -> Result<Option<Account>, CreditError> {
        Ok(self
            .accounts
            .get(&user_id)
            .or_else(|| self.guard.accounts.get(&user_id))
            .cloned())
    }

    async fn set_balance(&mut self, user_id: i64, balance: i64) -> Result<(), CreditError> {
        if balance < 0 {
            return Err(CreditError::Database(anyhow::anyhow!(
                "balance check constraint violated for user {}",
                user_id
            )));
        }
        let account = self.account_mut(user_id)?;
        account.balance = balance;
        account.updated_utc = Utc::now();
        Ok(())
    }

    async fn set_status(&mut self, user_id: i64, status: UserStatus) -> Result<(), CreditError> {
        let account = self.account_mut(user_id)?;
        account.status = status;
        account.updated_utc = Utc::now();
        Ok(())
    }

    async fn set_role(&mut self, user_id: i64, role: UserRole) -> Result<(), CreditError> {
        let account = self.account_mut(user_id)?;
        account.role = role;
        account.updated_utc = Utc::now();
        Ok(())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, CreditError> {
        // Same width as the description column.
        if let Some(description) = entry.description.as_deref() {
            if description.chars().count() > MAX_DESCRIPTION_CHARS {
                return Err(CreditError::Database(anyhow::anyhow!(
                    "value too long for ledger entry description ({} chars)",
                    description.chars().count()
                )));
            }
        }

        if let Some(reference_id) = entry.reference_id.as_deref() {
            let side = if entry.amount < 0 {
                EntrySide::Debit
            } else {
                EntrySide::Credit
            };
            if self.reservation_entry(reference_id, side).is_some() {
                return Err(CreditError::Database(anyhow::anyhow!(
                    "Duplicate ledger entry for reference {:?}",
                    entry.reference_id
                )));
            }
        }

        let created = LedgerEntry {
            entry_id: self.guard.next_entry_id + self.entries.len() as i64 + 1,
            user_id: entry.user_id,
            amount: entry.amount,
            kind: entry.kind,
            reference_id: entry.reference_id,
            service_type: entry.service_type,
            model: entry.model,
            description: entry.description,
            created_utc: Utc::now(),
        };
        self.entries.push(created.clone());
        Ok(created)
    }

    async fn insert_audit(&mut self, record: NewAuditRecord) -> Result<AuditRecord, CreditError> {
        let created = AuditRecord {
            audit_id: self.guard.next_audit_id + self.audit_records.len() as i64 + 1,
            actor_id: record.actor_id,
            action: record.action,
            target_type: record.target_type,
            target_id: record.target_id,
            before_json: record.before_json,
            after_json: record.after_json,
            ip: record.ip,
            user_agent: record.user_agent,
            created_utc: Utc::now(),
        };
        self.audit_records.push(created.clone());
        Ok(created)
    }

    async fn find_reservation_entry(
        &mut self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError> {
        Ok(self.reservation_entry(reference_id, side))
    }

    async fn commit(self: Box<Self>) -> Result<(), CreditError> {
        let MemoryTransaction {
            mut guard,
            accounts,
            entries,
            audit_records,
        } = *self;

        if let Some(last) = entries.last() {
            guard.next_entry_id = last.entry_id;
        }
        if let Some(last) = audit_records.last() {
            guard.next_audit_id = last.audit_id;
        }
        guard.accounts.extend(accounts);
        guard.entries.extend(entries);
        guard.audit_records.extend(audit_records);
        Ok(())
    }
}
