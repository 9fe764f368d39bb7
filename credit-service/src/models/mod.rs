//! Domain models for credit-service.

mod account;
mod audit;
mod entry;
mod provider_config;

pub use account::{Account, NewAccount, UserRole, UserStatus};
pub use audit::{
    ActorMeta, AuditRecord, ListAuditFilter, NewAuditRecord, ACTION_RECHARGE, ACTION_UPDATE_ROLE,
    ACTION_UPDATE_STATUS, TARGET_USER,
};
pub use entry::{
    EntryKind, EntryPage, EntrySide, LedgerEntry, NewLedgerEntry, ServiceType,
    MAX_DESCRIPTION_CHARS,
};
pub(crate) use provider_config::ProviderConfigRow;
pub use provider_config::{
    ConfigOwner, NewProviderConfig, ProviderConfig, ProviderConfigView, UpdateProviderConfig,
    PLATFORM_OWNER_ID,
};
