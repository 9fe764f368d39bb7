//! Services module for credit-service.

pub mod admin;
pub mod audit;
pub mod billing;
pub mod configs;
pub mod database;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod pagination;
pub mod polish;
pub mod providers;
pub mod resolver;
pub mod skills;
pub mod store;

pub use admin::{AccountPage, AdminService};
pub use audit::{AuditPage, AuditService};
pub use billing::{Billed, BillingOrchestrator, Reservation};
pub use configs::{PricingItem, PricingOverview, ProviderConfigService};
pub use database::Database;
pub use ledger::{billing_detail, CreditLedger, FixedCosts};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics, record_error, record_operation};
pub use polish::{PolishedScript, ScriptPolisher};
pub use resolver::{ConfigResolver, ExecutionChoice, PriceQuote};
pub use store::{CreditStore, StoreTransaction};
