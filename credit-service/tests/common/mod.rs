//! Common test utilities for credit-service integration tests.
#![allow(dead_code)]

use credit_service::config::BillingConfig;
use credit_service::models::{
    Account, ConfigOwner, NewAccount, NewProviderConfig, ProviderConfig, ServiceType,
};
use credit_service::services::providers::mock::{MockBehavior, MockClientFactory};
use credit_service::services::MemoryStore;
use credit_service::CreditServices;
use secrecy::Secret;
use std::sync::{Arc, Once};

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,credit_service=debug,sqlx=warn")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub const ADMIN_ID: i64 = 1;

/// Services over a fresh in-memory store.
pub struct TestContext {
    pub store: MemoryStore,
    pub services: CreditServices,
    pub clients: Arc<MockClientFactory>,
}

impl TestContext {
    pub async fn seed_user(&self, user_id: i64, balance: i64) -> Account {
        self.store
            .seed_account(&NewAccount::user(user_id), balance)
            .await
    }

    pub async fn balance(&self, user_id: i64) -> i64 {
        self.services
            .ledger
            .account(user_id)
            .await
            .expect("account should exist")
            .balance
    }

    /// Sum of every ledger entry amount for the user.
    pub async fn entry_sum(&self, user_id: i64) -> i64 {
        let mut sum = 0;
        let mut page = 1;
        loop {
            let result = self
                .services
                .ledger
                .list_entries(Some(user_id), page, 100)
                .await
                .expect("list entries");
            sum += result.entries.iter().map(|e| e.amount).sum::<i64>();
            if page * result.page_size >= result.total {
                return sum;
            }
            page += 1;
        }
    }

    pub async fn add_config(
        &self,
        owner: ConfigOwner,
        service_type: ServiceType,
        models: &[&str],
        priority: i32,
        credit_cost: i64,
    ) -> ProviderConfig {
        self.services
            .configs
            .create(owner, &new_config(service_type, models, priority, credit_cost))
            .await
            .expect("create config")
    }

    pub async fn add_default_platform_config(
        &self,
        service_type: ServiceType,
        models: &[&str],
        credit_cost: i64,
    ) -> ProviderConfig {
        let mut input = new_config(service_type, models, 0, credit_cost);
        input.is_default = true;
        self.services
            .configs
            .create(ConfigOwner::Platform, &input)
            .await
            .expect("create config")
    }
}

pub fn new_config(
    service_type: ServiceType,
    models: &[&str],
    priority: i32,
    credit_cost: i64,
) -> NewProviderConfig {
    NewProviderConfig {
        service_type,
        provider: "openai".to_string(),
        name: format!("{}-{}", service_type, models.first().copied().unwrap_or("any")),
        base_url: "https://api.example.com/v1".to_string(),
        secret: Secret::new("sk-test".to_string()),
        models: models.iter().map(|m| m.to_string()).collect(),
        priority,
        is_default: false,
        is_active: true,
        credit_cost,
        settings: None,
    }
}

pub fn spawn_services() -> TestContext {
    spawn_services_with(MockClientFactory::new(MockBehavior::Echo))
}

pub fn spawn_services_with(factory: MockClientFactory) -> TestContext {
    init_tracing();

    let store = MemoryStore::new();
    let clients = Arc::new(factory);
    let services = CreditServices::new(
        Arc::new(store.clone()),
        clients.clone(),
        &BillingConfig::default(),
    );

    TestContext {
        store,
        services,
        clients,
    }
}
