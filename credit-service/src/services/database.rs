//! PostgreSQL backend for credit-service.

use crate::error::CreditError;
use crate::models::{
    Account, AuditRecord, ConfigOwner, EntrySide, LedgerEntry, ListAuditFilter, NewAccount,
    NewAuditRecord, NewLedgerEntry, NewProviderConfig, ProviderConfig, ProviderConfigRow,
    ServiceType, UpdateProviderConfig, UserRole, UserStatus,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{CreditStore, StoreTransaction};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};

const ACCOUNT_COLUMNS: &str = "user_id, balance, status, role, created_utc, updated_utc";

const ENTRY_COLUMNS: &str =
    "entry_id, user_id, amount, kind, reference_id, service_type, model, description, created_utc";

const AUDIT_COLUMNS: &str = "audit_id, actor_id, action, target_type, target_id, before_json, after_json, ip, user_agent, created_utc";

const CONFIG_COLUMNS: &str = "config_id, owner_user_id, service_type, provider, name, base_url, secret, models, priority, is_default, is_active, credit_cost, settings, created_utc, updated_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "credit-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, CreditError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| CreditError::db("Failed to connect", e))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), CreditError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| CreditError::db("Migration failed", e))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl CreditStore for Database {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, CreditError> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CreditError::db("Failed to begin transaction", e))?;
        Ok(Box::new(PgStoreTransaction { tx }))
    }

    /// Check database health.
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), CreditError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| CreditError::db("Health check failed", e))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Account Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(user_id = input.user_id))]
    async fn create_account(&self, input: &NewAccount) -> Result<Account, CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, balance, status, role)
            VALUES ($1, 0, $2, $3)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(input.user_id)
        .bind(input.status.as_str())
        .bind(input.role.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CreditError::Database(anyhow::anyhow!(
                    "Account for user {} already exists",
                    input.user_id
                ))
            }
            _ => CreditError::db("Failed to create account", e),
        })?;

        timer.observe_duration();

        info!(user_id = account.user_id, role = %account.role, "Account opened");

        Ok(account)
    }

    #[instrument(skip(self))]
    async fn get_account(&self, user_id: i64) -> Result<Option<Account>, CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_account"])
            .start_timer();

        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to get account", e))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self))]
    async fn list_accounts(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<Account>, i64), CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_accounts"])
            .start_timer();

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CreditError::db("Failed to count accounts", e))?;

        let accounts = sqlx::query_as::<_, Account>(&format!(
            r#"
            SELECT {ACCOUNT_COLUMNS}
            FROM accounts
            ORDER BY created_utc DESC, user_id DESC
            LIMIT $1 OFFSET $2
            "#
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to list accounts", e))?;

        timer.observe_duration();

        Ok((accounts, total))
    }

    // -------------------------------------------------------------------------
    // Ledger and Audit Reads
    // -------------------------------------------------------------------------

    #[instrument(skip(self))]
    async fn list_entries(
        &self,
        user_id: Option<i64>,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<LedgerEntry>, i64), CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_entries"])
            .start_timer();

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM ledger_entries WHERE ($1::bigint IS NULL OR user_id = $1)",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to count entries", e))?;

        let entries = sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            SELECT {ENTRY_COLUMNS}
            FROM ledger_entries
            WHERE ($1::bigint IS NULL OR user_id = $1)
            ORDER BY entry_id DESC
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to list entries", e))?;

        timer.observe_duration();

        Ok((entries, total))
    }

    #[instrument(skip(self))]
    async fn find_reservation_entry(
        &self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError> {
        sqlx::query_as::<_, LedgerEntry>(&reservation_entry_query(side))
            .bind(reference_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| CreditError::db("Failed to find reservation entry", e))
    }

    #[instrument(skip(self, filter))]
    async fn list_audit_records(
        &self,
        filter: &ListAuditFilter,
        limit: i64,
        offset: i64,
    ) -> Result<(Vec<AuditRecord>, i64), CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_audit_records"])
            .start_timer();

        let predicate = r#"
            ($1::bigint IS NULL OR actor_id = $1)
              AND ($2::varchar IS NULL OR action = $2)
              AND ($3::varchar IS NULL OR target_type = $3)
              AND ($4::varchar IS NULL OR target_id = $4)
        "#;

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM audit_records WHERE {predicate}"
        ))
        .bind(filter.actor_id)
        .bind(filter.action.as_deref())
        .bind(filter.target_type.as_deref())
        .bind(filter.target_id.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to count audit records", e))?;

        let records = sqlx::query_as::<_, AuditRecord>(&format!(
            r#"
            SELECT {AUDIT_COLUMNS}
            FROM audit_records
            WHERE {predicate}
            ORDER BY audit_id DESC
            LIMIT $5 OFFSET $6
            "#
        ))
        .bind(filter.actor_id)
        .bind(filter.action.as_deref())
        .bind(filter.target_type.as_deref())
        .bind(filter.target_id.as_deref())
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to list audit records", e))?;

        timer.observe_duration();

        Ok((records, total))
    }

    // -------------------------------------------------------------------------
    // Provider Config Operations
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(service_type = %input.service_type, provider = %input.provider))]
    async fn create_config(
        &self,
        owner: ConfigOwner,
        input: &NewProviderConfig,
    ) -> Result<ProviderConfig, CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_config"])
            .start_timer();

        let row = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            r#"
            INSERT INTO provider_configs
                (owner_user_id, service_type, provider, name, base_url, secret, models,
                 priority, is_default, is_active, credit_cost, settings)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(owner.owner_id())
        .bind(input.service_type.as_str())
        .bind(&input.provider)
        .bind(&input.name)
        .bind(&input.base_url)
        .bind(input.secret.expose_secret())
        .bind(&input.models)
        .bind(input.priority)
        .bind(input.is_default)
        .bind(input.is_active)
        .bind(input.credit_cost)
        .bind(&input.settings)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to create provider config", e))?;

        timer.observe_duration();

        info!(config_id = row.config_id, "Provider config created");

        Ok(row.into())
    }

    #[instrument(skip(self))]
    async fn list_configs(
        &self,
        owner: ConfigOwner,
        service_type: Option<ServiceType>,
        active_only: bool,
    ) -> Result<Vec<ProviderConfig>, CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_configs"])
            .start_timer();

        let rows = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            r#"
            SELECT {CONFIG_COLUMNS}
            FROM provider_configs
            WHERE owner_user_id = $1
              AND ($2::varchar IS NULL OR service_type = $2)
              AND ($3 = FALSE OR is_active)
            ORDER BY priority DESC, config_id ASC
            "#
        ))
        .bind(owner.owner_id())
        .bind(service_type.map(|s| s.as_str()))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| CreditError::db("Failed to list provider configs", e))?;

        timer.observe_duration();

        Ok(rows.into_iter().map(ProviderConfig::from).collect())
    }

    #[instrument(skip(self, patch))]
    async fn update_config(
        &self,
        owner: ConfigOwner,
        config_id: i64,
        patch: &UpdateProviderConfig,
    ) -> Result<Option<ProviderConfig>, CreditError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_config"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CreditError::db("Failed to begin transaction", e))?;

        let existing = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            r#"
            SELECT {CONFIG_COLUMNS}
            FROM provider_configs
            WHERE config_id = $1 AND owner_user_id = $2
            FOR UPDATE
            "#
        ))
        .bind(config_id)
        .bind(owner.owner_id())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| CreditError::db("Failed to load provider config", e))?;

        let mut config: ProviderConfig = match existing {
            Some(row) => row.into(),
            None => return Ok(None),
        };
        patch.apply_to(&mut config);

        let row = sqlx::query_as::<_, ProviderConfigRow>(&format!(
            r#"
            UPDATE provider_configs
            SET provider = $2, name = $3, base_url = $4, secret = $5, models = $6,
                priority = $7, is_default = $8, is_active = $9, credit_cost = $10,
                settings = $11, updated_utc = NOW()
            WHERE config_id = $1
            RETURNING {CONFIG_COLUMNS}
            "#
        ))
        .bind(config_id)
        .bind(&config.provider)
        .bind(&config.name)
        .bind(&config.base_url)
        .bind(config.secret.expose_secret())
        .bind(&config.models)
        .bind(config.priority)
        .bind(config.is_default)
        .bind(config.is_active)
        .bind(config.credit_cost)
        .bind(&config.settings)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| CreditError::db("Failed to update provider config", e))?;

        tx.commit()
            .await
            .map_err(|e| CreditError::db("Failed to commit transaction", e))?;

        timer.observe_duration();

        Ok(Some(row.into()))
    }

    #[instrument(skip(self))]
    async fn delete_config(&self, owner: ConfigOwner, config_id: i64) -> Result<bool, CreditError> {
        let result =
            sqlx::query("DELETE FROM provider_configs WHERE config_id = $1 AND owner_user_id = $2")
                .bind(config_id)
                .bind(owner.owner_id())
                .execute(&self.pool)
                .await
                .map_err(|e| CreditError::db("Failed to delete provider config", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn reservation_entry_query(side: EntrySide) -> String {
    let sign = match side {
        EntrySide::Debit => "amount < 0",
        EntrySide::Credit => "amount > 0",
    };
    format!(
        r#"
        SELECT {ENTRY_COLUMNS}
        FROM ledger_entries
        WHERE reference_id = $1 AND {sign}
        ORDER BY entry_id DESC
        LIMIT 1
        "#
    )
}

/// A PostgreSQL transaction. Row locks are released on commit or rollback.
pub struct PgStoreTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PgStoreTransaction {
    async fn lock_account(&mut self, user_id: i64) -> Result<Option<Account>, CreditError> {
        sqlx::query_as::<_, Account>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1 FOR UPDATE"
        ))
        .bind(user_id)
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| CreditError::db("Failed to lock account", e))
    }

    async fn set_balance(&mut self, user_id: i64, balance: i64) -> Result<(), CreditError> {
        sqlx::query("UPDATE accounts SET balance = $2, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(balance)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| CreditError::db("Failed to update balance", e))?;
        Ok(())
    }

    async fn set_status(&mut self, user_id: i64, status: UserStatus) -> Result<(), CreditError> {
        sqlx::query("UPDATE accounts SET status = $2, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| CreditError::db("Failed to update status", e))?;
        Ok(())
    }

    async fn set_role(&mut self, user_id: i64, role: UserRole) -> Result<(), CreditError> {
        sqlx::query("UPDATE accounts SET role = $2, updated_utc = NOW() WHERE user_id = $1")
            .bind(user_id)
            .bind(role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|e| CreditError::db("Failed to update role", e))?;
        Ok(())
    }

    async fn insert_entry(&mut self, entry: NewLedgerEntry) -> Result<LedgerEntry, CreditError> {
        sqlx::query_as::<_, LedgerEntry>(&format!(
            r#"
            INSERT INTO ledger_entries (user_id, amount, kind, reference_id, service_type, model, description)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ENTRY_COLUMNS}
            "#
        ))
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.kind.as_str())
        .bind(entry.reference_id.as_deref())
        .bind(entry.service_type.map(|s| s.as_str()))
        .bind(entry.model.as_deref())
        .bind(entry.description.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                CreditError::Database(anyhow::anyhow!(
                    "Duplicate ledger entry for reference {:?}",
                    entry.reference_id
                ))
            }
            _ => CreditError::db("Failed to insert ledger entry", e),
        })
    }

    async fn insert_audit(&mut self, record: NewAuditRecord) -> Result<AuditRecord, CreditError> {
        sqlx::query_as::<_, AuditRecord>(&format!(
            r#"
            INSERT INTO audit_records (actor_id, action, target_type, target_id, before_json, after_json, ip, user_agent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {AUDIT_COLUMNS}
            "#
        ))
        .bind(record.actor_id)
        .bind(&record.action)
        .bind(&record.target_type)
        .bind(&record.target_id)
        .bind(&record.before_json)
        .bind(&record.after_json)
        .bind(record.ip.as_deref())
        .bind(record.user_agent.as_deref())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| CreditError::db("Failed to insert audit record", e))
    }

    async fn find_reservation_entry(
        &mut self,
        reference_id: &str,
        side: EntrySide,
    ) -> Result<Option<LedgerEntry>, CreditError> {
        sqlx::query_as::<_, LedgerEntry>(&reservation_entry_query(side))
            .bind(reference_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|e| CreditError::db("Failed to find reservation entry", e))
    }

    async fn commit(self: Box<Self>) -> Result<(), CreditError> {
        self.tx
            .commit()
            .await
            .map_err(|e| CreditError::db("Failed to commit transaction", e))
    }
}
