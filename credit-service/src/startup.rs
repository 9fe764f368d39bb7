//! Application startup and lifecycle management.

use crate::config::{BillingConfig, CreditConfig};
use crate::services::providers::{ClientFactory, DisabledClientFactory};
use crate::services::{
    get_metrics, init_metrics, AdminService, AuditService, BillingOrchestrator, ConfigResolver,
    CreditLedger, CreditStore, Database, MemoryStore, ProviderConfigService, ScriptPolisher,
};
use axum::{
    extract::State, http::StatusCode, middleware, response::IntoResponse, routing::get, Json,
    Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Every credit service wired over one store.
#[derive(Clone)]
pub struct CreditServices {
    pub store: Arc<dyn CreditStore>,
    pub audit: AuditService,
    pub ledger: CreditLedger,
    pub resolver: ConfigResolver,
    pub configs: ProviderConfigService,
    pub admin: AdminService,
    pub billing: BillingOrchestrator,
    pub polisher: ScriptPolisher,
}

impl CreditServices {
    pub fn new(
        store: Arc<dyn CreditStore>,
        clients: Arc<dyn ClientFactory>,
        billing: &BillingConfig,
    ) -> Self {
        let audit = AuditService::new(store.clone());
        let ledger = CreditLedger::new(store.clone(), audit.clone(), billing.costs);
        let resolver = ConfigResolver::new(store.clone());
        let configs = ProviderConfigService::new(store.clone(), resolver.clone());
        let admin = AdminService::new(store.clone(), audit.clone(), ledger.clone());
        let orchestrator = BillingOrchestrator::new(ledger.clone(), resolver.clone(), clients);
        let polisher = ScriptPolisher::new(
            orchestrator.clone(),
            billing.default_text_model.clone(),
            billing.prompt_language,
        );

        Self {
            store,
            audit,
            ledger,
            resolver,
            configs,
            admin,
            billing: orchestrator,
            polisher,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: CreditConfig,
    pub services: CreditServices,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.services.store.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": state.config.service_name,
                    "version": state.config.service_version
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": state.config.service_name,
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.services.store.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Operational router: health, readiness and metrics.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CreditConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true, Arc::new(DisabledClientFactory)).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: CreditConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false, Arc::new(DisabledClientFactory)).await
    }

    /// Build with a caller-supplied provider client factory.
    pub async fn build_with_clients(
        config: CreditConfig,
        clients: Arc<dyn ClientFactory>,
    ) -> Result<Self, AppError> {
        Self::build_internal(config, true, clients).await
    }

    async fn build_internal(
        config: CreditConfig,
        run_migrations: bool,
        clients: Arc<dyn ClientFactory>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let store: Arc<dyn CreditStore> = match &config.database {
            Some(database) => {
                let db = Database::new(
                    &database.url,
                    database.max_connections,
                    database.min_connections,
                )
                .await
                .map_err(|e| {
                    tracing::error!(error = %e, "Failed to connect to PostgreSQL");
                    AppError::from(e)
                })?;

                if run_migrations {
                    db.run_migrations().await.map_err(|e| {
                        tracing::error!(error = %e, "Failed to run migrations");
                        AppError::from(e)
                    })?;
                }

                Arc::new(db)
            }
            None => {
                tracing::warn!("DATABASE_URL not set - using in-memory store, state is not durable");
                Arc::new(MemoryStore::new())
            }
        };

        let services = CreditServices::new(store, clients, &config.billing);

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Credit service listener bound");

        Ok(Self {
            port,
            listener,
            state: AppState { config, services },
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get the wired services.
    pub fn services(&self) -> &CreditServices {
        &self.state.services
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = router(self.state.clone());

        tracing::info!(
            service = %self.state.config.service_name,
            version = %self.state.config.service_version,
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await.map_err(|e| {
            tracing::error!(error = %e, "HTTP server error");
            std::io::Error::other(format!("HTTP server error: {}", e))
        })
    }
}
