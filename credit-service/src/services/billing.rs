//! Billing orchestration for metered AI calls.
//!
//! Protocol: resolve config and price, reserve credits, build the client,
//! call it, and refund the reservation if anything after the reserve fails.
//! A successful call leaves the reservation in place as the final charge.

use crate::error::CreditError;
use crate::models::{EntryKind, ProviderConfig, ServiceType};
use crate::services::ledger::CreditLedger;
use crate::services::providers::{AiCapability, ClientFactory};
use crate::services::resolver::ConfigResolver;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

/// Credits held for one AI call together with the client that will make it.
#[derive(Clone)]
pub struct Reservation {
    pub capability: Arc<dyn AiCapability>,
    pub config: ProviderConfig,
    pub model: String,
    pub credit_cost: i64,
    /// `None` when the call is free and nothing was reserved.
    pub reference: Option<String>,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("config_id", &self.config.config_id)
            .field("model", &self.model)
            .field("credit_cost", &self.credit_cost)
            .field("reference", &self.reference)
            .finish()
    }
}

/// Output of a billed call.
#[derive(Debug, Clone)]
pub struct Billed<T> {
    pub value: T,
    pub model: String,
    pub credit_cost: i64,
    pub reference: Option<String>,
}

#[derive(Clone)]
pub struct BillingOrchestrator {
    ledger: CreditLedger,
    resolver: ConfigResolver,
    clients: Arc<dyn ClientFactory>,
}

impl BillingOrchestrator {
    pub fn new(
        ledger: CreditLedger,
        resolver: ConfigResolver,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        Self {
            ledger,
            resolver,
            clients,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    pub fn resolver(&self) -> &ConfigResolver {
        &self.resolver
    }

    /// Resolve, price and reserve for one call, then build its client.
    /// If the client cannot be built the reservation is refunded.
    #[instrument(skip(self, detail))]
    pub async fn reserve_credits(
        &self,
        user_id: i64,
        service_type: ServiceType,
        model_hint: &str,
        detail: &str,
    ) -> Result<Reservation, CreditError> {
        let quote = self
            .resolver
            .resolve_price(service_type, model_hint, user_id)
            .await?;
        let model = quote.execution.model.clone();

        let reference = self
            .ledger
            .reserve(user_id, service_type, &model, quote.credit_cost, detail)
            .await?;

        let capability = match self.clients.build(&quote.execution.config, &model) {
            Ok(capability) => capability,
            Err(e) => {
                let err = CreditError::from(e);
                self.refund_quietly(reference.as_deref(), &err).await;
                return Err(err);
            }
        };

        Ok(Reservation {
            capability,
            config: quote.execution.config,
            model,
            credit_cost: quote.credit_cost,
            reference,
        })
    }

    /// Reserve with `model_hint`; if that fails to resolve or to reach a
    /// client and the caller pinned no model, retry once without a hint.
    pub async fn reserve_with_fallback(
        &self,
        user_id: i64,
        service_type: ServiceType,
        pinned_model: &str,
        model_hint: &str,
        detail: &str,
    ) -> Result<Reservation, CreditError> {
        let first = self
            .reserve_credits(user_id, service_type, model_hint, detail)
            .await;

        match first {
            Err(err @ (CreditError::NoConfigFound { .. } | CreditError::ClientUnavailable(_)))
                if pinned_model.trim().is_empty() && !model_hint.trim().is_empty() =>
            {
                warn!(
                    user_id = user_id,
                    model_hint = %model_hint,
                    error = %err,
                    "Preferred model unavailable, falling back to default selection"
                );
                self.reserve_credits(user_id, service_type, "", detail).await
            }
            other => other,
        }
    }

    /// Refund a reservation. Empty, unknown or already refunded references
    /// are no-ops.
    pub async fn refund_credits(&self, reference: &str) -> Result<(), CreditError> {
        self.ledger.refund(reference).await
    }

    /// Charge fixed-price work directly.
    pub async fn consume_credits(
        &self,
        user_id: i64,
        cost: i64,
        kind: EntryKind,
        detail: &str,
    ) -> Result<(), CreditError> {
        self.ledger.consume(user_id, cost, kind, detail).await
    }

    /// Run `call` against a reservation. On failure the reservation is
    /// refunded and the call's own error is returned.
    pub async fn execute<T, F, Fut>(
        &self,
        reservation: Reservation,
        call: F,
    ) -> Result<Billed<T>, CreditError>
    where
        F: FnOnce(Arc<dyn AiCapability>, String) -> Fut,
        Fut: Future<Output = Result<T, CreditError>>,
    {
        match call(reservation.capability.clone(), reservation.model.clone()).await {
            Ok(value) => {
                info!(
                    model = %reservation.model,
                    credit_cost = reservation.credit_cost,
                    reference = ?reservation.reference,
                    "Billed AI call succeeded"
                );
                Ok(Billed {
                    value,
                    model: reservation.model,
                    credit_cost: reservation.credit_cost,
                    reference: reservation.reference,
                })
            }
            Err(err) => {
                self.refund_quietly(reservation.reference.as_deref(), &err)
                    .await;
                Err(err)
            }
        }
    }

    /// Reserve (with fallback) and execute in one step.
    pub async fn run<T, F, Fut>(
        &self,
        user_id: i64,
        service_type: ServiceType,
        pinned_model: &str,
        model_hint: &str,
        detail: &str,
        call: F,
    ) -> Result<Billed<T>, CreditError>
    where
        F: FnOnce(Arc<dyn AiCapability>, String) -> Fut,
        Fut: Future<Output = Result<T, CreditError>>,
    {
        let reservation = self
            .reserve_with_fallback(user_id, service_type, pinned_model, model_hint, detail)
            .await?;
        self.execute(reservation, call).await
    }

    async fn refund_quietly(&self, reference: Option<&str>, cause: &CreditError) {
        let Some(reference) = reference else {
            return;
        };
        if let Err(refund_err) = self.ledger.refund(reference).await {
            error!(
                reference_id = %reference,
                cause = %cause,
                error = %refund_err,
                "Failed to refund reservation after AI call failure"
            );
        }
    }
}
