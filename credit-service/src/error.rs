//! Error taxonomy for the credit ledger, config resolution and admin mutations.

use crate::models::ServiceType;
use service_core::error::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CreditError {
    #[error("Insufficient credits: required {required}, available {available}")]
    InsufficientCredits { required: i64, available: i64 },

    #[error("Invalid amount: {0} (must be positive)")]
    InvalidAmount(i64),

    #[error("Invalid user status: {0}")]
    InvalidStatus(String),

    #[error("Invalid user role: {0}")]
    InvalidRole(String),

    #[error("Unknown service type: {0}")]
    InvalidServiceType(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No provider config found for service type '{service_type}'{}", model_suffix(.model))]
    NoConfigFound {
        service_type: ServiceType,
        model: Option<String>,
    },

    #[error("AI client unavailable: {0}")]
    ClientUnavailable(String),

    #[error("AI provider failure: {0}")]
    Provider(String),

    #[error("Database error: {0}")]
    Database(anyhow::Error),
}

fn model_suffix(model: &Option<String>) -> String {
    model
        .as_deref()
        .map(|m| format!(" and model '{}'", m))
        .unwrap_or_default()
}

impl CreditError {
    /// Conditions the end user can act on, as opposed to faults.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCredits { .. }
                | Self::InvalidAmount(_)
                | Self::InvalidStatus(_)
                | Self::InvalidRole(_)
                | Self::InvalidServiceType(_)
                | Self::InvalidInput(_)
                | Self::NotFound(_)
        )
    }

    /// Short label used for the error metric.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::InsufficientCredits { .. } => "insufficient_credits",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidStatus(_) => "invalid_status",
            Self::InvalidRole(_) => "invalid_role",
            Self::InvalidServiceType(_) => "invalid_service_type",
            Self::InvalidInput(_) => "invalid_input",
            Self::NotFound(_) => "not_found",
            Self::NoConfigFound { .. } => "no_config_found",
            Self::ClientUnavailable(_) => "client_unavailable",
            Self::Provider(_) => "provider_error",
            Self::Database(_) => "db_error",
        }
    }

    pub(crate) fn db(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(anyhow::anyhow!("{}: {}", context, err))
    }
}

impl From<CreditError> for AppError {
    fn from(err: CreditError) -> Self {
        match err {
            CreditError::InsufficientCredits { .. } => {
                AppError::Forbidden(anyhow::anyhow!("insufficient credits"))
            }
            CreditError::InvalidAmount(_)
            | CreditError::InvalidStatus(_)
            | CreditError::InvalidRole(_)
            | CreditError::InvalidServiceType(_)
            | CreditError::InvalidInput(_) => AppError::BadRequest(anyhow::Error::new(err)),
            CreditError::NotFound(_) => AppError::NotFound(anyhow::Error::new(err)),
            CreditError::NoConfigFound { .. } | CreditError::ClientUnavailable(_) => {
                AppError::ServiceUnavailable(err.to_string())
            }
            CreditError::Provider(msg) => AppError::BadGateway(msg),
            CreditError::Database(e) => AppError::DatabaseError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[test]
    fn insufficient_credits_maps_to_forbidden() {
        let err = CreditError::InsufficientCredits {
            required: 5,
            available: 1,
        };
        assert!(err.is_user_facing());
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn storage_faults_are_internal() {
        let err = CreditError::db("Failed to lock account", "connection reset");
        assert!(!err.is_user_facing());
        assert_eq!(err.error_type(), "db_error");
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn no_config_found_mentions_model() {
        let err = CreditError::NoConfigFound {
            service_type: ServiceType::Video,
            model: Some("veo-2".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "No provider config found for service type 'video' and model 'veo-2'"
        );
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
