//! Billing error types

use acerto_shared::{BillingStatus, UnknownVariant};

pub type BillingResult<T> = Result<T, BillingError>;

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// The plan (or its billing period) an operation depends on cannot be resolved
    #[error("Invalid plan reference: {0}")]
    InvalidPlanReference(String),

    /// A billing date or time-of-day is not well formed
    #[error("Invalid date: {0}")]
    InvalidDate(String),

    /// A local time has no instant in the business timezone
    #[error("Timezone conversion failed: {0}")]
    TimezoneConversion(String),

    /// Only `active` and `inactive` can be assigned directly
    #[error("Status '{0}' cannot be assigned directly")]
    StatusNotAssignable(BillingStatus),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl BillingError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            BillingError::InvalidPlanReference(_) => "invalid_plan_reference",
            BillingError::InvalidDate(_) => "invalid_date",
            BillingError::TimezoneConversion(_) => "timezone_conversion_failure",
            BillingError::StatusNotAssignable(_) => "status_not_assignable",
            BillingError::NotFound(_) => "not_found",
            BillingError::InvalidInput(_) => "invalid_input",
            BillingError::Database(_) => "database_error",
        }
    }
}

impl From<sqlx::Error> for BillingError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => BillingError::NotFound("row not found".to_string()),
            other => BillingError::Database(other.to_string()),
        }
    }
}

impl From<UnknownVariant> for BillingError {
    fn from(e: UnknownVariant) -> Self {
        BillingError::Database(e.to_string())
    }
}
