use thiserror::Error;

use crate::domain::{Cents, NonPositiveAmount};

/// Broad classes of failure, used by whatever layer surfaces errors to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input
    Validation,
    /// A referenced customer, ad, spend log or user does not exist
    NotFound,
    /// Spend exceeds the customer's balance
    InsufficientBalance,
    /// The store was contended; the caller may retry
    Conflict,
    /// The caller's role does not permit the operation
    Forbidden,
    /// Store or transaction failure
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::NotFound => "not_found",
            ErrorKind::InsufficientBalance => "insufficient_balance",
            ErrorKind::Conflict => "conflict",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Customer not found: {0}")]
    CustomerNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Ad not found: {0}")]
    AdNotFound(String),

    #[error("Spend log not found: {0}")]
    SpendLogNotFound(String),

    #[error("Insufficient balance for customer {customer}: balance {balance}, required {required}")]
    InsufficientBalance {
        customer: String,
        balance: Cents,
        required: Cents,
    },

    #[error("Operation '{action}' requires an admin")]
    Forbidden { action: &'static str },

    #[error("Store is busy, retry the operation: {0}")]
    Conflict(String),

    #[error("Internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl AppError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation { .. } | AppError::UsernameTaken(_) => ErrorKind::Validation,
            AppError::CustomerNotFound(_)
            | AppError::UserNotFound(_)
            | AppError::AdNotFound(_)
            | AppError::SpendLogNotFound(_) => ErrorKind::NotFound,
            AppError::InsufficientBalance { .. } => ErrorKind::InsufficientBalance,
            AppError::Forbidden { .. } => ErrorKind::Forbidden,
            AppError::Conflict(_) => ErrorKind::Conflict,
            AppError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<NonPositiveAmount> for AppError {
    fn from(err: NonPositiveAmount) -> Self {
        AppError::validation("amount", err.to_string())
    }
}

/// SQLite result codes meaning another connection holds the lock:
/// SQLITE_BUSY, SQLITE_LOCKED and their extended variants.
fn is_contention(code: &str) -> bool {
    code.parse::<i32>()
        .map(|code| matches!(code & 0xff, 5 | 6))
        .unwrap_or(false)
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        let busy = err.chain().any(|cause| {
            matches!(
                cause.downcast_ref::<sqlx::Error>(),
                Some(sqlx::Error::Database(db)) if db.code().is_some_and(|code| is_contention(&code))
            )
        });

        if busy {
            AppError::Conflict(format!("{:#}", err))
        } else {
            AppError::Internal(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_codes() {
        assert!(is_contention("5"));
        assert!(is_contention("6"));
        // SQLITE_BUSY_SNAPSHOT
        assert!(is_contention("517"));
        assert!(!is_contention("19"));
        assert!(!is_contention("not-a-code"));
    }

    #[test]
    fn test_plain_errors_are_internal() {
        let err = AppError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_kinds() {
        assert_eq!(
            AppError::validation("amount", "must be positive").kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            AppError::AdNotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            AppError::InsufficientBalance {
                customer: "acme".into(),
                balance: 5000,
                required: 8000
            }
            .kind(),
            ErrorKind::InsufficientBalance
        );
        assert_eq!(
            AppError::Forbidden { action: "recharge" }.kind(),
            ErrorKind::Forbidden
        );
    }

    #[test]
    fn test_non_positive_amount_is_validation() {
        let err = AppError::from(NonPositiveAmount(0));
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "Invalid amount: must be positive, got 0.00");
    }

    #[test]
    fn test_validation_names_field() {
        let err = AppError::validation("platform", "must not be empty");
        assert_eq!(err.to_string(), "Invalid platform: must not be empty");
    }
}
