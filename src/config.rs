use std::time::Duration;

use chrono::FixedOffset;

use crate::application::AppError;
use crate::domain::{reference_offset, DEFAULT_UTC_OFFSET_HOURS};

pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;
pub const DEFAULT_USER: &str = "admin";

/// Runtime settings for the ledger service.
#[derive(Debug, Clone)]
pub struct Settings {
    /// SQLite database file path
    pub database: String,
    /// Hours east of UTC of the timezone that defines "today"
    pub utc_offset_hours: i32,
    /// How long a writer waits for the store's write lock
    pub busy_timeout: Duration,
    /// Username the CLI acts as
    pub user: String,
}

impl Settings {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
            user: DEFAULT_USER.to_string(),
        }
    }

    pub fn with_utc_offset_hours(mut self, hours: i32) -> Self {
        self.utc_offset_hours = hours;
        self
    }

    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    pub fn reference_offset(&self) -> Result<FixedOffset, AppError> {
        reference_offset(self.utc_offset_hours).ok_or_else(|| {
            AppError::validation(
                "utc_offset",
                format!(
                    "{} hours is outside -12..=14",
                    self.utc_offset_hours
                ),
            )
        })
    }
}
