pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod logging;
pub mod storage;

pub use application::{AppError, ErrorKind, LedgerService};
pub use config::Settings;
pub use domain::*;
pub use storage::Repository;
