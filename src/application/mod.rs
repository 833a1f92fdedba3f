// Application layer: use cases over the repository.
// The balance-mutating operations live in account_ledger (recharges and
// deductions) and spend (ad spend); statistics is read-only.

mod account_ledger;
pub mod error;
mod reconciliation;
mod service;
mod spend;
mod statistics;

pub use account_ledger::*;
pub use error::*;
pub use service::{parse_amount, LedgerService};
pub use spend::*;
pub use statistics::*;
