mod ad;
mod money;
mod reconciliation;
mod spend_log;
mod transaction;
mod user;
mod window;

pub use ad::*;
pub use money::*;
pub use reconciliation::*;
pub use spend_log::*;
pub use transaction::*;
pub use user::*;
pub use window::*;
