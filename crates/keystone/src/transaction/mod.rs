//! Transactions: buffered writes, overlay reads and atomic commit.
//!
//! A session holds at most one open [`Transaction`]. Writes accumulate in its
//! [`WriteSet`] and reach the backend as a single `apply` call on commit; a
//! rollback, a failed commit or a session close drops them unseen.

mod coordinator;
mod handle;
mod write_set;

pub use coordinator::TransactionCoordinator;
pub use handle::Transaction;
pub use write_set::WriteSet;
