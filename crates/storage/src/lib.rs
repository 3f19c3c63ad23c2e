//! Transaction management shared by every persistence adapter.
//!
//! The [`TxManager`] trait is the sole way to obtain a transaction handle;
//! all mutating repository operations accept one. Dropping an uncommitted
//! transaction rolls it back, so every non-commit exit path is safe by
//! construction.

pub mod error;
pub mod postgres;
pub mod tx;

pub use error::{Result, StoreError};
pub use postgres::{PgSession, PgTx, map_row_error};
pub use tx::TxManager;
