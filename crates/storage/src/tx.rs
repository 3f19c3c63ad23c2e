use async_trait::async_trait;

use crate::Result;

/// Typed transaction lifecycle.
///
/// `begin` installs the per-transaction lock acquisition timeout, so a hung
/// caller cannot wedge a row indefinitely. `commit` and `rollback` consume
/// the handle; dropping an uncommitted `Tx` is equivalent to `rollback`,
/// which makes the rollback path the default on every early return.
#[async_trait]
pub trait TxManager: Send + Sync {
    /// Transaction handle accepted by this store's mutating operations.
    type Tx: Send;

    /// Starts a transaction. Fails with [`StoreError::Unavailable`] when no
    /// transaction can be started.
    ///
    /// [`StoreError::Unavailable`]: crate::StoreError::Unavailable
    async fn begin(&self) -> Result<Self::Tx>;

    /// Commits the transaction. On failure nothing has been persisted.
    async fn commit(&self, tx: Self::Tx) -> Result<()>;

    /// Rolls the transaction back. Safe to call on any exit path.
    async fn rollback(&self, tx: Self::Tx) -> Result<()>;
}
