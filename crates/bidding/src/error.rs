use common::ItemId;
use storage::StoreError;
use thiserror::Error;

/// Bid placement failures.
///
/// A closed set of typed variants, so the RPC layer can map each to a
/// stable client-observable code. Validation variants are never retried;
/// `LockTimeout` means "try again"; `TransactionFailed` guarantees no
/// external effect occurred.
#[derive(Debug, Error)]
pub enum BidError {
    #[error("item {0} not found")]
    ItemNotFound(ItemId),

    #[error("seller cannot bid on their own item")]
    SellerCannotBid,

    #[error("bid amount must be positive, got {0}")]
    InvalidBidAmount(i64),

    #[error("bid of {amount} does not beat the current highest bid of {current_highest}")]
    BidTooLow { amount: i64, current_highest: i64 },

    #[error("auction has ended")]
    AuctionEnded,

    #[error("item is locked by another bidder, try again")]
    LockTimeout,

    #[error("transaction failed, the bid was not recorded")]
    TransactionFailed,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for BidError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::LockTimeout => BidError::LockTimeout,
            StoreError::TransactionFailed(reason) => {
                tracing::error!(%reason, "bid transaction failed to commit");
                BidError::TransactionFailed
            }
            other => BidError::Store(other),
        }
    }
}
