use events::DecodeError;
use storage::StoreError;
use thiserror::Error;

/// Errors raised while processing a delivery.
///
/// Decode failures are poison (non-requeuing nack); store failures are
/// transient and requeue the delivery for another attempt.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
