//! Persistence contract for retained messages.
//!
//! Every call may complete synchronously or answer `Pending`, in which case the
//! result arrives later on the enclosed channel.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::oneshot;

use crate::error::{EngineError, Result};
use crate::retained::RetainedMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreHandle(pub u64);

pub enum StoreCall<T> {
    Completed(Result<T>),
    Pending(oneshot::Receiver<Result<T>>),
}

impl<T> StoreCall<T> {
    pub fn ok(value: T) -> Self {
        Self::Completed(Ok(value))
    }

    /// The result, if the call has already completed.
    pub fn try_completed(self) -> std::result::Result<Result<T>, oneshot::Receiver<Result<T>>> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Pending(rx) => Err(rx),
        }
    }

    pub async fn wait(self) -> Result<T> {
        match self {
            Self::Completed(result) => result,
            Self::Pending(rx) => rx
                .await
                .map_err(|_| EngineError::Store("store completion dropped".to_string()))?,
        }
    }
}

pub trait RetainedStore: Send + Sync {
    /// Persists `message` with `references` references and returns its handle.
    fn store_retained_message(&self, message: &RetainedMessage, order_id: u64, references: u32) -> StoreCall<StoreHandle>;

    /// Drops one reference to a stored message.
    fn delete_stored_message(&self, handle: StoreHandle) -> StoreCall<()>;

    fn commit(&self) -> StoreCall<()>;

    fn rollback(&self);

    /// Retained references below this order id may be garbage collected.
    fn set_min_active_order_id(&self, order_id: u64);
}

/// Store for a broker running without persistence.
#[derive(Debug, Default)]
pub struct NullStore {
    next_handle: AtomicU64,
}

impl RetainedStore for NullStore {
    fn store_retained_message(&self, _message: &RetainedMessage, _order_id: u64, _references: u32) -> StoreCall<StoreHandle> {
        StoreCall::ok(StoreHandle(self.next_handle.fetch_add(1, Ordering::Relaxed) + 1))
    }

    fn delete_stored_message(&self, _handle: StoreHandle) -> StoreCall<()> {
        StoreCall::ok(())
    }

    fn commit(&self) -> StoreCall<()> {
        StoreCall::ok(())
    }

    fn rollback(&self) {}

    fn set_min_active_order_id(&self, _order_id: u64) {}
}
