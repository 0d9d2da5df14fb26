//! Service-level error type.
//!
//! Only `Connectivity` and `Config` are fatal; everything raised inside a
//! cycle is logged by the scheduler and retried on the next tick.

use thiserror::Error;

use crate::store::StoreError;
use crate::translate::TranslateError;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Store or API unusable at startup
    #[error("connectivity error: {0}")]
    Connectivity(String),

    #[error("configuration error: {0}")]
    Config(String),

    /// Queue count/fetch failed; nothing was modified
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Bulk update or queue delete failed; affected items stay queued
    #[error("write-back failed: {0}")]
    WriteBack(#[source] StoreError),

    #[error("translator setup failed: {0}")]
    Translator(#[from] TranslateError),
}

impl SyncError {
    /// Whether the process should stop rather than retry on the next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Connectivity(_) | SyncError::Config(_) | SyncError::Translator(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
