//! Translation: the content-addressed cache, the batch API client and the
//! reconciler that turns a raw numbered response back into one value per
//! requested text.

pub mod cache;
pub mod deepseek;
pub mod reconcile;

use async_trait::async_trait;
use thiserror::Error;

pub use cache::{content_hash, ContentCache};
pub use deepseek::DeepSeekClient;
pub use reconcile::{NumberedLineParser, Reconciled, ResponseParser, ResponseReconciler};

#[derive(Error, Debug)]
pub enum TranslateError {
    #[error("API error: {0}")]
    Api(String),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("translation timeout")]
    Timeout,

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TranslateError {
    /// Whether another attempt of the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TranslateError::Server { .. }
                | TranslateError::RateLimited { .. }
                | TranslateError::Timeout
        )
    }
}

/// A backend that translates an ordered batch of distinct texts in one call
/// and hands back the raw response text.
#[async_trait]
pub trait BatchTranslator: Send + Sync {
    async fn translate_batch(&self, texts: &[String]) -> Result<String, TranslateError>;
}
