//! Summarizer capability used by pruning to promote evicted content.
//!
//! A summarizer looks at messages about to leave the short-term log and may
//! propose a single `(key, value)` fact worth keeping. Returning `Ok(None)`
//! is a refusal, not an error.

use std::future::Future;
use std::pin::Pin;

use recall_types::error::ProviderError;
use recall_types::memory::Promotion;
use recall_types::message::Message;

/// Trait for turning evicted messages into a long-term fact.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait Summarizer: Send + Sync {
    fn summarize(
        &self,
        messages: &[Message],
    ) -> impl Future<Output = Result<Option<Promotion>, ProviderError>> + Send;
}

/// Object-safe version of [`Summarizer`] with boxed futures.
pub trait SummarizerDyn: Send + Sync {
    fn summarize_boxed<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> Pin<Box<dyn Future<Output = Result<Option<Promotion>, ProviderError>> + Send + 'a>>;
}

impl<T: Summarizer> SummarizerDyn for T {
    fn summarize_boxed<'a>(
        &'a self,
        messages: &'a [Message],
    ) -> Pin<Box<dyn Future<Output = Result<Option<Promotion>, ProviderError>> + Send + 'a>> {
        Box::pin(self.summarize(messages))
    }
}

/// Type-erased summarizer registered once at construction time.
pub struct BoxSummarizer {
    inner: Box<dyn SummarizerDyn + Send + Sync>,
}

impl BoxSummarizer {
    pub fn new<T: Summarizer + 'static>(summarizer: T) -> Self {
        Self {
            inner: Box::new(summarizer),
        }
    }

    pub async fn summarize(&self, messages: &[Message]) -> Result<Option<Promotion>, ProviderError> {
        self.inner.summarize_boxed(messages).await
    }
}
