use std::future::Future;

use crate::domain::Article;

pub mod card;

pub use card::{CardRenderer, RenderError};

/// Turns an article into PNG card bytes. Deterministic for identical input
/// and assets; failures are non-retryable.
pub trait RenderCard: Send + Sync + 'static {
    fn render(
        &self,
        article: &Article,
    ) -> impl Future<Output = Result<Vec<u8>, RenderError>> + Send;
}
