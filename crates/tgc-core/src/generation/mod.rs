//! Text generation port.

pub mod retry;

use async_trait::async_trait;

use crate::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommentRequest {
    pub text: String,
    /// Image as a `data:` URI.
    pub image: Option<String>,
}

/// One request/response call to a text-generation backend.
///
/// Implementations do not retry; wrap them in [`retry::RetryingGenerator`].
/// Transport and HTTP failures map to `Error::External`, unusable responses
/// (e.g. zero choices) to `Error::Generation`.
#[async_trait]
pub trait CommentGenerator: Send + Sync {
    async fn generate(&self, req: &CommentRequest) -> Result<String>;
}
