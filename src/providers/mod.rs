use async_trait::async_trait;

use crate::error::ModelError;
use crate::types::{CompletionRequest, CompletionResponse};

pub mod openai;
pub mod scripted;

/// The transport capability the executor drives: send a conversation, get
/// one response turn back.
///
/// Implementations own their own protocol, credentials, and retry policy;
/// failures propagate as [`ModelError`] without recovery attempts here.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError>;

    fn name(&self) -> &'static str;
}
