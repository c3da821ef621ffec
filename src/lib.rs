pub mod assertion;
pub mod error;
pub mod files;
pub mod functions;
pub mod providers;
pub mod types;
mod verify;

pub use assertion::{ChatAssertion, TextComparison};
pub use error::{AssertError, ModelError};
pub use functions::{FunctionCall, FunctionDefinition, Tool, ToolCall, ToolType};
pub use providers::openai::{OpenAI, OpenAIConfig};
pub use providers::scripted::{ScriptedProvider, ScriptedResponse};
pub use providers::ModelProvider;
pub use tokio_util::sync::CancellationToken;
pub use types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole};
