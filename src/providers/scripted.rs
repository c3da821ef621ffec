use std::sync::Mutex;

use async_trait::async_trait;

use crate::{
    error::ModelError,
    functions::ToolCall,
    providers::ModelProvider,
    types::{ChatMessage, CompletionRequest, CompletionResponse, MessageRole},
};

/// One pre-programmed assistant turn: text, tool calls, or both.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ScriptedResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            text: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_tool_calls(mut self, tool_calls: Vec<ToolCall>) -> Self {
        self.tool_calls = tool_calls;
        self
    }
}

/// Deterministic provider returning pre-programmed responses in order.
///
/// Every request it receives is recorded, so a test can check not just the
/// verdict but what the executor actually sent (transcript accumulation,
/// advertised tools, call count).
pub struct ScriptedProvider {
    responses: Mutex<Vec<ScriptedResponse>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new<I>(responses: I) -> Self
    where
        I: IntoIterator<Item = ScriptedResponse>,
    {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(ScriptedResponse::text))
    }

    /// Requests received so far, in arrival order.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, ModelError> {
        self.requests.lock().unwrap().push(request);

        let mut responses = self.responses.lock().unwrap();
        if responses.is_empty() {
            return Err(ModelError::Provider("no more scripted responses".to_string()));
        }
        let next = responses.remove(0);

        Ok(CompletionResponse {
            message: ChatMessage {
                role: MessageRole::Assistant,
                content: next.text,
                tool_calls: next.tool_calls,
            },
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::types::ChatMessage;

    use super::*;

    #[tokio::test]
    async fn replays_responses_in_order() {
        let provider = ScriptedProvider::from_texts(["first", "second"]);

        let request = CompletionRequest::new("model", vec![ChatMessage::user("hi")]);
        let one = provider.complete(request.clone()).await.expect("first");
        let two = provider.complete(request.clone()).await.expect("second");

        assert_eq!(one.message.text(), Some("first"));
        assert_eq!(two.message.text(), Some("second"));
        assert_eq!(provider.request_count(), 2);

        let error = provider.complete(request).await.unwrap_err();
        assert!(matches!(error, ModelError::Provider(_)));
    }

    #[tokio::test]
    async fn yields_programmed_tool_calls() {
        let provider = ScriptedProvider::new([ScriptedResponse::default().with_tool_calls(vec![
            ToolCall::new("get_weather", json!({"location": "Paris"})),
        ])]);

        let request = CompletionRequest::new("model", vec![ChatMessage::user("weather?")]);
        let response = provider.complete(request).await.expect("response");

        assert_eq!(response.message.text(), None);
        assert_eq!(response.message.tool_calls.len(), 1);
        assert_eq!(response.message.tool_calls[0].function.name, "get_weather");
    }
}
