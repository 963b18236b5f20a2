//! In-process providers for tests and local runs.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{MessageRole, ModelResponse, ToolCall};

use super::provider::{ChatRequest, ModelProvider, ProviderError};

#[derive(Debug, Clone)]
enum Step {
    Respond(ModelResponse),
    Fail(String),
    Delay(Duration, ModelResponse),
}

/// Replays per-model queues of canned outcomes and records every call.
///
/// A model with an empty queue fails with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<Vec<(String, ChatRequest)>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, model: &str, step: Step) {
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(model.to_string())
            .or_default()
            .push_back(step);
    }

    pub fn push_response(&self, model: &str, response: ModelResponse) {
        self.push(model, Step::Respond(response));
    }

    pub fn push_text(&self, model: &str, text: &str) {
        self.push_response(model, ModelResponse::text(model, text));
    }

    /// Queue a response requesting `calls`.
    pub fn push_tool_calls(&self, model: &str, text: &str, calls: Vec<ToolCall>) {
        self.push_response(model, ModelResponse::text(model, text).with_tool_calls(calls));
    }

    pub fn push_failure(&self, model: &str, message: &str) {
        self.push(model, Step::Fail(message.to_string()));
    }

    /// Queue a text response delivered after `delay`.
    pub fn push_delayed(&self, model: &str, delay: Duration, text: &str) {
        self.push(model, Step::Delay(delay, ModelResponse::text(model, text)));
    }

    /// Models called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.requests().into_iter().map(|(model, _)| model).collect()
    }

    /// Full requests received so far, in order.
    pub fn requests(&self) -> Vec<(String, ChatRequest)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    async fn call(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> Result<ModelResponse, ProviderError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((model.to_string(), request.clone()));

        let step = self
            .scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(model)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Fail(message)) => Err(ProviderError::Transport(message)),
            Some(Step::Delay(delay, response)) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
            None => Err(ProviderError::Transport(format!(
                "no scripted response for model '{model}'"
            ))),
        }
    }
}

/// Answers with the latest user message, prefixed by `echo: `.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

#[async_trait]
impl ModelProvider for EchoProvider {
    async fn call(
        &self,
        model: &str,
        request: &ChatRequest,
    ) -> Result<ModelResponse, ProviderError> {
        let last_user = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        Ok(ModelResponse::text(model, format!("echo: {last_user}")))
    }
}
