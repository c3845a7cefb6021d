use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::interface::{
    ChatCompletionRequest, ChatCompletionResponse, Choice, ChoiceMessage, CompletionClient, Usage,
};
use crate::error::UpstreamError;

enum Reply {
    Text(String),
    Fail { status: u16, message: String },
    Empty,
}

/// Completion client that records every request and answers with a canned reply
pub struct MockCompletionClient {
    reply: Reply,
    requests: Mutex<Vec<ChatCompletionRequest>>,
}

impl MockCompletionClient {
    fn with_reply(reply: Reply) -> Arc<Self> {
        Arc::new(Self {
            reply,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(text: &str) -> Arc<Self> {
        Self::with_reply(Reply::Text(text.to_string()))
    }

    pub fn failing(status: u16, message: &str) -> Arc<Self> {
        Self::with_reply(Reply::Fail {
            status,
            message: message.to_string(),
        })
    }

    pub fn empty() -> Arc<Self> {
        Self::with_reply(Reply::Empty)
    }

    pub fn requests(&self) -> Vec<ChatCompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionClient for MockCompletionClient {
    async fn complete(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<ChatCompletionResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());
        match &self.reply {
            Reply::Text(text) => Ok(ChatCompletionResponse {
                choices: vec![Choice {
                    message: ChoiceMessage {
                        content: Some(text.clone()),
                    },
                }],
                usage: Some(Usage {
                    prompt_tokens: Some(100),
                    completion_tokens: Some(50),
                    total_tokens: Some(150),
                    ..Default::default()
                }),
            }),
            Reply::Fail { status, message } => Err(UpstreamError::Api {
                status: *status,
                message: message.clone(),
            }),
            Reply::Empty => Ok(ChatCompletionResponse {
                choices: Vec::new(),
                usage: None,
            }),
        }
    }
}
