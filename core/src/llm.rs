use std::time::Duration;

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::config::LlmConfig;
use crate::error::ProviderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// A complete request to the completion provider: system context, the
/// conversation so far, and sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub turns: Vec<Turn>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            turns: vec![Turn {
                role: Role::User,
                content: user.into(),
            }],
            temperature: 0.7,
            max_tokens: 1000,
        }
    }

    pub fn sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Turn {
            role,
            content: content.into(),
        });
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}

pub struct OpenAiProvider {
    client: Client<OpenAIConfig>,
    model: String,
    timeout: Duration,
}

impl OpenAiProvider {
    pub fn new(config: &LlmConfig) -> Self {
        let mut openai = OpenAIConfig::new().with_api_key(config.api_key.expose_secret());
        if let Some(base) = &config.base_url {
            openai = openai.with_api_base(base);
        }

        info!("Completion provider ready. Model: {}", config.model);
        Self {
            client: Client::with_config(openai),
            model: config.model.clone(),
            timeout: config.timeout,
        }
    }

    /// Quick connectivity check used at startup.
    pub async fn ping(&self) -> Result<String, ProviderError> {
        let prompt = Prompt::new(
            "You are a health check.",
            "Hello! Reply with 'System Online'.",
        )
        .sampling(0.0, 10);
        self.complete(&prompt).await
    }

    #[allow(deprecated)]
    async fn send(&self, prompt: &Prompt) -> Result<Option<String>, OpenAIError> {
        let mut messages: Vec<ChatCompletionRequestMessage> =
            Vec::with_capacity(prompt.turns.len() + 1);
        messages.push(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt.system.as_str())
                .build()?
                .into(),
        );
        for turn in &prompt.turns {
            let message: ChatCompletionRequestMessage = match turn.role {
                Role::User => ChatCompletionRequestUserMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()?
                    .into(),
                Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                    .content(turn.content.as_str())
                    .build()?
                    .into(),
            };
            messages.push(message);
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(prompt.temperature)
            .max_tokens(prompt.max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await?;
        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default()))
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        debug!(model = %self.model, turns = prompt.turns.len(), "sending completion request");
        match tokio::time::timeout(self.timeout, self.send(prompt)).await {
            Err(_) => Err(ProviderError::Timeout(self.timeout)),
            Ok(Err(err)) => Err(ProviderError::Request(err.to_string())),
            Ok(Ok(None)) => Err(ProviderError::NoChoices),
            Ok(Ok(Some(text))) => Ok(text),
        }
    }
}
