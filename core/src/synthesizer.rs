use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::agent::AgentConfig;
use crate::error::SynthesisError;
use crate::llm::{CompletionProvider, Prompt};

const TEMPERATURE: f32 = 0.7;
const MAX_TOKENS: u32 = 2000;

/// Phrases an API result as a natural-language answer. One provider call,
/// no retry.
pub struct ResponseSynthesizer {
    provider: Arc<dyn CompletionProvider>,
}

impl ResponseSynthesizer {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub async fn synthesize(
        &self,
        agent: &AgentConfig,
        user_query: &str,
        api_result: &Value,
    ) -> Result<String, SynthesisError> {
        let prompt = synthesis_prompt(agent, user_query, api_result);
        let answer = self.provider.complete(&prompt).await?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(SynthesisError::EmptyCompletion);
        }

        info!(agent = %agent.name, chars = answer.len(), "response synthesized");
        Ok(answer.to_string())
    }
}

pub fn synthesis_prompt(agent: &AgentConfig, user_query: &str, api_result: &Value) -> Prompt {
    let result = serde_json::to_string_pretty(api_result).unwrap_or_else(|_| api_result.to_string());

    let system = format!(
        "You are a helpful assistant. {system_prompt}\n\
\n\
Endpoint context: {endpoint_info}\n\
\n\
Instructions:\n\
1. Answer the user's question using only the API results provided.\n\
2. If the results do not contain the relevant information, say so clearly.\n\
3. Keep the answer clear and easy to understand.",
        system_prompt = agent.system_prompt,
        endpoint_info = agent.endpoint_info,
    );

    let user = format!(
        "User query: {user_query}\n\nAPI results:\n{result}\n\nAnswer the user's query based on the API results above."
    );

    Prompt::new(system, user).sampling(TEMPERATURE, MAX_TOKENS)
}
