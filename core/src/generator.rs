use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::AgentConfig;
use crate::error::GenerationError;
use crate::extract::extract_json;
use crate::llm::{CompletionProvider, Prompt, Role};
use crate::shape::{check_shape, ShapePolicy};

const TEMPERATURE: f32 = 0.3;
const MAX_TOKENS: u32 = 1000;

const CORRECTIVE_INSTRUCTION: &str = "Your previous reply could not be parsed as JSON. \
Return JSON only: a single JSON value with the same structure as the example query, \
with no explanations, comments or markdown.";

/// Turns a free-text request into a structured query shaped like the
/// agent's example query.
pub struct QueryGenerator {
    provider: Arc<dyn CompletionProvider>,
    shape_policy: ShapePolicy,
}

impl QueryGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>, shape_policy: ShapePolicy) -> Self {
        Self {
            provider,
            shape_policy,
        }
    }

    pub async fn generate(
        &self,
        agent: &AgentConfig,
        user_query: &str,
    ) -> Result<Value, GenerationError> {
        let mut prompt = generation_prompt(agent, user_query);

        let first = self.provider.complete(&prompt).await?;
        let query = match extract_json(&first) {
            Some(query) => query,
            None => {
                warn!(agent = %agent.name, "completion contained no JSON, retrying once");
                prompt.push(Role::Assistant, first);
                prompt.push(Role::User, CORRECTIVE_INSTRUCTION);

                let second = self.provider.complete(&prompt).await?;
                extract_json(&second).ok_or(GenerationError::Unparseable { attempts: 2 })?
            }
        };

        self.check_conformance(agent, &query)?;
        info!(agent = %agent.name, "query generated");
        debug!(agent = %agent.name, query = %query, "generated query");
        Ok(query)
    }

    fn check_conformance(&self, agent: &AgentConfig, query: &Value) -> Result<(), GenerationError> {
        if self.shape_policy == ShapePolicy::Off {
            return Ok(());
        }

        let report = check_shape(&agent.example_query, query);
        if report.conforms() {
            return Ok(());
        }

        match self.shape_policy {
            ShapePolicy::Enforce => Err(GenerationError::ShapeMismatch(report)),
            _ => {
                warn!(
                    agent = %agent.name,
                    mismatches = %report,
                    "generated query drifts from the example shape"
                );
                Ok(())
            }
        }
    }
}

pub fn generation_prompt(agent: &AgentConfig, user_query: &str) -> Prompt {
    let example = serde_json::to_string_pretty(&agent.example_query)
        .unwrap_or_else(|_| agent.example_query.to_string());

    let system = format!(
        "You are a query generation assistant. You convert user requests into structured API queries.\n\
\n\
Agent context:\n\
- System prompt: {system_prompt}\n\
- Endpoint info: {endpoint_info}\n\
- Example query:\n{example}\n\
- Test scenarios (guidance only): {test_scenarios}\n\
\n\
Instructions:\n\
1. Work out what data the user is asking for.\n\
2. Produce a query with the same structure as the example query: the same keys and nesting, \
with values adapted to the user's request. The example's values are placeholders, not a template to copy.\n\
3. Return ONLY valid JSON. No explanations, comments or markdown.",
        system_prompt = agent.system_prompt,
        endpoint_info = agent.endpoint_info,
        test_scenarios = agent.test_scenarios,
    );

    let user = format!(
        "User query: {user_query}\n\nGenerate the API query JSON for this request. Return only the JSON."
    );

    Prompt::new(system, user).sampling(TEMPERATURE, MAX_TOKENS)
}
