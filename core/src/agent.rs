use std::fmt;

use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// The runtime view of an agent. One is fetched per pipeline call and only
// ever borrowed by the stages.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub credential: SecretString, // Only the executor may expose this
    pub system_prompt: String,
    pub endpoint: String,
    pub endpoint_info: String,
    pub example_query: Value,
    pub test_scenarios: String,
}

// The stored/wire shape of an agent (seed files, admin API, sqlite rows).
#[derive(Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub name: String,
    #[serde(default, alias = "api_key")]
    pub credential: String,
    pub system_prompt: String,
    pub endpoint: String,
    #[serde(default)]
    pub endpoint_info: String,
    pub example_query: Value,
    #[serde(default)]
    pub test_scenarios: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for AgentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentRecord")
            .field("name", &self.name)
            .field("credential", &"[REDACTED]")
            .field("system_prompt", &self.system_prompt)
            .field("endpoint", &self.endpoint)
            .field("endpoint_info", &self.endpoint_info)
            .field("example_query", &self.example_query)
            .field("test_scenarios", &self.test_scenarios)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Partial update: only the provided fields change.
#[derive(Clone, Default, Deserialize)]
pub struct AgentUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, alias = "api_key")]
    pub credential: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub endpoint_info: Option<String>,
    #[serde(default)]
    pub example_query: Option<Value>,
    #[serde(default)]
    pub test_scenarios: Option<String>,
}

// What end users get to see when picking an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentSummary {
    pub name: String,
    pub endpoint_info: String,
}

impl AgentRecord {
    /// Configuration-time checks. The endpoint is deliberately left alone:
    /// it is only ever exercised when a query is executed.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("agent name must not be empty".to_string());
        }
        if self.system_prompt.trim().is_empty() {
            return Err(format!("agent '{}' has an empty system_prompt", self.name));
        }
        if !self.example_query.is_object() {
            return Err(format!(
                "agent '{}' example_query must be a JSON object",
                self.name
            ));
        }
        Ok(())
    }

    pub fn summary(&self) -> AgentSummary {
        AgentSummary {
            name: self.name.clone(),
            endpoint_info: self.endpoint_info.clone(),
        }
    }

    pub fn to_config(&self) -> AgentConfig {
        AgentConfig {
            name: self.name.clone(),
            credential: SecretString::from(self.credential.clone()),
            system_prompt: self.system_prompt.clone(),
            endpoint: self.endpoint.clone(),
            endpoint_info: self.endpoint_info.clone(),
            example_query: self.example_query.clone(),
            test_scenarios: self.test_scenarios.clone(),
        }
    }

    /// Applies a partial update in place and returns whether anything was set.
    pub fn apply(&mut self, update: AgentUpdate) -> bool {
        let mut touched = false;
        touched |= set(&mut self.name, update.name);
        touched |= set(&mut self.credential, update.credential);
        touched |= set(&mut self.system_prompt, update.system_prompt);
        touched |= set(&mut self.endpoint, update.endpoint);
        touched |= set(&mut self.endpoint_info, update.endpoint_info);
        touched |= set(&mut self.example_query, update.example_query);
        touched |= set(&mut self.test_scenarios, update.test_scenarios);
        touched
    }
}

fn set<T>(slot: &mut T, value: Option<T>) -> bool {
    match value {
        Some(value) => {
            *slot = value;
            true
        }
        None => false,
    }
}

impl fmt::Debug for AgentUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentUpdate")
            .field("name", &self.name)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("system_prompt", &self.system_prompt)
            .field("endpoint", &self.endpoint)
            .field("endpoint_info", &self.endpoint_info)
            .field("example_query", &self.example_query)
            .field("test_scenarios", &self.test_scenarios)
            .finish()
    }
}

impl AgentUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.credential.is_none()
            && self.system_prompt.is_none()
            && self.endpoint.is_none()
            && self.endpoint_info.is_none()
            && self.example_query.is_none()
            && self.test_scenarios.is_none()
    }
}

// Input for one pipeline invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub agent_name: String,
    pub user_query: String,
}

/// The final answer plus the intermediate values that produced it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Completion {
    pub response: String,
    pub generated_query: Value,
    pub api_results: Value,
}
