use agentbridge_core::AgentRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// Input for get-response: the caller supplies the API results directly
#[derive(Debug, Deserialize)]
pub struct GetResponseRequest {
    pub agent_name: String,
    pub user_query: String,
    pub api_results: Value,
}

// Input for execute-query: a generated or hand-edited query
#[derive(Debug, Deserialize)]
pub struct ExecuteQueryRequest {
    pub agent_name: String,
    pub query: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateQueryResponse {
    pub generated_query: Value,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecuteQueryResponse {
    pub api_results: Value,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetResponseResponse {
    pub response: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CompleteQueryResponse {
    pub response: String,
    pub generated_query: Value,
    pub api_results: Value,
    pub success: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RootResponse {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// Admin view of an agent. The credential itself is never sent back.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminAgent {
    pub name: String,
    pub system_prompt: String,
    pub endpoint: String,
    pub endpoint_info: String,
    pub example_query: Value,
    pub test_scenarios: String,
    pub credential_set: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<AgentRecord> for AdminAgent {
    fn from(record: AgentRecord) -> Self {
        Self {
            credential_set: !record.credential.is_empty(),
            created_at: record.created_at.map(|ts| ts.to_rfc3339()),
            name: record.name,
            system_prompt: record.system_prompt,
            endpoint: record.endpoint,
            endpoint_info: record.endpoint_info,
            example_query: record.example_query,
            test_scenarios: record.test_scenarios,
        }
    }
}
