use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::agent::{AgentConfig, AgentRecord, AgentSummary, AgentUpdate};
use crate::error::DirectoryError;

/// Lookup and management of agent records.
///
/// The pipeline only ever calls [`AgentDirectory::get_agent`]; the remaining
/// operations back the agent listing and admin routes.
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn get_record(&self, name: &str) -> Result<Option<AgentRecord>, DirectoryError>;
    async fn list_records(&self) -> Result<Vec<AgentRecord>, DirectoryError>;
    async fn create(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError>;
    async fn update(&self, name: &str, update: AgentUpdate) -> Result<AgentRecord, DirectoryError>;
    async fn delete(&self, name: &str) -> Result<(), DirectoryError>;
    /// Inserts or replaces a record by name, keeping an existing `created_at`.
    async fn upsert(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError>;

    async fn get_agent(&self, name: &str) -> Result<Option<AgentConfig>, DirectoryError> {
        Ok(self.get_record(name).await?.map(|record| record.to_config()))
    }

    async fn list_agents(&self) -> Result<Vec<AgentSummary>, DirectoryError> {
        Ok(self
            .list_records()
            .await?
            .iter()
            .map(AgentRecord::summary)
            .collect())
    }
}

/// Resolves and applies an update against `existing`, checking the result is
/// still a valid agent. Shared by every backend.
pub(crate) fn updated_record(
    mut existing: AgentRecord,
    update: AgentUpdate,
) -> Result<AgentRecord, DirectoryError> {
    if !existing.apply(update) {
        return Err(DirectoryError::Invalid("no fields to update".to_string()));
    }
    existing.validate().map_err(DirectoryError::Invalid)?;
    Ok(existing)
}

pub(crate) fn validated(mut record: AgentRecord) -> Result<AgentRecord, DirectoryError> {
    record.validate().map_err(DirectoryError::Invalid)?;
    if record.created_at.is_none() {
        record.created_at = Some(Utc::now());
    }
    Ok(record)
}

/// Reads a JSON array of agent records.
pub async fn load_records(path: &Path) -> Result<Vec<AgentRecord>, DirectoryError> {
    let content = fs::read_to_string(path).await.map_err(|e| {
        DirectoryError::Storage(format!(
            "failed to read agent file at '{}': {}",
            path.display(),
            e
        ))
    })?;
    let records: Vec<AgentRecord> = serde_json::from_str(&content)?;

    for record in &records {
        if record.endpoint.trim().is_empty() {
            warn!("Agent '{}' registered without an endpoint", record.name);
        }
    }

    Ok(records)
}

/// Upserts every record in `path` into `directory`.
pub async fn seed_from_file(
    directory: &dyn AgentDirectory,
    path: &Path,
) -> Result<usize, DirectoryError> {
    let records = load_records(path).await?;
    let count = records.len();
    for record in records {
        let name = record.name.clone();
        directory.upsert(record).await?;
        info!("Seeded agent '{}'", name);
    }
    Ok(count)
}

/// In-memory directory, usually loaded from a JSON file at startup.
/// Changes made through it are not written back.
#[derive(Default)]
pub struct MemoryRegistry {
    agents: RwLock<BTreeMap<String, AgentRecord>>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<AgentRecord>) -> Result<Self, DirectoryError> {
        let mut agents = BTreeMap::new();
        for record in records {
            let record = validated(record)?;
            if agents.contains_key(&record.name) {
                return Err(DirectoryError::Conflict(record.name));
            }
            agents.insert(record.name.clone(), record);
        }
        Ok(Self {
            agents: RwLock::new(agents),
        })
    }

    pub async fn load(path: &Path) -> Result<Self, DirectoryError> {
        let registry = Self::from_records(load_records(path).await?)?;
        info!(
            "Loaded {} agents from '{}'",
            registry.agents.read().await.len(),
            path.display()
        );
        Ok(registry)
    }
}

#[async_trait]
impl AgentDirectory for MemoryRegistry {
    async fn get_record(&self, name: &str) -> Result<Option<AgentRecord>, DirectoryError> {
        Ok(self.agents.read().await.get(name).cloned())
    }

    async fn list_records(&self) -> Result<Vec<AgentRecord>, DirectoryError> {
        Ok(self.agents.read().await.values().cloned().collect())
    }

    async fn create(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError> {
        let record = validated(record)?;
        let mut agents = self.agents.write().await;
        if agents.contains_key(&record.name) {
            return Err(DirectoryError::Conflict(record.name));
        }
        agents.insert(record.name.clone(), record.clone());
        Ok(record)
    }

    async fn update(&self, name: &str, update: AgentUpdate) -> Result<AgentRecord, DirectoryError> {
        let mut agents = self.agents.write().await;
        let existing = agents
            .get(name)
            .cloned()
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))?;
        let record = updated_record(existing, update)?;

        if record.name != name {
            if agents.contains_key(&record.name) {
                return Err(DirectoryError::Conflict(record.name));
            }
            agents.remove(name);
        }
        agents.insert(record.name.clone(), record.clone());
        Ok(record)
    }

    async fn delete(&self, name: &str) -> Result<(), DirectoryError> {
        self.agents
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| DirectoryError::NotFound(name.to_string()))
    }

    async fn upsert(&self, record: AgentRecord) -> Result<AgentRecord, DirectoryError> {
        let mut record = validated(record)?;
        let mut agents = self.agents.write().await;
        if let Some(existing) = agents.get(&record.name) {
            record.created_at = existing.created_at;
        }
        agents.insert(record.name.clone(), record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;
    use serde_json::json;

    use super::*;

    fn record(name: &str) -> AgentRecord {
        AgentRecord {
            name: name.to_string(),
            credential: format!("sk-{name}"),
            system_prompt: "You answer questions.".to_string(),
            endpoint: format!("http://localhost/{name}"),
            endpoint_info: format!("{name} API"),
            example_query: json!({"q": "string"}),
            test_scenarios: String::new(),
            created_at: None,
        }
    }

    #[tokio::test]
    async fn lookup_is_case_sensitive() {
        let registry = MemoryRegistry::from_records(vec![record("Weather")]).unwrap();

        assert!(registry.get_agent("Weather").await.unwrap().is_some());
        assert!(registry.get_agent("weather").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_agent_wraps_the_credential() {
        let registry = MemoryRegistry::from_records(vec![record("weather")]).unwrap();
        let agent = registry.get_agent("weather").await.unwrap().unwrap();
        assert_eq!(agent.credential.expose_secret(), "sk-weather");
    }

    #[tokio::test]
    async fn create_rejects_duplicates_and_stamps_created_at() {
        let registry = MemoryRegistry::new();
        let created = registry.create(record("weather")).await.unwrap();
        assert!(created.created_at.is_some());

        let err = registry.create(record("weather")).await.unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict(name) if name == "weather"));
    }

    #[tokio::test]
    async fn update_renames_and_guards_against_conflicts() {
        let registry =
            MemoryRegistry::from_records(vec![record("weather"), record("news")]).unwrap();

        let err = registry
            .update(
                "weather",
                AgentUpdate {
                    name: Some("news".to_string()),
                    ..AgentUpdate::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Conflict(_)));

        let renamed = registry
            .update(
                "weather",
                AgentUpdate {
                    name: Some("forecast".to_string()),
                    ..AgentUpdate::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(renamed.name, "forecast");
        assert!(registry.get_record("weather").await.unwrap().is_none());
        assert!(registry.get_record("forecast").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let registry = MemoryRegistry::from_records(vec![record("weather")]).unwrap();
        let err = registry
            .update("weather", AgentUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DirectoryError::Invalid(_)));
    }

    #[tokio::test]
    async fn delete_unknown_agent_is_not_found() {
        let registry = MemoryRegistry::new();
        let err = registry.delete("ghost").await.unwrap_err();
        assert!(matches!(err, DirectoryError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_agents_exposes_only_public_fields() {
        let registry = MemoryRegistry::from_records(vec![record("weather")]).unwrap();
        let agents = registry.list_agents().await.unwrap();
        assert_eq!(
            agents,
            vec![AgentSummary {
                name: "weather".to_string(),
                endpoint_info: "weather API".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn load_and_seed_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "{}",
            json!([{
                "name": "MotieChecker",
                "api_key": "",
                "system_prompt": "You are a political analyst.",
                "endpoint": "https://example.org/odata",
                "endpoint_info": "OData API",
                "example_query": {"entity_set": "Besluit", "top": 10},
                "test_scenarios": "User prompt: ..."
            }])
        )
        .unwrap();

        let loaded = MemoryRegistry::load(file.path()).await.unwrap();
        assert!(loaded.get_agent("MotieChecker").await.unwrap().is_some());

        let target = MemoryRegistry::from_records(vec![record("weather")]).unwrap();
        let seeded = seed_from_file(&target, file.path()).await.unwrap();
        assert_eq!(seeded, 1);
        assert_eq!(target.list_records().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn upsert_keeps_the_first_created_at() {
        let registry = MemoryRegistry::new();
        let first = registry.upsert(record("weather")).await.unwrap();

        let mut again = record("weather");
        again.endpoint_info = "Reseeded".to_string();
        again.created_at = Some(Utc::now() + chrono::Duration::days(1));
        let second = registry.upsert(again).await.unwrap();

        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.endpoint_info, "Reseeded");
    }

    #[tokio::test]
    async fn missing_file_is_a_storage_error() {
        let err = MemoryRegistry::load(Path::new("/nonexistent/agents.json"))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, DirectoryError::Storage(_)));
    }
}
