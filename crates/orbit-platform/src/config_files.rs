use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A host configuration file the console may read and rewrite
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagedConfigFile {
    pub id: String,
    pub path: String,
    pub label: String,
    pub description: String,
    /// Command the operator should run after saving
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reload_hint: Option<String>,
    pub exists: bool,
}

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn list(&self) -> Result<Vec<ManagedConfigFile>>;

    async fn read(&self, id: &str) -> Result<String>;

    async fn write(&self, id: &str, content: &str) -> Result<()>;
}
