use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use botkeeper_core::BotkeeperResult;

use crate::store::StateStore;

/// Process-local store; contents are lost on restart.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<(String, String), serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn get(
        &self,
        namespace: &str,
        key: &str,
    ) -> BotkeeperResult<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
    ) -> BotkeeperResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    async fn delete(&self, namespace: &str, key: &str) -> BotkeeperResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}
