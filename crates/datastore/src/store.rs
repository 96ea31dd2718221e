use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use botkeeper_core::{BotkeeperResult, StorageKind};

/// Key-value persistence contract for runtime state and settings.
///
/// Values are JSON documents; `namespace` separates record kinds (runtime
/// state vs. settings) within one backend. Implementations must be safe for
/// many concurrent readers with one logical writer per key.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, namespace: &str, key: &str)
        -> BotkeeperResult<Option<serde_json::Value>>;
    async fn set(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
    ) -> BotkeeperResult<()>;
    async fn delete(&self, namespace: &str, key: &str) -> BotkeeperResult<()>;
}

/// Typed view over a [`StateStore`] namespace.
pub struct JsonStore<T> {
    inner: Arc<dyn StateStore>,
    namespace: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for JsonStore<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            namespace: self.namespace.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> JsonStore<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    pub fn new(inner: Arc<dyn StateStore>, namespace: &str) -> Self {
        Self {
            inner,
            namespace: namespace.to_string(),
            _marker: PhantomData,
        }
    }

    pub async fn get(&self, key: &str) -> BotkeeperResult<Option<T>> {
        match self.inner.get(&self.namespace, key).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: &T) -> BotkeeperResult<()> {
        let value = serde_json::to_value(value)?;
        self.inner.set(&self.namespace, key, value).await
    }

    pub async fn delete(&self, key: &str) -> BotkeeperResult<()> {
        self.inner.delete(&self.namespace, key).await
    }
}

/// Resolves the backing store for a storage preference.
///
/// The durable backend is optional; a bot preferring it falls back to the
/// in-memory store when none is configured.
#[derive(Clone)]
pub struct DataAccess {
    in_memory: Arc<dyn StateStore>,
    durable: Option<Arc<dyn StateStore>>,
    default_kind: StorageKind,
}

impl DataAccess {
    pub fn new(
        in_memory: Arc<dyn StateStore>,
        durable: Option<Arc<dyn StateStore>>,
        default_kind: StorageKind,
    ) -> Self {
        Self {
            in_memory,
            durable,
            default_kind,
        }
    }

    pub fn resolve(&self, kind: StorageKind) -> Arc<dyn StateStore> {
        match kind {
            StorageKind::Durable => self
                .durable
                .clone()
                .unwrap_or_else(|| Arc::clone(&self.in_memory)),
            StorageKind::InMemory => Arc::clone(&self.in_memory),
        }
    }

    pub fn resolve_default(&self) -> Arc<dyn StateStore> {
        self.resolve(self.default_kind)
    }
}
