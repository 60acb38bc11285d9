use crate::script::interface::CompiledScript;
use crate::types::{CacheKey, TenantId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

/// Process wide cache of compiled scripts keyed by tenant and script code.
///
/// A single lock guards every tenant: readers proceed concurrently, a writer
/// briefly blocks all of them.
#[derive(Clone, Default)]
pub struct CompiledScriptCache {
    entries: Arc<RwLock<HashMap<CacheKey, CompiledScript>>>,
}

/// Exclusive view of the cache, held while compiling a missing entry
pub struct ExclusiveCache<'a> {
    guard: RwLockWriteGuard<'a, HashMap<CacheKey, CompiledScript>>,
}

impl ExclusiveCache<'_> {
    pub fn get(&self, key: &CacheKey) -> Option<CompiledScript> {
        self.guard.get(key).cloned()
    }

    pub fn insert(&mut self, key: CacheKey, script: CompiledScript) {
        debug!("Compiled script {} added to compiled interface map", key);
        self.guard.insert(key, script);
    }

    pub fn remove(&mut self, key: &CacheKey) -> Option<CompiledScript> {
        self.guard.remove(key)
    }
}

impl CompiledScriptCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared mode lookup
    pub async fn get(&self, key: &CacheKey) -> Option<CompiledScript> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn insert(&self, key: CacheKey, script: CompiledScript) {
        self.exclusive().await.insert(key, script);
    }

    /// Remove the entry for `key`; removing an absent entry is a no-op.
    pub async fn remove(&self, key: &CacheKey) -> Option<CompiledScript> {
        self.entries.write().await.remove(key)
    }

    pub async fn exclusive(&self) -> ExclusiveCache<'_> {
        ExclusiveCache {
            guard: self.entries.write().await,
        }
    }

    pub async fn contains(&self, key: &CacheKey) -> bool {
        self.entries.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Codes cached for `tenant`, sorted
    pub async fn codes(&self, tenant: &TenantId) -> Vec<String> {
        let mut codes: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|key| &key.tenant == tenant)
            .map(|key| key.code.clone())
            .collect();
        codes.sort();
        codes
    }

    pub async fn clear_tenant(&self, tenant: &TenantId) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| &key.tenant != tenant);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::error::ScriptError;
    use crate::script::interface::{
        Capability, FnScriptFactory, ScriptContext, ScriptInterface,
    };
    use async_trait::async_trait;

    struct Noop;

    #[async_trait]
    impl ScriptInterface for Noop {
        async fn execute(&self, _context: &mut ScriptContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    fn compiled(name: &str) -> CompiledScript {
        CompiledScript::new(
            name,
            Capability::Script,
            "checksum",
            Arc::new(FnScriptFactory::new(name, vec![Capability::Script], || {
                Box::new(Noop)
            })),
        )
    }

    #[tokio::test]
    async fn test_entries_are_tenant_scoped() {
        let cache = CompiledScriptCache::new();
        let acme = TenantId::new("acme");
        let globex = TenantId::new("globex");

        cache.insert(CacheKey::new(&acme, "p.Foo"), compiled("p.Foo")).await;
        assert!(cache.contains(&CacheKey::new(&acme, "p.Foo")).await);
        assert!(!cache.contains(&CacheKey::new(&globex, "p.Foo")).await);
        assert_eq!(cache.codes(&acme).await, vec!["p.Foo"]);
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let cache = CompiledScriptCache::new();
        let key = CacheKey::new(&TenantId::default(), "p.Foo");
        cache.insert(key.clone(), compiled("p.Foo")).await;

        assert!(cache.remove(&key).await.is_some());
        assert!(cache.remove(&key).await.is_none());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_clear_tenant() {
        let cache = CompiledScriptCache::new();
        let acme = TenantId::new("acme");
        cache.insert(CacheKey::new(&acme, "a"), compiled("a")).await;
        cache.insert(CacheKey::new(&acme, "b"), compiled("b")).await;
        cache
            .insert(CacheKey::new(&TenantId::new("other"), "a"), compiled("a"))
            .await;

        assert_eq!(cache.clear_tenant(&acme).await, 2);
        assert_eq!(cache.len().await, 1);
    }
}
