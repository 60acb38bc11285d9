use crate::module::entity::{EntityRecord, EntityService, VersionedEntityService};
use crate::module::error::ModuleError;
use crate::store::{ModuleStore, ScriptStore, StoreError};
use crate::types::{CacheKey, DatePeriod, ModuleFilter, ModuleManifest, ScriptUnit, TenantId};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

type EntityKey = (String, String, Option<String>);
type VersionKey = (String, String);

/// In-memory store backing every persistence collaborator.
///
/// Counts every mutating call so callers can assert that an operation
/// performed no writes.
#[derive(Default)]
pub struct MemoryStore {
    modules: RwLock<HashMap<String, ModuleManifest>>,
    scripts: RwLock<HashMap<CacheKey, ScriptUnit>>,
    entities: RwLock<HashMap<EntityKey, Value>>,
    versions: RwLock<HashMap<VersionKey, Vec<(Option<DatePeriod>, Value)>>>,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls served so far
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn entity_count(&self, entity_type: &str) -> usize {
        let plain = self
            .entities
            .read()
            .await
            .keys()
            .filter(|(kind, _, _)| kind == entity_type)
            .count();
        let versioned: usize = self
            .versions
            .read()
            .await
            .iter()
            .filter(|((kind, _), _)| kind == entity_type)
            .map(|(_, versions)| versions.len())
            .sum();
        plain + versioned
    }
}

fn entity_key(entity_type: &str, code: &str, applies_to: Option<&str>) -> EntityKey {
    (
        entity_type.to_string(),
        code.to_string(),
        applies_to.map(str::to_string),
    )
}

#[async_trait]
impl ModuleStore for MemoryStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<ModuleManifest>, StoreError> {
        Ok(self.modules.read().await.get(code).cloned())
    }

    async fn create(&self, module: &ModuleManifest) -> Result<(), StoreError> {
        self.record_write();
        let mut modules = self.modules.write().await;
        if modules.contains_key(&module.code) {
            return Err(StoreError::AlreadyExists {
                kind: "module".to_string(),
                key: module.code.clone(),
            });
        }
        modules.insert(module.code.clone(), module.clone());
        debug!("Created module {}", module.code);
        Ok(())
    }

    async fn update(&self, module: &ModuleManifest) -> Result<ModuleManifest, StoreError> {
        self.record_write();
        let mut modules = self.modules.write().await;
        match modules.get_mut(&module.code) {
            Some(existing) => {
                *existing = module.clone();
                Ok(existing.clone())
            }
            None => Err(StoreError::Missing {
                kind: "module".to_string(),
                key: module.code.clone(),
            }),
        }
    }

    async fn remove(&self, code: &str) -> Result<(), StoreError> {
        self.record_write();
        self.modules
            .write()
            .await
            .remove(code)
            .map(|_| ())
            .ok_or_else(|| StoreError::Missing {
                kind: "module".to_string(),
                key: code.to_string(),
            })
    }

    async fn list(&self, filter: &ModuleFilter) -> Result<Vec<ModuleManifest>, StoreError> {
        let mut modules: Vec<ModuleManifest> = self
            .modules
            .read()
            .await
            .values()
            .filter(|module| filter.matches(module))
            .cloned()
            .collect();
        modules.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(modules)
    }
}

#[async_trait]
impl ScriptStore for MemoryStore {
    async fn find_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<ScriptUnit>, StoreError> {
        Ok(self
            .scripts
            .read()
            .await
            .get(&CacheKey::new(tenant, code))
            .cloned())
    }

    async fn save(&self, tenant: &TenantId, unit: &ScriptUnit) -> Result<(), StoreError> {
        self.record_write();
        self.scripts
            .write()
            .await
            .insert(CacheKey::new(tenant, &unit.code), unit.clone());
        Ok(())
    }

    async fn remove(&self, tenant: &TenantId, code: &str) -> Result<bool, StoreError> {
        self.record_write();
        Ok(self
            .scripts
            .write()
            .await
            .remove(&CacheKey::new(tenant, code))
            .is_some())
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<ScriptUnit>, StoreError> {
        let mut units: Vec<ScriptUnit> = self
            .scripts
            .read()
            .await
            .iter()
            .filter(|(key, _)| &key.tenant == tenant)
            .map(|(_, unit)| unit.clone())
            .collect();
        units.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(units)
    }
}

#[async_trait]
impl EntityService for MemoryStore {
    async fn create_or_update(&self, record: EntityRecord<'_>) -> Result<(), ModuleError> {
        self.record_write();
        self.entities.write().await.insert(
            entity_key(record.entity_type, record.code, record.applies_to),
            record.data.clone(),
        );
        Ok(())
    }

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<Option<Value>, ModuleError> {
        Ok(self
            .entities
            .read()
            .await
            .get(&entity_key(entity_type, code, applies_to))
            .cloned())
    }

    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<bool, ModuleError> {
        self.record_write();
        Ok(self
            .entities
            .write()
            .await
            .remove(&entity_key(entity_type, code, applies_to))
            .is_some())
    }
}

#[async_trait]
impl VersionedEntityService for MemoryStore {
    async fn create_or_update(
        &self,
        record: EntityRecord<'_>,
        validity: Option<&DatePeriod>,
    ) -> Result<(), ModuleError> {
        self.record_write();
        let mut versions = self.versions.write().await;
        let entry = versions
            .entry((record.entity_type.to_string(), record.code.to_string()))
            .or_default();
        match entry.iter_mut().find(|(period, _)| period.as_ref() == validity) {
            Some((_, data)) => *data = record.data.clone(),
            None => entry.push((validity.cloned(), record.data.clone())),
        }
        Ok(())
    }

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<Option<Value>, ModuleError> {
        let versions = self.versions.read().await;
        let Some(entry) = versions.get(&(entity_type.to_string(), code.to_string())) else {
            return Ok(None);
        };
        let found = match validity {
            Some(period) => entry
                .iter()
                .find(|(existing, _)| existing.as_ref() == Some(period)),
            None => entry.last(),
        };
        Ok(found.map(|(_, data)| data.clone()))
    }

    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<bool, ModuleError> {
        self.record_write();
        let mut versions = self.versions.write().await;
        let key = (entity_type.to_string(), code.to_string());
        let Some(entry) = versions.get_mut(&key) else {
            return Ok(false);
        };
        let before = entry.len();
        match validity {
            Some(period) => entry.retain(|(existing, _)| existing.as_ref() != Some(period)),
            None => entry.clear(),
        }
        let removed = entry.len() != before;
        if entry.is_empty() {
            versions.remove(&key);
        }
        Ok(removed)
    }
}
