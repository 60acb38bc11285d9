//! Persistence collaborators for modules, scripts and module item entities

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::types::{ModuleFilter, ModuleManifest, ScriptUnit, TenantId};
use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record already exists: {kind} {key}")]
    AlreadyExists { kind: String, key: String },

    #[error("Record not found: {kind} {key}")]
    Missing { kind: String, key: String },

    #[error("I/O error during {operation}: {error}")]
    Io { operation: String, error: String },

    #[error("Serialization error during {operation}: {error}")]
    Serialization { operation: String, error: String },
}

impl StoreError {
    pub(crate) fn io(operation: &str, error: impl std::fmt::Display) -> Self {
        StoreError::Io {
            operation: operation.to_string(),
            error: error.to_string(),
        }
    }

    pub(crate) fn serialization(operation: &str, error: impl std::fmt::Display) -> Self {
        StoreError::Serialization {
            operation: operation.to_string(),
            error: error.to_string(),
        }
    }
}

/// Persistence of module records
#[async_trait]
pub trait ModuleStore: Send + Sync {
    async fn find_by_code(&self, code: &str) -> Result<Option<ModuleManifest>, StoreError>;

    /// Insert a new module; fails when the code is taken.
    async fn create(&self, module: &ModuleManifest) -> Result<(), StoreError>;

    /// Replace the stored module with the same code.
    async fn update(&self, module: &ModuleManifest) -> Result<ModuleManifest, StoreError>;

    async fn remove(&self, code: &str) -> Result<(), StoreError>;

    async fn list(&self, filter: &ModuleFilter) -> Result<Vec<ModuleManifest>, StoreError>;

    async fn list_codes(&self, filter: &ModuleFilter) -> Result<Vec<String>, StoreError> {
        Ok(self
            .list(filter)
            .await?
            .into_iter()
            .map(|module| module.code)
            .collect())
    }

    /// Whether an installed and active module references the item.
    async fn is_child_of_other_active_module(
        &self,
        item_code: &str,
        item_class: &str,
    ) -> Result<bool, StoreError> {
        let filter = ModuleFilter {
            item_class: Some(item_class.to_string()),
            item_code: Some(item_code.to_string()),
            installed: Some(true),
            active: Some(true),
            ..Default::default()
        };
        Ok(!self.list(&filter).await?.is_empty())
    }
}

/// Persistence of script sources, scoped by tenant
#[async_trait]
pub trait ScriptStore: Send + Sync {
    async fn find_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<ScriptUnit>, StoreError>;

    /// Insert or replace the unit with the same code.
    async fn save(&self, tenant: &TenantId, unit: &ScriptUnit) -> Result<(), StoreError>;

    /// Returns whether a unit was removed.
    async fn remove(&self, tenant: &TenantId, code: &str) -> Result<bool, StoreError>;

    async fn list(&self, tenant: &TenantId) -> Result<Vec<ScriptUnit>, StoreError>;

    async fn list_active(&self, tenant: &TenantId) -> Result<Vec<ScriptUnit>, StoreError> {
        Ok(self
            .list(tenant)
            .await?
            .into_iter()
            .filter(|unit| unit.active)
            .collect())
    }
}
