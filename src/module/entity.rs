//! Upsert collaborators for the business entities referenced by module items

use crate::module::error::ModuleError;
use crate::types::DatePeriod;
use async_trait::async_trait;
use serde_json::Value;

/// One entity payload handed to an upsert handler
#[derive(Debug, Clone, Copy)]
pub struct EntityRecord<'a> {
    pub entity_type: &'a str,
    pub code: &'a str,
    pub applies_to: Option<&'a str>,
    pub data: &'a Value,
}

/// Create-or-update handler for non-versioned entity types
#[async_trait]
pub trait EntityService: Send + Sync {
    async fn create_or_update(&self, record: EntityRecord<'_>) -> Result<(), ModuleError>;

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<Option<Value>, ModuleError>;

    /// Returns whether an entity was removed.
    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<bool, ModuleError>;
}

/// Create-or-update handler for entity types that carry a validity window
#[async_trait]
pub trait VersionedEntityService: Send + Sync {
    async fn create_or_update(
        &self,
        record: EntityRecord<'_>,
        validity: Option<&DatePeriod>,
    ) -> Result<(), ModuleError>;

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<Option<Value>, ModuleError>;

    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<bool, ModuleError>;
}
