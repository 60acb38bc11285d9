//! Registry of entity types that may appear as module items

use crate::module::error::ModuleError;
use crate::types::{CUSTOM_ACTION_ITEM_TYPE, FIELD_TEMPLATE_ITEM_TYPE, MODULE_ITEM_TYPE};
use std::collections::HashMap;

/// Suffix carried by every item payload type name
pub const DTO_SUFFIX: &str = "Dto";

/// Entity type backing custom entity templates, whose fields become items
pub const ENTITY_TEMPLATE_ITEM_TYPE: &str = "CustomEntityTemplate";

/// Scope prefix of the field templates nested in a custom entity template
pub const ENTITY_TEMPLATE_FIELD_PREFIX: &str = "CE";

/// How the entities of a type are persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Plain,
    /// Entities carry a validity window
    Versioned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeInfo {
    pub name: String,
    /// Short discriminator used by filters and item commands
    pub tag: String,
    pub handler: HandlerKind,
    /// When set, the `fields` of a payload are recorded as field template
    /// items scoped `<prefix>_<code>`.
    pub nested_field_prefix: Option<String>,
}

impl EntityTypeInfo {
    pub fn plain(name: &str, tag: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: tag.to_string(),
            handler: HandlerKind::Plain,
            nested_field_prefix: None,
        }
    }

    pub fn versioned(name: &str, tag: &str) -> Self {
        Self {
            handler: HandlerKind::Versioned,
            ..Self::plain(name, tag)
        }
    }

    pub fn with_nested_fields(mut self, prefix: &str) -> Self {
        self.nested_field_prefix = Some(prefix.to_string());
        self
    }

    /// Payload type name used when exporting entities of this type
    pub fn dto_class_name(&self) -> String {
        format!("{}{}", self.name, DTO_SUFFIX)
    }
}

/// Maps item type tags and payload type names to registered entity types.
#[derive(Debug, Clone, Default)]
pub struct ItemTypeRegistry {
    types: HashMap<String, EntityTypeInfo>,
    tags: HashMap<String, String>,
}

impl ItemTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the types the installer handles itself
    pub fn with_builtin_types() -> Self {
        let mut registry = Self::new();
        registry.register(EntityTypeInfo::plain(MODULE_ITEM_TYPE, "module"));
        registry.register(EntityTypeInfo::plain(FIELD_TEMPLATE_ITEM_TYPE, "cft"));
        registry.register(EntityTypeInfo::plain(CUSTOM_ACTION_ITEM_TYPE, "eca"));
        registry.register(
            EntityTypeInfo::plain(ENTITY_TEMPLATE_ITEM_TYPE, "cet")
                .with_nested_fields(ENTITY_TEMPLATE_FIELD_PREFIX),
        );
        registry
    }

    pub fn register(&mut self, info: EntityTypeInfo) {
        self.tags.insert(info.tag.clone(), info.name.clone());
        self.types.insert(info.name.clone(), info);
    }

    pub fn get(&self, name: &str) -> Option<&EntityTypeInfo> {
        self.types.get(name)
    }

    /// Entity type name registered under `tag`
    pub fn resolve_tag(&self, tag: &str) -> Result<&str, ModuleError> {
        self.tags
            .get(tag)
            .map(String::as_str)
            .ok_or_else(|| ModuleError::not_found("Module item type", tag))
    }

    /// Entity type of a payload, named by convention after the payload type
    /// with its `Dto` suffix removed.
    pub fn resolve_dto(&self, dto_simple_name: &str) -> Result<&EntityTypeInfo, ModuleError> {
        let entity_name = dto_simple_name
            .rfind(DTO_SUFFIX)
            .map(|index| &dto_simple_name[..index])
            .ok_or_else(|| ModuleError::InvalidItem {
                dto_class: dto_simple_name.to_string(),
                reason: format!("type name does not end with {DTO_SUFFIX}"),
            })?;

        self.types
            .get(entity_name)
            .ok_or_else(|| ModuleError::not_found("Module item type", entity_name))
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.tags.keys().map(String::as_str).collect();
        tags.sort();
        tags
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_dto_strips_suffix() {
        let mut registry = ItemTypeRegistry::with_builtin_types();
        registry.register(EntityTypeInfo::versioned("PricePlan", "priceplan"));

        let info = registry.resolve_dto("PricePlanDto").unwrap();
        assert_eq!(info.name, "PricePlan");
        assert_eq!(info.handler, HandlerKind::Versioned);
    }

    #[test]
    fn test_unregistered_entity_is_a_business_error() {
        let registry = ItemTypeRegistry::with_builtin_types();
        let err = registry.resolve_dto("ServiceTemplateDto").unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("ServiceTemplate"));

        let err = registry.resolve_dto("Whatever").unwrap_err();
        assert!(matches!(err, ModuleError::InvalidItem { .. }));
    }

    #[test]
    fn test_unknown_tag_is_not_found() {
        let registry = ItemTypeRegistry::with_builtin_types();
        assert_eq!(registry.resolve_tag("cet").unwrap(), ENTITY_TEMPLATE_ITEM_TYPE);
        assert!(registry.resolve_tag("nope").unwrap_err().is_not_found());
    }
}
