//! Module lifecycle: create, install, uninstall, enable and export

use crate::module::entity::{EntityRecord, EntityService, VersionedEntityService};
use crate::module::error::ModuleError;
use crate::module::hooks::{ModuleScriptHooks, NoScriptHooks};
use crate::module::items::{entity_to_item, EntityPayload, ItemPayload};
use crate::module::pictures::PictureStore;
use crate::module::registry::{HandlerKind, ItemTypeRegistry, DTO_SUFFIX};
use crate::script::introspect;
use crate::store::ModuleStore;
use crate::types::module::is_blank;
use crate::types::{
    ModuleDto, ModuleFilter, ModuleItem, ModuleItemDto, ModuleManifest, ScriptDto,
    TenantId, CUSTOM_ACTION_ITEM_TYPE, FIELD_TEMPLATE_ITEM_TYPE, MODULE_ITEM_TYPE,
};
use futures::future::BoxFuture;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

const LOCALLY_DEVELOPED: &str =
    "Module with the same code is being developed locally, can not overwrite it.";

/// Unpacks module payloads into persisted entities and tracks their state.
///
/// Nested installs commit independently: a failure deep in the tree leaves
/// the already installed sub-modules in place, and the parent is only marked
/// installed once every one of its items succeeded.
pub struct ModuleInstaller {
    tenant: TenantId,
    modules: Arc<dyn ModuleStore>,
    entities: Arc<dyn EntityService>,
    versioned: Arc<dyn VersionedEntityService>,
    registry: ItemTypeRegistry,
    hooks: Arc<dyn ModuleScriptHooks>,
    pictures: PictureStore,
}

impl ModuleInstaller {
    pub fn new(
        tenant: TenantId,
        modules: Arc<dyn ModuleStore>,
        entities: Arc<dyn EntityService>,
        versioned: Arc<dyn VersionedEntityService>,
        registry: ItemTypeRegistry,
    ) -> Self {
        Self {
            tenant,
            modules,
            entities,
            versioned,
            registry,
            hooks: Arc::new(NoScriptHooks),
            pictures: PictureStore::disabled(),
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn ModuleScriptHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_pictures(mut self, pictures: PictureStore) -> Self {
        self.pictures = pictures;
        self
    }

    pub fn registry(&self) -> &ItemTypeRegistry {
        &self.registry
    }

    /// Install a module payload.
    ///
    /// Unknown modules are created from the payload first. A downloaded
    /// module that is not yet installed is installed from its stored
    /// snapshot, ignoring the given payload; an installed one is returned
    /// unchanged.
    pub async fn install(&self, dto: ModuleDto) -> Result<ModuleManifest, ModuleError> {
        let mut installing = Vec::new();
        self.install_nested(dto, &mut installing).await
    }

    /// Install `dto` below the modules in `installing`, which are the
    /// ancestors still being installed. A module nested in itself, directly
    /// or through other modules, is rejected.
    fn install_nested<'a>(
        &'a self,
        dto: ModuleDto,
        installing: &'a mut Vec<String>,
    ) -> BoxFuture<'a, Result<ModuleManifest, ModuleError>> {
        Box::pin(async move {
            if is_blank(Some(&dto.code)) {
                return Err(ModuleError::missing(vec!["code".to_string()]));
            }
            if installing.contains(&dto.code) {
                return Err(ModuleError::BusinessRule {
                    reason: format!(
                        "Module {} is nested in itself: {} -> {}",
                        dto.code,
                        installing.join(" -> "),
                        dto.code
                    ),
                });
            }

            installing.push(dto.code.clone());
            let result = self.install_one(dto, installing).await;
            installing.pop();
            result
        })
    }

    async fn install_one(
        &self,
        dto: ModuleDto,
        installing: &mut Vec<String>,
    ) -> Result<ModuleManifest, ModuleError> {
        let (mut manifest, payload) = match self.modules.find_by_code(&dto.code).await? {
            None => {
                let manifest = self.create(dto.clone(), false).await?;
                (manifest, dto)
            }
            Some(existing) => {
                if !existing.is_downloaded() {
                    return Err(ModuleError::forbidden(
                        &dto.code,
                        "install",
                        LOCALLY_DEVELOPED,
                    ));
                }
                if existing.installed {
                    debug!("Module {} is already installed", existing.code);
                    return Ok(existing);
                }
                let snapshot = source_to_dto(&existing)?;
                (existing, snapshot)
            }
        };

        info!("Installing module {}", manifest.code);

        let handle = match manifest.script_code.clone() {
            Some(code) => self.hooks.pre_install(&code, &manifest).await?,
            None => None,
        };

        self.unpack_items(&mut manifest, &payload, installing).await?;

        manifest.installed = true;
        manifest.active = true;
        let manifest = self.modules.update(&manifest).await?;

        if let Some(handle) = handle {
            self.hooks.post_install(handle, &manifest).await?;
        }

        info!(
            "Installed module {} with {} item(s)",
            manifest.code,
            manifest.items.len()
        );
        Ok(manifest)
    }

    /// Uninstall and install a downloaded module again from its snapshot.
    pub async fn reinstall(&self, code: &str) -> Result<ModuleManifest, ModuleError> {
        let manifest = self.require(code).await?;
        if !manifest.is_downloaded() {
            return Err(ModuleError::forbidden(code, "reinstall", LOCALLY_DEVELOPED));
        }
        if manifest.installed {
            self.uninstall(code, false).await?;
        }
        let snapshot = source_to_dto(&manifest)?;
        self.install(snapshot).await
    }

    async fn unpack_items(
        &self,
        manifest: &mut ModuleManifest,
        payload: &ModuleDto,
        installing: &mut Vec<String>,
    ) -> Result<(), ModuleError> {
        let Some(items) = &payload.module_items else {
            return Ok(());
        };

        manifest.items.clear();
        for item in items {
            if let Err(e) = self.install_item(manifest, item, installing).await {
                error!(
                    "Failed to transform DTO into a module item. DTO {}: {}",
                    item.dto_class_name, e
                );
                return Err(e);
            }
        }
        Ok(())
    }

    async fn install_item(
        &self,
        manifest: &mut ModuleManifest,
        item: &ModuleItemDto,
        installing: &mut Vec<String>,
    ) -> Result<(), ModuleError> {
        match ItemPayload::decode(item, &self.registry)? {
            ItemPayload::Module(dto) => {
                let child = self.install_nested(*dto, installing).await?;
                manifest.add_item(ModuleItem::new(child.code, MODULE_ITEM_TYPE, None, None));
            }
            ItemPayload::FieldTemplate(payload) => {
                self.upsert_plain(FIELD_TEMPLATE_ITEM_TYPE, &payload).await?;
                manifest.add_item(payload.to_item(FIELD_TEMPLATE_ITEM_TYPE));
            }
            ItemPayload::CustomAction(payload) => {
                self.upsert_plain(CUSTOM_ACTION_ITEM_TYPE, &payload).await?;
                manifest.add_item(payload.to_item(CUSTOM_ACTION_ITEM_TYPE));
            }
            ItemPayload::Entity { info, payload } => {
                match info.handler {
                    HandlerKind::Versioned => {
                        self.versioned
                            .create_or_update(
                                record(&info.name, &payload),
                                payload.validity.as_ref(),
                            )
                            .await?;
                    }
                    HandlerKind::Plain => self.upsert_plain(&info.name, &payload).await?,
                }
                manifest.add_item(payload.to_item(&info.name));

                if let Some(prefix) = &info.nested_field_prefix {
                    for field in payload.nested_field_items(prefix) {
                        manifest.add_item(field);
                    }
                }
            }
        }
        Ok(())
    }

    async fn upsert_plain(
        &self,
        entity_type: &str,
        payload: &EntityPayload,
    ) -> Result<(), ModuleError> {
        self.entities
            .create_or_update(record(entity_type, payload))
            .await
    }

    /// Create a module record from a payload. Development modules keep no
    /// snapshot and can not be installed over.
    pub async fn create(
        &self,
        mut dto: ModuleDto,
        development: bool,
    ) -> Result<ModuleManifest, ModuleError> {
        validate(&mut dto)?;

        if self.modules.find_by_code(&dto.code).await?.is_some() {
            return Err(ModuleError::AlreadyExists {
                kind: "Module".to_string(),
                code: dto.code,
            });
        }

        let mut manifest = ModuleManifest::new(dto.code.clone());
        manifest.active = true;
        self.parse_module_info(&mut manifest, &dto).await?;
        if development {
            manifest.module_source = None;
        }

        self.modules.create(&manifest).await?;
        info!("Created module {}", manifest.code);
        Ok(manifest)
    }

    /// Replace the description, script and snapshot of a downloaded module.
    pub async fn update(&self, mut dto: ModuleDto) -> Result<ModuleManifest, ModuleError> {
        validate(&mut dto)?;

        let mut manifest = self.require(&dto.code).await?;
        if !manifest.is_downloaded() {
            return Err(ModuleError::forbidden(&dto.code, "install", LOCALLY_DEVELOPED));
        }

        // a renamed module must not take over another record
        if let Some(target) = renamed_code(&dto) {
            if self.modules.find_by_code(target).await?.is_some() {
                return Err(ModuleError::AlreadyExists {
                    kind: "Module".to_string(),
                    code: target.to_string(),
                });
            }
        }

        manifest.items.clear();
        self.parse_module_info(&mut manifest, &dto).await?;

        if manifest.code != dto.code {
            self.modules.remove(&dto.code).await?;
            self.modules.create(&manifest).await?;
            Ok(manifest)
        } else {
            Ok(self.modules.update(&manifest).await?)
        }
    }

    pub async fn create_or_update(&self, dto: ModuleDto) -> Result<ModuleManifest, ModuleError> {
        if self.modules.find_by_code(&dto.code).await?.is_none() {
            self.create(dto, false).await
        } else {
            self.update(dto).await
        }
    }

    async fn parse_module_info(
        &self,
        manifest: &mut ModuleManifest,
        dto: &ModuleDto,
    ) -> Result<(), ModuleError> {
        manifest.code = renamed_code(dto).unwrap_or(&dto.code).to_string();
        manifest.description = dto.description.clone();
        manifest.license = dto.license.clone();
        manifest.logo_picture = dto.logo_picture.clone();

        if let (Some(picture), Some(file)) = (&dto.logo_picture, &dto.logo_picture_file) {
            if !picture.trim().is_empty() {
                self.pictures.write(&self.tenant, picture, file).await;
            }
        }

        manifest.script_code = match &dto.script {
            Some(script) => Some(self.hooks.ensure_script(script).await?),
            None => None,
        };

        manifest.module_source = Some(serde_json::to_string(dto)?);
        Ok(())
    }

    pub async fn delete(&self, code: &str) -> Result<(), ModuleError> {
        let manifest = self.require(code).await?;
        self.modules.remove(code).await?;
        if let Some(picture) = &manifest.logo_picture {
            self.pictures.remove(&self.tenant, picture).await;
        }
        info!("Deleted module {}", code);
        Ok(())
    }

    pub async fn find(&self, code: &str) -> Result<ModuleDto, ModuleError> {
        if is_blank(Some(code)) {
            return Err(ModuleError::missing(vec!["code".to_string()]));
        }
        let manifest = self.require(code).await?;
        self.module_to_dto(&manifest).await
    }

    /// Export a module. Downloaded modules that are not installed export
    /// their snapshot; others are rebuilt from the current entities.
    pub fn module_to_dto<'a>(
        &'a self,
        manifest: &'a ModuleManifest,
    ) -> BoxFuture<'a, Result<ModuleDto, ModuleError>> {
        Box::pin(async move {
            if manifest.is_downloaded() && !manifest.installed {
                return source_to_dto(manifest).map_err(|e| {
                    error!("Failed to load module source {}: {}", manifest.code, e);
                    e
                });
            }

            let mut dto = ModuleDto::new(
                manifest.code.clone(),
                manifest.description.clone(),
                manifest.license.clone(),
            );
            dto.logo_picture = manifest.logo_picture.clone();
            dto.script = manifest.script_code.as_deref().map(ScriptDto::by_code);

            if let Some(picture) = manifest.logo_picture.as_deref() {
                if !picture.trim().is_empty() {
                    dto.logo_picture_file = self.pictures.read(&self.tenant, picture).await;
                }
            }

            for item in &manifest.items {
                match self.item_to_dto(item).await? {
                    Some(item_dto) => dto.add_item(item_dto),
                    None => warn!("Failed to find a module item {:?}", item),
                }
            }
            Ok(dto)
        })
    }

    async fn item_to_dto(&self, item: &ModuleItem) -> Result<Option<ModuleItemDto>, ModuleError> {
        let applies_to = item.applies_to.as_deref();
        let data = match item.item_type.as_str() {
            MODULE_ITEM_TYPE => {
                let Some(child) = self.modules.find_by_code(&item.item_code).await? else {
                    return Ok(None);
                };
                let child_dto = self.module_to_dto(&child).await?;
                return Ok(Some(ModuleItemDto::new(
                    format!("{MODULE_ITEM_TYPE}{DTO_SUFFIX}"),
                    serde_json::to_value(child_dto)?,
                )));
            }
            FIELD_TEMPLATE_ITEM_TYPE | CUSTOM_ACTION_ITEM_TYPE => {
                self.entities
                    .find(&item.item_type, &item.item_code, applies_to)
                    .await?
            }
            entity_type => {
                let info = self
                    .registry
                    .get(entity_type)
                    .ok_or_else(|| ModuleError::not_found("Module item type", entity_type))?;
                match info.handler {
                    HandlerKind::Versioned => {
                        self.versioned
                            .find(entity_type, &item.item_code, item.validity.as_ref())
                            .await?
                    }
                    HandlerKind::Plain => {
                        self.entities
                            .find(entity_type, &item.item_code, applies_to)
                            .await?
                    }
                }
            }
        };
        Ok(data.map(|data| entity_to_item(&item.item_type, data)))
    }

    pub async fn list(&self, filter: &ModuleFilter) -> Result<Vec<ModuleDto>, ModuleError> {
        let filter = self.resolve_filter(filter)?;
        let mut result = Vec::new();
        for manifest in self.modules.list(&filter).await? {
            result.push(self.module_to_dto(&manifest).await?);
        }
        Ok(result)
    }

    pub async fn list_manifests(
        &self,
        filter: &ModuleFilter,
    ) -> Result<Vec<ModuleManifest>, ModuleError> {
        let filter = self.resolve_filter(filter)?;
        Ok(self.modules.list(&filter).await?)
    }

    pub async fn list_codes(&self, filter: &ModuleFilter) -> Result<Vec<String>, ModuleError> {
        let filter = self.resolve_filter(filter)?;
        Ok(self.modules.list_codes(&filter).await?)
    }

    fn resolve_filter(&self, filter: &ModuleFilter) -> Result<ModuleFilter, ModuleError> {
        let mut filter = filter.clone();
        if let Some(tag) = &filter.item_type {
            filter.item_class = Some(self.registry.resolve_tag(tag)?.to_string());
        }
        Ok(filter)
    }

    /// Uninstall a module; with `remove_items` its entities are deleted too,
    /// except those still referenced by another installed and active module.
    pub fn uninstall<'a>(
        &'a self,
        code: &'a str,
        remove_items: bool,
    ) -> BoxFuture<'a, Result<ModuleManifest, ModuleError>> {
        Box::pin(async move {
            if is_blank(Some(code)) {
                return Err(ModuleError::missing(vec!["code".to_string()]));
            }

            let mut manifest = self.require(code).await?;
            if !manifest.installed {
                return Err(ModuleError::forbidden(
                    code,
                    "uninstall",
                    "Module is not installed",
                ));
            }

            if remove_items {
                for item in &manifest.items {
                    if self.referenced_elsewhere(code, item).await? {
                        debug!("Keeping {:?}, still used by another module", item);
                        continue;
                    }
                    self.remove_item(item).await?;
                }
                manifest.items.clear();
            }

            manifest.installed = false;
            manifest.active = false;
            let manifest = self.modules.update(&manifest).await?;
            info!("Uninstalled module {}", code);
            Ok(manifest)
        })
    }

    async fn referenced_elsewhere(
        &self,
        code: &str,
        item: &ModuleItem,
    ) -> Result<bool, ModuleError> {
        let filter = ModuleFilter {
            item_class: Some(item.item_type.clone()),
            item_code: Some(item.item_code.clone()),
            installed: Some(true),
            active: Some(true),
            ..Default::default()
        };
        Ok(self
            .modules
            .list(&filter)
            .await?
            .iter()
            .any(|other| other.code != code))
    }

    async fn remove_item(&self, item: &ModuleItem) -> Result<(), ModuleError> {
        let applies_to = item.applies_to.as_deref();
        let removed = match item.item_type.as_str() {
            MODULE_ITEM_TYPE => match self.modules.find_by_code(&item.item_code).await? {
                Some(child) if child.installed => {
                    self.uninstall(&item.item_code, true).await?;
                    true
                }
                _ => false,
            },
            FIELD_TEMPLATE_ITEM_TYPE | CUSTOM_ACTION_ITEM_TYPE => {
                self.entities
                    .remove(&item.item_type, &item.item_code, applies_to)
                    .await?
            }
            entity_type => match self.registry.get(entity_type).map(|info| info.handler) {
                Some(HandlerKind::Versioned) => {
                    self.versioned
                        .remove(entity_type, &item.item_code, item.validity.as_ref())
                        .await?
                }
                Some(HandlerKind::Plain) => {
                    self.entities
                        .remove(entity_type, &item.item_code, applies_to)
                        .await?
                }
                None => {
                    warn!("No handler registered for module item type {}", entity_type);
                    false
                }
            },
        };
        if !removed {
            debug!("Module item {:?} had nothing to remove", item);
        }
        Ok(())
    }

    pub async fn enable(&self, code: &str) -> Result<ModuleManifest, ModuleError> {
        let mut manifest = self.require_code(code).await?;
        if !manifest.installed || manifest.active {
            return Err(ModuleError::forbidden(
                code,
                "enable",
                "Module is not installed or already enabled",
            ));
        }
        manifest.active = true;
        Ok(self.modules.update(&manifest).await?)
    }

    pub async fn disable(&self, code: &str) -> Result<ModuleManifest, ModuleError> {
        let mut manifest = self.require_code(code).await?;
        if !manifest.installed || !manifest.active {
            return Err(ModuleError::forbidden(
                code,
                "disable",
                "Module is not installed or already disabled",
            ));
        }
        manifest.active = false;
        Ok(self.modules.update(&manifest).await?)
    }

    /// Record an existing entity as an item of module `code`.
    pub async fn add_to_module(
        &self,
        code: &str,
        item_code: &str,
        item_tag: &str,
    ) -> Result<ModuleDto, ModuleError> {
        let mut manifest = self.require(code).await?;
        let item_type = self.registry.resolve_tag(item_tag)?;
        if item_type == MODULE_ITEM_TYPE && self.module_tree_contains(item_code, code).await? {
            return Err(ModuleError::BusinessRule {
                reason: format!("Module {item_code} already contains module {code}"),
            });
        }
        manifest.add_item(ModuleItem::new(item_code, item_type, None, None));
        let manifest = self.modules.update(&manifest).await?;
        self.module_to_dto(&manifest).await
    }

    pub async fn remove_from_module(
        &self,
        code: &str,
        item_code: &str,
        item_tag: &str,
    ) -> Result<ModuleDto, ModuleError> {
        let mut manifest = self.require(code).await?;
        let item_type = self.registry.resolve_tag(item_tag)?;
        manifest.remove_item(&ModuleItem::new(item_code, item_type, None, None));
        let manifest = self.modules.update(&manifest).await?;
        self.module_to_dto(&manifest).await
    }

    /// Whether an installed and active module holds the item.
    pub async fn is_child_of_other_active_module(
        &self,
        item_code: &str,
        item_tag: &str,
    ) -> Result<bool, ModuleError> {
        let item_type = self.registry.resolve_tag(item_tag)?;
        Ok(self
            .modules
            .is_child_of_other_active_module(item_code, item_type)
            .await?)
    }

    /// Whether module `target` is `root` or one of its nested modules.
    async fn module_tree_contains(&self, root: &str, target: &str) -> Result<bool, ModuleError> {
        let mut pending = vec![root.to_string()];
        let mut seen = HashSet::new();
        while let Some(code) = pending.pop() {
            if code == target {
                return Ok(true);
            }
            if !seen.insert(code.clone()) {
                continue;
            }
            if let Some(module) = self.modules.find_by_code(&code).await? {
                pending.extend(
                    module
                        .items
                        .iter()
                        .filter(|item| item.is_module())
                        .map(|item| item.item_code.clone()),
                );
            }
        }
        Ok(false)
    }

    async fn require_code(&self, code: &str) -> Result<ModuleManifest, ModuleError> {
        if is_blank(Some(code)) {
            return Err(ModuleError::missing(vec!["code".to_string()]));
        }
        self.require(code).await
    }

    async fn require(&self, code: &str) -> Result<ModuleManifest, ModuleError> {
        self.modules
            .find_by_code(code)
            .await?
            .ok_or_else(|| ModuleError::not_found("Module", code))
    }
}

/// The new code of a payload renaming its module, if it differs.
fn renamed_code(dto: &ModuleDto) -> Option<&str> {
    dto.updated_code
        .as_deref()
        .filter(|updated| !updated.trim().is_empty() && *updated != dto.code)
}

fn record<'a>(entity_type: &'a str, payload: &'a EntityPayload) -> EntityRecord<'a> {
    EntityRecord {
        entity_type,
        code: &payload.code,
        applies_to: payload.applies_to.as_deref(),
        data: &payload.data,
    }
}

/// Check the mandatory fields of a payload and settle its script code.
///
/// A script given with a source takes the full class name the source
/// declares as its code.
pub fn validate(dto: &mut ModuleDto) -> Result<(), ModuleError> {
    let mut missing = Vec::new();
    if is_blank(Some(&dto.code)) {
        missing.push("code".to_string());
    }
    if is_blank(Some(&dto.description)) {
        missing.push("description".to_string());
    }
    if is_blank(Some(&dto.license)) {
        missing.push("license".to_string());
    }

    if let Some(script) = dto.script.as_mut() {
        if is_blank(script.code.as_deref()) && is_blank(script.script.as_deref()) {
            missing.push("script.code".to_string());
        } else if let Some(source) = script.script.as_deref().filter(|s| !s.trim().is_empty()) {
            let full_class_name = introspect::full_class_name(source).ok_or_else(|| {
                ModuleError::Validation {
                    reason: "Could not find the class name of the module script".to_string(),
                }
            })?;
            if let Some(code) = script.code.as_deref().filter(|c| !c.trim().is_empty()) {
                if code != full_class_name {
                    return Err(ModuleError::Validation {
                        reason: "The code and the canonical script class name must be identical"
                            .to_string(),
                    });
                }
            }
            script.code = Some(full_class_name);
        }
    }

    if !missing.is_empty() {
        return Err(ModuleError::missing(missing));
    }
    Ok(())
}

/// Payload snapshot stored with a downloaded module
pub fn source_to_dto(manifest: &ModuleManifest) -> Result<ModuleDto, ModuleError> {
    let source = manifest.module_source.as_deref().unwrap_or_default();
    Ok(serde_json::from_str(source)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::json;

    fn installer(store: &Arc<MemoryStore>) -> ModuleInstaller {
        ModuleInstaller::new(
            TenantId::default(),
            store.clone(),
            store.clone(),
            store.clone(),
            ItemTypeRegistry::with_builtin_types(),
        )
    }

    #[test]
    fn test_validate_collects_missing_fields() {
        let mut dto = ModuleDto::new("", "", "l").with_script(ScriptDto::default());
        match validate(&mut dto).unwrap_err() {
            ModuleError::MissingParameters { missing } => {
                assert_eq!(missing, vec!["code", "description", "script.code"])
            }
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_validate_derives_script_code() {
        let mut dto = ModuleDto::new("M1", "d", "l").with_script(ScriptDto::with_source(
            "package org.acme;\npublic class Setup extends ModuleScript {}",
        ));
        validate(&mut dto).unwrap();
        assert_eq!(
            dto.script.unwrap().code.as_deref(),
            Some("org.acme.Setup")
        );
    }

    #[test]
    fn test_validate_rejects_mismatched_script_code() {
        let mut script = ScriptDto::with_source("package a;\npublic class B extends C {}");
        script.code = Some("a.Other".to_string());
        let mut dto = ModuleDto::new("M1", "d", "l").with_script(script);
        assert!(matches!(
            validate(&mut dto).unwrap_err(),
            ModuleError::Validation { .. }
        ));
    }

    #[tokio::test]
    async fn test_development_module_keeps_no_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let installer = installer(&store);

        let manifest = installer
            .create(ModuleDto::new("M1", "d", "l"), true)
            .await
            .unwrap();
        assert!(!manifest.is_downloaded());

        let err = installer
            .create(ModuleDto::new("M1", "d", "l"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ModuleError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_enable_disable_state_machine() {
        let store = Arc::new(MemoryStore::new());
        let installer = installer(&store);
        installer.install(ModuleDto::new("M1", "d", "l")).await.unwrap();

        assert!(installer.enable("M1").await.unwrap_err().is_forbidden());
        assert!(!installer.disable("M1").await.unwrap().active);
        assert!(installer.disable("M1").await.unwrap_err().is_forbidden());
        assert!(installer.enable("M1").await.unwrap().active);
    }

    #[tokio::test]
    async fn test_export_rebuilds_installed_items() {
        let store = Arc::new(MemoryStore::new());
        let installer = installer(&store);
        let dto = ModuleDto::new("M1", "d", "l").with_items(vec![ModuleItemDto::new(
            "CustomEntityTemplateDto",
            json!({"code": "order", "fields": [{"code": "amount"}]}),
        )]);
        installer.install(dto).await.unwrap();

        let exported = installer.find("M1").await.unwrap();
        let items = exported.module_items.unwrap();
        // the nested field template was never persisted on its own
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].dto_class_name, "CustomEntityTemplateDto");
    }

    #[tokio::test]
    async fn test_add_and_remove_item_by_tag() {
        let store = Arc::new(MemoryStore::new());
        let installer = installer(&store);
        installer
            .create(ModuleDto::new("M1", "d", "l"), false)
            .await
            .unwrap();

        installer.add_to_module("M1", "order", "cet").await.unwrap();
        let manifest = ModuleStore::find_by_code(store.as_ref(), "M1")
            .await
            .unwrap()
            .unwrap();
        assert!(manifest.contains_item("order", "CustomEntityTemplate"));

        installer.remove_from_module("M1", "order", "cet").await.unwrap();
        let manifest = ModuleStore::find_by_code(store.as_ref(), "M1")
            .await
            .unwrap()
            .unwrap();
        assert!(manifest.items.is_empty());

        assert!(installer
            .add_to_module("M1", "order", "bogus")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_list_filters_by_item_tag() {
        let store = Arc::new(MemoryStore::new());
        let installer = installer(&store);
        installer
            .install(ModuleDto::new("M1", "d", "l").with_items(vec![ModuleItemDto::new(
                "EntityCustomActionDto",
                json!({"code": "approve", "appliesTo": "CE_order"}),
            )]))
            .await
            .unwrap();
        installer.install(ModuleDto::new("M2", "d", "l")).await.unwrap();

        let filter = ModuleFilter {
            item_type: Some("eca".to_string()),
            ..Default::default()
        };
        assert_eq!(installer.list_codes(&filter).await.unwrap(), vec!["M1"]);
        assert_eq!(
            installer
                .list_codes(&ModuleFilter::default())
                .await
                .unwrap()
                .len(),
            2
        );
    }
}
