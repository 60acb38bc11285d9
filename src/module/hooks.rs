//! Module install lifecycle scripts

use crate::module::error::ModuleError;
use crate::script::{ScriptContext, ScriptInterface, ScriptService};
use crate::types::{ModuleManifest, ScriptDto, ScriptUnit, TenantId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

/// Script instance kept between the pre- and post-install calls
pub struct ModuleScriptHandle {
    pub code: String,
    pub context: ScriptContext,
    instance: Box<dyn ScriptInterface>,
}

impl ModuleScriptHandle {
    pub fn new(code: impl Into<String>, instance: Box<dyn ScriptInterface>) -> Self {
        Self {
            code: code.into(),
            context: ScriptContext::new(),
            instance,
        }
    }
}

/// Access to the scripts that drive a module's installation
#[async_trait]
pub trait ModuleScriptHooks: Send + Sync {
    /// Persist the script of a module payload when it carries a source and
    /// return its code. Code-only references must already exist.
    async fn ensure_script(&self, script: &ScriptDto) -> Result<String, ModuleError>;

    async fn script_exists(&self, code: &str) -> Result<bool, ModuleError>;

    async fn pre_install(
        &self,
        code: &str,
        module: &ModuleManifest,
    ) -> Result<Option<ModuleScriptHandle>, ModuleError>;

    async fn post_install(
        &self,
        handle: ModuleScriptHandle,
        module: &ModuleManifest,
    ) -> Result<(), ModuleError>;
}

/// Hooks backed by the module script service of one tenant
pub struct ServiceScriptHooks {
    service: Arc<ScriptService>,
    tenant: TenantId,
}

impl ServiceScriptHooks {
    pub fn new(service: Arc<ScriptService>, tenant: TenantId) -> Self {
        Self { service, tenant }
    }
}

#[async_trait]
impl ModuleScriptHooks for ServiceScriptHooks {
    async fn ensure_script(&self, script: &ScriptDto) -> Result<String, ModuleError> {
        if !script.is_code_only() {
            let mut unit = ScriptUnit::new(
                script.code.clone().unwrap_or_default(),
                script.script.clone().unwrap_or_default(),
            );
            unit.active = script.active;
            let unit = self.service.create_or_update(&self.tenant, unit).await?;
            return Ok(unit.code);
        }

        let code = script.code.clone().unwrap_or_default();
        if !self.script_exists(&code).await? {
            return Err(ModuleError::not_found("ModuleScript", &code));
        }
        Ok(code)
    }

    async fn script_exists(&self, code: &str) -> Result<bool, ModuleError> {
        Ok(self.service.find(&self.tenant, code).await?.is_some())
    }

    async fn pre_install(
        &self,
        code: &str,
        module: &ModuleManifest,
    ) -> Result<Option<ModuleScriptHandle>, ModuleError> {
        let instance = self.service.get_script_instance(&self.tenant, code).await?;
        let mut handle = ModuleScriptHandle::new(code, instance);
        debug!("Running pre-install script {} of module {}", code, module.code);
        handle
            .instance
            .pre_install_module(&mut handle.context, module)
            .await?;
        Ok(Some(handle))
    }

    async fn post_install(
        &self,
        mut handle: ModuleScriptHandle,
        module: &ModuleManifest,
    ) -> Result<(), ModuleError> {
        debug!(
            "Running post-install script {} of module {}",
            handle.code, module.code
        );
        handle
            .instance
            .post_install_module(&mut handle.context, module)
            .await?;
        Ok(())
    }
}

/// Hooks for deployments without module scripts
pub struct NoScriptHooks;

#[async_trait]
impl ModuleScriptHooks for NoScriptHooks {
    async fn ensure_script(&self, script: &ScriptDto) -> Result<String, ModuleError> {
        Err(ModuleError::not_found(
            "ModuleScript",
            script.code.as_deref().unwrap_or_default(),
        ))
    }

    async fn script_exists(&self, _code: &str) -> Result<bool, ModuleError> {
        Ok(false)
    }

    async fn pre_install(
        &self,
        _code: &str,
        _module: &ModuleManifest,
    ) -> Result<Option<ModuleScriptHandle>, ModuleError> {
        Ok(None)
    }

    async fn post_install(
        &self,
        _handle: ModuleScriptHandle,
        _module: &ModuleManifest,
    ) -> Result<(), ModuleError> {
        Ok(())
    }
}
