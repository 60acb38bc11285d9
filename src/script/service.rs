//! Tenant aware script service: persistence, compilation and the compiled cache

use crate::script::cache::CompiledScriptCache;
use crate::script::compiler::DynamicCompiler;
use crate::script::error::ScriptError;
use crate::script::interface::{Capability, CompiledScript, ScriptInterface};
use crate::script::introspect;
use crate::store::ScriptStore;
use crate::types::{CacheKey, Diagnostic, ScriptUnit, TenantId};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Scripts of one capability, compiled lazily and cached per tenant.
pub struct ScriptService {
    capability: Capability,
    store: Arc<dyn ScriptStore>,
    compiler: Arc<DynamicCompiler>,
    cache: CompiledScriptCache,
    reserved_namespaces: Vec<String>,
}

impl ScriptService {
    pub fn new(
        capability: Capability,
        store: Arc<dyn ScriptStore>,
        compiler: Arc<DynamicCompiler>,
        cache: CompiledScriptCache,
    ) -> Self {
        Self {
            capability,
            store,
            compiler,
            cache,
            reserved_namespaces: Vec::new(),
        }
    }

    /// Namespaces user scripts may not declare classes in
    pub fn with_reserved_namespaces(mut self, namespaces: Vec<String>) -> Self {
        self.reserved_namespaces = namespaces;
        self
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn cache(&self) -> &CompiledScriptCache {
        &self.cache
    }

    pub fn compiler(&self) -> &Arc<DynamicCompiler> {
        &self.compiler
    }

    /// Compile `unit` and record the outcome on it.
    ///
    /// A regular compile first drops the cached entry; a successful compile
    /// of an active unit then repopulates it. Test compiles never touch the
    /// cache.
    pub async fn compile_script(
        &self,
        tenant: &TenantId,
        unit: &mut ScriptUnit,
        test_compile: bool,
    ) -> Option<CompiledScript> {
        let key = CacheKey::new(tenant, &unit.code);
        if !test_compile {
            self.cache.remove(&key).await;
        }

        let compiled = self.compile_unit(unit).await;
        if let Some(compiled) = &compiled {
            if unit.active && !test_compile {
                self.cache.insert(key, compiled.clone()).await;
            }
        }
        compiled
    }

    async fn compile_unit(&self, unit: &mut ScriptUnit) -> Option<CompiledScript> {
        debug!("Compile script {}", unit.code);
        match self
            .compiler
            .compile(&unit.code, &unit.source, self.capability)
            .await
        {
            Ok(compiled) => {
                unit.set_diagnostics(Vec::new());
                Some(compiled)
            }
            Err(failure) => {
                unit.set_diagnostics(failure.diagnostics);
                None
            }
        }
    }

    /// Compiled type of the script `code`, compiling it on first access.
    ///
    /// Concurrent first accesses compile once: a miss in shared mode is
    /// re-checked under the exclusive guard before compiling.
    pub async fn get_script_interface(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<CompiledScript, ScriptError> {
        let key = CacheKey::new(tenant, code);
        if let Some(compiled) = self.cache.get(&key).await {
            return Ok(compiled);
        }

        let mut cache = self.cache.exclusive().await;
        if let Some(compiled) = cache.get(&key) {
            return Ok(compiled);
        }

        let mut unit = self
            .store
            .find_by_code(tenant, code)
            .await?
            .ok_or_else(|| ScriptError::NotFound {
                code: code.to_string(),
            })?;

        cache.remove(&key);
        if let Some(compiled) = self.compile_unit(&mut unit).await {
            if unit.active {
                cache.insert(key.clone(), compiled);
            }
        }
        self.store.save(tenant, &unit).await?;

        if unit.error {
            return Err(ScriptError::InvalidScript {
                code: code.to_string(),
                diagnostics: unit.diagnostics,
            });
        }

        cache.get(&key).ok_or_else(|| ScriptError::NotFound {
            code: code.to_string(),
        })
    }

    /// Fresh instance of the script `code`
    pub async fn get_script_instance(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Box<dyn ScriptInterface>, ScriptError> {
        let compiled = self.get_script_interface(tenant, code).await?;
        compiled.instantiate().map_err(|e| {
            error!("Failed to instantiate script {}: {}", code, e);
            e
        })
    }

    /// Drop the compiled entry of `code`, if any
    pub async fn clear(&self, tenant: &TenantId, code: &str) {
        if self.cache.remove(&CacheKey::new(tenant, code)).await.is_some() {
            debug!("Cleared compiled script {}/{}", tenant, code);
        }
    }

    /// Recompile `code` from its persisted source, or drop it if it is gone.
    pub async fn refresh_compiled_script(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<(), ScriptError> {
        match self.store.find_by_code(tenant, code).await? {
            Some(mut unit) => {
                self.compile_script(tenant, &mut unit, false).await;
                self.store.save(tenant, &unit).await?;
            }
            None => self.clear(tenant, code).await,
        }
        Ok(())
    }

    /// Compile every active script of `tenant`; returns how many compiled.
    pub async fn compile_all(&self, tenant: &TenantId) -> Result<usize, ScriptError> {
        if let Err(e) = self.compiler.classpath().construct().await {
            warn!("Failed to construct classpath: {}", e);
        }

        let units = self.store.list_active(tenant).await?;
        info!("Compiling {} active script(s) for {}", units.len(), tenant);

        let mut compiled = 0;
        for mut unit in units {
            if self.compile_script(tenant, &mut unit, false).await.is_some() {
                compiled += 1;
            } else {
                error!(
                    "Failed to compile script {}: {} error(s)",
                    unit.code,
                    unit.diagnostics.len()
                );
            }
            if let Err(e) = self.store.save(tenant, &unit).await {
                error!("Failed to persist compilation state of {}: {}", unit.code, e);
            }
        }
        Ok(compiled)
    }

    /// Check that `unit` declares a class outside the reserved namespaces.
    pub fn validate(&self, unit: &ScriptUnit) -> Result<String, ScriptError> {
        let full_class_name = introspect::full_class_name(&unit.source).ok_or_else(|| {
            ScriptError::Validation {
                reason: format!("Could not find the class name of script {}", unit.code),
            }
        })?;

        if let Some(namespace) = self
            .reserved_namespaces
            .iter()
            .find(|namespace| full_class_name.starts_with(namespace.as_str()))
        {
            return Err(ScriptError::Validation {
                reason: format!(
                    "{} is declared in the reserved namespace {}",
                    full_class_name, namespace
                ),
            });
        }
        Ok(full_class_name)
    }

    /// Validate, persist and compile a script. The code is always the full
    /// class name declared by the source.
    pub async fn create_or_update(
        &self,
        tenant: &TenantId,
        mut unit: ScriptUnit,
    ) -> Result<ScriptUnit, ScriptError> {
        let full_class_name = self.validate(&unit)?;
        if !unit.code.is_empty() && unit.code != full_class_name {
            debug!(
                "Script code {} replaced by declared class name {}",
                unit.code, full_class_name
            );
        }
        unit.code = full_class_name;

        self.compile_script(tenant, &mut unit, false).await;
        self.store.save(tenant, &unit).await?;
        info!("Saved script {} for {}", unit.code, tenant);
        Ok(unit)
    }

    pub async fn deactivate(&self, tenant: &TenantId, code: &str) -> Result<(), ScriptError> {
        let mut unit = self.find(tenant, code).await?.ok_or_else(|| ScriptError::NotFound {
            code: code.to_string(),
        })?;
        unit.active = false;
        self.store.save(tenant, &unit).await?;
        self.clear(tenant, code).await;
        Ok(())
    }

    pub async fn remove(&self, tenant: &TenantId, code: &str) -> Result<(), ScriptError> {
        let removed = self.store.remove(tenant, code).await?;
        self.clear(tenant, code).await;
        if removed {
            Ok(())
        } else {
            Err(ScriptError::NotFound {
                code: code.to_string(),
            })
        }
    }

    pub async fn find(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<ScriptUnit>, ScriptError> {
        Ok(self.store.find_by_code(tenant, code).await?)
    }

    pub async fn list(&self, tenant: &TenantId) -> Result<Vec<ScriptUnit>, ScriptError> {
        Ok(self.store.list(tenant).await?)
    }

    /// Compile raw source without persisting or caching anything.
    pub async fn compile_source_for_test(&self, source: &str) -> Vec<Diagnostic> {
        let code = introspect::full_class_name(source).unwrap_or_else(|| "unnamed".to_string());
        let mut unit = ScriptUnit::new(code, source);
        self.compile_script(&TenantId::default(), &mut unit, true)
            .await;
        unit.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClasspathConfig;
    use crate::script::backends::RegistryBackend;
    use crate::script::classpath::ClasspathResolver;
    use crate::script::interface::ScriptContext;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const FOO: &str = "package p;\npublic class Foo implements Script {}\n";

    struct Noop;

    #[async_trait]
    impl ScriptInterface for Noop {
        async fn execute(&self, _context: &mut ScriptContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    fn service(dir: &TempDir, store: Arc<MemoryStore>) -> ScriptService {
        let backend = Arc::new(RegistryBackend::new());
        backend.register_fn("p.Foo", vec![Capability::Script], || Box::new(Noop));
        let classpath = Arc::new(ClasspathResolver::new(ClasspathConfig {
            component_location: Some(dir.path().to_path_buf()),
            ..Default::default()
        }));
        ScriptService::new(
            Capability::Script,
            store,
            Arc::new(DynamicCompiler::new(backend, classpath)),
            CompiledScriptCache::new(),
        )
        .with_reserved_namespaces(vec!["java.".to_string()])
    }

    #[tokio::test]
    async fn test_missing_script_is_not_found() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(MemoryStore::new()));

        let err = service
            .get_script_interface(&TenantId::default(), "p.Missing")
            .await
            .unwrap_err();
        assert!(matches!(err, ScriptError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_inactive_script_compiles_but_is_not_served() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::default();
        store
            .save(&tenant, &ScriptUnit::new("p.Foo", FOO).inactive())
            .await
            .unwrap();
        let service = service(&dir, store);

        let err = service.get_script_interface(&tenant, "p.Foo").await.unwrap_err();
        assert!(matches!(err, ScriptError::NotFound { .. }));
        assert!(service.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_script_reports_diagnostics_and_persists_them() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let tenant = TenantId::default();
        let source = "package p;\npublic class Unknown implements Script {}\n";
        store
            .save(&tenant, &ScriptUnit::new("p.Unknown", source))
            .await
            .unwrap();
        let service = service(&dir, store.clone());

        let err = service.get_script_interface(&tenant, "p.Unknown").await.unwrap_err();
        match err {
            ScriptError::InvalidScript { diagnostics, .. } => assert!(!diagnostics.is_empty()),
            other => panic!("unexpected error: {other}"),
        }

        let persisted = ScriptStore::find_by_code(store.as_ref(), &tenant, "p.Unknown")
            .await
            .unwrap()
            .unwrap();
        assert!(persisted.error);
    }

    #[tokio::test]
    async fn test_create_or_update_derives_code_from_source() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(MemoryStore::new()));
        let tenant = TenantId::default();

        let unit = service
            .create_or_update(&tenant, ScriptUnit::new("", FOO))
            .await
            .unwrap();
        assert_eq!(unit.code, "p.Foo");
        assert!(!unit.error);
        assert_eq!(service.cache().codes(&tenant).await, vec!["p.Foo"]);
    }

    #[tokio::test]
    async fn test_reserved_namespace_is_rejected() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(MemoryStore::new()));

        let unit = ScriptUnit::new("", "package java.util;\npublic class Evil extends Thing {}");
        let err = service.validate(&unit).unwrap_err();
        assert!(matches!(err, ScriptError::Validation { .. }));
    }

    #[tokio::test]
    async fn test_deactivate_clears_cache() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(MemoryStore::new()));
        let tenant = TenantId::default();
        service
            .create_or_update(&tenant, ScriptUnit::new("p.Foo", FOO))
            .await
            .unwrap();

        service.deactivate(&tenant, "p.Foo").await.unwrap();
        assert!(service.cache().is_empty().await);
        assert!(!service.find(&tenant, "p.Foo").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_compile_source_for_test_leaves_cache_untouched() {
        let dir = TempDir::new().unwrap();
        let service = service(&dir, Arc::new(MemoryStore::new()));

        assert!(service.compile_source_for_test(FOO).await.is_empty());
        assert!(!service
            .compile_source_for_test("package p;\npublic class Bar extends X {}")
            .await
            .is_empty());
        assert!(service.cache().is_empty().await);
    }
}
