//! Integration tests for the compiled script cache

use async_trait::async_trait;
use modforge::config::ClasspathConfig;
use modforge::script::backends::{CompileRequest, CompilerBackend, RegistryBackend};
use modforge::script::{
    introspect, BackendError, Capability, ClasspathResolver, CompiledScriptCache,
    DynamicCompiler, ScriptContext, ScriptError, ScriptFactory, ScriptInterface, ScriptService,
};
use modforge::store::{MemoryStore, ScriptStore};
use modforge::types::{ScriptUnit, TenantId};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const FOO: &str = "package p;\npublic class Foo implements Script {}\n";

struct Greeter;

#[async_trait]
impl ScriptInterface for Greeter {
    async fn execute(&self, context: &mut ScriptContext) -> Result<(), ScriptError> {
        context.insert("greeting".to_string(), json!("hello"));
        Ok(())
    }
}

/// Registry backend that counts compilations and takes its time about them
struct CountingBackend {
    inner: RegistryBackend,
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingBackend {
    fn new(delay: Duration) -> Self {
        let inner = RegistryBackend::new();
        inner.register_fn("p.Foo", vec![Capability::Script], || Box::new(Greeter));
        Self {
            inner,
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompilerBackend for CountingBackend {
    async fn compile(
        &self,
        request: &CompileRequest,
    ) -> Result<Arc<dyn ScriptFactory>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.inner.compile(request).await
    }

    fn backend_name(&self) -> &'static str {
        "counting"
    }
}

struct Fixture {
    _dir: TempDir,
    backend: Arc<CountingBackend>,
    store: Arc<MemoryStore>,
    service: Arc<ScriptService>,
}

fn fixture(delay: Duration) -> Fixture {
    let dir = TempDir::new().unwrap();
    let backend = Arc::new(CountingBackend::new(delay));
    let store = Arc::new(MemoryStore::new());
    let classpath = Arc::new(ClasspathResolver::new(ClasspathConfig {
        component_location: Some(dir.path().to_path_buf()),
        ..Default::default()
    }));
    let service = Arc::new(ScriptService::new(
        Capability::Script,
        store.clone(),
        Arc::new(DynamicCompiler::new(backend.clone(), classpath)),
        CompiledScriptCache::new(),
    ));
    Fixture {
        _dir: dir,
        backend,
        store,
        service,
    }
}

#[test]
fn test_full_class_name_examples() {
    assert_eq!(
        introspect::full_class_name("package p; public class Foo implements Bar {}").as_deref(),
        Some("p.Foo")
    );
    assert_eq!(
        introspect::full_class_name("public class Foo extends Bar {}").as_deref(),
        Some("Foo")
    );
}

#[tokio::test]
async fn test_cache_hit_does_not_recompile() {
    let fx = fixture(Duration::ZERO);
    let tenant = TenantId::default();
    let mut unit = ScriptUnit::new("p.Foo", FOO);

    assert!(fx.service.compile_script(&tenant, &mut unit, false).await.is_some());
    assert_eq!(fx.backend.calls(), 1);

    let compiled = fx.service.get_script_interface(&tenant, "p.Foo").await.unwrap();
    assert_eq!(compiled.full_class_name, "p.Foo");
    assert_eq!(fx.backend.calls(), 1);

    let instance = fx.service.get_script_instance(&tenant, "p.Foo").await.unwrap();
    let mut context = ScriptContext::new();
    instance.execute(&mut context).await.unwrap();
    assert_eq!(context["greeting"], json!("hello"));
    assert_eq!(fx.backend.calls(), 1);
}

#[tokio::test]
async fn test_test_compile_leaves_cache_unchanged() {
    let fx = fixture(Duration::ZERO);
    let tenant = TenantId::default();

    let mut good = ScriptUnit::new("p.Foo", FOO);
    assert!(fx.service.compile_script(&tenant, &mut good, true).await.is_some());
    assert!(fx.service.cache().is_empty().await);

    let mut bad = ScriptUnit::new("p.Nope", "package p;\npublic class Nope extends X {}");
    assert!(fx.service.compile_script(&tenant, &mut bad, true).await.is_none());
    assert!(bad.error);
    assert!(fx.service.cache().is_empty().await);

    // a test compile does not evict an existing entry either
    fx.service.compile_script(&tenant, &mut good, false).await;
    let before = fx.service.cache().codes(&tenant).await;
    fx.service.compile_script(&tenant, &mut good, true).await;
    assert_eq!(fx.service.cache().codes(&tenant).await, before);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_compiles_once() {
    let fx = fixture(Duration::from_millis(50));
    let tenant = TenantId::new("acme");
    fx.store
        .save(&tenant, &ScriptUnit::new("p.Foo", FOO))
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = fx.service.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            service.get_script_interface(&tenant, "p.Foo").await
        }));
    }

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(fx.backend.calls(), 1);
    assert!(results.iter().all(|compiled| compiled.same_type(&results[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_access_to_invalid_script_fails_for_everyone() {
    let fx = fixture(Duration::from_millis(10));
    let tenant = TenantId::default();
    fx.store
        .save(
            &tenant,
            &ScriptUnit::new("p.Broken", "package p;\npublic class Broken extends X {}"),
        )
        .await
        .unwrap();

    let mut handles = Vec::new();
    for _ in 0..4 {
        let service = fx.service.clone();
        let tenant = tenant.clone();
        handles.push(tokio::spawn(async move {
            service.get_script_interface(&tenant, "p.Broken").await
        }));
    }

    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ScriptError::InvalidScript { .. }));
    }
    assert!(fx.service.cache().is_empty().await);
}

#[tokio::test]
async fn test_clear_then_get_recompiles_current_source() {
    let fx = fixture(Duration::ZERO);
    let tenant = TenantId::default();
    fx.store
        .save(&tenant, &ScriptUnit::new("p.Foo", FOO))
        .await
        .unwrap();

    fx.service.get_script_interface(&tenant, "p.Foo").await.unwrap();
    fx.service.clear(&tenant, "p.Foo").await;
    fx.service.clear(&tenant, "p.Foo").await;
    fx.service.get_script_interface(&tenant, "p.Foo").await.unwrap();
    assert_eq!(fx.backend.calls(), 2);

    // the stored source now declares a class nothing implements
    fx.store
        .save(
            &tenant,
            &ScriptUnit::new("p.Foo", "package p;\npublic class Renamed extends X {}"),
        )
        .await
        .unwrap();
    fx.service.clear(&tenant, "p.Foo").await;

    let err = fx.service.get_script_interface(&tenant, "p.Foo").await.unwrap_err();
    assert!(matches!(err, ScriptError::InvalidScript { .. }));
    assert_eq!(fx.backend.calls(), 3);
}

#[tokio::test]
async fn test_compile_all_populates_active_scripts_only() {
    let fx = fixture(Duration::ZERO);
    let tenant = TenantId::default();
    fx.store
        .save(&tenant, &ScriptUnit::new("p.Foo", FOO))
        .await
        .unwrap();
    fx.store
        .save(
            &tenant,
            &ScriptUnit::new("p.Other", "package p;\npublic class Other extends X {}").inactive(),
        )
        .await
        .unwrap();

    assert_eq!(fx.service.compile_all(&tenant).await.unwrap(), 1);
    assert_eq!(fx.service.cache().codes(&tenant).await, vec!["p.Foo"]);
    assert_eq!(fx.backend.calls(), 1);
}

#[tokio::test]
async fn test_refresh_drops_entry_of_removed_script() {
    let fx = fixture(Duration::ZERO);
    let tenant = TenantId::default();
    fx.service
        .create_or_update(&tenant, ScriptUnit::new("", FOO))
        .await
        .unwrap();
    assert!(!fx.service.cache().is_empty().await);

    ScriptStore::remove(fx.store.as_ref(), &tenant, "p.Foo")
        .await
        .unwrap();
    fx.service.refresh_compiled_script(&tenant, "p.Foo").await.unwrap();
    assert!(fx.service.cache().is_empty().await);
}
