/// Backend binding script sources to implementations registered at startup
use super::traits::{CompileRequest, CompilerBackend};
use crate::script::error::BackendError;
use crate::script::interface::{Capability, FnScriptFactory, ScriptFactory, ScriptInterface};
use crate::types::{Diagnostic, Severity};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Registry of known implementation builders keyed by full class name.
///
/// Compiling a source looks up the builder registered for the class the
/// source declares; sources naming an unknown class fail with a diagnostic
/// located on the declaration.
#[derive(Default)]
pub struct RegistryBackend {
    builders: RwLock<HashMap<String, Arc<dyn ScriptFactory>>>,
}

impl RegistryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, factory: Arc<dyn ScriptFactory>) {
        let name = factory.class_name().to_string();
        debug!("Registering script implementation {}", name);
        if let Ok(mut builders) = self.builders.write() {
            builders.insert(name, factory);
        }
    }

    /// Register a constructor function under `class_name`.
    pub fn register_fn<F>(&self, class_name: &str, capabilities: Vec<Capability>, builder: F)
    where
        F: Fn() -> Box<dyn ScriptInterface> + Send + Sync + 'static,
    {
        self.register(Arc::new(FnScriptFactory::new(
            class_name,
            capabilities,
            builder,
        )));
    }

    pub fn registered(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builders
            .read()
            .map(|builders| builders.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    fn declaration_line(source: &str) -> u64 {
        source
            .lines()
            .position(|line| line.contains("public class"))
            .map(|index| index as u64 + 1)
            .unwrap_or(1)
    }
}

#[async_trait]
impl CompilerBackend for RegistryBackend {
    async fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn ScriptFactory>, BackendError> {
        let builders = self
            .builders
            .read()
            .map_err(|_| BackendError::unexpected("PoisonError", "builder registry lock poisoned"))?;

        match builders.get(&request.full_class_name) {
            Some(factory) => Ok(factory.clone()),
            None => Err(BackendError::Diagnostics(vec![Diagnostic::located(
                Severity::Error,
                format!(
                    "cannot find symbol: no implementation registered for class {}",
                    request.full_class_name
                ),
                format!("{}.src", request.full_class_name),
                Self::declaration_line(&request.source),
                None,
            )])),
        }
    }

    fn backend_name(&self) -> &'static str {
        "registry"
    }
}
