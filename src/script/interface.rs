//! Script interface traits and compiled script handles

use crate::script::error::ScriptError;
use crate::types::ModuleManifest;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Values exchanged with a running script
pub type ScriptContext = HashMap<String, serde_json::Value>;

/// Interface a compiled script must satisfy to be usable by a service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Generic executable script
    Script,
    /// Script driving a module's install lifecycle
    ModuleScript,
    /// Script exposed as a callable function endpoint
    Function,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::Script => "script",
            Capability::ModuleScript => "module_script",
            Capability::Function => "function",
        };
        f.write_str(name)
    }
}

/// Unified interface of every compiled script
#[async_trait]
pub trait ScriptInterface: Send + Sync {
    async fn init(&self, _context: &mut ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    async fn execute(&self, context: &mut ScriptContext) -> Result<(), ScriptError>;

    async fn finalize(&self, _context: &mut ScriptContext) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Called before the items of `module` are unpacked
    async fn pre_install_module(
        &self,
        _context: &mut ScriptContext,
        _module: &ModuleManifest,
    ) -> Result<(), ScriptError> {
        Ok(())
    }

    /// Called once `module` is marked installed
    async fn post_install_module(
        &self,
        _context: &mut ScriptContext,
        _module: &ModuleManifest,
    ) -> Result<(), ScriptError> {
        Ok(())
    }
}

/// Produces instances of one compiled script type
pub trait ScriptFactory: Send + Sync {
    fn class_name(&self) -> &str;

    fn capabilities(&self) -> &[Capability];

    fn instantiate(&self) -> Result<Box<dyn ScriptInterface>, ScriptError>;
}

type Builder = dyn Fn() -> Box<dyn ScriptInterface> + Send + Sync;

/// Factory backed by a plain constructor function
pub struct FnScriptFactory {
    class_name: String,
    capabilities: Vec<Capability>,
    builder: Box<Builder>,
}

impl FnScriptFactory {
    pub fn new<F>(class_name: impl Into<String>, capabilities: Vec<Capability>, builder: F) -> Self
    where
        F: Fn() -> Box<dyn ScriptInterface> + Send + Sync + 'static,
    {
        Self {
            class_name: class_name.into(),
            capabilities,
            builder: Box::new(builder),
        }
    }
}

impl ScriptFactory for FnScriptFactory {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn instantiate(&self) -> Result<Box<dyn ScriptInterface>, ScriptError> {
        Ok((self.builder)())
    }
}

/// Successfully compiled script type held by the compiled cache
#[derive(Clone)]
pub struct CompiledScript {
    pub full_class_name: String,
    pub capability: Capability,
    pub source_checksum: String,
    pub compiled_at: DateTime<Utc>,
    factory: Arc<dyn ScriptFactory>,
}

impl CompiledScript {
    pub fn new(
        full_class_name: impl Into<String>,
        capability: Capability,
        source_checksum: impl Into<String>,
        factory: Arc<dyn ScriptFactory>,
    ) -> Self {
        Self {
            full_class_name: full_class_name.into(),
            capability,
            source_checksum: source_checksum.into(),
            compiled_at: Utc::now(),
            factory,
        }
    }

    pub fn instantiate(&self) -> Result<Box<dyn ScriptInterface>, ScriptError> {
        self.factory.instantiate()
    }

    /// True when both handles come from the same compilation.
    pub fn same_type(&self, other: &CompiledScript) -> bool {
        Arc::ptr_eq(&self.factory, &other.factory)
    }
}

impl fmt::Debug for CompiledScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledScript")
            .field("full_class_name", &self.full_class_name)
            .field("capability", &self.capability)
            .field("source_checksum", &self.source_checksum)
            .field("compiled_at", &self.compiled_at)
            .finish()
    }
}
