/// Abstract compiler backend for runtime scripts
use crate::script::classpath::Classpath;
use crate::script::error::BackendError;
use crate::script::interface::{Capability, ScriptFactory};
use async_trait::async_trait;
use std::sync::Arc;

/// Everything a backend needs to compile one unit of source
#[derive(Debug, Clone)]
pub struct CompileRequest {
    /// Script code the compilation is performed for
    pub identifier: String,
    pub full_class_name: String,
    pub source: String,
    pub classpath: Classpath,
    pub capability: Capability,
}

#[async_trait]
pub trait CompilerBackend: Send + Sync {
    /// Compile the request into a factory of script instances, or report
    /// the compiler's diagnostics.
    async fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn ScriptFactory>, BackendError>;

    fn backend_name(&self) -> &'static str;
}
