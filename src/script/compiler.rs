use crate::script::backends::{CompileRequest, CompilerBackend};
use crate::script::classpath::ClasspathResolver;
use crate::script::error::{BackendError, CompilationFailure};
use crate::script::interface::{Capability, CompiledScript};
use crate::script::introspect;
use crate::types::Diagnostic;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, trace, warn};

/// Compiles single units of script source against a target capability
pub struct DynamicCompiler {
    backend: Arc<dyn CompilerBackend>,
    classpath: Arc<ClasspathResolver>,
}

impl DynamicCompiler {
    pub fn new(backend: Arc<dyn CompilerBackend>, classpath: Arc<ClasspathResolver>) -> Self {
        Self { backend, classpath }
    }

    pub fn classpath(&self) -> &Arc<ClasspathResolver> {
        &self.classpath
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.backend_name()
    }

    /// Compile `source` for the script `identifier`.
    ///
    /// Only error diagnostics are returned on failure. Failures of the
    /// backend that carry no diagnostics are reported as one synthetic
    /// diagnostic holding the failure message.
    pub async fn compile(
        &self,
        identifier: &str,
        source: &str,
        capability: Capability,
    ) -> Result<CompiledScript, CompilationFailure> {
        if let Err(e) = self.classpath.construct().await {
            warn!("Failed to construct classpath: {}", e);
        }
        self.classpath.supplement(source).await;

        let full_class_name = introspect::full_class_name(source).ok_or_else(|| {
            CompilationFailure::single(
                identifier,
                Diagnostic::error("source does not declare a public class extending or implementing a script type"),
            )
        })?;

        let classpath = self.classpath.classpath().await;
        trace!(
            "Compile script {} with classpath {}",
            full_class_name,
            classpath.to_arg()
        );

        let request = CompileRequest {
            identifier: identifier.to_string(),
            full_class_name: full_class_name.clone(),
            source: source.to_string(),
            classpath,
            capability,
        };

        let started = Instant::now();
        let factory = match self.backend.compile(&request).await {
            Ok(factory) => factory,
            Err(BackendError::Diagnostics(diagnostics)) => {
                return Err(self.error_diagnostics(identifier, diagnostics));
            }
            Err(BackendError::Unexpected { kind, message }) => {
                error!("Failed while compiling script {}: {}: {}", identifier, kind, message);
                let message = if message.trim().is_empty() { kind } else { message };
                return Err(CompilationFailure::single(identifier, Diagnostic::error(message)));
            }
        };

        if !factory.capabilities().contains(&capability) {
            return Err(CompilationFailure::single(
                identifier,
                Diagnostic::error(format!(
                    "{} does not implement the {} interface",
                    full_class_name, capability
                )),
            ));
        }

        debug!(
            "Compiled script {} ({}) in {:?} using {} backend",
            identifier,
            full_class_name,
            started.elapsed(),
            self.backend.backend_name()
        );

        Ok(CompiledScript::new(
            full_class_name,
            capability,
            checksum(source),
            factory,
        ))
    }

    fn error_diagnostics(&self, identifier: &str, diagnostics: Vec<Diagnostic>) -> CompilationFailure {
        error!("Failed to compile script {}. Compilation errors:", identifier);

        let errors: Vec<Diagnostic> = diagnostics
            .into_iter()
            .filter(Diagnostic::is_error)
            .inspect(|d| {
                warn!(
                    "ERROR script {} location {}:{}: {}",
                    identifier,
                    d.line.unwrap_or_default(),
                    d.column.unwrap_or_default(),
                    d.message
                )
            })
            .collect();

        if errors.is_empty() {
            return CompilationFailure::single(
                identifier,
                Diagnostic::error("compilation failed without reporting an error"),
            );
        }

        CompilationFailure {
            identifier: identifier.to_string(),
            diagnostics: errors,
        }
    }
}

pub fn checksum(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClasspathConfig;
    use crate::script::backends::RegistryBackend;
    use crate::script::error::ScriptError;
    use crate::script::interface::{ScriptContext, ScriptFactory, ScriptInterface};
    use crate::types::Severity;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Noop;

    #[async_trait]
    impl ScriptInterface for Noop {
        async fn execute(&self, _context: &mut ScriptContext) -> Result<(), ScriptError> {
            Ok(())
        }
    }

    /// Backend answering every request with a fixed failure
    struct FailingBackend(fn() -> BackendError);

    #[async_trait]
    impl CompilerBackend for FailingBackend {
        async fn compile(&self, _request: &CompileRequest) -> Result<Arc<dyn ScriptFactory>, BackendError> {
            Err((self.0)())
        }

        fn backend_name(&self) -> &'static str {
            "failing"
        }
    }

    fn resolver(dir: &TempDir) -> Arc<ClasspathResolver> {
        Arc::new(ClasspathResolver::new(ClasspathConfig {
            component_location: Some(dir.path().to_path_buf()),
            ..Default::default()
        }))
    }

    #[tokio::test]
    async fn test_compile_registered_script() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RegistryBackend::new());
        backend.register_fn("p.Foo", vec![Capability::Script], || Box::new(Noop));
        let compiler = DynamicCompiler::new(backend, resolver(&dir));

        let compiled = compiler
            .compile("p.Foo", "package p; public class Foo implements Bar {}", Capability::Script)
            .await
            .unwrap();
        assert_eq!(compiled.full_class_name, "p.Foo");
        assert_eq!(compiled.source_checksum.len(), 64);
    }

    #[tokio::test]
    async fn test_missing_declaration_is_a_diagnostic() {
        let dir = TempDir::new().unwrap();
        let compiler = DynamicCompiler::new(Arc::new(RegistryBackend::new()), resolver(&dir));

        let failure = compiler
            .compile("broken", "class Nope {}", Capability::Script)
            .await
            .unwrap_err();
        assert_eq!(failure.diagnostics.len(), 1);
        assert_eq!(failure.identifier, "broken");
    }

    #[tokio::test]
    async fn test_capability_mismatch_fails() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(RegistryBackend::new());
        backend.register_fn("p.Foo", vec![Capability::Script], || Box::new(Noop));
        let compiler = DynamicCompiler::new(backend, resolver(&dir));

        let failure = compiler
            .compile("p.Foo", "package p; public class Foo extends Bar {}", Capability::ModuleScript)
            .await
            .unwrap_err();
        assert!(failure.diagnostics[0].message.contains("module_script"));
    }

    #[tokio::test]
    async fn test_only_error_diagnostics_survive() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(FailingBackend(|| {
            BackendError::Diagnostics(vec![
                Diagnostic::located(Severity::Warning, "unchecked", "Foo.src", 1, None),
                Diagnostic::located(Severity::Error, "bad type", "Foo.src", 2, Some(4)),
                Diagnostic::located(Severity::Note, "see docs", "Foo.src", 2, None),
            ])
        }));
        let compiler = DynamicCompiler::new(backend, resolver(&dir));

        let failure = compiler
            .compile("p.Foo", "public class Foo extends Bar {}", Capability::Script)
            .await
            .unwrap_err();
        assert_eq!(failure.diagnostics.len(), 1);
        assert_eq!(failure.diagnostics[0].message, "bad type");
    }

    #[tokio::test]
    async fn test_unexpected_failure_becomes_single_diagnostic() {
        let dir = TempDir::new().unwrap();
        let compiler = DynamicCompiler::new(
            Arc::new(FailingBackend(|| BackendError::unexpected("NullPointer", ""))),
            resolver(&dir),
        );

        let failure = compiler
            .compile("p.Foo", "public class Foo extends Bar {}", Capability::Script)
            .await
            .unwrap_err();
        assert_eq!(failure.diagnostics, vec![Diagnostic::error("NullPointer")]);
    }
}
