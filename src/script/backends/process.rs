/// Backend delegating to an external compiler process
use super::traits::{CompileRequest, CompilerBackend};
use crate::config::CompilerConfig;
use crate::script::classpath::PATH_SEPARATOR;
use crate::script::error::{BackendError, ScriptError};
use crate::script::interface::{Capability, ScriptContext, ScriptFactory, ScriptInterface};
use crate::types::{Diagnostic, ModuleManifest, Severity};
use anyhow::Context;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};

static DIAGNOSTIC_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?m)^(?P<file>[^:\n]+?):(?P<line>\d+):(?:(?P<col>\d+):)?\s*(?P<kind>fatal error|error|warning|note):\s*(?P<msg>.+?)\s*$",
    )
    .expect("valid diagnostic pattern")
});

/// Parse `file:line[:col]: severity: message` lines from compiler output.
pub fn parse_diagnostics(output: &str) -> Vec<Diagnostic> {
    DIAGNOSTIC_LINE
        .captures_iter(output)
        .filter_map(|caps| {
            let severity = Severity::parse(&caps["kind"])?;
            let line = caps["line"].parse().ok()?;
            let column = caps.name("col").and_then(|c| c.as_str().parse().ok());
            Some(Diagnostic::located(
                severity,
                caps["msg"].to_string(),
                caps["file"].trim().to_string(),
                line,
                column,
            ))
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct ProcessBackend {
    config: CompilerConfig,
    work_dir: PathBuf,
}

impl ProcessBackend {
    pub fn new(config: CompilerConfig, work_dir: PathBuf) -> Self {
        Self { config, work_dir }
    }

    /// Whether the configured compiler can be found on this host.
    pub fn is_available(&self) -> bool {
        self.program()
            .map(|(program, _)| which::which(program).is_ok())
            .unwrap_or(false)
    }

    fn program(&self) -> Result<(String, Vec<String>), BackendError> {
        let mut words = shell_words::split(&self.config.program)
            .map_err(|e| BackendError::unexpected("shell_words::ParseError", e.to_string()))?;
        if words.is_empty() {
            return Err(BackendError::unexpected(
                "ConfigurationError",
                "no compiler program configured",
            ));
        }
        let program = words.remove(0);
        Ok((program, words))
    }

    fn unit_dir(&self, request: &CompileRequest) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(request.identifier.as_bytes());
        hasher.update(request.full_class_name.as_bytes());
        hasher.update(request.source.as_bytes());
        self.work_dir.join(format!("{:x}", hasher.finalize()))
    }

    fn source_path(&self, src_dir: &Path, full_class_name: &str) -> PathBuf {
        let mut path = src_dir.to_path_buf();
        let mut segments: Vec<&str> = full_class_name.split('.').collect();
        let class = segments.pop().unwrap_or(full_class_name);
        for segment in segments {
            path.push(segment);
        }
        path.push(format!("{class}.{}", self.config.source_extension));
        path
    }

    async fn write_source(&self, request: &CompileRequest) -> anyhow::Result<(PathBuf, PathBuf)> {
        let unit_dir = self.unit_dir(request);
        let source_path = self.source_path(&unit_dir.join("src"), &request.full_class_name);
        let output_dir = unit_dir.join("classes");

        if let Some(parent) = source_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::create_dir_all(&output_dir)
            .await
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;
        tokio::fs::write(&source_path, &request.source)
            .await
            .with_context(|| format!("Failed to write {}", source_path.display()))?;

        Ok((source_path, output_dir))
    }
}

#[async_trait]
impl CompilerBackend for ProcessBackend {
    async fn compile(&self, request: &CompileRequest) -> Result<Arc<dyn ScriptFactory>, BackendError> {
        let (program, program_args) = self.program()?;
        let (source_path, output_dir) = self.write_source(request).await?;

        let mut cmd = Command::new(&program);
        cmd.args(&program_args).args(&self.config.args);
        if !request.classpath.is_empty() {
            cmd.args([&self.config.classpath_flag, &request.classpath.to_arg()]);
        }
        cmd.arg(&self.config.output_flag)
            .arg(&output_dir)
            .arg(&source_path);

        debug!("Running compiler command: {:?}", cmd);

        let output = cmd
            .output()
            .await
            .with_context(|| format!("Failed to execute {program}"))?;

        if !output.status.success() {
            let mut text = String::from_utf8_lossy(&output.stderr).into_owned();
            text.push('\n');
            text.push_str(&String::from_utf8_lossy(&output.stdout));

            let diagnostics = parse_diagnostics(&text);
            if diagnostics.is_empty() {
                return Err(BackendError::unexpected(
                    format!("CompilerExit({})", output.status.code().unwrap_or(-1)),
                    text.trim().to_string(),
                ));
            }
            return Err(BackendError::Diagnostics(diagnostics));
        }

        info!(
            "Compiled {} into {}",
            request.full_class_name,
            output_dir.display()
        );

        let mut runtime_path = output_dir.display().to_string();
        if !request.classpath.is_empty() {
            runtime_path.push(PATH_SEPARATOR);
            runtime_path.push_str(&request.classpath.to_arg());
        }

        Ok(Arc::new(ProcessScriptFactory::new(
            &request.full_class_name,
            vec![request.capability],
            &self.config.launcher,
            &runtime_path,
        )))
    }

    fn backend_name(&self) -> &'static str {
        "process"
    }
}

/// Factory of scripts that run as child processes speaking JSON on stdio.
///
/// The child receives `{"phase", "context", "module"}` on stdin and must
/// print the resulting context object on stdout.
#[derive(Debug, Clone)]
pub struct ProcessScriptFactory {
    class_name: String,
    capabilities: Vec<Capability>,
    command: Vec<String>,
}

impl ProcessScriptFactory {
    pub fn new(
        class_name: &str,
        capabilities: Vec<Capability>,
        launcher: &[String],
        runtime_path: &str,
    ) -> Self {
        let command = launcher
            .iter()
            .map(|part| {
                part.replace("{classpath}", runtime_path)
                    .replace("{class}", class_name)
            })
            .collect();
        Self {
            class_name: class_name.to_string(),
            capabilities,
            command,
        }
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }
}

impl ScriptFactory for ProcessScriptFactory {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    fn instantiate(&self) -> Result<Box<dyn ScriptInterface>, ScriptError> {
        if self.command.is_empty() {
            return Err(ScriptError::Instantiation {
                code: self.class_name.clone(),
                reason: "no launcher configured".to_string(),
            });
        }
        Ok(Box::new(ProcessScript {
            command: self.command.clone(),
        }))
    }
}

struct ProcessScript {
    command: Vec<String>,
}

impl ProcessScript {
    async fn invoke(
        &self,
        phase: &str,
        context: &mut ScriptContext,
        module: Option<&ModuleManifest>,
    ) -> Result<(), ScriptError> {
        let request = json!({
            "phase": phase,
            "context": context,
            "module": module,
        });

        let mut child = Command::new(&self.command[0])
            .args(&self.command[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&serde_json::to_vec(&request)?).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Script process failed during {}: {}", phase, stderr.trim());
            return Err(ScriptError::Execution {
                message: format!("{phase} exited with {}: {}", output.status, stderr.trim()),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            let result: ScriptContext = serde_json::from_str(stdout.trim())?;
            *context = result;
        }
        Ok(())
    }
}

#[async_trait]
impl ScriptInterface for ProcessScript {
    async fn init(&self, context: &mut ScriptContext) -> Result<(), ScriptError> {
        self.invoke("init", context, None).await
    }

    async fn execute(&self, context: &mut ScriptContext) -> Result<(), ScriptError> {
        self.invoke("execute", context, None).await
    }

    async fn finalize(&self, context: &mut ScriptContext) -> Result<(), ScriptError> {
        self.invoke("finalize", context, None).await
    }

    async fn pre_install_module(
        &self,
        context: &mut ScriptContext,
        module: &ModuleManifest,
    ) -> Result<(), ScriptError> {
        self.invoke("preInstallModule", context, Some(module)).await
    }

    async fn post_install_module(
        &self,
        context: &mut ScriptContext,
        module: &ModuleManifest,
    ) -> Result<(), ScriptError> {
        self.invoke("postInstallModule", context, Some(module)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::classpath::Classpath;
    use tempfile::TempDir;

    fn request(source: &str) -> CompileRequest {
        CompileRequest {
            identifier: "p.Foo".to_string(),
            full_class_name: "p.Foo".to_string(),
            source: source.to_string(),
            classpath: Classpath::default(),
            capability: Capability::Script,
        }
    }

    #[test]
    fn test_parse_diagnostics() {
        let output = "\
src/p/Foo.java:3: error: cannot find symbol
src/p/Foo.java:7:12: warning: unchecked call
Note: Some input files use unchecked operations.
1 error
";
        let diagnostics = parse_diagnostics(output);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].severity, Severity::Error);
        assert_eq!(diagnostics[0].line, Some(3));
        assert_eq!(diagnostics[0].column, None);
        assert_eq!(diagnostics[0].message, "cannot find symbol");
        assert_eq!(diagnostics[1].severity, Severity::Warning);
        assert_eq!(diagnostics[1].column, Some(12));
    }

    #[test]
    fn test_source_path_follows_package() {
        let backend = ProcessBackend::new(CompilerConfig::default(), PathBuf::from("/work"));
        let path = backend.source_path(Path::new("/work/x/src"), "org.acme.Foo");
        assert_eq!(path, PathBuf::from("/work/x/src/org/acme/Foo.java"));
    }

    #[test]
    fn test_launcher_substitution() {
        let factory = ProcessScriptFactory::new(
            "p.Foo",
            vec![Capability::Script],
            &[
                "java".to_string(),
                "-cp".to_string(),
                "{classpath}".to_string(),
                "{class}".to_string(),
            ],
            "/out:/lib/a.jar",
        );
        assert_eq!(factory.command(), ["java", "-cp", "/out:/lib/a.jar", "p.Foo"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_compiler_reports_diagnostics() {
        let work = TempDir::new().unwrap();
        let config = CompilerConfig {
            program: "sh -c 'echo \"Foo.java:2: error: bad things\" >&2; exit 1' compiler"
                .to_string(),
            args: Vec::new(),
            ..Default::default()
        };
        let backend = ProcessBackend::new(config, work.path().to_path_buf());

        let err = backend.compile(&request("public class Foo extends X {}")).await.err().unwrap();
        match err {
            BackendError::Diagnostics(diagnostics) => {
                assert_eq!(diagnostics.len(), 1);
                assert_eq!(diagnostics[0].message, "bad things");
            }
            other => panic!("Expected diagnostics, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_crashing_compiler_is_unexpected() {
        let work = TempDir::new().unwrap();
        let config = CompilerConfig {
            program: "sh -c 'echo segfault >&2; exit 3' compiler".to_string(),
            args: Vec::new(),
            ..Default::default()
        };
        let backend = ProcessBackend::new(config, work.path().to_path_buf());

        let err = backend.compile(&request("public class Foo extends X {}")).await.err().unwrap();
        match err {
            BackendError::Unexpected { kind, message } => {
                assert_eq!(kind, "CompilerExit(3)");
                assert!(message.contains("segfault"));
            }
            other => panic!("Expected unexpected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_successful_compile_runs_launcher() {
        let work = TempDir::new().unwrap();
        let config = CompilerConfig {
            program: "true".to_string(),
            args: Vec::new(),
            launcher: vec![
                "sh".to_string(),
                "-c".to_string(),
                "cat > /dev/null; echo '{\"answer\": 42}'".to_string(),
            ],
            ..Default::default()
        };
        let backend = ProcessBackend::new(config, work.path().to_path_buf());

        let factory = backend
            .compile(&request("package p; public class Foo extends X {}"))
            .await
            .unwrap();
        assert_eq!(factory.class_name(), "p.Foo");

        let script = factory.instantiate().unwrap();
        let mut context = ScriptContext::new();
        script.execute(&mut context).await.unwrap();
        assert_eq!(context["answer"], json!(42));
    }
}
