use crate::cli::options::{Commands, OutputFormat, ScriptCommand};
use crate::cli::output;
use crate::config::{BackendKind, ForgeConfig};
use crate::module::{ItemTypeRegistry, ModuleInstaller, PictureStore, ServiceScriptHooks};
use crate::script::backends::{CompilerBackend, ProcessBackend, RegistryBackend};
use crate::script::{
    introspect, Capability, ClasspathResolver, CompiledScriptCache, DynamicCompiler,
    ScriptService,
};
use crate::store::FileStore;
use crate::types::{ModuleDto, ModuleFilter, ScriptUnit, TenantId};
use anyhow::{bail, Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Services of one tenant wired from the configuration
pub struct ForgeCli {
    tenant: TenantId,
    format: OutputFormat,
    scripts: Arc<ScriptService>,
    installer: ModuleInstaller,
}

impl ForgeCli {
    pub fn new(config: &ForgeConfig, tenant: TenantId, format: OutputFormat) -> Self {
        let store = Arc::new(FileStore::new(config.tenant_dir(tenant.as_str())));
        let classpath = Arc::new(ClasspathResolver::new(config.classpath.clone()));

        let compiler = Arc::new(DynamicCompiler::new(compiler_backend(config), classpath));

        let service = |capability| {
            Arc::new(
                ScriptService::new(
                    capability,
                    store.clone(),
                    compiler.clone(),
                    CompiledScriptCache::new(),
                )
                .with_reserved_namespaces(config.compiler.reserved_namespaces.clone()),
            )
        };
        let scripts = service(Capability::Script);
        let module_scripts = service(Capability::ModuleScript);

        let installer = ModuleInstaller::new(
            tenant.clone(),
            store.clone(),
            store.clone(),
            store,
            ItemTypeRegistry::with_builtin_types(),
        )
        .with_hooks(Arc::new(ServiceScriptHooks::new(module_scripts, tenant.clone())))
        .with_pictures(PictureStore::new(config.pictures_dir()));

        Self {
            tenant,
            format,
            scripts,
            installer,
        }
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Introspect { file } => self.introspect(&file).await,
            Commands::Compile { file, code, test } => self.compile(&file, code, test).await,
            Commands::Classpath { source } => self.classpath(source.as_deref()).await,
            Commands::Script { command } => self.script(command).await,
            Commands::Install { manifest } => {
                let dto = read_payload(&manifest).await?;
                let manifest = self.installer.install(dto).await?;
                output::print_manifest(self.format, &manifest)
            }
            Commands::Reinstall { code } => {
                let manifest = self.installer.reinstall(&code).await?;
                output::print_manifest(self.format, &manifest)
            }
            Commands::Uninstall { code, remove } => {
                let manifest = self.installer.uninstall(&code, remove).await?;
                output::print_manifest(self.format, &manifest)
            }
            Commands::Enable { code } => {
                let manifest = self.installer.enable(&code).await?;
                output::print_manifest(self.format, &manifest)
            }
            Commands::Disable { code } => {
                let manifest = self.installer.disable(&code).await?;
                output::print_manifest(self.format, &manifest)
            }
            Commands::Delete { code } => {
                self.installer.delete(&code).await?;
                output::print_message(self.format, &format!("Deleted module {code}"))
            }
            Commands::List {
                item_type,
                item_code,
                installed,
                active,
                downloaded,
                codes_only,
            } => {
                let filter = ModuleFilter {
                    item_type,
                    item_code,
                    installed,
                    active,
                    downloaded,
                    ..Default::default()
                };
                if codes_only {
                    let codes = self.installer.list_codes(&filter).await?;
                    output::print_codes(self.format, &codes)
                } else {
                    let modules = self.installer.list_manifests(&filter).await?;
                    output::print_modules(self.format, &modules)
                }
            }
            Commands::Export { code, output: path } => {
                let dto = self.installer.find(&code).await?;
                let json = serde_json::to_string_pretty(&dto)?;
                match path {
                    Some(path) => {
                        tokio::fs::write(&path, json)
                            .await
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        info!("Exported module {} to {}", code, path.display());
                        Ok(())
                    }
                    None => {
                        println!("{json}");
                        Ok(())
                    }
                }
            }
            Commands::AddItem {
                code,
                item_code,
                item_type,
            } => {
                let dto = self
                    .installer
                    .add_to_module(&code, &item_code, &item_type)
                    .await?;
                output::print_json(&dto)
            }
            Commands::RemoveItem {
                code,
                item_code,
                item_type,
            } => {
                let dto = self
                    .installer
                    .remove_from_module(&code, &item_code, &item_type)
                    .await?;
                output::print_json(&dto)
            }
        }
    }

    async fn introspect(&self, file: &Path) -> Result<()> {
        let source = read_source(file).await?;
        output::print_introspection(
            self.format,
            introspect::package_name(&source),
            introspect::class_name(&source),
            introspect::full_class_name(&source),
            introspect::imports(&source),
        )
    }

    async fn compile(&self, file: &Path, code: Option<String>, test: bool) -> Result<()> {
        let source = read_source(file).await?;
        if test {
            let diagnostics = self.scripts.compile_source_for_test(&source).await;
            return output::print_diagnostics(self.format, &diagnostics);
        }

        let unit = ScriptUnit::new(code.unwrap_or_default(), source);
        let unit = self.scripts.create_or_update(&self.tenant, unit).await?;
        output::print_diagnostics(self.format, &unit.diagnostics)?;
        if unit.error {
            bail!("Script {} failed to compile", unit.code);
        }
        Ok(())
    }

    async fn classpath(&self, source: Option<&Path>) -> Result<()> {
        let resolver = self.scripts.compiler().classpath();
        resolver
            .construct()
            .await
            .context("Failed to construct classpath")?;
        if let Some(source) = source {
            resolver.supplement(&read_source(source).await?).await;
        }
        let classpath = resolver.classpath().await;
        output::print_codes(self.format, classpath.entries())
    }

    async fn script(&self, command: ScriptCommand) -> Result<()> {
        match command {
            ScriptCommand::Add { file, inactive } => {
                let mut unit = ScriptUnit::new(String::new(), read_source(&file).await?);
                unit.active = !inactive;
                let unit = self.scripts.create_or_update(&self.tenant, unit).await?;
                output::print_diagnostics(self.format, &unit.diagnostics)?;
                output::print_message(self.format, &format!("Stored script {}", unit.code))
            }
            ScriptCommand::List => {
                let units = self.scripts.list(&self.tenant).await?;
                let cached = self.scripts.cache().codes(&self.tenant).await;
                output::print_scripts(self.format, &units, &cached)
            }
            ScriptCommand::Clear { code } => {
                self.scripts.clear(&self.tenant, &code).await;
                output::print_message(self.format, &format!("Cleared compiled script {code}"))
            }
            ScriptCommand::CompileAll => {
                let compiled = self.scripts.compile_all(&self.tenant).await?;
                output::print_message(self.format, &format!("Compiled {compiled} script(s)"))
            }
            ScriptCommand::Remove { code } => {
                self.scripts.remove(&self.tenant, &code).await?;
                output::print_message(self.format, &format!("Removed script {code}"))
            }
        }
    }
}

/// Backend selected by the configuration.
pub fn compiler_backend(config: &ForgeConfig) -> Arc<dyn CompilerBackend> {
    match config.compiler.backend {
        BackendKind::Registry => {
            warn!(
                "The registry compiler backend has no registered classes here; \
                 set compiler.backend to process to compile scripts"
            );
            Arc::new(RegistryBackend::new())
        }
        BackendKind::Process => {
            let backend = ProcessBackend::new(config.compiler.clone(), config.work_dir());
            if !backend.is_available() {
                warn!(
                    "Compiler program {:?} was not found on PATH",
                    config.compiler.program
                );
            }
            Arc::new(backend)
        }
    }
}

async fn read_source(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))
}

/// Module payload from a JSON file, or YAML for `.yaml`/`.yml` files.
pub async fn read_payload(path: &Path) -> Result<ModuleDto> {
    let content = read_source(path).await?;
    let dto = match path.extension().and_then(|ext| ext.to_str()) {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid module payload {}", path.display()))?,
        _ => serde_json::from_str(&content)
            .with_context(|| format!("Invalid module payload {}", path.display()))?,
    };
    Ok(dto)
}
