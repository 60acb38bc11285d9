//! Runtime configuration loaded from YAML or JSON files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read configuration {path}: {error}")]
    Read { path: String, error: String },

    #[error("Invalid YAML configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: String, reason: String },
}

/// Top level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// Tenant used when none is given on the command line
    pub tenant: String,
    /// Root of persisted modules, scripts, entities and pictures
    pub data_dir: PathBuf,
    pub classpath: ClasspathConfig,
    pub compiler: CompilerConfig,
    /// Store module logo pictures under `data_dir/pictures`
    pub pictures: bool,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            tenant: "default".to_string(),
            data_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("modforge"),
            classpath: ClasspathConfig::default(),
            compiler: CompilerConfig::default(),
            pictures: true,
        }
    }
}

impl ForgeConfig {
    /// Load configuration; the format follows the file extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;

        let config: ForgeConfig = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tenant.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "tenant".to_string(),
                reason: "must not be blank".to_string(),
            });
        }
        if self.classpath.library_extension.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "classpath.library_extension".to_string(),
                reason: "must not be blank".to_string(),
            });
        }
        if self.compiler.backend == BackendKind::Process && self.compiler.program.is_empty() {
            return Err(ConfigError::Invalid {
                field: "compiler.program".to_string(),
                reason: "required by the process backend".to_string(),
            });
        }
        Ok(())
    }

    pub fn tenant_dir(&self, tenant: &str) -> PathBuf {
        self.data_dir.join("tenants").join(tenant)
    }

    pub fn pictures_dir(&self) -> Option<PathBuf> {
        self.pictures.then(|| self.data_dir.join("pictures"))
    }

    pub fn work_dir(&self) -> PathBuf {
        self.data_dir.join("work")
    }
}

/// Maps a virtual (overlay) location prefix to the physical directory behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayRoot {
    pub virtual_prefix: PathBuf,
    pub physical_prefix: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClasspathConfig {
    /// Location of the running component; defaults to the executable's directory
    pub component_location: Option<PathBuf>,
    pub library_extension: String,
    pub overlay_roots: Vec<OverlayRoot>,
    /// Imports under these prefixes are provided by the core runtime
    pub core_prefixes: Vec<String>,
    /// Exceptions to `core_prefixes` that still need a library on the path
    pub passthrough_prefixes: Vec<String>,
    /// Imports under these prefixes belong to the platform itself
    pub internal_prefixes: Vec<String>,
    /// Entries always appended to the computed path
    pub extra_entries: Vec<PathBuf>,
}

impl Default for ClasspathConfig {
    fn default() -> Self {
        Self {
            component_location: None,
            library_extension: "jar".to_string(),
            overlay_roots: Vec::new(),
            core_prefixes: vec!["java".to_string()],
            passthrough_prefixes: vec!["javax.persistence".to_string()],
            internal_prefixes: Vec::new(),
            extra_entries: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process builders; only classes registered by an embedding host
    /// compile, so the command line tool alone can not serve any script.
    Registry,
    /// The configured external compiler and launcher
    #[default]
    Process,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    pub backend: BackendKind,
    /// External compiler command, split with shell rules
    pub program: String,
    pub args: Vec<String>,
    pub classpath_flag: String,
    pub output_flag: String,
    pub source_extension: String,
    /// Launcher of compiled scripts; `{classpath}` and `{class}` are substituted
    pub launcher: Vec<String>,
    /// Class names under these namespaces may not be declared by scripts
    pub reserved_namespaces: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Process,
            program: "javac".to_string(),
            args: vec!["-nowarn".to_string()],
            classpath_flag: "-cp".to_string(),
            output_flag: "-d".to_string(),
            source_extension: "java".to_string(),
            launcher: vec![
                "java".to_string(),
                "-cp".to_string(),
                "{classpath}".to_string(),
                "{class}".to_string(),
            ],
            reserved_namespaces: vec!["java.".to_string(), "javax.".to_string()],
        }
    }
}
