use serde::{Deserialize, Serialize};
use std::fmt;

/// Tenant (provider) identifier that scopes every script and compiled entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self("default".to_string())
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Tenant scoped key of a script and of its compiled cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub tenant: TenantId,
    pub code: String,
}

impl CacheKey {
    pub fn new(tenant: &TenantId, code: &str) -> Self {
        Self {
            tenant: tenant.clone(),
            code: code.to_string(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.code)
    }
}

/// Language family of a script source. Only compiled sources exist today.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceKind {
    #[default]
    Compiled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind.trim().to_ascii_lowercase().as_str() {
            "error" | "fatal error" => Some(Severity::Error),
            "warning" | "mandatory_warning" => Some(Severity::Warning),
            "note" | "other" => Some(Severity::Note),
            _ => None,
        }
    }
}

/// A compilation diagnostic. Only error diagnostics are ever retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u64>,
}

impl Diagnostic {
    /// Error without a source location, used for synthetic failures.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            message: message.into(),
            source_file: None,
            line: None,
            column: None,
        }
    }

    pub fn located(
        severity: Severity,
        message: impl Into<String>,
        source_file: impl Into<String>,
        line: u64,
        column: Option<u64>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            source_file: Some(source_file.into()),
            line: Some(line),
            column,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.source_file, self.line) {
            (Some(file), Some(line)) => match self.column {
                Some(column) => write!(f, "{file}:{line}:{column}: {}", self.message),
                None => write!(f, "{file}:{line}: {}", self.message),
            },
            _ => f.write_str(&self.message),
        }
    }
}

/// User supplied script source and the outcome of its last compilation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptUnit {
    pub code: String,
    pub source: String,
    #[serde(default)]
    pub source_kind: SourceKind,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
}

fn default_true() -> bool {
    true
}

impl ScriptUnit {
    pub fn new(code: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            source: source.into(),
            source_kind: SourceKind::Compiled,
            active: true,
            error: false,
            diagnostics: Vec::new(),
        }
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Replace the diagnostics of the previous compilation in one step.
    pub fn set_diagnostics(&mut self, diagnostics: Vec<Diagnostic>) {
        self.error = !diagnostics.is_empty();
        self.diagnostics = diagnostics;
    }
}
