use crate::types::Diagnostic;
use thiserror::Error;

/// Errors raised by the script engine
#[derive(Error, Debug)]
pub enum ScriptError {
    #[error("Script not found: {code}")]
    NotFound { code: String },

    #[error("Script {code} is invalid: {} compilation error(s)", diagnostics.len())]
    InvalidScript {
        code: String,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("Script validation failed: {reason}")]
    Validation { reason: String },

    #[error("Failed to instantiate script {code}: {reason}")]
    Instantiation { code: String, reason: String },

    #[error("Script execution failed: {message}")]
    Execution { message: String },

    #[error("Script store error during {operation}: {error}")]
    Store { operation: String, error: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure reported by a compiler backend
#[derive(Error, Debug)]
pub enum BackendError {
    /// Structured failure carrying the compiler's diagnostics, any severity.
    #[error("Compilation produced {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),

    /// Anything else: spawn failures, I/O, crashes of the backend.
    #[error("{kind}: {message}")]
    Unexpected { kind: String, message: String },
}

impl BackendError {
    pub fn unexpected(kind: impl Into<String>, message: impl Into<String>) -> Self {
        BackendError::Unexpected {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Unexpected {
            kind: format!("io::{:?}", err.kind()),
            message: err.to_string(),
        }
    }
}

impl From<anyhow::Error> for BackendError {
    fn from(err: anyhow::Error) -> Self {
        BackendError::Unexpected {
            kind: "anyhow::Error".to_string(),
            message: format!("{err:#}"),
        }
    }
}

/// Diagnostics of a failed compilation, surfaced as data
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Compilation of {identifier} failed with {} error(s)", diagnostics.len())]
pub struct CompilationFailure {
    pub identifier: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl CompilationFailure {
    pub fn single(identifier: &str, diagnostic: Diagnostic) -> Self {
        Self {
            identifier: identifier.to_string(),
            diagnostics: vec![diagnostic],
        }
    }
}

impl From<crate::store::StoreError> for ScriptError {
    fn from(err: crate::store::StoreError) -> Self {
        let operation = match &err {
            crate::store::StoreError::Io { operation, .. }
            | crate::store::StoreError::Serialization { operation, .. } => operation.clone(),
            crate::store::StoreError::AlreadyExists { .. } => "create".to_string(),
            crate::store::StoreError::Missing { .. } => "lookup".to_string(),
        };
        ScriptError::Store {
            operation,
            error: err.to_string(),
        }
    }
}
