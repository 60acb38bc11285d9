use crate::script::error::ScriptError;
use crate::store::StoreError;
use thiserror::Error;

/// Errors that can occur during module operations
#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("The following parameters are required or contain invalid values: {}", missing.join(", "))]
    MissingParameters { missing: Vec<String> },

    #[error("Module validation failed: {reason}")]
    Validation { reason: String },

    #[error("{kind} with code={code} does not exist")]
    NotFound { kind: String, code: String },

    #[error("{kind} with code={code} already exists")]
    AlreadyExists { kind: String, code: String },

    #[error("Action {action} on {code} is forbidden: {reason}")]
    Forbidden {
        code: String,
        action: String,
        reason: String,
    },

    #[error("{reason}")]
    BusinessRule { reason: String },

    #[error("Module item {dto_class} is invalid: {reason}")]
    InvalidItem { dto_class: String, reason: String },

    #[error("Script error: {0}")]
    Script(#[from] ScriptError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModuleError {
    pub fn not_found(kind: &str, code: &str) -> Self {
        ModuleError::NotFound {
            kind: kind.to_string(),
            code: code.to_string(),
        }
    }

    pub fn forbidden(code: &str, action: &str, reason: &str) -> Self {
        ModuleError::Forbidden {
            code: code.to_string(),
            action: action.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn missing(fields: Vec<String>) -> Self {
        ModuleError::MissingParameters { missing: fields }
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, ModuleError::Forbidden { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ModuleError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ModuleError::MissingParameters { .. } | ModuleError::Validation { .. }
        )
    }
}
