//! Modforge - runtime script compilation and module installation
//!
//! This crate compiles tenant supplied script sources into cached script
//! types and installs modules by unpacking their payloads into persisted
//! business entities.

pub mod cli;
pub mod config;
pub mod module;
pub mod script;
pub mod store;
pub mod types;

pub use config::ForgeConfig;
pub use module::{ModuleError, ModuleInstaller};
pub use script::{ScriptError, ScriptService};
pub use types::*;
