//! Runtime script compilation and the per-tenant compiled script cache

pub mod backends;
pub mod cache;
pub mod classpath;
pub mod compiler;
pub mod error;
pub mod interface;
pub mod introspect;
pub mod service;

pub use cache::CompiledScriptCache;
pub use classpath::{Classpath, ClasspathResolver};
pub use compiler::DynamicCompiler;
pub use error::*;
pub use interface::*;
pub use service::ScriptService;
