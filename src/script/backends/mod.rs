/// Compiler backends turning script source into live implementations
pub mod process;
pub mod registry;
pub mod traits;

pub use process::{ProcessBackend, ProcessScriptFactory};
pub use registry::RegistryBackend;
pub use traits::{CompileRequest, CompilerBackend};
