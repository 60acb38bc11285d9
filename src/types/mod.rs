pub mod module;
pub mod script;

pub use module::*;
pub use script::*;
