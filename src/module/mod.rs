//! Module installation: unpacking payloads into entities and tracking state

pub mod entity;
pub mod error;
pub mod hooks;
pub mod installer;
pub mod items;
pub mod pictures;
pub mod registry;

pub use entity::{EntityRecord, EntityService, VersionedEntityService};
pub use error::*;
pub use hooks::{ModuleScriptHandle, ModuleScriptHooks, NoScriptHooks, ServiceScriptHooks};
pub use installer::ModuleInstaller;
pub use pictures::PictureStore;
pub use registry::{EntityTypeInfo, HandlerKind, ItemTypeRegistry};
