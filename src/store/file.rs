use crate::module::entity::{EntityRecord, EntityService, VersionedEntityService};
use crate::module::error::ModuleError;
use crate::store::{ModuleStore, ScriptStore, StoreError};
use crate::types::{DatePeriod, ModuleFilter, ModuleManifest, ScriptUnit, TenantId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

/// JSON file store rooted at one directory.
///
/// Layout:
/// `modules/<code>.json`, `scripts/<tenant>/<code>.json`,
/// `entities/<type>/[<scope>__]<code>.json` and `versions/<type>/<code>.json`,
/// each key encoded with `file_name`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct VersionEntry {
    #[serde(default)]
    validity: Option<DatePeriod>,
    data: Value,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn module_path(&self, code: &str) -> PathBuf {
        self.root
            .join("modules")
            .join(format!("{}.json", file_name(code)))
    }

    fn script_dir(&self, tenant: &TenantId) -> PathBuf {
        self.root.join("scripts").join(file_name(tenant.as_str()))
    }

    fn script_path(&self, tenant: &TenantId, code: &str) -> PathBuf {
        self.script_dir(tenant)
            .join(format!("{}.json", file_name(code)))
    }

    fn entity_path(&self, entity_type: &str, code: &str, applies_to: Option<&str>) -> PathBuf {
        let key = match applies_to {
            Some(scope) => format!("{}__{}", file_name(scope), file_name(code)),
            None => file_name(code),
        };
        self.root
            .join("entities")
            .join(file_name(entity_type))
            .join(format!("{key}.json"))
    }

    fn version_path(&self, entity_type: &str, code: &str) -> PathBuf {
        self.root
            .join("versions")
            .join(file_name(entity_type))
            .join(format!("{}.json", file_name(code)))
    }
}

/// Portable, reversible file name for a key.
///
/// ASCII letters, digits, `-` and non-leading `.` are kept; every other
/// byte, `_` included, becomes `_XX` in hex. Distinct keys therefore never
/// share a file, and an encoded name never contains `__`.
fn file_name(key: &str) -> String {
    let mut name = String::with_capacity(key.len());
    for (index, byte) in key.bytes().enumerate() {
        let keep = byte.is_ascii_alphanumeric() || byte == b'-' || (byte == b'.' && index > 0);
        if keep {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("_{byte:02X}"));
        }
    }
    name
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(StoreError::io(&format!("read {}", path.display()), e)),
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| StoreError::serialization(&format!("parse {}", path.display()), e))
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(&format!("create {}", parent.display()), e))?;
    }
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| StoreError::serialization(&format!("encode {}", path.display()), e))?;
    fs::write(path, text)
        .await
        .map_err(|e| StoreError::io(&format!("write {}", path.display()), e))
}

/// Returns whether a file was removed.
async fn remove_file(path: &Path) -> Result<bool, StoreError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(StoreError::io(&format!("remove {}", path.display()), e)),
    }
}

async fn read_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(&format!("list {}", dir.display()), e)),
    };

    let mut values = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io(&format!("list {}", dir.display()), e))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(value)) => values.push(value),
            Ok(None) => {}
            Err(e) => warn!("Skipping unreadable record {}: {}", path.display(), e),
        }
    }
    Ok(values)
}

#[async_trait]
impl ModuleStore for FileStore {
    async fn find_by_code(&self, code: &str) -> Result<Option<ModuleManifest>, StoreError> {
        read_json(&self.module_path(code)).await
    }

    async fn create(&self, module: &ModuleManifest) -> Result<(), StoreError> {
        let path = self.module_path(&module.code);
        if fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists {
                kind: "module".to_string(),
                key: module.code.clone(),
            });
        }
        write_json(&path, module).await?;
        debug!("Created module {} at {}", module.code, path.display());
        Ok(())
    }

    async fn update(&self, module: &ModuleManifest) -> Result<ModuleManifest, StoreError> {
        let path = self.module_path(&module.code);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::Missing {
                kind: "module".to_string(),
                key: module.code.clone(),
            });
        }
        write_json(&path, module).await?;
        Ok(module.clone())
    }

    async fn remove(&self, code: &str) -> Result<(), StoreError> {
        if remove_file(&self.module_path(code)).await? {
            Ok(())
        } else {
            Err(StoreError::Missing {
                kind: "module".to_string(),
                key: code.to_string(),
            })
        }
    }

    async fn list(&self, filter: &ModuleFilter) -> Result<Vec<ModuleManifest>, StoreError> {
        let mut modules: Vec<ModuleManifest> = read_all(&self.root.join("modules"))
            .await?
            .into_iter()
            .filter(|module| filter.matches(module))
            .collect();
        modules.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(modules)
    }
}

#[async_trait]
impl ScriptStore for FileStore {
    async fn find_by_code(
        &self,
        tenant: &TenantId,
        code: &str,
    ) -> Result<Option<ScriptUnit>, StoreError> {
        read_json(&self.script_path(tenant, code)).await
    }

    async fn save(&self, tenant: &TenantId, unit: &ScriptUnit) -> Result<(), StoreError> {
        write_json(&self.script_path(tenant, &unit.code), unit).await
    }

    async fn remove(&self, tenant: &TenantId, code: &str) -> Result<bool, StoreError> {
        remove_file(&self.script_path(tenant, code)).await
    }

    async fn list(&self, tenant: &TenantId) -> Result<Vec<ScriptUnit>, StoreError> {
        let mut units: Vec<ScriptUnit> = read_all(&self.script_dir(tenant)).await?;
        units.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(units)
    }
}

#[async_trait]
impl EntityService for FileStore {
    async fn create_or_update(&self, record: EntityRecord<'_>) -> Result<(), ModuleError> {
        let path = self.entity_path(record.entity_type, record.code, record.applies_to);
        Ok(write_json(&path, record.data).await?)
    }

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<Option<Value>, ModuleError> {
        Ok(read_json(&self.entity_path(entity_type, code, applies_to)).await?)
    }

    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        applies_to: Option<&str>,
    ) -> Result<bool, ModuleError> {
        Ok(remove_file(&self.entity_path(entity_type, code, applies_to)).await?)
    }
}

#[async_trait]
impl VersionedEntityService for FileStore {
    async fn create_or_update(
        &self,
        record: EntityRecord<'_>,
        validity: Option<&DatePeriod>,
    ) -> Result<(), ModuleError> {
        let path = self.version_path(record.entity_type, record.code);
        let mut versions: Vec<VersionEntry> = read_json(&path).await?.unwrap_or_default();
        match versions
            .iter_mut()
            .find(|entry| entry.validity.as_ref() == validity)
        {
            Some(entry) => entry.data = record.data.clone(),
            None => versions.push(VersionEntry {
                validity: validity.cloned(),
                data: record.data.clone(),
            }),
        }
        Ok(write_json(&path, &versions).await?)
    }

    async fn find(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<Option<Value>, ModuleError> {
        let versions: Vec<VersionEntry> = read_json(&self.version_path(entity_type, code))
            .await?
            .unwrap_or_default();
        let found = match validity {
            Some(period) => versions
                .into_iter()
                .find(|entry| entry.validity.as_ref() == Some(period)),
            None => versions.into_iter().last(),
        };
        Ok(found.map(|entry| entry.data))
    }

    async fn remove(
        &self,
        entity_type: &str,
        code: &str,
        validity: Option<&DatePeriod>,
    ) -> Result<bool, ModuleError> {
        let path = self.version_path(entity_type, code);
        let Some(mut versions) = read_json::<Vec<VersionEntry>>(&path).await? else {
            return Ok(false);
        };
        let before = versions.len();
        match validity {
            Some(period) => versions.retain(|entry| entry.validity.as_ref() != Some(period)),
            None => versions.clear(),
        }
        let removed = versions.len() != before;
        if versions.is_empty() {
            remove_file(&path).await?;
        } else if removed {
            write_json(&path, &versions).await?;
        }
        Ok(removed)
    }
}
