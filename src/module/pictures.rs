use crate::types::TenantId;
use std::path::PathBuf;
use tokio::fs;
use tracing::error;

/// Module logo pictures stored per tenant. Every operation is best effort:
/// failures are logged and never abort the calling module operation.
#[derive(Debug, Clone, Default)]
pub struct PictureStore {
    root: Option<PathBuf>,
}

impl PictureStore {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// A store that keeps nothing
    pub fn disabled() -> Self {
        Self::default()
    }

    fn path(&self, tenant: &TenantId, filename: &str) -> Option<PathBuf> {
        let name = std::path::Path::new(filename).file_name()?;
        self.root
            .as_ref()
            .map(|root| root.join(tenant.as_str()).join(name))
    }

    pub async fn write(&self, tenant: &TenantId, filename: &str, data: &[u8]) {
        let Some(path) = self.path(tenant, filename) else {
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!("error when export module picture {}, info {}", filename, e);
                return;
            }
        }
        if let Err(e) = fs::write(&path, data).await {
            error!("error when export module picture {}, info {}", filename, e);
        }
    }

    pub async fn read(&self, tenant: &TenantId, filename: &str) -> Option<Vec<u8>> {
        let path = self.path(tenant, filename)?;
        match fs::read(&path).await {
            Ok(data) => Some(data),
            Err(e) => {
                error!("Failed to read module picture {}, info {}", filename, e);
                None
            }
        }
    }

    pub async fn remove(&self, tenant: &TenantId, filename: &str) {
        let Some(path) = self.path(tenant, filename) else {
            return;
        };
        if let Err(e) = fs::remove_file(&path).await {
            error!("error when delete module picture {}, info {}", filename, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_pictures_round_trip_per_tenant() {
        let dir = TempDir::new().unwrap();
        let store = PictureStore::new(Some(dir.path().to_path_buf()));
        let tenant = TenantId::new("acme");

        store.write(&tenant, "logo.png", &[1, 2, 3]).await;
        assert!(dir.path().join("acme/logo.png").exists());
        assert_eq!(store.read(&tenant, "logo.png").await, Some(vec![1, 2, 3]));

        store.remove(&tenant, "logo.png").await;
        assert_eq!(store.read(&tenant, "logo.png").await, None);
    }

    #[tokio::test]
    async fn test_disabled_store_keeps_nothing() {
        let store = PictureStore::disabled();
        let tenant = TenantId::default();
        store.write(&tenant, "logo.png", &[1]).await;
        assert_eq!(store.read(&tenant, "logo.png").await, None);
    }
}
