use std::io::{self, ErrorKind};
use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs;
use tracing::*;

use crate::ImageId;

const PARTIAL_SUFFIX: &str = ".partial";

/// Filesystem artifact store: one directory per image identifier, one file
/// per named blob.
#[derive(Clone, Debug)]
pub struct StoreHandle {
    root: Arc<PathBuf>,
}

impl StoreHandle {
    pub async fn new(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        debug!(message = "Artifact store ready", root = %root.display());

        Ok(StoreHandle {
            root: Arc::new(root),
        })
    }

    fn location(&self, id: &ImageId) -> PathBuf {
        self.root.join(id.to_string())
    }

    /// Creates the location for `id`. Fails with `AlreadyExists` if it is
    /// already there.
    #[instrument(name = "store.create", skip_all, fields(image_id = %id))]
    pub async fn create(&self, id: &ImageId) -> io::Result<()> {
        fs::create_dir(self.location(id)).await
    }

    /// Writes `name` under `id`. The content becomes visible under its
    /// final name only once it is complete.
    #[instrument(name = "store.write", skip_all, fields(image_id = %id, artifact = %name, len = bytes.len()))]
    pub async fn write(&self, id: &ImageId, name: &str, bytes: &[u8]) -> io::Result<()> {
        let location = self.location(id);
        let partial = location.join(format!("{name}{PARTIAL_SUFFIX}"));
        fs::write(&partial, bytes).await?;
        fs::rename(&partial, location.join(name)).await
    }

    pub async fn read(&self, id: &ImageId, name: &str) -> io::Result<Vec<u8>> {
        fs::read(self.location(id).join(name)).await
    }

    pub async fn exists(&self, id: &ImageId, name: &str) -> io::Result<bool> {
        fs::try_exists(self.location(id).join(name)).await
    }

    /// Whether anything at all is stored for `id`.
    pub async fn contains(&self, id: &ImageId) -> io::Result<bool> {
        fs::try_exists(self.location(id)).await
    }

    /// Deletes every blob under `id`. Deleting an absent location succeeds.
    #[instrument(name = "store.remove", skip_all, fields(image_id = %id))]
    pub async fn remove(&self, id: &ImageId) -> io::Result<()> {
        match fs::remove_dir_all(self.location(id)).await {
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            result => result,
        }
    }
}
