//! Per-image processing run.
//!
//! A run turns one buffered upload into a committed set of artifacts under
//! the image's identifier:
//!
//! ```text
//! storage/<id>/
//! ├── original        # the upload, byte for byte
//! ├── phone.webp      # one variant per configured size
//! ├── tablet.webp
//! ├── desktop.webp
//! └── metadata.json   # written last; its presence marks the commit
//! ```
//!
//! Any failure after the location is created removes the whole location
//! before the error is returned. A panic while populating it counts as a
//! failure too.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::*;

use crate::codec::ImageCodec;
use crate::metadata::ImageMetadata;
use crate::store::StoreHandle;
use crate::{ImageId, ProcessingError};

pub const SOURCE_ARTIFACT: &str = "original";
pub const METADATA_ARTIFACT: &str = "metadata.json";

/// One labelled resize target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSize {
    pub label: String,
    pub width: u32,
    pub height: u32,
}

impl VariantSize {
    pub fn new(label: &str, width: u32, height: u32) -> Self {
        VariantSize {
            label: label.to_lowercase(),
            width,
            height,
        }
    }
}

/// The fixed set of sizes every image is rendered at. Built once at start-up
/// and shared read-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSizes(Vec<VariantSize>);

impl VariantSizes {
    pub fn new(sizes: Vec<VariantSize>) -> Self {
        VariantSizes(sizes)
    }

    /// phone 800x600, tablet 1024x768, desktop 1920x1080.
    pub fn standard() -> Self {
        VariantSizes(vec![
            VariantSize::new("phone", 800, 600),
            VariantSize::new("tablet", 1024, 768),
            VariantSize::new("desktop", 1920, 1080),
        ])
    }

    /// Case-insensitive lookup by label.
    pub fn get(&self, label: &str) -> Option<&VariantSize> {
        let label = label.to_lowercase();
        self.0.iter().find(|size| size.label == label)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariantSize> {
        self.0.iter()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.0.iter().map(|size| size.label.as_str()).collect()
    }
}

impl Default for VariantSizes {
    fn default() -> Self {
        Self::standard()
    }
}

/// Artifact name of the variant for `label` in the codec's output format.
pub fn variant_artifact(label: &str, extension: &str) -> String {
    format!("{label}.{extension}")
}

/// Runs the processing routine. Cheap to clone; every execution unit gets
/// its own handle to the same store, codec and size table.
#[derive(Clone)]
pub struct Processor {
    store: StoreHandle,
    codec: Arc<dyn ImageCodec>,
    sizes: Arc<VariantSizes>,
}

impl Processor {
    pub fn new(store: StoreHandle, codec: Arc<dyn ImageCodec>, sizes: Arc<VariantSizes>) -> Self {
        Processor {
            store,
            codec,
            sizes,
        }
    }

    pub fn store(&self) -> &StoreHandle {
        &self.store
    }

    /// Processes one upload and commits its artifacts under `id`.
    ///
    /// On error nothing is left under `id`, unless the location already
    /// existed before the call, in which case it is not touched.
    #[instrument(name = "processor.process", skip_all, fields(image_id = %id, filename = %filename))]
    pub async fn process(
        &self,
        data: Vec<u8>,
        filename: &str,
        id: &ImageId,
    ) -> Result<ImageMetadata, ProcessingError> {
        let metadata = ImageMetadata::new(*id, filename);

        self.store.create(id).await?;

        let populated = AssertUnwindSafe(self.populate(metadata, data, id))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProcessingError::Panicked(panic_message(&*panic))));

        match populated {
            Ok(metadata) => Ok(metadata),
            Err(err) => {
                debug!(message = "Rolling back", error = %err);
                if let Err(cleanup) = self.store.remove(id).await {
                    error!(message = "Rollback failed", error = %cleanup);
                }
                Err(err)
            }
        }
    }

    async fn populate(
        &self,
        mut metadata: ImageMetadata,
        data: Vec<u8>,
        id: &ImageId,
    ) -> Result<ImageMetadata, ProcessingError> {
        self.store.write(id, SOURCE_ARTIFACT, &data).await?;

        let extension = self.codec.extension();
        let codec = Arc::clone(&self.codec);
        let sizes = Arc::clone(&self.sizes);
        let (exif, variants) = tokio::task::spawn_blocking(move || {
            let exif = codec.read_exif(&data);
            let image = codec.decode(&data)?;
            let variants = sizes
                .iter()
                .map(|size| -> Result<_, ProcessingError> {
                    let encoded = codec.resize_and_encode(&image, size.width, size.height)?;
                    Ok((variant_artifact(&size.label, extension), encoded))
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok::<_, ProcessingError>((exif, variants))
        })
        .await??;

        match exif {
            Ok(fields) => metadata.apply_exif(fields),
            Err(err) => debug!(message = "No usable EXIF data", error = %err),
        }

        for (name, encoded) in &variants {
            self.store.write(id, name, encoded).await?;
        }

        let record = serde_json::to_vec(&metadata)?;
        self.store.write(id, METADATA_ARTIFACT, &record).await?;

        Ok(metadata)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
