use std::io::ErrorKind;
use std::sync::Arc;

use crate::codec::ImageCodec;
use crate::metadata::ImageMetadata;
use crate::processing::{variant_artifact, VariantSizes, METADATA_ARTIFACT};
use crate::store::StoreHandle;
use crate::{ImageId, QueryError};

/// Read-only access to committed images.
///
/// An identifier only counts as present once its metadata artifact exists,
/// so runs that are still in flight, or were rolled back, stay invisible.
#[derive(Clone)]
pub struct QueryService {
    store: StoreHandle,
    sizes: Arc<VariantSizes>,
    extension: &'static str,
}

impl QueryService {
    pub fn new(store: StoreHandle, sizes: Arc<VariantSizes>, codec: &dyn ImageCodec) -> Self {
        QueryService {
            store,
            sizes,
            extension: codec.extension(),
        }
    }

    pub async fn get_metadata(&self, id: &str) -> Result<ImageMetadata, QueryError> {
        let id = parse_id(id)?;
        let record = self
            .store
            .read(&id, METADATA_ARTIFACT)
            .await
            .map_err(|err| not_found(err, || format!("metadata for {id}")))?;
        Ok(serde_json::from_slice(&record)?)
    }

    /// Encoded bytes of the `size_label` variant of `id`. Labels are matched
    /// case-insensitively.
    pub async fn get_variant(&self, id: &str, size_label: &str) -> Result<Vec<u8>, QueryError> {
        let size = self
            .sizes
            .get(size_label)
            .ok_or_else(|| QueryError::InvalidArgument(format!("unknown size {size_label:?}")))?;
        let id = parse_id(id)?;

        if !self.store.exists(&id, METADATA_ARTIFACT).await? {
            return Err(QueryError::NotFound(format!("image {id}")));
        }

        self.store
            .read(&id, &variant_artifact(&size.label, self.extension))
            .await
            .map_err(|err| not_found(err, || format!("{} variant of {id}", size.label)))
    }
}

// A string that does not parse was never minted, so it cannot exist.
fn parse_id(id: &str) -> Result<ImageId, QueryError> {
    id.parse()
        .map_err(|_| QueryError::NotFound(format!("image {id:?}")))
}

fn not_found(err: std::io::Error, what: impl FnOnce() -> String) -> QueryError {
    if err.kind() == ErrorKind::NotFound {
        QueryError::NotFound(what())
    } else {
        QueryError::Storage(err)
    }
}
