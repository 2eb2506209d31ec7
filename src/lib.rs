use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use uuid::Uuid;

pub mod codec;
pub mod config;
pub mod error;
pub mod metadata;
pub mod processing;
pub mod query;
pub mod queue;
pub mod server;
pub mod slots;
pub mod store;
pub mod telemetry;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use codec::{ImageCodec, WebpCodec};
pub use error::{CodecError, ProcessingError, QueryError, SubmitError};
pub use metadata::ImageMetadata;
pub use processing::{Processor, VariantSize, VariantSizes};
pub use query::QueryService;
pub use queue::{JobReceiver, SubmissionQueue};
pub use slots::SlotPool;
pub use store::StoreHandle;
pub use worker::WorkMessage;

/// Unique key of one submission: its queued job, its storage location and
/// every later query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(Uuid);

impl ImageId {
    pub fn new() -> Self {
        ImageId(Uuid::new_v4())
    }
}

impl Default for ImageId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.as_hyphenated().fmt(f)
    }
}

impl FromStr for ImageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(ImageId)
    }
}

/// An accepted upload waiting for a worker.
///
/// The payload is buffered in memory before the job is queued, so nothing
/// borrowed from the uploader crosses the queue.
pub struct PendingJob {
    pub id: ImageId,
    pub filename: String,
    pub data: Vec<u8>,
}

impl PendingJob {
    pub fn new(id: ImageId, filename: impl Into<String>, data: Vec<u8>) -> Self {
        PendingJob {
            id,
            filename: filename.into(),
            data,
        }
    }

    /// Drains `reader` into memory and mints a fresh identifier for it.
    pub async fn read_from<R>(mut reader: R, filename: impl Into<String>) -> std::io::Result<Self>
    where
        R: AsyncRead + Unpin,
    {
        let mut data = Vec::new();
        reader.read_to_end(&mut data).await?;
        Ok(PendingJob::new(ImageId::new(), filename, data))
    }
}

impl fmt::Debug for PendingJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingJob")
            .field("id", &self.id)
            .field("filename", &self.filename)
            .field("len", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_id_round_trips_through_its_string_form() {
        let id = ImageId::new();
        let parsed: ImageId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn image_ids_are_unique() {
        assert_ne!(ImageId::new(), ImageId::new());
    }

    #[test]
    fn image_id_rejects_path_like_strings() {
        assert!("../etc".parse::<ImageId>().is_err());
        assert!("".parse::<ImageId>().is_err());
    }

    #[tokio::test]
    async fn read_from_buffers_the_whole_stream() {
        let payload = vec![7u8; 10_000];
        let job = PendingJob::read_from(payload.as_slice(), "seven.png")
            .await
            .unwrap();
        assert_eq!(job.filename, "seven.png");
        assert_eq!(job.data, payload);
    }
}
