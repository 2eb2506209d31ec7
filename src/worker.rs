use tokio::sync::mpsc::UnboundedSender;
use tracing::*;

use crate::metadata::ImageMetadata;
use crate::processing::Processor;
use crate::slots::Slot;
use crate::{ImageId, PendingJob};

/// Per-job outcome, published by execution units as they go.
#[derive(Debug)]
pub enum WorkMessage {
    JobStarted(ImageId),
    JobCompleted(Box<ImageMetadata>),
    JobFailed(ImageId, String),
}

impl WorkMessage {
    pub fn image_id(&self) -> ImageId {
        match self {
            WorkMessage::JobStarted(id) | WorkMessage::JobFailed(id, _) => *id,
            WorkMessage::JobCompleted(metadata) => metadata.id,
        }
    }
}

/// One execution unit: processes `job` while holding `slot`.
///
/// Errors end here. They are logged and reported as `JobFailed`; the slot
/// and the job's buffer are released when this returns.
pub(crate) async fn run(
    job: PendingJob,
    slot: Slot,
    processor: Processor,
    send_to_client: UnboundedSender<WorkMessage>,
) {
    let PendingJob { id, filename, data } = job;
    info!(message = "Starting to process image", filename = %filename);
    notify(&send_to_client, WorkMessage::JobStarted(id));

    match processor.process(data, &filename, &id).await {
        Ok(metadata) => {
            info!(message = "Successfully processed image", filename = %filename);
            notify(&send_to_client, WorkMessage::JobCompleted(Box::new(metadata)));
        }
        Err(err) => {
            error!(message = "Error processing image", filename = %filename, error = %err);
            notify(&send_to_client, WorkMessage::JobFailed(id, err.to_string()));
        }
    }

    drop(slot);
    debug!(message = "Released processing slot", filename = %filename);
}

// Nobody listening for outcomes is not a pipeline failure.
fn notify(send_to_client: &UnboundedSender<WorkMessage>, msg: WorkMessage) {
    if let Err(err) = send_to_client.send(msg) {
        debug!(message = "Outcome dropped, no receiver", image_id = %err.0.image_id());
    }
}
