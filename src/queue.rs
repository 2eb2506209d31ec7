use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::{PendingJob, SubmitError};

/// Creates the producer and consumer halves of the submission queue.
///
/// The buffer is unbounded: producers are never held back by processing
/// speed, only the number of concurrent runs is capped downstream.
pub fn channel() -> (SubmissionQueue, JobReceiver) {
    let (sender, receiver) = async_channel::unbounded();
    (SubmissionQueue { sender }, JobReceiver { receiver })
}

/// Producer side. Cheap to clone.
#[derive(Clone)]
pub struct SubmissionQueue {
    sender: Sender<PendingJob>,
}

impl SubmissionQueue {
    /// Appends `job` and wakes a waiting consumer. Never waits.
    pub fn enqueue(&self, job: PendingJob) -> Result<(), SubmitError> {
        let (id, filename) = (job.id, job.filename.clone());
        match self.sender.try_send(job) {
            Ok(()) => {
                info!(
                    message = "Image queued for processing",
                    image_id = %id,
                    filename = %filename,
                    queued = self.len()
                );
                Ok(())
            }
            Err(TrySendError::Closed(job)) | Err(TrySendError::Full(job)) => {
                warn!(message = "Rejected job, queue is closed", image_id = %id);
                Err(SubmitError::Closed(job))
            }
        }
    }

    /// Number of jobs waiting for dispatch.
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }
}

/// Consumer side, owned by the coordinator.
pub struct JobReceiver {
    receiver: Receiver<PendingJob>,
}

impl JobReceiver {
    /// Waits for the next job in FIFO order.
    ///
    /// Returns `None` once `cancel_token` fires, or when every producer has
    /// been dropped and nothing is left to hand out.
    pub async fn dequeue(&self, cancel_token: &CancellationToken) -> Option<PendingJob> {
        tokio::select! {
            biased;
            _ = cancel_token.cancelled() => None,
            job = self.receiver.recv() => job.ok(),
        }
    }

    /// Pops the next job if one is already waiting.
    pub fn try_dequeue(&self) -> Option<PendingJob> {
        match self.receiver.try_recv() {
            Ok(job) => Some(job),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

impl Drop for JobReceiver {
    fn drop(&mut self) {
        if !self.is_empty() {
            warn!(message = "Abandoning queued jobs", count = self.len());
        }
        self.receiver.close();
    }
}
