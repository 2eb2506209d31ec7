use std::sync::Arc;

use anyhow::Error;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::*;

use crate::processing::Processor;
use crate::queue::JobReceiver;
use crate::slots::SlotPool;
use crate::worker::{self, WorkMessage};

/// Coordinator loop: dispatches queued jobs to execution units, never more
/// than `slots.max_concurrent()` at a time.
///
/// Returns after `cancel_token` fires, every submission handle is gone or
/// the slot pool is closed, and only once all dispatched units have
/// finished. Jobs still queued at that point are abandoned. The pool is
/// closed on the way out, so it hands out no further slots.
pub async fn serve(
    cancel_token: CancellationToken,
    jobs: JobReceiver,
    slots: Arc<SlotPool>,
    processor: Processor,
    send_to_client: mpsc::UnboundedSender<WorkMessage>,
) -> Result<(), Error> {
    info!(
        message = "Coordinator started",
        max_concurrent = slots.max_concurrent()
    );

    let mut workers = JoinSet::new();
    let mut failure = None;

    'serve: while let Some(first) = jobs.dequeue(&cancel_token).await {
        // Drain whatever is already waiting before blocking on the queue again.
        let mut next = Some(first);
        while let Some(job) = next.take().or_else(|| jobs.try_dequeue()) {
            debug!(
                message = "Dequeued job",
                image_id = %job.id,
                filename = %job.filename,
                still_queued = jobs.len()
            );

            // Backpressure point: waits here while every slot is busy.
            let slot = tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    warn!(message = "Cancelled while waiting for a slot, abandoning job", image_id = %job.id);
                    break 'serve;
                },
                slot = slots.acquire() => slot,
            };
            let slot = match slot {
                Ok(slot) => slot,
                Err(err) => {
                    error!(message = "Slot pool closed, stopping", error = %err);
                    failure = Some(err);
                    break 'serve;
                }
            };

            let span = info_span!("job", image_id = %job.id);
            workers.spawn(
                worker::run(job, slot, processor.clone(), send_to_client.clone()).instrument(span),
            );

            while let Some(result) = workers.try_join_next() {
                log_unit_exit(result);
            }
        }
    }

    slots.close();

    if cancel_token.is_cancelled() {
        debug!("Coordinator cancelled");
    } else if failure.is_none() {
        debug!("Submission queue closed");
    }

    info!(message = "Waiting for remaining tasks to complete", in_flight = workers.len());
    while let Some(result) = workers.join_next().await {
        log_unit_exit(result);
    }
    info!("Coordinator stopped.");

    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn log_unit_exit(result: Result<(), JoinError>) {
    if let Err(err) = result {
        error!(message = "Execution unit did not complete", error = %err);
    }
}
