use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Error;
use clap::Parser;
use tokio::{
    signal::unix::{signal, SignalKind},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, instrument, Instrument};

use imgq::config::ConfigContext;
use imgq::{queue, server, telemetry};
use imgq::{
    ImageCodec, PendingJob, Processor, SlotPool, StoreHandle, SubmissionQueue, VariantSizes,
    WebpCodec, WorkMessage,
};

#[instrument(skip_all)]
async fn setup(cancel_token: CancellationToken, config: ConfigContext) -> Result<(), Error> {
    let store = StoreHandle::new(&config.storage_dir).await?;
    let codec: Arc<dyn ImageCodec> = Arc::new(WebpCodec::new());
    let processor = Processor::new(store, codec, Arc::new(VariantSizes::standard()));
    let slots = Arc::new(SlotPool::new(usize::from(config.max_concurrent)));

    // Accepted uploads waiting for a slot
    let (queue, jobs) = queue::channel();

    // Per-job outcomes from the execution units
    let (send_to_client, mut recv_from_server) = mpsc::unbounded_channel();

    let server_spawn = {
        let cancel_token = cancel_token.clone();
        tokio::spawn(
            async move {
                if let Err(err) = server::serve(cancel_token, jobs, slots, processor, send_to_client).await
                {
                    error!("Coordinator failed: {}", err);
                }
            }
            .instrument(info_span!("server")),
        )
    };

    submit_files(&queue, &config.files).await;
    debug!("Done submitting files");

    // An open queue keeps the coordinator waiting for more work.
    let _queue = if config.exit_when_idle {
        drop(queue);
        None
    } else {
        Some(queue)
    };

    let (mut completed, mut failed) = (0usize, 0usize);
    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                debug!("Setup Cancelled");
                break;
            },
            server_response = recv_from_server.recv() => {
                match server_response {
                    Some(msg) => {
                        match &msg {
                            WorkMessage::JobCompleted(_) => completed += 1,
                            WorkMessage::JobFailed(..) => failed += 1,
                            WorkMessage::JobStarted(_) => {}
                        }
                        info!(event = "Message", msg = ?msg);
                    },
                    None => {
                        debug!("Coordinator finished, exiting");
                        break;
                    }
                }
            }
        }
    }

    println!("Waiting for coordinator to shutdown...");
    server_spawn.await?;
    info!(message = "Processing summary", completed, failed);

    Ok(())
}

/// Upload boundary: buffers each file and queues it under a fresh id.
async fn submit_files(queue: &SubmissionQueue, files: &[PathBuf]) {
    for path in files {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        let accepted = match tokio::fs::File::open(path).await {
            Ok(file) => PendingJob::read_from(file, filename).await,
            Err(err) => Err(err),
        };

        match accepted {
            Ok(job) => {
                let id = job.id;
                match queue.enqueue(job) {
                    Ok(()) => println!("{}\t{}", id, path.display()),
                    Err(err) => eprintln!("Error processing {}: {}", path.display(), err),
                }
            }
            Err(err) => {
                error!(message = "Error reading file", path = %path.display(), error = %err);
                eprintln!("Error processing {}: {}", path.display(), err);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ConfigContext::parse();
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "imgq=debug");
    }

    telemetry::init(config.jaeger_endpoint.as_deref())?;

    let token = CancellationToken::new();

    let cloned_token = token.clone();
    let app = tokio::spawn(setup(cloned_token, config));

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) =
            match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
                (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
                _ => {
                    error!("Failed to install signal handlers");
                    return;
                }
            };
        tokio::select! {
            _ = sigterm.recv() => {println!("Received SIGTERM"); token.cancel()},
            _ = sigint.recv() => {println!("Received SIGINT"); token.cancel()},
        }
    });
    app.await??;
    println!("Shutting down.");
    telemetry::shutdown();

    Ok(())
}
