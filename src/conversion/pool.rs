//! Bounded conversion worker pool.
//!
//! A fixed number of long-lived workers pull jobs from one bounded queue.
//! Submission never blocks: a saturated queue is reported to the caller
//! immediately. Shutdown closes the queue and drains in-flight work; abort
//! is the only way to end a job mid-execution.

use crate::conversion::encoder::{self, EncoderSettings};
use crate::conversion::progress::ProgressExtractor;
use crate::quality::resolve_quality_setting;
use crate::state::{ConversionJob, ConversionStore, ProcessHandle};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Error returned from [`WorkerPool::queue_job`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Conversion queue is full")]
    Full,
    #[error("Conversion queue is shut down")]
    Closed,
}

pub struct WorkerPool {
    store: Arc<ConversionStore>,
    settings: EncoderSettings,
    worker_count: usize,
    queue_tx: parking_lot::Mutex<Option<mpsc::Sender<ConversionJob>>>,
    /// Single receiver shared by all workers; taken at start.
    queue_rx: parking_lot::Mutex<Option<Arc<tokio::sync::Mutex<mpsc::Receiver<ConversionJob>>>>>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Build a pool with `worker_count` workers and a queue holding twice
    /// that many pending jobs.
    pub fn new(worker_count: usize, store: Arc<ConversionStore>, settings: EncoderSettings) -> Self {
        let worker_count = worker_count.max(1);
        let (tx, rx) = mpsc::channel(worker_count * 2);
        Self {
            store,
            settings,
            worker_count,
            queue_tx: parking_lot::Mutex::new(Some(tx)),
            queue_rx: parking_lot::Mutex::new(Some(Arc::new(tokio::sync::Mutex::new(rx)))),
            workers: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Launch the workers. Calling more than once is a no-op.
    pub fn start(&self) {
        let Some(queue) = self.queue_rx.lock().take() else {
            return;
        };

        let mut workers = self.workers.lock();
        for worker_id in 0..self.worker_count {
            let queue = Arc::clone(&queue);
            let store = Arc::clone(&self.store);
            let settings = self.settings.clone();
            workers.push(tokio::spawn(async move {
                tracing::debug!(worker = worker_id, "Conversion worker started");
                loop {
                    // Lock only for the dequeue; released before the job runs
                    // so the other workers can pull concurrently.
                    let job = {
                        let mut rx = queue.lock().await;
                        rx.recv().await
                    };
                    let Some(job) = job else { break };
                    run_job(&store, &settings, job).await;
                }
                tracing::debug!(worker = worker_id, "Conversion worker stopped");
            }));
        }
        tracing::info!(workers = self.worker_count, "Conversion worker pool started");
    }

    /// Close the queue and wait for all in-flight jobs to finish.
    pub async fn stop(&self) {
        self.queue_tx.lock().take();
        let workers = std::mem::take(&mut *self.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!("Conversion worker panicked: {e}");
            }
        }
        tracing::info!("Conversion worker pool stopped");
    }

    /// Enqueue a job without blocking. Returns [`QueueError::Full`] right
    /// away when the queue is saturated.
    pub fn queue_job(&self, job: ConversionJob) -> Result<(), QueueError> {
        let tx = self.queue_tx.lock().clone().ok_or(QueueError::Closed)?;
        tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}

/// Execute one job: spawn the encoder, feed progress into the store, wait
/// for exit and finalize. The process handle is registered for exactly the
/// duration of execution.
async fn run_job(store: &Arc<ConversionStore>, settings: &EncoderSettings, job: ConversionJob) {
    tracing::info!(
        conversion_id = %job.id,
        file = %job.original_filename,
        format = %job.format,
        "Starting conversion"
    );

    let quality = resolve_quality_setting(&job.quality);
    let mut child = match encoder::spawn_encoder(settings, &job, quality) {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(conversion_id = %job.id, "Failed to start encoder: {e}");
            remove_artifacts(&job);
            store.update_status_with_error(
                &job.id,
                &format!("Failed to start conversion process: {e}"),
            );
            return;
        }
    };

    let registered = match child.id() {
        Some(pid) => {
            store.register_active_process(&job.id, ProcessHandle::new(pid));
            true
        }
        None => false,
    };

    let progress_task = child.stdout.take().map(|stdout| {
        let extractor = ProgressExtractor::new(Arc::clone(store), job.id.clone());
        tokio::spawn(extractor.run(stdout))
    });

    let wait_result = child.wait().await;

    if let Some(task) = progress_task {
        let _ = task.await;
    }
    if registered {
        store.unregister_active_process(&job.id);
    }

    match wait_result {
        Err(e) => {
            remove_artifacts(&job);
            store.update_status_with_error(
                &job.id,
                &format!("Failed to wait for conversion process: {e}"),
            );
        }
        Ok(status) if !status.success() => {
            tracing::warn!(conversion_id = %job.id, "Encoder exited with {status}");
            remove_artifacts(&job);
            // If the process was signalled by the abort path, that path has
            // already finalized the status and this call is a no-op.
            store.update_status_with_error(
                &job.id,
                &format!("Conversion process exited with {status}"),
            );
        }
        Ok(_) => {
            if !output_is_nonempty(&job.output_path) {
                remove_artifacts(&job);
                store.update_status_with_error(&job.id, "Conversion produced an empty output file");
                return;
            }

            // Metadata copy needs the input, so it runs before input removal.
            if settings.copy_metadata {
                if let Err(e) =
                    encoder::copy_metadata(settings, &job.input_path, &job.output_path).await
                {
                    tracing::warn!(conversion_id = %job.id, "Metadata copy failed: {e}");
                }
            }
            if let Err(e) = std::fs::remove_file(&job.input_path) {
                tracing::warn!(conversion_id = %job.id, "Failed to remove input file: {e}");
            }

            store.update_status_on_success(&job.id);
            tracing::info!(conversion_id = %job.id, "Conversion finished");
        }
    }
}

fn output_is_nonempty(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.len() > 0).unwrap_or(false)
}

/// Remove the input artifact and any partial output after a failed or
/// aborted conversion.
fn remove_artifacts(job: &ConversionJob) {
    for path in [&job.input_path, &job.output_path] {
        if let Err(e) = std::fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::debug!(conversion_id = %job.id, "Failed to remove {path:?}: {e}");
            }
        }
    }
}
