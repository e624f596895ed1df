//! Job executor loop.

use super::{SqliteJobQueue, StoredJob, WorkerFactory};
use crate::connectivity::Connectivity;
use crate::db::now_millis;
use crate::error::StorageError;
use std::sync::Arc;
use std::time::Duration;
use stride_sync_core::{JobAction, JobEvent, JobState};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

/// Maximum number of jobs dispatched per pass.
const DISPATCH_BATCH: u32 = 32;

/// Runs due jobs from a [`SqliteJobQueue`].
#[derive(Clone)]
pub struct JobExecutor {
    queue: SqliteJobQueue,
    factory: Arc<dyn WorkerFactory>,
    connectivity: Arc<dyn Connectivity>,
    poll_interval: Duration,
}

impl JobExecutor {
    /// Create an executor.
    pub fn new(
        queue: SqliteJobQueue,
        factory: Arc<dyn WorkerFactory>,
        connectivity: Arc<dyn Connectivity>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            factory,
            connectivity,
            poll_interval,
        }
    }

    /// Dispatch every job that is due now and whose constraints hold, and
    /// wait for all of them to finish.
    ///
    /// Returns the number of jobs that ran.
    pub async fn run_due(&self) -> Result<usize, StorageError> {
        let due = self.queue.due_jobs(now_millis(), DISPATCH_BATCH).await?;
        let online = self.connectivity.is_online();

        let mut running = Vec::new();
        for job in due {
            if job.constraints.requires_network && !online {
                tracing::debug!("Job {} waits for network", job.id);
                continue;
            }
            if !self.queue.mark_dispatched(job.id).await? {
                continue;
            }

            let queue = self.queue.clone();
            let factory = Arc::clone(&self.factory);
            running.push((job.id, tokio::spawn(execute(queue, factory, job))));
        }

        let count = running.len();
        for (id, handle) in running {
            match handle.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("Job {} bookkeeping failed: {}", id, e),
                Err(e) => tracing::error!("Job {} worker crashed: {}", id, e),
            }
        }
        Ok(count)
    }

    /// Start the executor loop in the background.
    ///
    /// Jobs left dispatched by a previous process are requeued first. The
    /// loop wakes on the poll interval, on every submission and on every
    /// connectivity change.
    pub fn spawn(self) -> ExecutorHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            if let Err(e) = self.queue.recover_interrupted().await {
                tracing::error!("Job recovery failed: {}", e);
            }

            let submissions = self.queue.submissions();
            let mut network = self.connectivity.changes();
            tracing::info!(
                "Job executor started (poll interval: {}ms)",
                self.poll_interval.as_millis()
            );

            loop {
                match self.run_due().await {
                    Ok(0) => {}
                    Ok(ran) => tracing::debug!("Executor pass ran {} jobs", ran),
                    Err(e) => tracing::error!("Executor pass failed: {}", e),
                }

                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    _ = submissions.notified() => {}
                    _ = network_changed(&mut network) => {}
                    _ = tokio::time::sleep(self.poll_interval) => {}
                }
            }

            tracing::info!("Job executor stopped");
        });

        ExecutorHandle {
            shutdown: Some(shutdown_tx),
            task,
        }
    }
}

/// Run one dispatched job and apply the outcome.
async fn execute(
    queue: SqliteJobQueue,
    factory: Arc<dyn WorkerFactory>,
    job: StoredJob,
) -> Result<(), StorageError> {
    let schedule = job.schedule();
    let (state, actions) = JobState::Queued {
        attempt: job.attempt,
    }
    .on_event(JobEvent::Dispatch, &schedule);

    for action in actions {
        let JobAction::RunWorker { attempt } = action else {
            continue;
        };

        let worker = factory.create(&job.intent);
        let result = worker.do_work(attempt).await;
        tracing::debug!("Job {} ({}) attempt {} finished: {:?}", job.id, job.tag, attempt, result);

        let (next, follow_up) = state.on_event(JobEvent::Finished { result }, &schedule);
        for action in follow_up {
            let applied = match action {
                JobAction::Requeue { attempt, delay } => {
                    queue.reschedule(job.id, attempt, delay).await?
                }
                JobAction::Remove => queue.remove(job.id).await?,
                JobAction::RunWorker { .. } => true,
            };
            if !applied {
                tracing::debug!("Job {} was cancelled while running, result discarded", job.id);
            }
        }
        if next == JobState::Failed {
            tracing::warn!("Job {} ({}) gave up after {} attempts", job.id, job.tag, attempt + 1);
        }
    }
    Ok(())
}

async fn network_changed(rx: &mut Option<watch::Receiver<bool>>) {
    match rx {
        Some(rx) => {
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}

/// Handle to a running executor loop.
pub struct ExecutorHandle {
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ExecutorHandle {
    /// Stop the loop after its current pass and wait for it.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.task).await {
            tracing::error!("Job executor task failed: {}", e);
        }
    }
}

impl Drop for ExecutorHandle {
    fn drop(&mut self) {
        if self.shutdown.is_some() {
            self.task.abort();
        }
    }
}
