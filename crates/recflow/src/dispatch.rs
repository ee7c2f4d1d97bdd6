//! The single sequential worker: one job at a time, FIFO, never stops on a job failure.

use std::sync::Arc;
use log::{error, info, warn};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use crate::config::Config;
use crate::entity::Entity;
use crate::ffmpeg::MediaTools;
use crate::notify::Notifier;
use crate::renamer::Renamer;
use crate::store::{Job, JobQueue, JobStore};

pub struct Dispatcher {
    store: Arc<JobStore>,
    queue: JobQueue,
    tools: Arc<dyn MediaTools>,
    notifier: Arc<dyn Notifier>,
    config: watch::Receiver<Arc<Config>>,
}

impl Dispatcher {
    pub fn new(
        store: Arc<JobStore>,
        queue: JobQueue,
        tools: Arc<dyn MediaTools>,
        notifier: Arc<dyn Notifier>,
        config: watch::Receiver<Arc<Config>>,
    ) -> Self {
        Self {
            store,
            queue,
            tools,
            notifier,
            config,
        }
    }

    /// Process jobs until cancelled. A job already running is finished first.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!("transcoder: ready for jobs");

        loop {
            let job = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("transcoder: stop requested, no further jobs will be started");
                    break;
                }
                job = self.queue.next() => match job {
                    Some(job) => job,
                    None => {
                        warn!("transcoder: job queue closed");
                        break;
                    }
                },
            };

            self.process(job).await;
        }
    }

    /// Run one job to its terminal state, mark it complete and notify exactly once
    pub async fn process(&self, job: Job) -> Entity {
        // Snapshot once so a reload can't change this job half way through
        let config = self.config.borrow().clone();
        let renamer = Renamer::from_config(&config.rename);
        let mut entity = Entity::new(job.details, config.transcoding.clone(), renamer);

        info!("Job {}: starting '{}' from {}", job.id, entity.details.title, entity.details.path);

        match entity.process(self.tools.as_ref()).await {
            Ok(()) => info!("Job {}: ✅ finished (ok: {})", job.id, entity.ok()),
            Err(e) => error!("Job {}: ❌ failed: {}", job.id, e),
        }

        // Success and failure are both terminal; either way the job leaves the index
        if let Err(e) = self.store.complete(&job.id).await {
            error!("Job {}: failed to mark job as done: {}", job.id, e);
            entity.fail(&e);
        }

        if let Err(e) = self.notifier.notify(&entity).await {
            error!("Job {}: error when doing notifications: {}", job.id, e);
        }

        entity
    }
}
