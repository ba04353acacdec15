use crate::notify::{Dispatch, Notifier};
use crate::pipeline::{Disposition, GeneratedCss, GenerationResult, Generator, JobContext, JobError};
use crate::queue::{FailOutcome, QueueEntry, QueueError, QueueResult, RefreshQueue};
use crate::ConfigError;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Counts of job outcomes for one drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub succeeded: usize,

    /// Stored, but over the size budget
    pub warned: usize,

    /// Failed and re-enqueued
    pub retried: usize,

    /// Failed and recorded as permanent failures
    pub abandoned: usize,
}

impl DrainReport {
    pub fn total(&self) -> usize {
        self.succeeded + self.warned + self.retried + self.abandoned
    }
}

struct FinishedJob {
    entry: QueueEntry,
    outcome: Result<GeneratedCss, JobError>,
    transcript: String,
    duration: Duration,
}

/// Drains the refresh queue through a fixed pool of concurrent jobs
pub struct Worker {
    queue: Arc<RefreshQueue>,
    generator: Arc<Generator>,
    notifier: Notifier,
    batch_size: usize,
    workers: usize,
    wait_for_notifications: bool,
    drain_scheduled: AtomicBool,
}

impl Worker {
    pub fn new(queue: Arc<RefreshQueue>, generator: Arc<Generator>, notifier: Notifier) -> Self {
        Self {
            queue,
            generator,
            notifier,
            batch_size: 4,
            workers: 2,
            wait_for_notifications: false,
            drain_scheduled: AtomicBool::new(false),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Makes [`drain`](Worker::drain) wait for notification deliveries
    /// before returning
    pub fn wait_for_notifications(mut self, wait: bool) -> Self {
        self.wait_for_notifications = wait;
        self
    }

    pub fn queue(&self) -> &Arc<RefreshQueue> {
        &self.queue
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    pub fn is_drain_scheduled(&self) -> bool {
        self.drain_scheduled.load(Ordering::SeqCst)
    }

    /// Processes every entry that is available when the drain starts
    ///
    /// Entries are claimed `batch_size` at a time and at most `workers` jobs
    /// run at once. A failed job is finished on its own; it never stops the
    /// rest of the drain. Entries re-enqueued by a failure during this drain
    /// are left for a later one.
    pub async fn drain(&self) -> QueueResult<DrainReport> {
        let started = Utc::now();
        let mut report = DrainReport::default();
        let mut dispatches = Vec::new();

        loop {
            let batch = self.queue.dequeue_available(self.batch_size, started)?;
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Claimed {} queue entries", batch.len());

            let mut jobs = JoinSet::new();
            for entry in batch {
                while jobs.len() >= self.workers {
                    if let Some(joined) = jobs.join_next().await {
                        self.collect(joined, &mut report, &mut dispatches);
                    }
                }
                jobs.spawn(run_job(self.generator.clone(), entry));
            }
            while let Some(joined) = jobs.join_next().await {
                self.collect(joined, &mut report, &mut dispatches);
            }
        }

        self.settle(dispatches).await;

        if report.total() > 0 {
            tracing::info!(
                "Drain finished: {} succeeded, {} over budget, {} retrying, {} abandoned",
                report.succeeded,
                report.warned,
                report.retried,
                report.abandoned
            );
        }
        Ok(report)
    }

    /// Generates one page immediately, holding its queue claim meanwhile
    ///
    /// Fails with [`QueueError::AlreadyInFlight`] while a drain (in this or
    /// another process) is working on the same page. An unknown URL is
    /// reported without touching the queue.
    pub async fn generate_now(&self, url: &str) -> QueueResult<Result<GeneratedCss, JobError>> {
        let page_url = match self.generator.registry().resolve(url) {
            Some(page) => page.url.clone(),
            None => return Ok(Err(ConfigError::NoPageConfig(url.to_string()).into())),
        };

        let entry = self
            .queue
            .claim_url(&page_url)?
            .ok_or_else(|| QueueError::AlreadyInFlight(page_url.clone()))?;

        let job = run_job(self.generator.clone(), entry).await;
        let (dispatch, settled) = self.finish(&job, &mut DrainReport::default());
        self.settle(vec![dispatch]).await;
        settled?;

        Ok(job.outcome)
    }

    async fn settle(&self, dispatches: Vec<Dispatch>) {
        if self.wait_for_notifications {
            for dispatch in dispatches {
                dispatch.settled().await;
            }
        } else {
            dispatches.into_iter().for_each(Dispatch::detach);
        }
    }

    fn collect(
        &self,
        joined: Result<FinishedJob, tokio::task::JoinError>,
        report: &mut DrainReport,
        dispatches: &mut Vec<Dispatch>,
    ) {
        match joined {
            Ok(job) => {
                let (dispatch, settled) = self.finish(&job, report);
                dispatches.push(dispatch);
                if let Err(e) = settled {
                    tracing::error!("Failed to update queue for {}: {}", job.entry.url, e);
                }
            }
            Err(e) => tracing::error!("Generation task failed: {}", e),
        }
    }

    /// Reports a finished job and settles its queue entry
    ///
    /// The notification goes out whether or not the queue update succeeds.
    fn finish(&self, job: &FinishedJob, report: &mut DrainReport) -> (Dispatch, QueueResult<()>) {
        let url = job.entry.url.as_str();
        let result = GenerationResult::from_job(url, &job.outcome, job.duration);
        let dispatch = self.notifier.notify(url, &result, &job.transcript);
        (dispatch, self.settle_entry(job, report))
    }

    fn settle_entry(&self, job: &FinishedJob, report: &mut DrainReport) -> QueueResult<()> {
        let url = job.entry.url.as_str();

        let e = match &job.outcome {
            Ok(_) => {
                self.queue.complete(url)?;
                if self.queue.clear_permanent_failure(url)? {
                    tracing::info!("Cleared previous permanent failure for {}", url);
                }
                report.succeeded += 1;
                return Ok(());
            }
            Err(e) => e,
        };

        let message = e.to_string();
        let outcome = match e.disposition() {
            Disposition::Soft => {
                tracing::warn!("{}: {}", url, message);
                self.queue.complete(url)?;
                report.warned += 1;
                return Ok(());
            }
            Disposition::Retry => self.queue.fail(url, &message, true)?,
            Disposition::Fatal => self.queue.fail(url, &message, false)?,
        };

        match outcome {
            FailOutcome::Retrying { attempt } => {
                tracing::warn!(
                    "Generation failed for {} (attempt {} of {}): {}",
                    url,
                    attempt,
                    self.queue.max_attempts(),
                    message
                );
                report.retried += 1;
            }
            FailOutcome::Abandoned { attempts } => {
                tracing::error!(
                    "Giving up on {} after {} attempt(s): {}",
                    url,
                    attempts,
                    message
                );
                report.abandoned += 1;
            }
        }
        Ok(())
    }

    /// Enqueues every configured page and schedules a drain
    ///
    /// Returns the number of URLs actually added. Calling this again while a
    /// drain is scheduled or running adds nothing and schedules nothing more.
    pub fn trigger(self: &Arc<Self>) -> QueueResult<usize> {
        let added = self.queue.enqueue(self.generator.registry().urls())?;
        tracing::info!("Queued {} refresh jobs", added);
        self.schedule_drain();
        Ok(added)
    }

    /// Spawns a background drain unless one is already scheduled
    pub fn schedule_drain(self: &Arc<Self>) -> bool {
        if self.drain_scheduled.swap(true, Ordering::SeqCst) {
            tracing::debug!("Drain already scheduled");
            return false;
        }

        let worker = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = worker.drain().await {
                tracing::error!("Drain failed: {}", e);
            }
            worker.drain_scheduled.store(false, Ordering::SeqCst);

            // Entries added after the drain started
            match worker.queue.available_count() {
                Ok(available) if available > 0 => {
                    worker.schedule_drain();
                }
                Ok(_) => {}
                Err(e) => tracing::error!("Failed to read queue stats: {}", e),
            }
        });
        true
    }

    /// Schedules a drain every `tick`, starting immediately
    pub async fn run(self: Arc<Self>, tick: Duration) {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.schedule_drain();
        }
    }
}

async fn run_job(generator: Arc<Generator>, entry: QueueEntry) -> FinishedJob {
    let mut ctx = JobContext::new(entry.url.clone());
    let outcome = generator.generate(&entry.url, &mut ctx).await;
    FinishedJob {
        duration: ctx.elapsed(),
        transcript: ctx.transcript(),
        entry,
        outcome,
    }
}
