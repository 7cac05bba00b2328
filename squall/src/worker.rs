use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::job::Job;
use crate::op;
use crate::reporter;
use crate::stats::Stats;

pub type ExitHook = Arc<dyn Fn(i32) + Send + Sync>;

/// Submission handle into the pool's queue. Cloned freely; every submission
/// is tracked so the pool knows when it has gone quiet.
#[derive(Clone)]
pub struct JobSender {
    tx: flume::Sender<Job>,
    in_flight: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl JobSender {
    pub async fn submit(&self, job: Job) -> Result<(), JobError> {
        self.reserve();
        self.send_reserved(job).await
    }

    /// Counts a submission before the send so the pool cannot look idle
    /// between the decision to submit and the job landing in the queue.
    fn reserve(&self) {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
    }

    async fn send_reserved(&self, job: Job) -> Result<(), JobError> {
        if self.tx.send_async(job).await.is_err() {
            self.release();
            return Err(JobError::Internal("job queue is closed".into()));
        }
        Ok(())
    }

    fn release(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Everything a job receives at execution time.
#[derive(Clone)]
pub struct WorkerParams {
    pub cancel: CancellationToken,
    pub client: aws_sdk_s3::Client,
    /// Configured multipart chunk size, in bytes.
    pub chunk_size: u64,
    pub stats: Arc<Stats>,
    /// Back-edge into the pool for fan-out sub-jobs and successor jobs.
    pub sub_jobs: JobSender,
    /// Process-exit function used by `exit`.
    pub exit: ExitHook,
}

/// Fixed-size pool of tasks draining one shared queue.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
    sender: JobSender,
    in_flight: Arc<AtomicU64>,
    idle: Arc<Notify>,
}

impl WorkerPool {
    pub fn new(
        workers: usize,
        cancel: CancellationToken,
        client: aws_sdk_s3::Client,
        chunk_size: u64,
        stats: Arc<Stats>,
        exit: ExitHook,
    ) -> Self {
        // A batch job occupies its worker for the whole fan-out, so a lone
        // worker could never run its own sub-jobs.
        let workers = workers.max(2);
        let (tx, rx) = flume::bounded::<Job>(workers * 4);
        let in_flight = Arc::new(AtomicU64::new(0));
        let idle = Arc::new(Notify::new());
        let sender = JobSender {
            tx,
            in_flight: Arc::clone(&in_flight),
            idle: Arc::clone(&idle),
        };
        let params = WorkerParams {
            cancel,
            client,
            chunk_size,
            stats,
            sub_jobs: sender.clone(),
            exit,
        };
        let shutdown = CancellationToken::new();
        let handles = (0..workers)
            .map(|_| {
                tokio::spawn(worker_loop(
                    rx.clone(),
                    params.clone(),
                    shutdown.clone(),
                    Arc::clone(&in_flight),
                    Arc::clone(&idle),
                ))
            })
            .collect();
        Self {
            handles,
            shutdown,
            sender,
            in_flight,
            idle,
        }
    }

    pub fn sender(&self) -> JobSender {
        self.sender.clone()
    }

    /// Resolves once every submitted job (sub-jobs and successors included)
    /// has been fully processed.
    pub async fn wait_idle(&self) {
        loop {
            // Register interest before the check so a wakeup between the
            // load and the await is not lost.
            let mut notified = std::pin::pin!(self.idle.notified());
            notified.as_mut().enable();
            if self.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }

    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

async fn worker_loop(
    rx: flume::Receiver<Job>,
    params: WorkerParams,
    shutdown: CancellationToken,
    in_flight: Arc<AtomicU64>,
    idle: Arc<Notify>,
) {
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv_async() => match job {
                Ok(job) => job,
                Err(_) => break,
            },
        };
        run_job(job, &params).await;
        if in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            idle.notify_waiters();
        }
    }
}

/// Executes one job and settles all of its bookkeeping: stats, counters,
/// reporting, successor scheduling, and the completion notifier.
pub async fn run_job(mut job: Job, params: &WorkerParams) {
    let notifier = job.notifier.take();
    let result = op::dispatch(&job, params).await;
    let ok = match &result {
        Ok(()) => true,
        Err(e) => e.is_acceptable(),
    };

    // An acceptable failure still performed its probe, so it counts.
    if ok {
        if let Some(category) = job.operation.stat_category() {
            params.stats.add(category);
        }
    }

    if job.is_sub_job && !job.operation.is_internal() {
        match &result {
            Ok(()) => job.counters.add_success(),
            Err(e) if e.is_acceptable() => job.counters.add_acceptable_fail(),
            Err(_) => job.counters.add_fail(),
        }
    }

    reporter::report(&job, &result);

    if !job.is_sub_job {
        if !ok {
            params.stats.add_job_failure();
        }
        let next = if ok {
            job.success_next.take()
        } else {
            job.fail_next.take()
        };
        if let Some(next) = next {
            // Detached so a full queue cannot wedge the worker that is the
            // queue's own consumer.
            let sender = params.sub_jobs.clone();
            sender.reserve();
            tokio::spawn(async move {
                let _ = sender.send_reserved(*next).await;
            });
        }
    }

    // Must come after the counter updates so the parent's aggregate view is
    // consistent when it observes the completion.
    if let Some(notifier) = notifier {
        notifier.notify(ok, &params.cancel).await;
    }
}
