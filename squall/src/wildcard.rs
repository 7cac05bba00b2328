//! The fan-out engine coupling a listing producer to a per-item sub-job
//! factory.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{JobError, JobResult};
use crate::job::{Job, Notifier};
use crate::worker::{JobSender, WorkerParams};

/// Capacity of both the producer channel and the notifier channel.
pub const CHANNEL_CAP: usize = 1000;

/// Couples `lister` to `callback` and blocks until every issued sub-job has
/// been accounted for.
///
/// The lister must emit its items followed by one `None` end-of-stream
/// sentinel; dropping the sender without the sentinel reads as early
/// termination. The callback runs synchronously, in emission order, and is
/// also invoked on the sentinel so buffering callbacks can flush.
///
/// A lister error is returned in place of the aggregate, but only after the
/// already-submitted sub-jobs have drained, so counters stay conserved.
pub async fn wild_operation<T, L, Fut, C>(
    params: &WorkerParams,
    lister: L,
    callback: C,
) -> JobResult
where
    T: Send + 'static,
    L: FnOnce(flume::Sender<Option<T>>) -> Fut,
    Fut: Future<Output = JobResult>,
    C: FnMut(Option<T>) -> Option<Job> + Send + 'static,
{
    let (item_tx, item_rx) = flume::bounded::<Option<T>>(CHANNEL_CAP);
    let (done_tx, done_rx) = flume::bounded::<bool>(CHANNEL_CAP);
    let issued = Arc::new(AtomicU64::new(0));
    let processed = Arc::new(AtomicU64::new(0));
    let successful = Arc::new(AtomicU64::new(0));

    let consumer = tokio::spawn(consume_items(
        item_rx,
        callback,
        done_tx,
        params.sub_jobs.clone(),
        Arc::clone(&issued),
    ));
    tokio::spawn(tally_results(
        done_rx,
        Arc::clone(&processed),
        Arc::clone(&successful),
    ));

    let lister_result = lister(item_tx).await;

    consumer
        .await
        .map_err(|e| JobError::Internal(format!("fan-out consumer panicked: {e}")))?;

    let issued = issued.load(Ordering::SeqCst);
    while processed.load(Ordering::SeqCst) < issued {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
            _ = params.cancel.cancelled() => return Err(JobError::Interrupted),
        }
    }

    lister_result?;

    let successful = successful.load(Ordering::SeqCst);
    if successful == issued {
        Ok(())
    } else {
        Err(JobError::Incomplete { successful, issued })
    }
}

async fn consume_items<T, C>(
    rx: flume::Receiver<Option<T>>,
    mut callback: C,
    done_tx: flume::Sender<bool>,
    sub_jobs: JobSender,
    issued: Arc<AtomicU64>,
) where
    C: FnMut(Option<T>) -> Option<Job> + Send + 'static,
{
    loop {
        let item = match rx.recv_async().await {
            Ok(item) => item,
            // Sender dropped without the sentinel: early termination.
            Err(_) => break,
        };
        let eof = item.is_none();
        if let Some(mut job) = callback(item) {
            job.notifier = Some(Notifier::new(done_tx.clone()));
            issued.fetch_add(1, Ordering::SeqCst);
            if sub_jobs.submit(job).await.is_err() {
                // Queue gone; undo the count so the wait loop terminates.
                issued.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        }
        if eof {
            break;
        }
    }
}

async fn tally_results(
    rx: flume::Receiver<bool>,
    processed: Arc<AtomicU64>,
    successful: Arc<AtomicU64>,
) {
    while let Ok(ok) = rx.recv_async().await {
        if ok {
            successful.fetch_add(1, Ordering::SeqCst);
        }
        processed.fetch_add(1, Ordering::SeqCst);
    }
}
