use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::argument::Argument;
use crate::op::Operation;
use crate::options::Options;

/// Result counters shared between a root job and all of its sub-jobs.
///
/// Structurally immutable; only the words inside move, and only upward.
#[derive(Debug, Default)]
pub struct Counters {
    success: AtomicU64,
    acceptable_fails: AtomicU64,
    fails: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub success: u64,
    pub acceptable_fails: u64,
    pub fails: u64,
}

impl Counters {
    pub fn add_success(&self) {
        self.success.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_acceptable_fail(&self) {
        self.acceptable_fails.fetch_add(1, Ordering::SeqCst);
    }

    pub fn add_fail(&self) {
        self.fails.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            success: self.success.load(Ordering::SeqCst),
            acceptable_fails: self.acceptable_fails.load(Ordering::SeqCst),
            fails: self.fails.load(Ordering::SeqCst),
        }
    }
}

/// Write-once completion handle a sub-job reports through.
///
/// Consuming `self` makes double notification unrepresentable.
#[derive(Debug)]
pub struct Notifier {
    tx: flume::Sender<bool>,
}

impl Notifier {
    pub fn new(tx: flume::Sender<bool>) -> Self {
        Self { tx }
    }

    /// Delivers the outcome to the owning fan-out. A full channel is retried
    /// with a one-second backoff; cancellation abandons the attempt.
    pub async fn notify(self, ok: bool, cancel: &CancellationToken) {
        loop {
            match self.tx.try_send(ok) {
                Ok(()) => return,
                Err(flume::TrySendError::Disconnected(_)) => return,
                Err(flume::TrySendError::Full(_)) => {
                    info!("waiting to notify");
                    tokio::select! {
                        _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                        _ = cancel.cancelled() => return,
                    }
                }
            }
        }
    }
}

/// The unit of execution.
#[derive(Debug)]
pub struct Job {
    /// Verbatim text this job was parsed from; inherited by sub-jobs for
    /// error messages.
    pub source_desc: String,
    /// Short command name shown to the user. Batch sub-jobs carry the
    /// serialized option suffix here (e.g. `cp -n`).
    pub command: String,
    pub operation: Operation,
    pub args: Vec<Argument>,
    pub opts: Options,
    /// Follow-up queued when this job ends without / with error. Root jobs
    /// only.
    pub success_next: Option<Box<Job>>,
    pub fail_next: Option<Box<Job>>,
    /// Completion handle stamped by the owning fan-out. Sub-jobs only.
    pub notifier: Option<Notifier>,
    pub is_sub_job: bool,
    pub counters: Arc<Counters>,
}

impl Job {
    pub fn root(
        source_desc: impl Into<String>,
        command: impl Into<String>,
        operation: Operation,
        args: Vec<Argument>,
        opts: Options,
    ) -> Self {
        Self {
            source_desc: source_desc.into(),
            command: command.into(),
            operation,
            args,
            opts,
            success_next: None,
            fail_next: None,
            notifier: None,
            is_sub_job: false,
            counters: Arc::new(Counters::default()),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.command)?;
        for arg in &self.args {
            write!(f, " {}", arg.text())?;
        }
        Ok(())
    }
}

/// Everything a fan-out callback needs to mint sub-jobs without borrowing the
/// parent. Counter handles are shared, so results roll up automatically.
#[derive(Debug, Clone)]
pub struct SubJobTemplate {
    pub source_desc: String,
    pub command: String,
    pub opts: Options,
    pub counters: Arc<Counters>,
}

impl SubJobTemplate {
    pub fn from_root(job: &Job, command: impl Into<String>) -> Self {
        Self {
            source_desc: job.source_desc.clone(),
            command: command.into(),
            opts: job.opts,
            counters: Arc::clone(&job.counters),
        }
    }

    pub fn make(&self, operation: Operation, args: Vec<Argument>) -> Job {
        Job {
            source_desc: self.source_desc.clone(),
            command: self.command.clone(),
            operation,
            args,
            opts: self.opts,
            success_next: None,
            fail_next: None,
            notifier: None,
            is_sub_job: true,
            counters: Arc::clone(&self.counters),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_command_and_args() {
        let job = Job::root(
            "cp a b",
            "cp",
            Operation::LocalCopy,
            vec![Argument::local("a"), Argument::local("b")],
            Options::default(),
        );
        assert_eq!(job.to_string(), "cp a b");
    }

    #[test]
    fn sub_jobs_share_counters() {
        let root = Job::root("x", "cp", Operation::BatchUpload, vec![], Options::default());
        let tpl = SubJobTemplate::from_root(&root, "cp");
        let sub = tpl.make(Operation::Upload, vec![]);
        assert!(sub.is_sub_job);
        sub.counters.add_success();
        assert_eq!(root.counters.snapshot().success, 1);
    }

    #[tokio::test]
    async fn notify_succeeds_on_open_channel() {
        let (tx, rx) = flume::bounded(1);
        Notifier::new(tx)
            .notify(true, &CancellationToken::new())
            .await;
        assert_eq!(rx.try_recv().unwrap(), true);
    }

    #[tokio::test]
    async fn notify_aborts_on_cancellation_when_full() {
        let (tx, rx) = flume::bounded(1);
        tx.try_send(false).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        Notifier::new(tx).notify(true, &cancel).await;
        // only the pre-existing value is in the channel
        assert_eq!(rx.try_recv().unwrap(), false);
        assert!(rx.try_recv().is_err());
    }
}
