use std::sync::atomic::{AtomicU64, Ordering};

/// What kind of work a successful job represents. Each job increments at most
/// one category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatCategory {
    FileOp,
    S3Op,
    ShellOp,
}

/// Process-wide tallies, shared by reference between all workers.
#[derive(Debug, Default)]
pub struct Stats {
    file_ops: AtomicU64,
    s3_ops: AtomicU64,
    shell_ops: AtomicU64,
    job_failures: AtomicU64,
}

impl Stats {
    pub fn add(&self, category: StatCategory) {
        let counter = match category {
            StatCategory::FileOp => &self.file_ops,
            StatCategory::S3Op => &self.s3_ops,
            StatCategory::ShellOp => &self.shell_ops,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a root job that finished with a hard error; drives the process
    /// exit code.
    pub fn add_job_failure(&self) {
        self.job_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_ops(&self) -> u64 {
        self.file_ops.load(Ordering::Relaxed)
    }

    pub fn s3_ops(&self) -> u64 {
        self.s3_ops.load(Ordering::Relaxed)
    }

    pub fn shell_ops(&self) -> u64 {
        self.shell_ops.load(Ordering::Relaxed)
    }

    pub fn job_failures(&self) -> u64 {
        self.job_failures.load(Ordering::Relaxed)
    }
}
