use thiserror::Error;

pub type JobResult = Result<(), JobError>;

#[derive(Debug, Error)]
pub enum JobError {
    /// The destination file already exists and `-n` was requested.
    #[error("file already exists")]
    FileExistsButOk,
    /// The destination object already exists and `-n` was requested.
    #[error("object already exists")]
    ObjectExistsButOk,
    /// The cancellation context won the race against the operation.
    #[error("interrupted")]
    Interrupted,
    /// Aggregate outcome of a fan-out where some sub-jobs did not succeed.
    #[error("{successful} of {issued} sub-jobs succeeded")]
    Incomplete { successful: u64, issued: u64 },
    /// Misuse of the core, e.g. an argument on the wrong side. A bug, not a
    /// user error.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("{0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] color_eyre::Report),
}

impl JobError {
    /// Acceptable errors are counted separately and do not fail the job;
    /// successor scheduling takes the success branch.
    pub fn is_acceptable(&self) -> bool {
        matches!(
            self,
            JobError::FileExistsButOk | JobError::ObjectExistsButOk
        )
    }
}
