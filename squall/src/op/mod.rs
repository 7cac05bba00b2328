mod batch;
mod listing;
mod local;
mod remote;

pub use batch::make_delete_batcher;

use camino::Utf8Path;
use squall_s3_helpers::S3Uri;

use crate::error::{JobError, JobResult};
use crate::job::Job;
use crate::stats::StatCategory;
use crate::worker::WorkerParams;

/// Every operation the dispatcher knows. Closed on purpose; there is no
/// dynamic registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LocalDelete,
    LocalCopy,
    ShellExec,
    Copy,
    Delete,
    Download,
    Upload,
    BatchLocalCopy,
    BatchDelete,
    BatchDeleteActual,
    BatchDownload,
    BatchUpload,
    ListBuckets,
    List,
    Size,
    Abort,
}

impl Operation {
    /// Internal operations never emit reporter output and never touch the
    /// result counters.
    pub fn is_internal(self) -> bool {
        matches!(self, Operation::Abort)
    }

    /// Which stat tally a completed run of this operation bumps. Batch
    /// operations report through their sub-jobs instead.
    pub fn stat_category(self) -> Option<StatCategory> {
        match self {
            Operation::LocalDelete | Operation::LocalCopy => Some(StatCategory::FileOp),
            Operation::ShellExec => Some(StatCategory::ShellOp),
            Operation::Copy
            | Operation::Delete
            | Operation::Download
            | Operation::Upload
            | Operation::BatchDeleteActual
            | Operation::ListBuckets
            | Operation::List
            | Operation::Size => Some(StatCategory::S3Op),
            Operation::BatchLocalCopy
            | Operation::BatchDelete
            | Operation::BatchDownload
            | Operation::BatchUpload
            | Operation::Abort => None,
        }
    }
}

/// Runs `job` to completion. Total over [`Operation`]; argument-shape
/// violations surface as [`JobError::Internal`] since the parser enforces
/// arity and sides.
pub async fn dispatch(job: &Job, params: &WorkerParams) -> JobResult {
    match job.operation {
        Operation::LocalDelete => local::local_delete(job, params).await,
        Operation::LocalCopy => local::local_copy(job, params).await,
        Operation::ShellExec => local::shell_exec(job, params).await,
        Operation::Copy => remote::copy(job, params).await,
        Operation::Delete => remote::delete(job, params).await,
        Operation::Download => remote::download(job, params).await,
        Operation::Upload => remote::upload(job, params).await,
        Operation::BatchLocalCopy => batch::batch_local_copy(job, params).await,
        Operation::BatchDelete => batch::batch_delete(job, params).await,
        Operation::BatchDeleteActual => batch::batch_delete_actual(job, params).await,
        Operation::BatchDownload => batch::batch_download(job, params).await,
        Operation::BatchUpload => batch::batch_upload(job, params).await,
        Operation::ListBuckets => listing::list_buckets(job, params).await,
        Operation::List => listing::list(job, params).await,
        Operation::Size => listing::size(job, params).await,
        Operation::Abort => listing::abort(job, params),
    }
}

pub(crate) fn local_arg<'a>(job: &'a Job, index: usize) -> Result<&'a Utf8Path, JobError> {
    match job.args.get(index) {
        Some(crate::argument::Argument::Local(path)) => Ok(path),
        other => Err(JobError::Internal(format!(
            "`{}` expected a local path in argument {index}, got {other:?}",
            job.command
        ))),
    }
}

pub(crate) fn remote_arg<'a>(job: &'a Job, index: usize) -> Result<&'a S3Uri, JobError> {
    match job.args.get(index) {
        Some(crate::argument::Argument::Remote { uri, .. }) => Ok(uri),
        other => Err(JobError::Internal(format!(
            "`{}` expected a remote url in argument {index}, got {other:?}",
            job.command
        ))),
    }
}
