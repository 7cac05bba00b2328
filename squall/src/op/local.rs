//! Single-target filesystem operations.

use std::process::Stdio;

use color_eyre::eyre::WrapErr as _;
use filetime::FileTime;

use crate::error::{JobError, JobResult};
use crate::job::Job;
use crate::op::local_arg;
use crate::worker::WorkerParams;

pub async fn local_delete(job: &Job, _params: &WorkerParams) -> JobResult {
    let path = local_arg(job, 0)?;
    tokio::fs::remove_file(path)
        .await
        .wrap_err_with(|| format!("failed to remove {path}"))?;
    Ok(())
}

pub async fn local_copy(job: &Job, _params: &WorkerParams) -> JobResult {
    let src = local_arg(job, 0)?;
    let dst = local_arg(job, 1)?;

    if job.opts.if_not_exists && tokio::fs::try_exists(dst).await.unwrap_or(false) {
        return Err(JobError::FileExistsButOk);
    }

    if job.opts.delete_source {
        tokio::fs::rename(src, dst)
            .await
            .wrap_err_with(|| format!("failed to move {src} to {dst}"))?;
        return Ok(());
    }

    tokio::fs::copy(src, dst)
        .await
        .wrap_err_with(|| format!("failed to copy {src} to {dst}"))?;

    // fs::copy carries permissions; timestamps need a second pass.
    let metadata = tokio::fs::metadata(src)
        .await
        .wrap_err_with(|| format!("failed to stat {src}"))?;
    let atime = FileTime::from_last_access_time(&metadata);
    let mtime = FileTime::from_last_modification_time(&metadata);
    let dst = dst.to_owned();
    tokio::task::spawn_blocking(move || {
        filetime::set_file_times(dst.as_std_path(), atime, mtime)
            .wrap_err_with(|| format!("failed to set times on {dst}"))
    })
    .await
    .map_err(|e| JobError::Internal(format!("set_file_times task panicked: {e}")))??;

    Ok(())
}

/// Launches the program with inherited stdio. The child's lifetime is bound
/// to the cancellation context.
pub async fn shell_exec(job: &Job, params: &WorkerParams) -> JobResult {
    let mut texts = job.args.iter().map(|a| a.text());
    let program = texts
        .next()
        .ok_or_else(|| JobError::Internal("exec requires a program".into()))?;

    let mut child = tokio::process::Command::new(program)
        .args(texts)
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .wrap_err_with(|| format!("failed to launch {program}"))?;

    tokio::select! {
        status = child.wait() => {
            let status = status.wrap_err("failed to wait for child")?;
            if status.success() {
                Ok(())
            } else {
                Err(JobError::Failed(format!("{program} exited with {status}")))
            }
        }
        _ = params.cancel.cancelled() => {
            let _ = child.kill().await;
            Err(JobError::Interrupted)
        }
    }
}
