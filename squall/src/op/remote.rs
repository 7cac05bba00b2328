//! Single-target remote operations.

use color_eyre::eyre::WrapErr as _;
use squall_s3_helpers::{pick_part_size, S3Uri};

use crate::error::{JobError, JobResult};
use crate::job::Job;
use crate::op::{local_arg, remote_arg};
use crate::worker::WorkerParams;

pub async fn delete(job: &Job, params: &WorkerParams) -> JobResult {
    let uri = remote_arg(job, 0)?;
    params
        .client
        .delete_object()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .send()
        .await
        .wrap_err_with(|| format!("failed to delete {uri}"))?;
    Ok(())
}

/// Server-side copy, tagged with the storage class the options select.
///
/// With `delete_source`, a failing secondary delete leaves both objects in
/// place and surfaces the delete error; no rollback is attempted.
pub async fn copy(job: &Job, params: &WorkerParams) -> JobResult {
    let src = remote_arg(job, 0)?;
    let dst = remote_arg(job, 1)?;

    if job.opts.if_not_exists && head_exists(params, dst).await {
        return Err(JobError::ObjectExistsButOk);
    }

    params
        .client
        .copy_object()
        .copy_source(format!("{}/{}", src.bucket, src.key))
        .bucket(&dst.bucket)
        .key(&dst.key)
        .storage_class(job.opts.storage_class().to_aws())
        .send()
        .await
        .wrap_err_with(|| format!("failed to copy {src} to {dst}"))?;

    if job.opts.delete_source {
        params
            .client
            .delete_object()
            .bucket(&src.bucket)
            .key(&src.key)
            .send()
            .await
            .wrap_err_with(|| format!("copied, but failed to delete {src}"))?;
    }
    Ok(())
}

pub async fn download(job: &Job, params: &WorkerParams) -> JobResult {
    let src = remote_arg(job, 0)?;
    let dst = local_arg(job, 1)?;

    if job.opts.if_not_exists && tokio::fs::try_exists(dst).await.unwrap_or(false) {
        return Err(JobError::FileExistsButOk);
    }

    // Detached so a cancellation can abandon the transfer; aborting drops
    // the tempfile the helper writes into, removing the partial download.
    let mut transfer = tokio::spawn({
        let client = params.client.clone();
        let object = src.clone();
        let out_path = dst.to_owned();
        let part_size = params.chunk_size;
        async move { squall_s3_helpers::download_file(&client, &object, &out_path, part_size).await }
    });

    tokio::select! {
        res = &mut transfer => {
            res.map_err(|e| JobError::Internal(format!("download task panicked: {e}")))??;
        }
        _ = params.cancel.cancelled() => {
            transfer.abort();
            // Wait for the task to actually drop so the partial file is
            // gone before we report the interruption.
            let _ = transfer.await;
            return Err(JobError::Interrupted);
        }
    }

    if job.opts.delete_source {
        params
            .client
            .delete_object()
            .bucket(&src.bucket)
            .key(&src.key)
            .send()
            .await
            .wrap_err_with(|| format!("downloaded, but failed to delete {src}"))?;
    }
    Ok(())
}

pub async fn upload(job: &Job, params: &WorkerParams) -> JobResult {
    let src = local_arg(job, 0)?;
    let dst = remote_arg(job, 1)?;

    let metadata = tokio::fs::metadata(src)
        .await
        .wrap_err_with(|| format!("failed to stat {src}"))?;

    if job.opts.if_not_exists && head_exists(params, dst).await {
        return Err(JobError::ObjectExistsButOk);
    }

    let part_size = pick_part_size(metadata.len(), params.chunk_size);
    let result = squall_s3_helpers::upload_file(
        &params.client,
        dst,
        src,
        part_size,
        job.opts.storage_class(),
        &params.cancel,
    )
    .await;
    if let Err(e) = result {
        if params.cancel.is_cancelled() {
            return Err(JobError::Interrupted);
        }
        return Err(e.into());
    }

    if job.opts.delete_source {
        tokio::fs::remove_file(src)
            .await
            .wrap_err_with(|| format!("uploaded, but failed to remove {src}"))?;
    }
    Ok(())
}

pub(crate) async fn head_exists(params: &WorkerParams, uri: &S3Uri) -> bool {
    params
        .client
        .head_object()
        .bucket(&uri.bucket)
        .key(&uri.key)
        .send()
        .await
        .is_ok()
}
