#![allow(clippy::uninlined_format_args)]
use std::{ops::RangeInclusive, os::unix::fs::FileExt, sync::Arc, time::Duration};

use aws_sdk_s3::Client;
use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::{
    eyre::{ensure, eyre, OptionExt as _, WrapErr},
    Result,
};
use tokio::{sync::Mutex, task::JoinSet, time::timeout};
use tracing::warn;

use crate::S3Uri;

const CONCURRENCY: usize = 16;
const PART_DOWNLOAD_TIMEOUT_SECS: u64 = 120;
const PART_DOWNLOAD_NUM_RETRY: u8 = 5;

#[derive(Debug, Clone)]
struct ContentRange(RangeInclusive<u64>);

impl std::fmt::Display for ContentRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let start = self.0.start();
        let end = self.0.end();
        write!(f, "bytes={}-{}", start, end)
    }
}

/// Downloads `object` into `out_path` with ranged concurrent GETs.
///
/// Bytes land in a tempfile next to the destination, persisted into place
/// only once the full object has been written and verified. Dropping the
/// returned future (e.g. losing a cancellation race) discards the tempfile,
/// so the destination path is never left partially written.
pub async fn download_file(
    client: &Client,
    object: &S3Uri,
    out_path: &Utf8Path,
    part_size: u64,
) -> Result<()> {
    ensure!(part_size > 0, "part size must be positive");
    let parent_dir = out_path
        .parent()
        .ok_or_eyre("please provide the path to a file")?;
    let parent_dir = if parent_dir.as_str().is_empty() {
        Utf8PathBuf::from(".")
    } else {
        parent_dir.to_owned()
    };
    ensure!(
        parent_dir.try_exists().unwrap_or(false),
        "parent directory {parent_dir} doesn't exist"
    );

    let mut head = client
        .head_object()
        .bucket(&object.bucket)
        .key(&object.key);
    if let Some(version) = &object.version_id {
        head = head.version_id(version);
    }
    let head_resp = head
        .send()
        .await
        .wrap_err("failed to make aws head_object request")?;

    let bytes_to_download: u64 = head_resp
        .content_length()
        .ok_or_eyre("head_object response missing content length")?
        .try_into()
        .wrap_err("download size is too large to fit into u64")?;

    let step_size: usize = part_size.try_into().expect("part_size fits in usize");
    let ranges = (0..bytes_to_download).step_by(step_size).map(move |start| {
        let end = std::cmp::min(start + part_size - 1, bytes_to_download - 1);
        ContentRange(start..=end)
    });

    let (tmp_file, tmp_file_path) = tokio::task::spawn_blocking(move || {
        let tmp_file = tempfile::NamedTempFile::new_in(parent_dir)
            .wrap_err("failed to create tempfile")?;
        tmp_file.as_file().set_len(bytes_to_download)?;
        Ok::<_, color_eyre::Report>(tmp_file.into_parts())
    })
    .await?
    .wrap_err("failed to create tempfile")?;

    let tmp_file: Arc<std::fs::File> = Arc::new(tmp_file);

    let ranges = Arc::new(Mutex::new(ranges));
    let mut download_tasks = JoinSet::new();
    for _ in 0..CONCURRENCY {
        let ranges = Arc::clone(&ranges);
        let client = client.clone();
        let object = object.clone();
        let tmp_file = Arc::clone(&tmp_file);

        download_tasks.spawn(async move {
            loop {
                let range_option = {
                    let mut ranges_lock = ranges.lock().await;
                    ranges_lock.next()
                };

                let Some(range) = range_option else {
                    break;
                };

                let body =
                    download_part_retry_on_timeout(&range, &client, &object).await?;
                ensure!(
                    body.len() as u64 == *range.0.end() - *range.0.start() + 1,
                    "downloaded bytes did not match range length"
                );

                tokio::task::spawn_blocking({
                    let tmp_file = Arc::clone(&tmp_file);
                    let start = *range.0.start();
                    move || {
                        tmp_file.write_all_at(&body, start)?;
                        Ok::<(), std::io::Error>(())
                    }
                })
                .await??;
            }

            Ok::<(), color_eyre::Report>(())
        });
    }

    while let Some(res) = download_tasks.join_next().await {
        res??;
    }

    let file_size = tokio::task::spawn_blocking({
        let tmp_file = tmp_file.clone();
        move || {
            tmp_file.sync_all()?;
            let metadata = tmp_file.metadata()?;
            Ok::<_, std::io::Error>(metadata.len())
        }
    })
    .await??;
    ensure!(
        bytes_to_download == file_size,
        "didn't write full bytes to file"
    );

    let out_path_clone = out_path.to_owned();
    tokio::task::spawn_blocking(move || {
        tmp_file_path
            .persist(&out_path_clone)
            .wrap_err("failed to persist temporary file")
    })
    .await
    .wrap_err("task panicked")??;

    Ok(())
}

async fn download_part_retry_on_timeout(
    range: &ContentRange,
    client: &Client,
    object: &S3Uri,
) -> Result<bytes::Bytes> {
    for _ in 0..PART_DOWNLOAD_NUM_RETRY {
        match timeout(
            Duration::from_secs(PART_DOWNLOAD_TIMEOUT_SECS),
            download_part(range, client, object),
        )
        .await
        {
            Ok(result) => return result,
            Err(e) => warn!("get part timeout for part {}", e),
        }
    }

    Err(eyre!(
        "exceeded maximum number of retries for {object} at range {range}"
    ))
}

async fn download_part(
    range: &ContentRange,
    client: &Client,
    object: &S3Uri,
) -> Result<bytes::Bytes> {
    ensure!(
        !object.is_dir(),
        "directories are not supported, make sure the s3 uri doesn't end in a slash"
    );
    let mut req = client
        .get_object()
        .bucket(&object.bucket)
        .key(&object.key)
        .range(range.to_string());
    if let Some(version) = &object.version_id {
        req = req.version_id(version);
    }
    let part = req
        .send()
        .await
        .wrap_err("failed to make aws get_object request")?;

    let body = part
        .body
        .collect()
        .await
        .wrap_err("failed to collect body")?;

    Ok(body.into_bytes())
}
