#![allow(clippy::uninlined_format_args)]
use std::num::NonZeroU16;
use std::{collections::BTreeMap, os::unix::fs::FileExt, sync::Arc, time::Duration};

use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use bytes::Bytes;
use camino::Utf8Path;
use color_eyre::{
    eyre::{bail, ensure, eyre, WrapErr as _},
    Result,
};
use tokio::io::AsyncReadExt;
use tokio::{sync::Mutex, task::JoinSet, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::{S3Uri, StorageClass};

/// The multipart API refuses uploads with more parts than this.
pub const MAX_UPLOAD_PARTS: u64 = 10_000;

const CONCURRENCY: usize = 16;
const PART_UPLOAD_TIMEOUT_SECS: u64 = 120;
const PART_UPLOAD_NUM_RETRY: u8 = 5;
const MIB: u64 = 1024 * 1024;

/// Picks the part size for a file of `file_size` bytes.
///
/// Starts from the configured size; when that would exceed
/// [`MAX_UPLOAD_PARTS`], recomputes the minimum viable size rounded up to a
/// whole mebibyte.
pub fn pick_part_size(file_size: u64, configured: u64) -> u64 {
    let configured = configured.max(1);
    if file_size.div_ceil(configured) <= MAX_UPLOAD_PARTS {
        return configured;
    }
    file_size.div_ceil(MAX_UPLOAD_PARTS).div_ceil(MIB) * MIB
}

#[derive(Debug, Clone, Copy)]
struct PartRange {
    start: u64,
    len: u64,
    part_number: NonZeroU16,
}

/// Uploads `in_path` to `object` with the given storage class.
///
/// Files up to one part go through a single PutObject; larger files use a
/// multipart upload driven by [`CONCURRENCY`] concurrent part tasks.
/// Cancellation (or any part failure) aborts the multipart upload; no partial
/// object is left behind, though already-uploaded parts are discarded.
pub async fn upload_file(
    client: &Client,
    object: &S3Uri,
    in_path: &Utf8Path,
    part_size: u64,
    storage_class: StorageClass,
    cancel: &CancellationToken,
) -> Result<()> {
    ensure!(
        !object.is_dir(),
        "directories are not supported, make sure the s3 uri doesn't end in a slash"
    );
    ensure!(part_size > 0, "part size must be positive");

    let mut in_file = tokio::fs::File::open(in_path)
        .await
        .wrap_err_with(|| format!("failed to open {in_path}"))?;
    let metadata = in_file
        .metadata()
        .await
        .wrap_err_with(|| format!("failed to stat {in_path}"))?;
    ensure!(metadata.is_file(), "input path must be a file");
    let total_bytes = metadata.len();

    // For small files, use a single PutObject.
    if total_bytes <= part_size {
        let mut bytes = Vec::new();
        in_file
            .read_to_end(&mut bytes)
            .await
            .wrap_err("failed to read input file")?;

        let put = client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .storage_class(storage_class.to_aws())
            .body(Bytes::from(bytes).into())
            .send();
        tokio::select! {
            res = put => {
                res.wrap_err("failed to upload object")?;
            }
            _ = cancel.cancelled() => bail!("upload interrupted"),
        }
        return Ok(());
    }

    let upload_id = client
        .create_multipart_upload()
        .bucket(&object.bucket)
        .key(&object.key)
        .storage_class(storage_class.to_aws())
        .send()
        .await
        .wrap_err("failed to create multipart upload")?
        .upload_id()
        .ok_or_else(|| eyre!("upload id missing"))?
        .to_string();

    let file = Arc::new(in_file.try_into_std().expect("infallible"));

    let outcome = tokio::select! {
        res = upload_parts(client, object, &upload_id, file, total_bytes, part_size) => res,
        _ = cancel.cancelled() => Err(eyre!("upload interrupted")),
    };

    let completed_parts = match outcome {
        Ok(parts) => parts,
        Err(e) => {
            // Release the parts uploaded so far.
            let _ = client
                .abort_multipart_upload()
                .bucket(&object.bucket)
                .key(&object.key)
                .upload_id(&upload_id)
                .send()
                .await;
            return Err(e);
        }
    };

    client
        .complete_multipart_upload()
        .bucket(&object.bucket)
        .key(&object.key)
        .upload_id(upload_id)
        .multipart_upload(
            CompletedMultipartUpload::builder()
                .set_parts(Some(completed_parts))
                .build(),
        )
        .send()
        .await
        .wrap_err("failed to complete multipart upload")?;

    Ok(())
}

async fn upload_parts(
    client: &Client,
    object: &S3Uri,
    upload_id: &str,
    file: Arc<std::fs::File>,
    total_bytes: u64,
    part_size: u64,
) -> Result<Vec<CompletedPart>> {
    let ranges_iter = {
        let mut part_number: u16 = 1;
        let step: usize = part_size.try_into().expect("part_size fits in usize");
        (0..total_bytes).step_by(step).map(move |start| {
            let len = std::cmp::min(part_size, total_bytes - start);
            let range = PartRange {
                start,
                len,
                part_number: part_number.try_into().expect("nonzero"),
            };
            part_number += 1;
            range
        })
    };

    let ranges = Arc::new(Mutex::new(ranges_iter));
    let mut tasks = JoinSet::new();

    for _ in 0..CONCURRENCY {
        let client = client.clone();
        let object = object.clone();
        let upload_id = upload_id.to_owned();
        let file = Arc::clone(&file);
        let ranges = Arc::clone(&ranges);

        tasks.spawn(async move {
            let mut uploaded = Vec::new();
            loop {
                let range_opt = {
                    let mut lock = ranges.lock().await;
                    lock.next()
                };
                let Some(range) = range_opt else { break };

                let (range, buf) = tokio::task::spawn_blocking({
                    let file = Arc::clone(&file);
                    move || {
                        let mut buf = vec![0u8; range.len as usize];
                        file.read_exact_at(&mut buf, range.start)?;
                        Ok::<_, std::io::Error>((range, buf))
                    }
                })
                .await??;

                let etag = upload_part_retry_on_timeout(
                    &client,
                    &object,
                    &upload_id,
                    range.part_number,
                    Bytes::from(buf),
                )
                .await?;
                uploaded.push((range.part_number, etag));
            }

            Ok::<_, color_eyre::Report>(uploaded)
        });
    }

    let mut parts: BTreeMap<NonZeroU16, String> = BTreeMap::new();
    while let Some(res) = tasks.join_next().await {
        for (part_number, etag) in res.wrap_err("upload task panicked")?? {
            parts.insert(part_number, etag);
        }
    }

    // Build parts in order
    Ok(parts
        .into_iter()
        .map(|(part_number, e_tag)| {
            CompletedPart::builder()
                .e_tag(e_tag)
                .part_number(part_number.get().into())
                .build()
        })
        .collect())
}

async fn upload_part_retry_on_timeout(
    client: &Client,
    object: &S3Uri,
    upload_id: &str,
    part_number: NonZeroU16,
    body: Bytes,
) -> Result<String> {
    for _ in 0..PART_UPLOAD_NUM_RETRY {
        match timeout(
            Duration::from_secs(PART_UPLOAD_TIMEOUT_SECS),
            upload_part(client, object, upload_id, part_number, body.clone()),
        )
        .await
        {
            Ok(result) => return result,
            Err(e) => warn!("put part timeout for part {}: {}", part_number, e),
        }
    }

    Err(eyre!(
        "exceeded maximum number of retries for {object} part {part_number}"
    ))
}

async fn upload_part(
    client: &Client,
    object: &S3Uri,
    upload_id: &str,
    part_number: NonZeroU16,
    body: Bytes,
) -> Result<String> {
    let resp = client
        .upload_part()
        .bucket(&object.bucket)
        .key(&object.key)
        .upload_id(upload_id)
        .part_number(u16::from(part_number).into())
        .body(body.into())
        .send()
        .await
        .wrap_err("failed to upload part")?;

    let etag = resp
        .e_tag()
        .ok_or_else(|| eyre!("etag missing in upload_part response"))?
        .to_string();
    Ok(etag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const DEFAULT: u64 = 5 * MIB;

    #[test]
    fn small_file_keeps_configured_size() {
        assert_eq!(pick_part_size(0, DEFAULT), DEFAULT);
        assert_eq!(pick_part_size(DEFAULT, DEFAULT), DEFAULT);
        assert_eq!(pick_part_size(MAX_UPLOAD_PARTS * DEFAULT, DEFAULT), DEFAULT);
    }

    #[test]
    fn oversized_file_grows_part_size() {
        let file_size = MAX_UPLOAD_PARTS * DEFAULT + 1;
        let picked = pick_part_size(file_size, DEFAULT);
        assert!(picked > DEFAULT);
        assert_eq!(picked % MIB, 0);
        assert!(file_size.div_ceil(picked) <= MAX_UPLOAD_PARTS);
    }

    proptest! {
        #[test]
        fn part_count_always_within_bound(
            file_size in 0u64..(1 << 45),
            configured_mib in 1u64..128,
        ) {
            let configured = configured_mib * MIB;
            let picked = pick_part_size(file_size, configured);
            prop_assert!(file_size.div_ceil(picked) <= MAX_UPLOAD_PARTS);
            // Never shrinks below the configured size when that already fits.
            if file_size.div_ceil(configured) <= MAX_UPLOAD_PARTS {
                prop_assert_eq!(picked, configured);
            }
        }
    }
}
