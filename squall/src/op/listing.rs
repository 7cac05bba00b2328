//! Listing and introspection operations.
//!
//! `list` and `size` are listing-shaped and run through the fan-out engine
//! like the batch operations do, with callbacks that print or accumulate
//! instead of producing sub-jobs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use aws_smithy_types::DateTime;
use color_eyre::eyre::WrapErr as _;
use futures::TryStreamExt as _;
use glob::Pattern;
use squall_s3_helpers::{list_objects, ListEntry};

use crate::error::JobResult;
use crate::job::Job;
use crate::keyglob;
use crate::op::remote_arg;
use crate::wildcard::wild_operation;
use crate::worker::WorkerParams;

pub async fn list_buckets(_job: &Job, params: &WorkerParams) -> JobResult {
    let resp = params
        .client
        .list_buckets()
        .send()
        .await
        .wrap_err("failed to list buckets")?;
    for bucket in resp.buckets() {
        println!(
            "{}  {}",
            format_time(bucket.creation_date()),
            bucket.name().unwrap_or_default()
        );
    }
    Ok(())
}

/// One fixed-width line per entry: date, class code, size, key. Common
/// prefixes render as `DIR` rows with the other columns blank.
pub async fn list(job: &Job, params: &WorkerParams) -> JobResult {
    let uri = remote_arg(job, 0)?.clone();
    let prefix = keyglob::glob_prefix(&uri.key).to_owned();
    let pattern = key_pattern(&uri.key)?;

    let callback = move |item: Option<ListEntry>| -> Option<Job> {
        match item? {
            ListEntry::Prefix(dir) => {
                if matches_entry(&pattern, dir.trim_end_matches('/')) {
                    println!("{:>19} {} {:>12}  {}", "", ' ', "DIR", dir);
                }
            }
            ListEntry::Object(obj) => {
                if matches_entry(&pattern, &obj.key) {
                    println!(
                        "{:>19} {} {:>12}  {}",
                        format_time(obj.last_modified.as_ref()),
                        obj.storage_class.code(),
                        obj.size,
                        obj.key
                    );
                }
            }
        }
        None
    };

    let client = params.client.clone();
    wild_operation(
        params,
        move |tx| emit_entries(tx, client, uri.bucket, prefix, Some("/")),
        callback,
    )
    .await
}

/// Sums object sizes across the whole (non-delimited) listing.
pub async fn size(job: &Job, params: &WorkerParams) -> JobResult {
    let uri = remote_arg(job, 0)?.clone();
    let prefix = keyglob::glob_prefix(&uri.key).to_owned();
    let pattern = key_pattern(&uri.key)?;

    let total_bytes = Arc::new(AtomicU64::new(0));
    let total_objects = Arc::new(AtomicU64::new(0));
    let callback = {
        let total_bytes = Arc::clone(&total_bytes);
        let total_objects = Arc::clone(&total_objects);
        move |item: Option<ListEntry>| -> Option<Job> {
            if let ListEntry::Object(obj) = item? {
                if matches_entry(&pattern, &obj.key) {
                    total_bytes.fetch_add(obj.size, Ordering::Relaxed);
                    total_objects.fetch_add(1, Ordering::Relaxed);
                }
            }
            None
        }
    };

    let client = params.client.clone();
    wild_operation(
        params,
        move |tx| emit_entries(tx, client, uri.bucket, prefix, None),
        callback,
    )
    .await?;

    println!(
        "{} bytes in {} objects: {}",
        total_bytes.load(Ordering::Relaxed),
        total_objects.load(Ordering::Relaxed),
        job.args[0].text()
    );
    Ok(())
}

/// Terminates the process through the exit hook. Internal; never reported.
pub fn abort(job: &Job, params: &WorkerParams) -> JobResult {
    let code = match job.args.first() {
        None => -1,
        Some(arg) => arg.text().parse::<i32>().unwrap_or(255),
    };
    (params.exit)(code);
    Ok(())
}

async fn emit_entries(
    tx: flume::Sender<Option<ListEntry>>,
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    delimiter: Option<&str>,
) -> JobResult {
    let mut entries = list_objects(&client, &bucket, &prefix, delimiter);
    while let Some(entry) = entries.try_next().await? {
        if tx.send_async(Some(entry)).await.is_err() {
            return Ok(());
        }
    }
    let _ = tx.send_async(None).await;
    Ok(())
}

fn key_pattern(key: &str) -> Result<Option<Pattern>, crate::error::JobError> {
    if keyglob::has_glob(key) {
        Ok(Some(keyglob::compile(key)?))
    } else {
        Ok(None)
    }
}

fn matches_entry(pattern: &Option<Pattern>, candidate: &str) -> bool {
    pattern
        .as_ref()
        .is_none_or(|p| p.matches_with(candidate, keyglob::match_options()))
}

fn format_time(time: Option<&DateTime>) -> String {
    time.and_then(|t| chrono::DateTime::<chrono::Utc>::from_timestamp(t.secs(), 0))
        .map(|dt| dt.format("%Y/%m/%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_renders_in_fixed_format() {
        let t = DateTime::from_secs(1_700_000_000);
        assert_eq!(format_time(Some(&t)), "2023/11/14 22:13:20");
        assert_eq!(format_time(None), "");
    }

    #[test]
    fn entry_matching_honors_globs() {
        let pattern = key_pattern("logs/2024-*.gz").unwrap();
        assert!(matches_entry(&pattern, "logs/2024-01.gz"));
        assert!(!matches_entry(&pattern, "logs/2023-01.gz"));
        assert!(!matches_entry(&pattern, "logs/2024-01/part.gz"));
        assert!(matches_entry(&None, "anything/at/all"));
    }
}
