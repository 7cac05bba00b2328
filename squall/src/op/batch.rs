//! Batch (fan-out) operations: one listing-shaped command becomes a stream
//! of sub-jobs scheduled back through the worker pool.

use camino::{Utf8Path, Utf8PathBuf};
use color_eyre::eyre::WrapErr as _;
use futures::TryStreamExt as _;
use glob::Pattern;
use squall_s3_helpers::{list_objects, ListEntry, RemoteObject, S3Uri, StorageClass};
use walkdir::WalkDir;

use aws_sdk_s3::types::{Delete, ObjectIdentifier};

use crate::argument::Argument;
use crate::error::{JobError, JobResult};
use crate::job::{Job, SubJobTemplate};
use crate::keyglob;
use crate::op::{local_arg, remote_arg, Operation};
use crate::options::Options;
use crate::reporter;
use crate::wildcard::wild_operation;
use crate::worker::WorkerParams;

/// The multi-delete API takes at most this many keys per request.
pub const MULTI_DELETE_MAX: usize = 1000;

pub async fn batch_upload(job: &Job, params: &WorkerParams) -> JobResult {
    let src = local_arg(job, 0)?.to_owned();
    remote_arg(job, 1)?;
    let dst_root = job.args[1].clone();

    // Directories given to upload are always walked in full.
    let (source, trim) = classify_local_source(src, true, job.opts.recursive).await?;
    let tpl = SubJobTemplate::from_root(job, sub_command(&job.opts));
    let parents = job.opts.parents;

    let callback = move |item: Option<Utf8PathBuf>| -> Option<Job> {
        let path = item?;
        let name = dest_name_local(&path, &trim, parents);
        let dst = dst_root.append(&name, true);
        Some(tpl.make(Operation::Upload, vec![Argument::Local(path), dst]))
    };

    wild_operation(params, move |tx| run_local_lister(tx, source), callback).await
}

pub async fn batch_local_copy(job: &Job, params: &WorkerParams) -> JobResult {
    let src = local_arg(job, 0)?.to_owned();
    local_arg(job, 1)?;
    let dst_root = job.args[1].clone();

    let (source, trim) = classify_local_source(src, false, job.opts.recursive).await?;
    let tpl = SubJobTemplate::from_root(job, sub_command(&job.opts));
    let parents = job.opts.parents;

    let callback = move |item: Option<Utf8PathBuf>| -> Option<Job> {
        let path = item?;
        let name = dest_name_local(&path, &trim, parents);
        let dst = dst_root.append(&name, false);
        ensure_parent_dir(&dst);
        Some(tpl.make(Operation::LocalCopy, vec![Argument::Local(path), dst]))
    };

    wild_operation(params, move |tx| run_local_lister(tx, source), callback).await
}

pub async fn batch_download(job: &Job, params: &WorkerParams) -> JobResult {
    let src = remote_arg(job, 0)?.clone();
    local_arg(job, 1)?;
    let dst_root = job.args[1].clone();

    let prefix = keyglob::glob_prefix(&src.key).to_owned();
    let pattern = key_pattern(&src.key)?;
    let tpl = SubJobTemplate::from_root(job, sub_command(&job.opts));
    let parents = job.opts.parents;
    let bucket = src.bucket.clone();

    let callback = move |item: Option<RemoteObject>| -> Option<Job> {
        let obj = item?;
        if obj.storage_class == StorageClass::Glacier {
            reporter::item_err(&format!(
                "s3://{bucket}/{}: glacier object, not downloading",
                obj.key
            ));
            return None;
        }
        let name = if parents {
            obj.key.clone()
        } else {
            keyglob::key_basename(&obj.key).to_owned()
        };
        let dst = dst_root.append(&name, false);
        ensure_parent_dir(&dst);
        let src_arg = Argument::remote(S3Uri::new(bucket.clone(), obj.key));
        Some(tpl.make(Operation::Download, vec![src_arg, dst]))
    };

    let client = params.client.clone();
    wild_operation(
        params,
        move |tx| emit_remote(tx, client, src.bucket, prefix, pattern),
        callback,
    )
    .await
}

/// Deletes are not one sub-job per key: keys buffer into batches of
/// [`MULTI_DELETE_MAX`] and each full (or final) batch becomes one
/// `BatchDeleteActual` sub-job.
pub async fn batch_delete(job: &Job, params: &WorkerParams) -> JobResult {
    let src = remote_arg(job, 0)?.clone();
    let prefix = keyglob::glob_prefix(&src.key).to_owned();
    let pattern = key_pattern(&src.key)?;
    let tpl = SubJobTemplate::from_root(job, format!("batch-rm{}", job.opts.suffix()));
    let bucket_arg = Argument::remote(S3Uri::new(src.bucket.clone(), ""));

    let callback = make_delete_batcher(tpl, bucket_arg);
    let client = params.client.clone();
    wild_operation(
        params,
        move |tx| emit_remote(tx, client, src.bucket, prefix, pattern),
        callback,
    )
    .await
}

/// The buffering callback behind [`batch_delete`]. Invoked once per listed
/// object plus once with `None` to flush the final partial batch.
pub fn make_delete_batcher(
    tpl: SubJobTemplate,
    bucket_arg: Argument,
) -> impl FnMut(Option<RemoteObject>) -> Option<Job> + Send + 'static {
    let mut keys: Vec<Argument> = Vec::new();
    move |item| match item {
        Some(obj) => {
            keys.push(Argument::raw(obj.key));
            if keys.len() == MULTI_DELETE_MAX {
                Some(flush_delete_batch(&tpl, &bucket_arg, &mut keys))
            } else {
                None
            }
        }
        None if keys.is_empty() => None,
        None => Some(flush_delete_batch(&tpl, &bucket_arg, &mut keys)),
    }
}

fn flush_delete_batch(
    tpl: &SubJobTemplate,
    bucket_arg: &Argument,
    keys: &mut Vec<Argument>,
) -> Job {
    let mut args = Vec::with_capacity(keys.len() + 1);
    args.push(bucket_arg.clone());
    args.append(keys);
    tpl.make(Operation::BatchDeleteActual, args)
}

/// Issues one multi-delete over the buffered keys, printing a line per key.
/// The operation's own error is the last per-key error, if any.
pub async fn batch_delete_actual(job: &Job, params: &WorkerParams) -> JobResult {
    let bucket = remote_arg(job, 0)?.bucket.clone();
    let mut objects = Vec::with_capacity(job.args.len().saturating_sub(1));
    for arg in &job.args[1..] {
        objects.push(
            ObjectIdentifier::builder()
                .key(arg.text())
                .build()
                .map_err(|e| JobError::Internal(format!("bad delete key: {e}")))?,
        );
    }
    if objects.is_empty() {
        return Ok(());
    }

    let delete = Delete::builder()
        .set_objects(Some(objects))
        .quiet(false)
        .build()
        .map_err(|e| JobError::Internal(format!("bad delete request: {e}")))?;
    let resp = params
        .client
        .delete_objects()
        .bucket(&bucket)
        .delete(delete)
        .send()
        .await
        .wrap_err_with(|| format!("failed to delete objects in s3://{bucket}/"))?;

    for deleted in resp.deleted() {
        if let Some(key) = deleted.key() {
            reporter::item_ok(&format!("rm s3://{bucket}/{key}"));
        }
    }
    let mut last_error = None;
    for err in resp.errors() {
        let message = format!(
            "s3://{bucket}/{}: {}",
            err.key().unwrap_or_default(),
            err.message().unwrap_or("delete failed")
        );
        reporter::item_err(&message);
        last_error = Some(message);
    }
    match last_error {
        Some(message) => Err(JobError::Failed(message)),
        None => Ok(()),
    }
}

fn sub_command(opts: &Options) -> String {
    let base = if opts.delete_source { "mv" } else { "cp" };
    format!("{base}{}", opts.suffix())
}

fn key_pattern(key: &str) -> Result<Option<Pattern>, JobError> {
    if keyglob::has_glob(key) {
        Ok(Some(keyglob::compile(key)?))
    } else {
        Ok(None)
    }
}

/// Remote lister shared by download and delete batches: every object under
/// the fixed prefix whose key matches the glob, then the end-of-stream
/// sentinel. A listing error closes the channel without the sentinel.
async fn emit_remote(
    tx: flume::Sender<Option<RemoteObject>>,
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    pattern: Option<Pattern>,
) -> JobResult {
    let mut entries = list_objects(&client, &bucket, &prefix, None);
    while let Some(entry) = entries.try_next().await? {
        let ListEntry::Object(obj) = entry else {
            continue;
        };
        let matched = pattern
            .as_ref()
            .is_none_or(|p| p.matches_with(&obj.key, keyglob::match_options()));
        if matched && tx.send_async(Some(obj)).await.is_err() {
            return Ok(());
        }
    }
    let _ = tx.send_async(None).await;
    Ok(())
}

/// How a local batch source produces files.
enum LocalSource {
    Dir { root: Utf8PathBuf, recursive: bool },
    Glob { pattern: String, walk_matched_dirs: bool },
    File(Utf8PathBuf),
}

async fn classify_local_source(
    src: Utf8PathBuf,
    always_walk_dirs: bool,
    recursive: bool,
) -> Result<(LocalSource, String), JobError> {
    if keyglob::has_glob(src.as_str()) {
        let trim = normalize_trim(dir_of(keyglob::glob_prefix(src.as_str())));
        return Ok((
            LocalSource::Glob {
                pattern: src.into_string(),
                walk_matched_dirs: recursive,
            },
            trim,
        ));
    }
    let metadata = tokio::fs::metadata(&src)
        .await
        .wrap_err_with(|| format!("failed to stat {src}"))?;
    if metadata.is_dir() {
        let trim = normalize_trim(src.as_str());
        Ok((
            LocalSource::Dir {
                root: src,
                recursive: always_walk_dirs || recursive,
            },
            trim,
        ))
    } else {
        let trim = normalize_trim(dir_of(src.as_str()));
        Ok((LocalSource::File(src), trim))
    }
}

async fn run_local_lister(
    tx: flume::Sender<Option<Utf8PathBuf>>,
    source: LocalSource,
) -> JobResult {
    tokio::task::spawn_blocking(move || {
        let result = emit_local(&tx, &source);
        if result.is_ok() {
            let _ = tx.send(None);
        }
        result
    })
    .await
    .map_err(|e| JobError::Internal(format!("lister task panicked: {e}")))?
}

fn emit_local(tx: &flume::Sender<Option<Utf8PathBuf>>, source: &LocalSource) -> JobResult {
    match source {
        LocalSource::Dir { root, recursive } => walk_files(tx, root, *recursive),
        LocalSource::File(path) => {
            let _ = tx.send(Some(path.clone()));
            Ok(())
        }
        LocalSource::Glob {
            pattern,
            walk_matched_dirs,
        } => {
            let matches = glob::glob_with(pattern, keyglob::match_options())
                .map_err(|e| JobError::Failed(format!("invalid glob `{pattern}`: {e}")))?;
            for entry in matches {
                let path = entry.map_err(|e| JobError::Failed(e.to_string()))?;
                let path = Utf8PathBuf::from_path_buf(path)
                    .map_err(|p| JobError::Failed(format!("non-utf8 path: {}", p.display())))?;
                if path.is_dir() {
                    if *walk_matched_dirs {
                        walk_files(tx, &path, true)?;
                    }
                } else if tx.send(Some(path)).is_err() {
                    return Ok(());
                }
            }
            Ok(())
        }
    }
}

fn walk_files(
    tx: &flume::Sender<Option<Utf8PathBuf>>,
    root: &Utf8Path,
    recursive: bool,
) -> JobResult {
    let max_depth = if recursive { usize::MAX } else { 1 };
    for entry in WalkDir::new(root).max_depth(max_depth) {
        let entry = entry.map_err(|e| JobError::Failed(format!("walk failed: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = Utf8PathBuf::from_path_buf(entry.into_path())
            .map_err(|p| JobError::Failed(format!("non-utf8 path: {}", p.display())))?;
        if tx.send(Some(path)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn dest_name_local(src: &Utf8Path, trim: &str, parents: bool) -> String {
    if parents {
        src.as_str()
            .strip_prefix(trim)
            .unwrap_or(src.as_str())
            .to_owned()
    } else {
        src.file_name().unwrap_or(src.as_str()).to_owned()
    }
}

fn dir_of(path: &str) -> &str {
    match path.rfind(std::path::MAIN_SEPARATOR) {
        Some(idx) => &path[..=idx],
        None => "",
    }
}

fn normalize_trim(dir: &str) -> String {
    let sep = std::path::MAIN_SEPARATOR;
    if dir.is_empty() || dir == "." || dir == format!(".{sep}") {
        return String::new();
    }
    let mut out = dir.to_owned();
    if !out.ends_with(sep) {
        out.push(sep);
    }
    out
}

fn ensure_parent_dir(arg: &Argument) {
    if let Some(path) = arg.as_local() {
        if let Some(parent) = path.parent() {
            if !parent.as_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}
