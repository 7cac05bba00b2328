//! Direct exercises of the fan-out engine contracts.

mod common;

use std::sync::Arc;

use camino::Utf8PathBuf;
use squall::argument::Argument;
use squall::error::JobError;
use squall::job::{Job, SubJobTemplate};
use squall::op::Operation;
use squall::options::Options;
use squall::wildcard::wild_operation;

fn root_job() -> Job {
    Job::root(
        "rm batch",
        "rm",
        Operation::BatchDelete,
        vec![],
        Options::default(),
    )
}

#[tokio::test]
async fn empty_listing_is_a_clean_success() {
    let (pool, stats, cancel) = common::test_pool(2);
    let params = common::params_for(&pool, &stats, &cancel);

    let root = root_job();
    let counters = Arc::clone(&root.counters);
    let template = SubJobTemplate::from_root(&root, "rm");

    let lister = |tx: flume::Sender<Option<Utf8PathBuf>>| async move {
        let _ = tx.send_async(None).await;
        Ok(())
    };
    let callback = move |item: Option<Utf8PathBuf>| {
        item.map(|p| template.make(Operation::LocalDelete, vec![Argument::Local(p)]))
    };

    let result = wild_operation(&params, lister, callback).await;
    assert!(result.is_ok());
    let snapshot = counters.snapshot();
    assert_eq!(
        (snapshot.success, snapshot.acceptable_fails, snapshot.fails),
        (0, 0, 0)
    );
    pool.shutdown().await;
}

#[tokio::test]
async fn lister_error_still_drains_submitted_sub_jobs() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
    let first = base.join("first");
    let second = base.join("second");
    std::fs::write(&first, b"x").unwrap();
    std::fs::write(&second, b"y").unwrap();

    let (pool, stats, cancel) = common::test_pool(2);
    let params = common::params_for(&pool, &stats, &cancel);

    let root = root_job();
    let counters = Arc::clone(&root.counters);
    let template = SubJobTemplate::from_root(&root, "rm");

    let emitted = vec![first.clone(), second.clone()];
    let lister = move |tx: flume::Sender<Option<Utf8PathBuf>>| async move {
        for path in emitted {
            tx.send_async(Some(path)).await.unwrap();
        }
        // bail out without the end-of-stream sentinel
        Err(JobError::Failed("listing broke".into()))
    };
    let callback = move |item: Option<Utf8PathBuf>| {
        item.map(|p| template.make(Operation::LocalDelete, vec![Argument::Local(p)]))
    };

    let result = wild_operation(&params, lister, callback).await;
    match result {
        Err(JobError::Failed(msg)) => assert_eq!(msg, "listing broke"),
        other => panic!("expected the lister error, got {other:?}"),
    }

    // the two already-issued deletes ran to completion and were counted
    assert!(!first.exists());
    assert!(!second.exists());
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.success, 2);
    assert_eq!(snapshot.success + snapshot.acceptable_fails + snapshot.fails, 2);
    pool.shutdown().await;
}

#[tokio::test]
async fn failed_sub_jobs_produce_an_aggregate_error() {
    let dir = tempfile::tempdir().unwrap();
    let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

    let (pool, stats, cancel) = common::test_pool(2);
    let params = common::params_for(&pool, &stats, &cancel);

    let root = root_job();
    let counters = Arc::clone(&root.counters);
    let template = SubJobTemplate::from_root(&root, "rm");

    let missing = vec![base.join("not-there-1"), base.join("not-there-2")];
    let present = base.join("present");
    std::fs::write(&present, b"z").unwrap();
    let mut items: Vec<Utf8PathBuf> = missing.clone();
    items.push(present.clone());

    let lister = move |tx: flume::Sender<Option<Utf8PathBuf>>| async move {
        for path in items {
            tx.send_async(Some(path)).await.unwrap();
        }
        let _ = tx.send_async(None).await;
        Ok(())
    };
    let callback = move |item: Option<Utf8PathBuf>| {
        item.map(|p| template.make(Operation::LocalDelete, vec![Argument::Local(p)]))
    };

    let result = wild_operation(&params, lister, callback).await;
    match result {
        Err(JobError::Incomplete { successful, issued }) => {
            assert_eq!(successful, 1);
            assert_eq!(issued, 3);
        }
        other => panic!("expected an aggregate error, got {other:?}"),
    }
    let snapshot = counters.snapshot();
    assert_eq!(snapshot.success, 1);
    assert_eq!(snapshot.fails, 2);
    assert_eq!(snapshot.success + snapshot.acceptable_fails + snapshot.fails, 3);
    pool.shutdown().await;
}

#[tokio::test]
async fn callback_sees_the_end_of_stream_sentinel() {
    let (pool, stats, cancel) = common::test_pool(2);
    let params = common::params_for(&pool, &stats, &cancel);

    let root = root_job();
    let template = SubJobTemplate::from_root(&root, "exec");

    // Buffers everything and only emits a job on the sentinel, like the
    // delete batcher does.
    let mut buffered = 0usize;
    let callback = move |item: Option<u32>| -> Option<Job> {
        match item {
            Some(_) => {
                buffered += 1;
                None
            }
            None => {
                assert_eq!(buffered, 3);
                Some(template.make(
                    Operation::ShellExec,
                    vec![Argument::raw("true")],
                ))
            }
        }
    };
    let lister = |tx: flume::Sender<Option<u32>>| async move {
        for n in 0..3u32 {
            tx.send_async(Some(n)).await.unwrap();
        }
        let _ = tx.send_async(None).await;
        Ok(())
    };

    let result = wild_operation(&params, lister, callback).await;
    assert!(result.is_ok());
    assert_eq!(stats.shell_ops(), 1);
    pool.shutdown().await;
}
