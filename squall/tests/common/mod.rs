#![allow(dead_code)] // not every test binary uses every helper

use std::sync::Arc;

use squall::stats::Stats;
use squall::worker::{ExitHook, WorkerParams, WorkerPool};
use tokio_util::sync::CancellationToken;

pub const CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// A client that can be constructed without credentials; fine for tests that
/// never touch the network.
pub fn offline_client() -> aws_sdk_s3::Client {
    let config = aws_sdk_s3::Config::builder()
        .behavior_version(aws_sdk_s3::config::BehaviorVersion::latest())
        .build();
    aws_sdk_s3::Client::from_conf(config)
}

pub fn test_pool_with_exit(
    workers: usize,
    exit: ExitHook,
) -> (WorkerPool, Arc<Stats>, CancellationToken) {
    let cancel = CancellationToken::new();
    let stats = Arc::new(Stats::default());
    let pool = WorkerPool::new(
        workers,
        cancel.clone(),
        offline_client(),
        CHUNK_SIZE,
        Arc::clone(&stats),
        exit,
    );
    (pool, stats, cancel)
}

pub fn test_pool(workers: usize) -> (WorkerPool, Arc<Stats>, CancellationToken) {
    test_pool_with_exit(workers, Arc::new(|_code| {}))
}

pub fn params_for(
    pool: &WorkerPool,
    stats: &Arc<Stats>,
    cancel: &CancellationToken,
) -> WorkerParams {
    WorkerParams {
        cancel: cancel.clone(),
        client: offline_client(),
        chunk_size: CHUNK_SIZE,
        stats: Arc::clone(stats),
        sub_jobs: pool.sender(),
        exit: Arc::new(|_code| {}),
    }
}
