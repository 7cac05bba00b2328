//! Per-job outcome formatting.
//!
//! Sub-job and per-item lines go to plain stdout, indented under the root
//! command; root summaries go through the logger.

use tracing::{error, info};

use crate::error::JobResult;
use crate::job::Job;

const INDENT: &str = "                    "; // 20 spaces

/// One line per finished job. Internal operations stay silent.
pub fn report(job: &Job, result: &JobResult) {
    if job.operation.is_internal() {
        return;
    }
    if job.is_sub_job {
        report_sub(job, result);
    } else {
        report_root(job, result);
    }
}

fn report_sub(job: &Job, result: &JobResult) {
    match result {
        Ok(()) => println!("{INDENT}+OK \"{job}\""),
        Err(e) if e.is_acceptable() => {
            println!("{INDENT}+OK? \"{job}\" ({})", cleanup_error(&e.to_string()))
        }
        Err(e) => println!("{INDENT}-ERR \"{job}\": {}", cleanup_error(&e.to_string())),
    }
}

fn report_root(job: &Job, result: &JobResult) {
    let counters = job.counters.snapshot();
    let suffix = counter_suffix(counters.success, counters.fails);
    match result {
        Err(e) if !e.is_acceptable() => {
            error!(
                "-ERR \"{job}\"{suffix}: {}",
                cleanup_error(&e.to_string())
            );
        }
        _ => {
            let status = if counters.acceptable_fails > 0 || result.is_err() {
                "OK?"
            } else {
                "OK"
            };
            let reason = match result {
                Err(e) => format!(" ({})", cleanup_error(&e.to_string())),
                Ok(()) => String::new(),
            };
            info!("+{status} \"{job}\"{reason}{suffix}");
        }
    }
}

fn counter_suffix(success: u64, fails: u64) -> String {
    match (success, fails) {
        (0, 0) => String::new(),
        (s, 0) => format!(" ({s})"),
        (0, f) => format!(" ({f} failed)"),
        (s, f) => format!(" ({s}, {f} failed)"),
    }
}

/// Per-item success line, e.g. one per deleted key.
pub fn item_ok(msg: &str) {
    println!("{INDENT}+OK \"{msg}\"");
}

/// Per-item error line for items that never became sub-jobs.
pub fn item_err(msg: &str) {
    println!("{INDENT}-ERR \"{msg}\"");
}

/// Strips transport-layer noise the sdk prepends to service errors.
pub fn cleanup_error(message: &str) -> String {
    let mut cleaned = message.replace('\n', " ");
    for noise in [
        "service error: ",
        "unhandled error: ",
        "dispatch failure: ",
        "Error { ",
    ] {
        cleaned = cleaned.replace(noise, "");
    }
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
