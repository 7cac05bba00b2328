#![forbid(unsafe_code)]

use std::io::Read as _;
use std::sync::Arc;

use clap::Parser;
use color_eyre::{
    eyre::{bail, WrapErr},
    Result,
};
use squall::args::Args;
use squall::command;
use squall::stats::Stats;
use squall::worker::{ExitHook, WorkerPool};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

const MIB: u64 = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    run(args).await
}

async fn run(args: Args) -> Result<()> {
    let commands = gather_commands(&args)?;
    if commands.is_empty() {
        bail!("no command given; pass one on the command line or use -f");
    }

    let client = squall_s3_helpers::client(args.endpoint_url.as_deref()).await?;

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, cancelling running jobs");
                cancel.cancel();
            }
        }
    });

    let stats = Arc::new(Stats::default());
    let chunk_size = args.chunk_size_mb.max(5) * MIB;
    let exit: ExitHook = Arc::new(|code| std::process::exit(code));
    let pool = WorkerPool::new(
        args.workers,
        cancel.clone(),
        client,
        chunk_size,
        Arc::clone(&stats),
        exit,
    );

    let mut parse_failures: u64 = 0;
    for line in &commands {
        match command::parse_line(line) {
            Ok(None) => {}
            Ok(Some(job)) => {
                if let Err(e) = pool.sender().submit(job).await {
                    bail!("failed to submit job: {e}");
                }
            }
            Err(e) => {
                error!("failed to parse {line:?}: {e:#}");
                parse_failures += 1;
            }
        }
    }

    pool.wait_idle().await;
    pool.shutdown().await;

    if args.stats {
        info!(
            file_ops = stats.file_ops(),
            s3_ops = stats.s3_ops(),
            shell_ops = stats.shell_ops(),
            failed_jobs = stats.job_failures(),
            "all jobs finished"
        );
    } else {
        debug!(
            file_ops = stats.file_ops(),
            s3_ops = stats.s3_ops(),
            shell_ops = stats.shell_ops(),
            failed_jobs = stats.job_failures(),
            "all jobs finished"
        );
    }

    if parse_failures > 0 || stats.job_failures() > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn gather_commands(args: &Args) -> Result<Vec<String>> {
    if let Some(path) = &args.command_file {
        let text = if path == "-" {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .wrap_err("failed to read commands from stdin")?;
            buf
        } else {
            std::fs::read_to_string(path)
                .wrap_err_with(|| format!("failed to read command file {path}"))?
        };
        Ok(text.lines().map(str::to_owned).collect())
    } else if !args.command.is_empty() {
        Ok(vec![shell_words::join(&args.command)])
    } else {
        Ok(Vec::new())
    }
}
