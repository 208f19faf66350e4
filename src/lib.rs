pub mod config;
pub mod dispatch;
pub mod error;
pub mod jobs;
pub mod logging;
pub mod output;
pub mod parser;
pub mod pool;
pub mod store;

pub use config::{Cli, CliCommand, EmsConfig, JobArgs, RunArgs};
pub use dispatch::{RunSummary, ThreadTeam, WorkerOutcome};
pub use error::{EmsError, EmsResult, ErrorCode};
pub use logging::{LoggingConfig, init_logging};
pub use output::OutputSink;
pub use parser::{Command, CommandSource, JobParser};
pub use pool::{JobLauncher, PoolReport, ProcessPool, SelfExecLauncher};
pub use store::{Coord, EventId, EventStore, ReservationId};

use anyhow::{Context, Result};

/// Discover job files and process them with a bounded pool of child processes.
pub fn run_pool(config: &EmsConfig) -> Result<PoolReport> {
    config.validate()?;

    let jobs = jobs::discover_jobs(&config.jobs_dir, &config.job_pattern)?;
    if jobs.is_empty() {
        tracing::info!(dir = %config.jobs_dir.display(), "no job files found");
        return Ok(PoolReport::default());
    }

    tracing::info!(
        dir = %config.jobs_dir.display(),
        jobs = jobs.len(),
        max_proc = config.max_proc,
        max_threads = config.max_threads,
        delay_ms = config.delay_ms,
        "starting job pool"
    );

    let launcher = SelfExecLauncher::current(config.max_threads, config.delay_ms)?;
    let pool = ProcessPool::new(config.max_proc);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build process pool runtime")?;

    Ok(runtime.block_on(pool.run(&jobs, &launcher)))
}

/// Entry point of a child process: run one job file to completion.
pub fn run_job(args: &JobArgs) -> Result<RunSummary> {
    jobs::run_job(&args.file, args.threads, args.access_delay())
}
