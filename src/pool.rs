//! Bounded pool of job processes.
//!
//! Each job file gets its own child process, so stores never share memory. A
//! semaphore of `max_proc` permits caps the number of live children: launching the
//! next job waits on a permit, which is released when a child exits.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Builds the command that processes one job file
pub trait JobLauncher: Send + Sync {
    fn command(&self, job: &Path) -> Command;
}

/// Re-executes the current binary with the hidden `job` subcommand.
#[derive(Debug, Clone)]
pub struct SelfExecLauncher {
    exe: PathBuf,
    threads: usize,
    delay_ms: u64,
}

impl SelfExecLauncher {
    pub fn new(exe: PathBuf, threads: usize, delay_ms: u64) -> Self {
        Self {
            exe,
            threads,
            delay_ms,
        }
    }

    pub fn current(threads: usize, delay_ms: u64) -> Result<Self> {
        let exe = std::env::current_exe().context("failed to locate current executable")?;
        Ok(Self::new(exe, threads, delay_ms))
    }
}

impl JobLauncher for SelfExecLauncher {
    fn command(&self, job: &Path) -> Command {
        let mut command = Command::new(&self.exe);
        command
            .arg("job")
            .arg("--file")
            .arg(job)
            .arg("--threads")
            .arg(self.threads.to_string())
            .arg("--delay-ms")
            .arg(self.delay_ms.to_string());
        command
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolReport {
    pub launched: usize,
    pub succeeded: usize,
    /// Failed spawns, non-zero exits and lost waits
    pub failed: usize,
    /// Highest number of children alive at the same time
    pub peak_live: usize,
}

pub struct ProcessPool {
    max_proc: usize,
}

impl ProcessPool {
    pub fn new(max_proc: usize) -> Self {
        Self {
            max_proc: max_proc.max(1),
        }
    }

    /// Launch one child per job and wait for all of them.
    ///
    /// A job that fails to spawn or exits unsuccessfully is counted and logged; the
    /// remaining jobs still run.
    pub async fn run<L: JobLauncher>(&self, jobs: &[PathBuf], launcher: &L) -> PoolReport {
        let started = Instant::now();
        let permits = Arc::new(Semaphore::new(self.max_proc));
        let live = Arc::new(AtomicUsize::new(0));
        let mut report = PoolReport::default();
        let mut children: JoinSet<(PathBuf, std::io::Result<ExitStatus>)> = JoinSet::new();

        for job in jobs {
            // Blocks here while `max_proc` children are alive.
            let permit = match permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!(error = %err, "process pool semaphore closed");
                    break;
                }
            };

            let mut child = match launcher.command(job).kill_on_drop(false).spawn() {
                Ok(child) => child,
                Err(err) => {
                    report.failed += 1;
                    error!(job = %job.display(), error = %err, "failed to spawn job process");
                    continue;
                }
            };

            report.launched += 1;
            let now_live = live.fetch_add(1, Ordering::SeqCst) + 1;
            report.peak_live = report.peak_live.max(now_live);
            debug!(job = %job.display(), pid = child.id(), live = now_live, "job process started");

            let live = live.clone();
            let job = job.clone();
            children.spawn(async move {
                let status = child.wait().await;
                live.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                (job, status)
            });
        }

        while let Some(joined) = children.join_next().await {
            match joined {
                Ok((job, Ok(status))) if status.success() => {
                    report.succeeded += 1;
                    debug!(job = %job.display(), "job process exited");
                }
                Ok((job, Ok(status))) => {
                    report.failed += 1;
                    warn!(job = %job.display(), code = ?status.code(), "job process failed");
                }
                Ok((job, Err(err))) => {
                    report.failed += 1;
                    error!(job = %job.display(), error = %err, "failed to wait for job process");
                }
                Err(err) => {
                    report.failed += 1;
                    error!(error = %err, "job wait task failed");
                }
            }
        }

        info!(
            launched = report.launched,
            succeeded = report.succeeded,
            failed = report.failed,
            peak_live = report.peak_live,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "all job processes finished"
        );
        report
    }
}
