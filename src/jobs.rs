//! Job file discovery and single-job execution.

use crate::dispatch::{RunSummary, process_stream};
use crate::logging::job_span;
use crate::output::OutputSink;
use crate::parser::JobParser;
use crate::store::EventStore;
use anyhow::{Context, Result};
use globset::Glob;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use walkdir::WalkDir;

pub const OUTPUT_EXTENSION: &str = "out";

/// Job files directly inside `dir` whose file name matches `pattern`, sorted by path.
pub fn discover_jobs(dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let matcher = Glob::new(pattern)
        .with_context(|| format!("invalid job pattern {:?}", pattern))?
        .compile_matcher();

    let mut jobs = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.with_context(|| format!("failed to scan {:?}", dir))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            jobs.push(entry.into_path());
        }
    }
    jobs.sort();

    debug!(dir = %dir.display(), count = jobs.len(), "discovered job files");
    Ok(jobs)
}

/// `jobs/a.jobs` -> `jobs/a.out`
pub fn output_path_for(job: &Path) -> PathBuf {
    job.with_extension(OUTPUT_EXTENSION)
}

/// Process one job file with its own store, sink and thread team.
pub fn run_job(job: &Path, threads: usize, access_delay: Duration) -> Result<RunSummary> {
    let span = job_span(job);
    let _enter = span.enter();
    let started = Instant::now();

    let input = File::open(job).with_context(|| format!("failed to open job file {:?}", job))?;
    let output_path = output_path_for(job);
    let sink = OutputSink::create_file(&output_path)
        .with_context(|| format!("failed to create output file {:?}", output_path))?;

    let store = EventStore::new(access_delay);
    let mut parser = JobParser::new(BufReader::new(input));
    let summary = process_stream(&store, &sink, threads, &mut parser)
        .with_context(|| format!("job {:?} aborted", job))?;
    store.terminate()?;

    info!(
        threads,
        lines = parser.line_number(),
        generations = summary.generations,
        failures = summary.failures,
        elapsed_ms = started.elapsed().as_millis() as u64,
        output = %output_path.display(),
        "job finished"
    );
    Ok(summary)
}
