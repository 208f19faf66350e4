use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use globset::Glob;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_JOBS_DIR: &str = "jobs";
const DEFAULT_JOB_PATTERN: &str = "*.jobs";
const DEFAULT_MAX_PROC: usize = 1;
const DEFAULT_MAX_THREADS: usize = 1;
/// Simulated cost of every store access, in milliseconds
pub const DEFAULT_ACCESS_DELAY_MS: u64 = 10;

#[derive(Parser, Debug, Clone)]
#[command(name = "ems", about = "Concurrent event and seat reservation store", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CliCommand {
    /// Process every job file in a directory with a pool of child processes
    Run(RunArgs),
    /// Process a single job file in this process
    #[command(hide = true)]
    Job(JobArgs),
}

#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    #[arg(
        value_name = "JOBS_DIR",
        env = "EMS_JOBS_DIR",
        help = "Directory containing job files"
    )]
    pub jobs_dir: Option<PathBuf>,

    #[arg(
        long,
        value_name = "FILE",
        help = "Path to a configuration file (YAML or JSON)"
    )]
    pub config: Option<PathBuf>,

    #[arg(
        long,
        env = "EMS_MAX_PROC",
        value_name = "N",
        help = "Maximum number of job processes alive at once",
        value_parser = clap::value_parser!(usize)
    )]
    pub max_proc: Option<usize>,

    #[arg(
        long,
        env = "EMS_MAX_THREADS",
        value_name = "N",
        help = "Worker threads per job process",
        value_parser = clap::value_parser!(usize)
    )]
    pub max_threads: Option<usize>,

    #[arg(
        long,
        env = "EMS_DELAY_MS",
        value_name = "MS",
        help = "Artificial delay before every store access"
    )]
    pub delay_ms: Option<u64>,

    #[arg(
        long,
        env = "EMS_JOB_PATTERN",
        value_name = "GLOB",
        help = "File name pattern selecting job files"
    )]
    pub pattern: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct JobArgs {
    #[arg(long, value_name = "FILE")]
    pub file: PathBuf,

    #[arg(long, default_value_t = DEFAULT_MAX_THREADS)]
    pub threads: usize,

    #[arg(long, default_value_t = DEFAULT_ACCESS_DELAY_MS)]
    pub delay_ms: u64,
}

impl JobArgs {
    pub fn access_delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone)]
pub struct EmsConfig {
    pub jobs_dir: PathBuf,
    pub max_proc: usize,
    pub max_threads: usize,
    pub delay_ms: u64,
    pub job_pattern: String,
}

impl Default for EmsConfig {
    fn default() -> Self {
        Self {
            jobs_dir: PathBuf::from(DEFAULT_JOBS_DIR),
            max_proc: DEFAULT_MAX_PROC,
            max_threads: DEFAULT_MAX_THREADS,
            delay_ms: DEFAULT_ACCESS_DELAY_MS,
            job_pattern: DEFAULT_JOB_PATTERN.to_string(),
        }
    }
}

impl EmsConfig {
    pub fn from_args(args: RunArgs) -> Result<Self> {
        let RunArgs {
            jobs_dir: cli_jobs_dir,
            config,
            max_proc: cli_max_proc,
            max_threads: cli_max_threads,
            delay_ms: cli_delay_ms,
            pattern: cli_pattern,
        } = args;

        let file_config = if let Some(path) = config.as_ref() {
            load_config_file(path)?
        } else {
            PartialConfig::default()
        };

        let PartialConfig {
            jobs_dir: file_jobs_dir,
            max_proc: file_max_proc,
            max_threads: file_max_threads,
            delay_ms: file_delay_ms,
            job_pattern: file_pattern,
        } = file_config;

        Ok(Self {
            jobs_dir: cli_jobs_dir
                .or(file_jobs_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_JOBS_DIR)),
            max_proc: cli_max_proc.or(file_max_proc).unwrap_or(DEFAULT_MAX_PROC),
            max_threads: cli_max_threads
                .or(file_max_threads)
                .unwrap_or(DEFAULT_MAX_THREADS),
            delay_ms: cli_delay_ms
                .or(file_delay_ms)
                .unwrap_or(DEFAULT_ACCESS_DELAY_MS),
            job_pattern: cli_pattern
                .or(file_pattern)
                .unwrap_or_else(|| DEFAULT_JOB_PATTERN.to_string()),
        })
    }

    /// Fail fast on settings that would make the pool unable to run.
    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.max_proc >= 1, "max_proc must be at least 1");
        anyhow::ensure!(self.max_threads >= 1, "max_threads must be at least 1");
        anyhow::ensure!(
            self.jobs_dir.is_dir(),
            "jobs directory {:?} does not exist or is not a directory",
            self.jobs_dir
        );
        Glob::new(&self.job_pattern)
            .with_context(|| format!("invalid job pattern {:?}", self.job_pattern))?;
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PartialConfig {
    jobs_dir: Option<PathBuf>,
    max_proc: Option<usize>,
    max_threads: Option<usize>,
    delay_ms: Option<u64>,
    job_pattern: Option<String>,
}

fn load_config_file(path: &Path) -> Result<PartialConfig> {
    if !path.exists() {
        anyhow::bail!("config file {:?} does not exist", path);
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {:?}", path))?;
    let ext = path
        .extension()
        .and_then(|os| os.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let parsed = match ext.as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&contents)
            .with_context(|| format!("failed to parse YAML config {:?}", path))?,
        "json" => serde_json::from_str(&contents)
            .with_context(|| format!("failed to parse JSON config {:?}", path))?,
        other => anyhow::bail!("unsupported config extension: {other}"),
    };
    Ok(parsed)
}
