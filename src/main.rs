use clap::Parser;
use ems::{Cli, CliCommand, EmsConfig, LoggingConfig, init_logging, run_job, run_pool};

fn main() -> anyhow::Result<()> {
    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let cli = Cli::parse();
    match cli.command {
        CliCommand::Run(args) => {
            let config = EmsConfig::from_args(args)?;
            let report = run_pool(&config)?;
            anyhow::ensure!(report.failed == 0, "{} job(s) failed", report.failed);
            Ok(())
        }
        CliCommand::Job(args) => {
            run_job(&args)?;
            Ok(())
        }
    }
}
