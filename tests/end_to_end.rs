//! Drives the `ems` binary against a directory of job files.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::tempdir;

fn ems(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_ems"))
        .args(args)
        .env_remove("EMS_JOBS_DIR")
        .env_remove("EMS_MAX_PROC")
        .env_remove("EMS_MAX_THREADS")
        .env_remove("EMS_DELAY_MS")
        .env_remove("EMS_JOB_PATTERN")
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run ems binary")
}

fn write_job(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

#[test]
fn run_writes_one_output_per_job() {
    let dir = tempdir().unwrap();
    write_job(
        dir.path(),
        "basic.jobs",
        "CREATE 1 10 20\nRESERVE 1 [(1,1) (1,2) (1,3)]\nSHOW 1\n",
    );
    write_job(dir.path(), "empty.jobs", "LIST\n");
    write_job(
        dir.path(),
        "barrier.jobs",
        "CREATE 5 1 1\nBARRIER\nSHOW 5\nLIST\n",
    );
    write_job(dir.path(), "ignored.txt", "CREATE 9 1 1\n");

    let output = ems(&[
        "run",
        dir.path().to_str().unwrap(),
        "--max-proc",
        "2",
        "--max-threads",
        "3",
        "--delay-ms",
        "0",
    ]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let basic = fs::read_to_string(dir.path().join("basic.out")).unwrap();
    let lines: Vec<&str> = basic.lines().collect();
    assert_eq!(lines.len(), 10);
    let mut first_row = vec!["1"; 3];
    first_row.extend(vec!["0"; 17]);
    assert_eq!(lines[0], first_row.join(" "));
    assert!(lines[1..].iter().all(|line| line.split(' ').all(|v| v == "0")));

    assert_eq!(fs::read_to_string(dir.path().join("empty.out")).unwrap(), "No events\n");

    let barrier = fs::read_to_string(dir.path().join("barrier.out")).unwrap();
    assert!(barrier.starts_with("0\n") || barrier.starts_with("Event: 5\n"));
    assert_eq!(barrier.len(), "0\nEvent: 5\n".len());

    assert!(!dir.path().join("ignored.out").exists());
}

#[test]
fn custom_pattern_selects_other_files() {
    let dir = tempdir().unwrap();
    write_job(dir.path(), "a.txt", "CREATE 2 1 2\nSHOW 2\n");
    write_job(dir.path(), "b.jobs", "LIST\n");

    let output = ems(&[
        "run",
        dir.path().to_str().unwrap(),
        "--pattern",
        "*.txt",
        "--delay-ms",
        "0",
    ]);
    assert!(output.status.success());

    assert_eq!(fs::read_to_string(dir.path().join("a.out")).unwrap(), "0 0\n");
    assert!(!dir.path().join("b.out").exists());
}

#[test]
fn invalid_commands_keep_the_job_running() {
    let dir = tempdir().unwrap();
    write_job(
        dir.path(),
        "mixed.jobs",
        "CREATE 1 2 2\nRESERVE 1 [(3,3)]\nRESERVE 2 [(1,1)]\nBOGUS\nRESERVE 1 [(2,2)]\nSHOW 1\n",
    );

    let output = ems(&["run", dir.path().to_str().unwrap(), "--delay-ms", "0"]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("mixed.out")).unwrap(), "0 0\n0 1\n");
}

#[test]
fn missing_jobs_directory_fails() {
    let dir = tempdir().unwrap();
    let output = ems(&["run", dir.path().join("missing").to_str().unwrap()]);
    assert!(!output.status.success());
}

#[test]
fn job_subcommand_processes_a_single_file() {
    let dir = tempdir().unwrap();
    write_job(dir.path(), "single.jobs", "CREATE 3 1 3\nRESERVE 3 [(1,2)]\nSHOW 3\n");

    let job = dir.path().join("single.jobs");
    let output = ems(&["job", "--file", job.to_str().unwrap(), "--threads", "2", "--delay-ms", "0"]);
    assert!(output.status.success());
    assert_eq!(fs::read_to_string(dir.path().join("single.out")).unwrap(), "0 1 0\n");
}

#[test]
fn job_subcommand_exits_non_zero_when_the_job_aborts() {
    let dir = tempdir().unwrap();
    let job = dir.path().join("absent.jobs");
    let output = ems(&["job", "--file", job.to_str().unwrap(), "--delay-ms", "0"]);
    assert!(!output.status.success());
    assert!(!dir.path().join("absent.out").exists());
}
