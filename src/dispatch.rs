//! Worker team that drains one command stream against a shared store.
//!
//! Workers claim commands through a single cursor mutex. Store operations run after
//! the cursor is released, so one worker's RESERVE or SHOW never stops another from
//! claiming the next line. A BARRIER ends the current generation. Once every worker
//! has been joined, a fresh generation with clean wait state picks up after it.

use crate::error::{EmsError, EmsResult};
use crate::logging::{generation_span, worker_span};
use crate::output::OutputSink;
use crate::parser::{Command, CommandSource, HELP_TEXT, WaitTarget};
use crate::store::EventStore;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How a worker left its generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// End of stream reached, or another worker ended the generation
    Finished,
    /// This worker read a BARRIER; the team must restart
    Restart,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub generations: usize,
    pub commands: u64,
    pub failures: u64,
}

/// Cursor and wait state scoped to one generation.
struct Cursor<'a, S> {
    source: &'a mut S,
    terminated: bool,
    /// Pending delay per worker ordinal, index `ordinal - 1`
    pending_ms: Vec<u64>,
}

impl<'a, S> Cursor<'a, S> {
    fn new(source: &'a mut S, workers: usize) -> Self {
        Self {
            source,
            terminated: false,
            pending_ms: vec![0; workers],
        }
    }

    fn take_delay(&mut self, ordinal: usize) -> u64 {
        std::mem::take(&mut self.pending_ms[ordinal - 1])
    }

    /// Delays accumulate: a worker may receive several WAITs before it sleeps.
    fn schedule(&mut self, delay_ms: u64, target: WaitTarget) -> bool {
        match target {
            WaitTarget::All => {
                for slot in &mut self.pending_ms {
                    *slot = slot.saturating_add(delay_ms);
                }
                true
            }
            WaitTarget::Worker(ordinal) => match self.pending_ms.get_mut(ordinal.wrapping_sub(1)) {
                Some(slot) => {
                    *slot = slot.saturating_add(delay_ms);
                    true
                }
                None => false,
            },
        }
    }
}

pub struct ThreadTeam<'s> {
    store: &'s EventStore,
    sink: &'s OutputSink,
    workers: usize,
    commands: AtomicU64,
    failures: AtomicU64,
}

impl<'s> ThreadTeam<'s> {
    pub fn new(store: &'s EventStore, sink: &'s OutputSink, workers: usize) -> Self {
        Self {
            store,
            sink,
            workers: workers.max(1),
            commands: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        }
    }

    /// Run generations until the stream is exhausted.
    pub fn run<S: CommandSource + Send>(&self, source: &mut S) -> EmsResult<RunSummary> {
        let mut generations = 0;
        loop {
            generations += 1;
            let outcome = self.run_generation(source, generations)?;
            if outcome == WorkerOutcome::Finished {
                break;
            }
            debug!(generation = generations, "barrier reached, restarting team");
        }

        Ok(RunSummary {
            generations,
            commands: self.commands.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        })
    }

    fn run_generation<S: CommandSource + Send>(
        &self,
        source: &mut S,
        generation: usize,
    ) -> EmsResult<WorkerOutcome> {
        let span = generation_span(generation);
        let _enter = span.enter();
        let cursor = Mutex::new(Cursor::new(source, self.workers));

        let results = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.workers);
            let mut spawn_error = None;
            for ordinal in 1..=self.workers {
                let cursor = &cursor;
                let spawned = thread::Builder::new()
                    .name(format!("ems-worker-{ordinal}"))
                    .spawn_scoped(scope, move || self.work(generation, ordinal, cursor));
                match spawned {
                    Ok(handle) => handles.push((ordinal, handle)),
                    Err(err) => {
                        warn!(ordinal, error = %err, "failed to spawn worker thread");
                        spawn_error = Some(err);
                    }
                }
            }

            let joined: Vec<_> = handles
                .into_iter()
                .map(|(ordinal, handle)| (ordinal, handle.join()))
                .collect();
            (joined, spawn_error)
        });

        let (joined, spawn_error) = results;
        if joined.is_empty() {
            if let Some(err) = spawn_error {
                return Err(EmsError::Io(err));
            }
        }

        let mut outcome = WorkerOutcome::Finished;
        for (ordinal, result) in joined {
            match result {
                Err(_) => {
                    return Err(EmsError::LockFailure(format!("worker {ordinal} panicked")));
                }
                Ok(Err(err)) => return Err(err),
                Ok(Ok(WorkerOutcome::Restart)) => outcome = WorkerOutcome::Restart,
                Ok(Ok(WorkerOutcome::Finished)) => {}
            }
        }
        Ok(outcome)
    }

    fn work<S: CommandSource>(
        &self,
        generation: usize,
        ordinal: usize,
        cursor: &Mutex<Cursor<'_, S>>,
    ) -> EmsResult<WorkerOutcome> {
        let span = worker_span(generation, ordinal);
        let _enter = span.enter();

        loop {
            let mut state = cursor.lock();
            if state.terminated {
                return Ok(WorkerOutcome::Finished);
            }

            let delay_ms = state.take_delay(ordinal);
            if delay_ms > 0 {
                drop(state);
                debug!(delay_ms, "waiting");
                thread::sleep(Duration::from_millis(delay_ms));
                // The generation may have ended while this worker slept.
                continue;
            }

            let command = match state.source.next_command() {
                Ok(Some(command)) => command,
                Ok(None) => {
                    state.terminated = true;
                    return Ok(WorkerOutcome::Finished);
                }
                Err(err) => {
                    state.terminated = true;
                    error!(error = %err, "failed to read next command");
                    return Err(err.into());
                }
            };

            match command {
                Command::Barrier => {
                    state.terminated = true;
                    return Ok(WorkerOutcome::Restart);
                }
                Command::Empty => {}
                Command::Wait { delay_ms, target } => {
                    self.commands.fetch_add(1, Ordering::Relaxed);
                    if !state.schedule(delay_ms, target) {
                        warn!(?target, workers = self.workers, "WAIT targets an unknown thread, ignored");
                    }
                }
                Command::Help => {
                    self.commands.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = self.sink.write_block(HELP_TEXT) {
                        self.report(err.into())?;
                    }
                }
                Command::Invalid { reason } => {
                    self.commands.fetch_add(1, Ordering::Relaxed);
                    self.report(EmsError::parse(reason))?;
                }
                store_operation => {
                    drop(state);
                    self.commands.fetch_add(1, Ordering::Relaxed);
                    if let Err(err) = self.execute(store_operation) {
                        self.report(err)?;
                    }
                }
            }
        }
    }

    fn execute(&self, command: Command) -> EmsResult<()> {
        match command {
            Command::Create { id, rows, cols } => self.store.create(id, rows, cols),
            Command::Reserve { id, seats } => self.store.reserve(id, &seats).map(|_| ()),
            Command::Show { id } => self.store.show(id, self.sink),
            Command::List => self.store.list_events(self.sink),
            other => Err(EmsError::parse(format!("{other:?} is not a store operation"))),
        }
    }

    /// Log a per-command error and keep going; fatal errors end the worker.
    fn report(&self, err: EmsError) -> EmsResult<()> {
        if err.is_fatal() {
            error!(code = %err.code(), error = %err, "fatal error");
            return Err(err);
        }
        self.failures.fetch_add(1, Ordering::Relaxed);
        warn!(code = %err.code(), category = err.code().category(), error = %err, "command failed");
        Ok(())
    }
}

/// Convenience wrapper: process `source` with a fresh team and log the summary.
pub fn process_stream<S: CommandSource + Send>(
    store: &EventStore,
    sink: &OutputSink,
    workers: usize,
    source: &mut S,
) -> EmsResult<RunSummary> {
    let summary = ThreadTeam::new(store, sink, workers).run(source)?;
    sink.flush()?;
    info!(
        generations = summary.generations,
        commands = summary.commands,
        failures = summary.failures,
        "command stream processed"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_line;
    use std::collections::VecDeque;

    fn script(lines: &[&str]) -> VecDeque<Command> {
        lines.iter().map(|line| parse_line(line)).collect()
    }

    #[test]
    fn waits_accumulate_per_worker() {
        let mut source: VecDeque<Command> = VecDeque::new();
        let mut cursor = Cursor::new(&mut source, 3);
        assert!(cursor.schedule(10, WaitTarget::All));
        assert!(cursor.schedule(5, WaitTarget::Worker(2)));
        assert!(!cursor.schedule(5, WaitTarget::Worker(4)));
        assert!(!cursor.schedule(5, WaitTarget::Worker(0)));
        assert_eq!(cursor.pending_ms, vec![10, 15, 10]);
        assert_eq!(cursor.take_delay(2), 15);
        assert_eq!(cursor.take_delay(2), 0);
    }

    #[test]
    fn single_worker_runs_in_file_order() {
        let store = EventStore::default();
        let (sink, buffer) = OutputSink::in_memory();
        let mut source = script(&["CREATE 1 2 2", "RESERVE 1 [(1,1) (1,2)]", "SHOW 1", "LIST"]);

        let summary = ThreadTeam::new(&store, &sink, 1).run(&mut source).unwrap();

        assert_eq!(buffer.contents(), "1 1\n0 0\nEvent: 1\n");
        assert_eq!(summary.generations, 1);
        assert_eq!(summary.commands, 4);
        assert_eq!(summary.failures, 0);
    }

    #[test]
    fn barrier_starts_a_new_generation() {
        let store = EventStore::default();
        let (sink, _buffer) = OutputSink::in_memory();
        let mut source = script(&["CREATE 1 1 1", "BARRIER", "LIST", "BARRIER", "HELP"]);

        let summary = ThreadTeam::new(&store, &sink, 4).run(&mut source).unwrap();

        assert_eq!(summary.generations, 3);
    }

    #[test]
    fn errors_are_counted_not_fatal() {
        let store = EventStore::default();
        let (sink, buffer) = OutputSink::in_memory();
        let mut source = script(&["SHOW 9", "BOGUS", "CREATE 1 1 1", "CREATE 1 1 1", "LIST"]);

        let summary = ThreadTeam::new(&store, &sink, 1).run(&mut source).unwrap();

        assert_eq!(summary.failures, 3);
        assert_eq!(buffer.contents(), "Event: 1\n");
    }
}
