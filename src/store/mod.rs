//! In-memory event store with per-seat locking.
//!
//! Lock granularity, from coarse to fine:
//! - the [`Registry`] read/write lock, held briefly for lookups and exclusively for appends
//! - the per-event reservation counter, held only to issue an id
//! - one mutex per seat, wrapping the seat value itself
//!
//! Multi-seat reservations acquire seat locks in ascending `(row, col)` order. Every
//! reservation on an event follows that order, so no two requests can wait on each
//! other in a cycle.

mod event;
mod registry;

pub use event::Event;
pub use registry::Registry;

use crate::error::{EmsError, EmsResult};
use crate::output::OutputSink;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use tracing::debug;

pub type EventId = u32;
pub type ReservationId = u32;

/// 1-based seat coordinate. Derived ordering is `(row, col)` lexicographic, which is
/// the lock-acquisition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coord {
    pub row: usize,
    pub col: usize,
}

impl Coord {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.row, self.col)
    }
}

impl From<(usize, usize)> for Coord {
    fn from((row, col): (usize, usize)) -> Self {
        Self::new(row, col)
    }
}

/// Store handle owned by one job process and shared by all of its workers.
pub struct EventStore {
    registry: Registry,
    access_delay: Duration,
    live: AtomicBool,
}

impl EventStore {
    /// `access_delay` is slept before every registry lookup and every seat read or
    /// write, simulating a costly backing store.
    pub fn new(access_delay: Duration) -> Self {
        Self {
            registry: Registry::new(),
            access_delay,
            live: AtomicBool::new(true),
        }
    }

    /// Drop every event. Any later operation fails with `UninitializedStore`.
    pub fn terminate(&self) -> EmsResult<()> {
        if !self.live.swap(false, Ordering::AcqRel) {
            return Err(EmsError::UninitializedStore);
        }
        self.registry.clear();
        debug!("event store terminated");
        Ok(())
    }

    fn ensure_live(&self) -> EmsResult<()> {
        if self.live.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(EmsError::UninitializedStore)
        }
    }

    fn pause(&self) {
        if !self.access_delay.is_zero() {
            thread::sleep(self.access_delay);
        }
    }

    fn lookup(&self, id: EventId) -> EmsResult<Arc<Event>> {
        self.ensure_live()?;
        self.pause();
        self.registry.get(id).ok_or(EmsError::EventNotFound { id })
    }

    pub fn create(&self, id: EventId, rows: usize, cols: usize) -> EmsResult<()> {
        self.ensure_live()?;
        self.pause();
        if self.registry.contains(id) {
            return Err(EmsError::DuplicateEvent { id });
        }

        let event = Event::new(id, rows, cols)?;
        self.registry.insert(event)?;
        debug!(event_id = id, rows, cols, "event created");
        Ok(())
    }

    /// Reserve every seat in `seats` under one fresh reservation id, or none of them.
    pub fn reserve(&self, id: EventId, seats: &[Coord]) -> EmsResult<ReservationId> {
        let event = self.lookup(id)?;
        if seats.is_empty() {
            return Err(EmsError::EmptyReservation);
        }

        let mut ordered = seats.to_vec();
        ordered.sort_unstable();
        if let Some(pair) = ordered.windows(2).find(|pair| pair[0] == pair[1]) {
            return Err(EmsError::DuplicateSeatInRequest { seat: pair[0] });
        }

        // Guards drop on every early return, releasing whatever was taken so far.
        let mut held = Vec::with_capacity(ordered.len());
        for &seat in &ordered {
            let index = event
                .index_of(seat)
                .ok_or(EmsError::InvalidSeat { id, seat })?;
            let guard = event.seat(index).lock();
            self.pause();
            if *guard != 0 {
                return Err(EmsError::SeatAlreadyReserved { id, seat });
            }
            held.push(guard);
        }

        let reservation = event.next_reservation_id();
        for mut guard in held {
            self.pause();
            *guard = reservation;
        }

        debug!(event_id = id, reservation, seats = ordered.len(), "seats reserved");
        Ok(reservation)
    }

    /// Seat values in row-major order. Each seat is locked only while it is read.
    pub fn snapshot(&self, id: EventId) -> EmsResult<Vec<ReservationId>> {
        let event = self.lookup(id)?;
        Ok((0..event.seat_count())
            .map(|index| {
                self.pause();
                *event.seat(index).lock()
            })
            .collect())
    }

    /// Render the grid as `rows` lines of space-separated seat values.
    pub fn render(&self, id: EventId) -> EmsResult<String> {
        let event = self.lookup(id)?;
        let (rows, cols) = (event.rows(), event.cols());
        let mut out = String::with_capacity(event.seat_count() * 2);

        for row in 0..rows {
            for col in 0..cols {
                if col > 0 {
                    out.push(' ');
                }
                self.pause();
                let value = *event.seat(row * cols + col).lock();
                out.push_str(&value.to_string());
            }
            out.push('\n');
        }
        Ok(out)
    }

    pub fn show(&self, id: EventId, sink: &OutputSink) -> EmsResult<()> {
        let rendered = self.render(id)?;
        sink.write_block(&rendered)?;
        Ok(())
    }

    pub fn render_list(&self) -> EmsResult<String> {
        self.ensure_live()?;
        let mut out = String::new();
        self.registry.for_each_id(|id| {
            out.push_str("Event: ");
            out.push_str(&id.to_string());
            out.push('\n');
        });
        if out.is_empty() {
            out.push_str("No events\n");
        }
        Ok(out)
    }

    pub fn list_events(&self, sink: &OutputSink) -> EmsResult<()> {
        let rendered = self.render_list()?;
        sink.write_block(&rendered)?;
        Ok(())
    }

    pub fn event(&self, id: EventId) -> EmsResult<Arc<Event>> {
        self.lookup(id)
    }

    pub fn event_ids(&self) -> Vec<EventId> {
        self.registry.ids()
    }
}

impl Default for EventStore {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn seats(coords: &[(usize, usize)]) -> Vec<Coord> {
        coords.iter().copied().map(Coord::from).collect()
    }

    #[test]
    fn reserve_then_render() {
        let store = EventStore::default();
        store.create(1, 2, 2).unwrap();
        assert_eq!(store.reserve(1, &seats(&[(1, 1), (1, 2)])).unwrap(), 1);
        assert_eq!(store.render(1).unwrap(), "1 1\n0 0\n");
    }

    #[test]
    fn render_of_fresh_event_is_all_zero() {
        let store = EventStore::default();
        store.create(3, 2, 3).unwrap();
        assert_eq!(store.render(3).unwrap(), "0 0 0\n0 0 0\n");
    }

    #[test]
    fn duplicate_seat_in_request_reserves_nothing() {
        let store = EventStore::default();
        store.create(1, 2, 2).unwrap();
        assert_matches!(
            store.reserve(1, &seats(&[(1, 1), (1, 1)])),
            Err(EmsError::DuplicateSeatInRequest { seat }) if seat == Coord::new(1, 1)
        );
        assert_eq!(store.snapshot(1).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(store.event(1).unwrap().reservation_count(), 0);
    }

    #[test]
    fn invalid_seat_rolls_back_and_keeps_counter() {
        let store = EventStore::default();
        store.create(1, 2, 2).unwrap();
        assert_matches!(
            store.reserve(1, &seats(&[(1, 1), (3, 1)])),
            Err(EmsError::InvalidSeat { id: 1, .. })
        );
        assert_eq!(store.snapshot(1).unwrap(), vec![0, 0, 0, 0]);
        // Locks from the failed attempt were released.
        assert_eq!(store.reserve(1, &seats(&[(1, 1)])).unwrap(), 1);
    }

    #[test]
    fn reserved_seat_blocks_overlapping_request() {
        let store = EventStore::default();
        store.create(1, 1, 3).unwrap();
        store.reserve(1, &seats(&[(1, 2)])).unwrap();
        assert_matches!(
            store.reserve(1, &seats(&[(1, 3), (1, 2), (1, 1)])),
            Err(EmsError::SeatAlreadyReserved { seat, .. }) if seat == Coord::new(1, 2)
        );
        assert_eq!(store.render(1).unwrap(), "0 1 0\n");
    }

    #[test]
    fn missing_event_and_empty_request() {
        let store = EventStore::default();
        assert_matches!(store.reserve(4, &seats(&[(1, 1)])), Err(EmsError::EventNotFound { id: 4 }));
        assert_matches!(store.render(4), Err(EmsError::EventNotFound { id: 4 }));
        store.create(4, 1, 1).unwrap();
        assert_matches!(store.reserve(4, &[]), Err(EmsError::EmptyReservation));
    }

    #[test]
    fn duplicate_create_leaves_grid_untouched() {
        let store = EventStore::default();
        store.create(1, 1, 2).unwrap();
        store.reserve(1, &seats(&[(1, 2)])).unwrap();
        assert_matches!(store.create(1, 5, 5), Err(EmsError::DuplicateEvent { id: 1 }));
        assert_eq!(store.render(1).unwrap(), "0 1\n");
    }

    #[test]
    fn list_renders_in_insertion_order() {
        let store = EventStore::default();
        assert_eq!(store.render_list().unwrap(), "No events\n");
        store.create(5, 1, 1).unwrap();
        assert_eq!(store.render_list().unwrap(), "Event: 5\n");
        store.create(2, 1, 1).unwrap();
        assert_eq!(store.render_list().unwrap(), "Event: 5\nEvent: 2\n");
    }

    #[test]
    fn terminated_store_rejects_operations() {
        let store = EventStore::default();
        store.create(1, 1, 1).unwrap();
        store.terminate().unwrap();
        assert_matches!(store.create(2, 1, 1), Err(EmsError::UninitializedStore));
        assert_matches!(store.render_list(), Err(EmsError::UninitializedStore));
        assert_matches!(store.terminate(), Err(EmsError::UninitializedStore));
    }
}
