use super::{Coord, EventId, ReservationId};
use crate::error::{EmsError, EmsResult};
use parking_lot::Mutex;

/// One event: a fixed grid of seats, each cell living inside its own lock.
///
/// Cell value `0` means free; any other value is the reservation id that claimed it.
/// The reservation counter has a lock of its own so issuing an id never contends
/// with seat access.
pub struct Event {
    id: EventId,
    rows: usize,
    cols: usize,
    seats: Box<[Mutex<ReservationId>]>,
    reservations: Mutex<ReservationId>,
}

impl Event {
    pub(crate) fn new(id: EventId, rows: usize, cols: usize) -> EmsResult<Self> {
        let cells = rows
            .checked_mul(cols)
            .filter(|cells| *cells > 0)
            .ok_or(EmsError::InvalidDimensions { rows, cols })?;

        let mut seats: Vec<Mutex<ReservationId>> = Vec::new();
        seats
            .try_reserve_exact(cells)
            .map_err(|_| EmsError::AllocationFailed { rows, cols })?;
        seats.extend((0..cells).map(|_| Mutex::new(0)));
        let seats = seats.into_boxed_slice();

        Ok(Self {
            id,
            rows,
            cols,
            seats,
            reservations: Mutex::new(0),
        })
    }

    pub fn id(&self) -> EventId {
        self.id
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Flat index of a 1-based seat, or `None` when it falls outside the grid.
    pub(crate) fn index_of(&self, seat: Coord) -> Option<usize> {
        let in_rows = (1..=self.rows).contains(&seat.row);
        let in_cols = (1..=self.cols).contains(&seat.col);
        (in_rows && in_cols).then(|| (seat.row - 1) * self.cols + seat.col - 1)
    }

    pub(crate) fn seat(&self, index: usize) -> &Mutex<ReservationId> {
        &self.seats[index]
    }

    /// Issue the next reservation id. Ids start at 1 and never repeat.
    pub(crate) fn next_reservation_id(&self) -> ReservationId {
        let mut counter = self.reservations.lock();
        *counter += 1;
        *counter
    }

    /// Number of reservations issued so far
    pub fn reservation_count(&self) -> ReservationId {
        *self.reservations.lock()
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.id)
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish_non_exhaustive()
    }
}
