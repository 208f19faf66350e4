//! Error taxonomy for the event store and the command dispatcher.
//!
//! Domain and parse errors are reported and the worker moves on to the next
//! command. Only [`EmsError::LockFailure`] is fatal: it aborts the job process.

use crate::store::{Coord, EventId};
use std::fmt;
use thiserror::Error;

/// Result type for store and dispatcher operations
pub type EmsResult<T> = Result<T, EmsError>;

#[derive(Debug, Error)]
pub enum EmsError {
    /// The store was terminated (or never set up) and can no longer serve requests
    #[error("EMS state must be initialized")]
    UninitializedStore,

    #[error("event {id} already exists")]
    DuplicateEvent { id: EventId },

    #[error("event {id} not found")]
    EventNotFound { id: EventId },

    #[error("event dimensions must be positive (got {rows}x{cols})")]
    InvalidDimensions { rows: usize, cols: usize },

    #[error("not enough memory for a {rows}x{cols} event")]
    AllocationFailed { rows: usize, cols: usize },

    #[error("reservation request must name at least one seat")]
    EmptyReservation,

    /// Seat lies outside the event grid
    #[error("invalid seat {seat} for event {id}")]
    InvalidSeat { id: EventId, seat: Coord },

    #[error("seat {seat} of event {id} already reserved")]
    SeatAlreadyReserved { id: EventId, seat: Coord },

    #[error("seat {seat} appears more than once in the request")]
    DuplicateSeatInRequest { seat: Coord },

    #[error("invalid command: {reason}. See HELP for usage")]
    ParseError { reason: String },

    /// A synchronization primitive failed; the lock state can no longer be trusted
    #[error("lock failure: {0}")]
    LockFailure(String),

    #[error("output error: {0}")]
    Io(#[from] std::io::Error),
}

/// Stable machine-readable code for each error kind, used in log fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UninitializedStore,
    DuplicateEvent,
    EventNotFound,
    InvalidDimensions,
    AllocationFailed,
    EmptyReservation,
    InvalidSeat,
    SeatAlreadyReserved,
    DuplicateSeatInRequest,
    ParseError,
    LockFailure,
    Io,
}

impl ErrorCode {
    pub fn category(&self) -> &'static str {
        match self {
            ErrorCode::ParseError => "client_error",
            ErrorCode::EventNotFound => "resource_not_found",
            ErrorCode::DuplicateEvent
            | ErrorCode::InvalidDimensions
            | ErrorCode::EmptyReservation
            | ErrorCode::InvalidSeat
            | ErrorCode::DuplicateSeatInRequest => "validation_error",
            ErrorCode::SeatAlreadyReserved => "conflict",
            ErrorCode::AllocationFailed => "resource_exhausted",
            ErrorCode::UninitializedStore | ErrorCode::LockFailure => "server_error",
            ErrorCode::Io => "io_error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl EmsError {
    pub fn parse(reason: impl Into<String>) -> Self {
        EmsError::ParseError {
            reason: reason.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            EmsError::UninitializedStore => ErrorCode::UninitializedStore,
            EmsError::DuplicateEvent { .. } => ErrorCode::DuplicateEvent,
            EmsError::EventNotFound { .. } => ErrorCode::EventNotFound,
            EmsError::InvalidDimensions { .. } => ErrorCode::InvalidDimensions,
            EmsError::AllocationFailed { .. } => ErrorCode::AllocationFailed,
            EmsError::EmptyReservation => ErrorCode::EmptyReservation,
            EmsError::InvalidSeat { .. } => ErrorCode::InvalidSeat,
            EmsError::SeatAlreadyReserved { .. } => ErrorCode::SeatAlreadyReserved,
            EmsError::DuplicateSeatInRequest { .. } => ErrorCode::DuplicateSeatInRequest,
            EmsError::ParseError { .. } => ErrorCode::ParseError,
            EmsError::LockFailure(_) => ErrorCode::LockFailure,
            EmsError::Io(_) => ErrorCode::Io,
        }
    }

    /// Fatal errors terminate the job process instead of being reported per command
    pub fn is_fatal(&self) -> bool {
        matches!(self, EmsError::LockFailure(_))
    }
}
