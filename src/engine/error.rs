//! Error types for ticket allocation.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::ledger::LedgerError;
use crate::model::TicketNo;

/// Top-level error returned by [`Engine::apply`](super::Engine::apply).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("reserve failed: {0}")]
    Reserve(#[from] ReserveError),

    #[error("{0}")]
    Claim(#[from] ClaimError),

    #[error("direct sale failed: {0}")]
    Sale(#[from] SaleError),

    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

/// Error during reservation.
#[derive(Debug, Error)]
pub enum ReserveError {
    #[error("ticket {0} is out of range")]
    InvalidNumber(TicketNo),

    #[error("missing seller identity")]
    MissingSeller,

    #[error("ticket {0} is already sold")]
    AlreadySold(TicketNo),

    #[error("ticket {0} is held by {1} until {2}")]
    HeldByOther(TicketNo, String, DateTime<Utc>),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The operation acting on an existing reservation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOp {
    Confirm,
    Cancel,
}

/// Unified error for operations on an existing reservation (confirm, cancel).
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("{0:?}: ticket {1} is out of range")]
    InvalidNumber(ClaimOp, TicketNo),

    #[error("{0:?}: missing {1}")]
    MissingField(ClaimOp, &'static str),

    #[error("{0:?}: ticket {1} has no live reservation")]
    NotReserved(ClaimOp, TicketNo),

    #[error("{0:?}: ticket {1} is held by {2}, not {3}")]
    NotOwner(ClaimOp, TicketNo, String, String),

    #[error("{0:?}: ticket {1} is already sold")]
    AlreadySold(ClaimOp, TicketNo),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Error during a direct sale (no prior reservation).
#[derive(Debug, Error)]
pub enum SaleError {
    #[error("ticket {0} is out of range")]
    InvalidNumber(TicketNo),

    #[error("missing seller identity")]
    MissingSeller,

    #[error("missing {0}")]
    MissingField(&'static str),

    #[error("ticket {0} is already sold")]
    AlreadySold(TicketNo),

    #[error("ticket {0} is held by {1}")]
    HeldByOther(TicketNo, String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
