//! Core domain types for the raffle engine.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Amount;

/// Ticket number, drawn from the fixed pool `1..=POOL_SIZE`.
pub type TicketNo = u16;

/// Number of tickets in the default pool.
pub const POOL_SIZE: TicketNo = 100;

/// How long a reservation holds a number before it lapses.
pub const DEFAULT_LEASE_SECS: i64 = 5 * 60;

/// Buyer contact details captured when a sale is recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    pub name: String,
    pub phone: String,
    pub email: Option<String>,
}

impl Buyer {
    pub fn new(name: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone: phone.into(),
            email: None,
        }
    }
}

/// A confirmed sale. Append-only; at most one per ticket number.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleRecord {
    pub number: TicketNo,
    pub seller: String,
    pub buyer: Buyer,
    pub amount: Amount,
    pub created_at: DateTime<Utc>,
    pub note: Option<String>,
}

/// A time-limited hold on a ticket number.
///
/// Identity is the (number, seller, created_at) triple; a record whose
/// `expires_at` has passed counts as absent even before it is reaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub number: TicketNo,
    pub seller: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ReservationRecord {
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

/// Derived state of one ticket number at a point in time.
#[derive(Debug, Clone, PartialEq)]
pub enum TicketState {
    Available,
    Reserved {
        seller: String,
        expires_at: DateTime<Utc>,
    },
    Sold {
        seller: String,
        buyer: String,
    },
}

/// A command representing the possible inputs of the engine.
#[derive(Debug, Clone)]
pub enum Command {
    /// Take a time-limited hold on a number.
    Reserve {
        number: TicketNo,
        seller: String,
        lease: Duration,
        at: DateTime<Utc>,
    },
    /// Convert the caller's hold into a permanent sale.
    Confirm {
        number: TicketNo,
        seller: String,
        buyer: Buyer,
        amount: Amount,
        note: Option<String>,
        at: DateTime<Utc>,
    },
    /// Release the caller's hold without selling.
    Cancel {
        number: TicketNo,
        seller: String,
        at: DateTime<Utc>,
    },
    /// Remove every expired reservation from the ledger.
    Reap { at: DateTime<Utc> },
    /// Sell a number outright, without a prior hold.
    Sell {
        number: TicketNo,
        seller: String,
        buyer: Buyer,
        amount: Amount,
        note: Option<String>,
        at: DateTime<Utc>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn reservation_is_live_before_expiry() {
        let record = ReservationRecord {
            number: 7,
            seller: "ana".to_string(),
            created_at: at("2026-03-01T10:00:00Z"),
            expires_at: at("2026-03-01T10:05:00Z"),
        };
        assert!(record.is_live(at("2026-03-01T10:04:59Z")));
    }

    #[test]
    fn reservation_expired_at_the_boundary() {
        let record = ReservationRecord {
            number: 7,
            seller: "ana".to_string(),
            created_at: at("2026-03-01T10:00:00Z"),
            expires_at: at("2026-03-01T10:05:00Z"),
        };
        assert!(!record.is_live(at("2026-03-01T10:05:00Z")));
        assert!(!record.is_live(at("2026-03-01T10:06:00Z")));
    }

    #[test]
    fn buyer_new_has_no_email() {
        let buyer = Buyer::new("Ximena", "555-0100");
        assert_eq!(buyer.name, "Ximena");
        assert_eq!(buyer.phone, "555-0100");
        assert!(buyer.email.is_none());
    }
}
