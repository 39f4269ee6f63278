//! Per-seller view of an outstanding reservation.
//!
//! A session mirrors what one connected seller believes they hold. It is a
//! convenience for countdown display and form flow only; the ledger is always
//! authoritative, and `sync` drops the local hold the moment a snapshot stops
//! backing it.

use chrono::{DateTime, Duration, Utc};

use crate::engine::Board;
use crate::model::{TicketNo, TicketState};

/// The one hold a session may be tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hold {
    pub number: TicketNo,
    pub expires_at: DateTime<Utc>,
}

/// Client-side session state for one seller.
#[derive(Debug, Clone)]
pub struct SellerSession {
    seller: String,
    hold: Option<Hold>,
}

impl SellerSession {
    pub fn new(seller: impl Into<String>) -> Self {
        Self {
            seller: seller.into(),
            hold: None,
        }
    }

    pub fn seller(&self) -> &str {
        &self.seller
    }

    pub fn hold(&self) -> Option<Hold> {
        self.hold
    }

    /// Record a hold the engine just granted.
    pub fn note_hold(&mut self, number: TicketNo, expires_at: DateTime<Utc>) {
        self.hold = Some(Hold { number, expires_at });
    }

    /// Forget the tracked hold (after confirm or cancel).
    pub fn clear(&mut self) {
        self.hold = None;
    }

    /// Time left on the tracked hold; `None` when there is none or it has
    /// already lapsed (in which case it is dropped).
    pub fn remaining(&mut self, now: DateTime<Utc>) -> Option<Duration> {
        let hold = self.hold?;
        if hold.expires_at <= now {
            self.hold = None;
            return None;
        }
        Some(hold.expires_at - now)
    }

    /// Reconcile against an authoritative snapshot: keep the hold only while
    /// the board still shows this seller holding that number.
    pub fn sync(&mut self, board: &Board) {
        let Some(hold) = self.hold else { return };
        match board.state(hold.number) {
            Some(TicketState::Reserved { seller, expires_at }) if *seller == self.seller => {
                self.hold = Some(Hold {
                    number: hold.number,
                    expires_at: *expires_at,
                });
            }
            _ => self.hold = None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Amount;
    use crate::engine::Engine;
    use crate::ledger::MemoryLedger;
    use crate::model::Buyer;

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn t0() -> DateTime<Utc> {
        at("2026-03-01T10:00:00Z")
    }

    #[test]
    fn starts_without_hold() {
        let mut session = SellerSession::new("ana");
        assert_eq!(session.seller(), "ana");
        assert!(session.hold().is_none());
        assert!(session.remaining(t0()).is_none());
    }

    #[test]
    fn remaining_counts_down_and_lapses() {
        let mut session = SellerSession::new("ana");
        session.note_hold(3, at("2026-03-01T10:05:00Z"));

        assert_eq!(
            session.remaining(at("2026-03-01T10:02:00Z")),
            Some(Duration::minutes(3))
        );

        // past expiry the hold is dropped, not reported as negative
        assert!(session.remaining(at("2026-03-01T10:05:00Z")).is_none());
        assert!(session.hold().is_none());
    }

    #[test]
    fn clear_forgets_hold() {
        let mut session = SellerSession::new("ana");
        session.note_hold(3, at("2026-03-01T10:05:00Z"));
        session.clear();
        assert!(session.hold().is_none());
    }

    #[test]
    fn sync_keeps_hold_backed_by_board() {
        let mut engine = Engine::new(MemoryLedger::default());
        let expiry = engine.reserve(3, "ana", Duration::minutes(5), t0()).unwrap();

        let mut session = SellerSession::new("ana");
        session.note_hold(3, expiry);
        session.sync(&engine.snapshot(t0()).unwrap());

        assert_eq!(session.hold(), Some(Hold { number: 3, expires_at: expiry }));
    }

    #[test]
    fn sync_drops_hold_the_ledger_no_longer_shows() {
        let mut engine = Engine::new(MemoryLedger::default());
        let expiry = engine.reserve(3, "ana", Duration::minutes(5), t0()).unwrap();

        let mut session = SellerSession::new("ana");
        session.note_hold(3, expiry);

        // another client's view: the hold expired and bruno took the number
        let later = at("2026-03-01T10:06:00Z");
        engine.reserve(3, "bruno", Duration::minutes(5), later).unwrap();
        session.sync(&engine.snapshot(later).unwrap());

        assert!(session.hold().is_none());
    }

    #[test]
    fn sync_drops_hold_after_sale() {
        let mut engine = Engine::new(MemoryLedger::default());
        let expiry = engine.reserve(3, "ana", Duration::minutes(5), t0()).unwrap();

        let mut session = SellerSession::new("ana");
        session.note_hold(3, expiry);

        engine
            .confirm(
                3,
                "ana",
                Buyer::new("Ximena", "555-0100"),
                Amount::from_major(10_000),
                None,
                at("2026-03-01T10:01:00Z"),
            )
            .unwrap();
        session.sync(&engine.snapshot(at("2026-03-01T10:02:00Z")).unwrap());

        assert!(session.hold().is_none());
    }
}
