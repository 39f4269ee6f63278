//! Ticket reservation and allocation engine.
//!
//! The engine arbitrates a fixed pool of numbered tickets between competing
//! sellers that coordinate only through a shared ledger. A claim is two-phase:
//! a time-limited reservation, then a confirmation into a permanent sale.
//! The ledger offers no atomic read-modify-write, so every mutating operation
//! re-reads the current records, acts, and reconciles afterwards where the
//! read-then-append window could have raced. Also supports an async stream of
//! commands, which serializes all mutations through one consumer.

use chrono::{DateTime, Duration, Utc};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};

use crate::Amount;
use crate::ledger::{Ledger, LedgerError};
use crate::model::{Buyer, Command, POOL_SIZE, ReservationRecord, SaleRecord, TicketNo};

mod classify;
pub use classify::{Anomaly, Board, classify};

mod error;
pub use error::{ClaimError, ClaimOp, EngineError, ReserveError, SaleError};

/// The reservation and allocation engine.
///
/// Holds no ticket state of its own; every operation works from a fresh
/// ledger snapshot.
pub struct Engine<L> {
    ledger: L,
    pool: TicketNo,
}

/// Public API
impl<L: Ledger> Engine<L> {
    pub fn new(ledger: L) -> Self {
        Self::with_pool(ledger, POOL_SIZE)
    }

    pub fn with_pool(ledger: L, pool: TicketNo) -> Self {
        Self { ledger, pool }
    }

    /// Run the engine over the given command stream.
    pub async fn run(&mut self, mut stream: impl Stream<Item = Command> + Unpin) {
        while let Some(cmd) = stream.next().await {
            // a rejected command should not stop the engine
            let _ = self.apply(cmd);
        }
    }

    /// Apply a single command on top of the current ledger state.
    pub fn apply(&mut self, cmd: Command) -> Result<(), EngineError> {
        match cmd {
            Command::Reserve {
                number,
                seller,
                lease,
                at,
            } => {
                let result = self.reserve(number, &seller, lease, at);
                Self::log_outcome("reserve", number, &seller, &result);
                result?;
            }
            Command::Confirm {
                number,
                seller,
                buyer,
                amount,
                note,
                at,
            } => {
                let result = self.confirm(number, &seller, buyer, amount, note, at);
                Self::log_outcome("confirm", number, &seller, &result);
                result?;
            }
            Command::Cancel { number, seller, at } => {
                let result = self.cancel(number, &seller, at);
                Self::log_outcome("cancel", number, &seller, &result);
                result?;
            }
            Command::Sell {
                number,
                seller,
                buyer,
                amount,
                note,
                at,
            } => {
                let result = self.sell_direct(number, &seller, buyer, amount, note, at);
                Self::log_outcome("sell", number, &seller, &result);
                result?;
            }
            Command::Reap { at } => {
                let reaped = self.reap(at)?;
                info!(op = "reap", reaped, "applied");
            }
        }
        Ok(())
    }

    /// Take a time-limited hold on `number` for `seller`.
    ///
    /// Re-reserving one's own live hold is idempotent success; the standing
    /// expiry is returned unchanged. After appending, the reservations are
    /// re-read and duplicate live holds for the number are resolved
    /// earliest-created-wins, so two sellers racing on the same number cannot
    /// both keep it.
    pub fn reserve(
        &mut self,
        number: TicketNo,
        seller: &str,
        lease: Duration,
        now: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, ReserveError> {
        if !self.in_range(number) {
            return Err(ReserveError::InvalidNumber(number));
        }
        let seller = seller.trim();
        if seller.is_empty() {
            return Err(ReserveError::MissingSeller);
        }

        let sales = self.ledger.sales()?;
        if Self::sale_for(&sales, number).is_some() {
            return Err(ReserveError::AlreadySold(number));
        }

        let reservations = self.ledger.reservations()?;
        if let Some(held) = Self::earliest_live(&reservations, number, now) {
            if held.seller == seller {
                return Ok(held.expires_at);
            }
            return Err(ReserveError::HeldByOther(
                number,
                held.seller.clone(),
                held.expires_at,
            ));
        }

        // the number is free; drop any lapsed holds on it while we are here
        // so the ledger does not accumulate them
        for stale in reservations
            .iter()
            .filter(|r| r.number == number && !r.is_live(now))
        {
            if let Err(e) = self
                .ledger
                .delete_reservation(number, &stale.seller, stale.created_at)
            {
                warn!(number, seller = %stale.seller, error = %e, "failed to drop lapsed hold");
            }
        }

        let expires_at = now + lease;
        self.ledger.append_reservation(ReservationRecord {
            number,
            seller: seller.to_string(),
            created_at: now,
            expires_at,
        })?;

        // the read above and the append are not atomic; re-read and keep only
        // the earliest hold
        if let Some(winner) = self.reconcile(number, now)? {
            if winner.seller != seller {
                return Err(ReserveError::HeldByOther(
                    number,
                    winner.seller,
                    winner.expires_at,
                ));
            }
        }
        Ok(expires_at)
    }

    /// Convert `seller`'s live hold on `number` into a permanent sale.
    pub fn confirm(
        &mut self,
        number: TicketNo,
        seller: &str,
        buyer: Buyer,
        amount: Amount,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), ClaimError> {
        use ClaimOp::Confirm;

        if !self.in_range(number) {
            return Err(ClaimError::InvalidNumber(Confirm, number));
        }
        let seller = seller.trim();
        if seller.is_empty() {
            return Err(ClaimError::MissingField(Confirm, "seller"));
        }
        if buyer.name.trim().is_empty() {
            return Err(ClaimError::MissingField(Confirm, "buyer name"));
        }
        if buyer.phone.trim().is_empty() {
            return Err(ClaimError::MissingField(Confirm, "buyer phone"));
        }

        let sales = self.ledger.sales()?;
        if Self::sale_for(&sales, number).is_some() {
            return Err(ClaimError::AlreadySold(Confirm, number));
        }

        let reservations = self.ledger.reservations()?;
        let Some(held) = Self::earliest_live(&reservations, number, now) else {
            return Err(ClaimError::NotReserved(Confirm, number));
        };
        if held.seller != seller {
            return Err(ClaimError::NotOwner(
                Confirm,
                number,
                held.seller.clone(),
                seller.to_string(),
            ));
        }
        let held_at = held.created_at;

        // sale first, hold second: a failure between the two steps leaves the
        // ticket sold, never silently available again
        self.ledger.append_sale(SaleRecord {
            number,
            seller: seller.to_string(),
            buyer,
            amount,
            created_at: now,
            note,
        })?;
        if let Err(e) = self.ledger.delete_reservation(number, seller, held_at) {
            warn!(number, seller, error = %e, "sale recorded but hold not removed");
        }
        Ok(())
    }

    /// Release `seller`'s live hold on `number` without selling.
    pub fn cancel(
        &mut self,
        number: TicketNo,
        seller: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ClaimError> {
        use ClaimOp::Cancel;

        if !self.in_range(number) {
            return Err(ClaimError::InvalidNumber(Cancel, number));
        }
        let seller = seller.trim();
        if seller.is_empty() {
            return Err(ClaimError::MissingField(Cancel, "seller"));
        }

        let reservations = self.ledger.reservations()?;
        let Some(held) = Self::earliest_live(&reservations, number, now) else {
            return Err(ClaimError::NotReserved(Cancel, number));
        };
        if held.seller != seller {
            return Err(ClaimError::NotOwner(
                Cancel,
                number,
                held.seller.clone(),
                seller.to_string(),
            ));
        }

        self.ledger
            .delete_reservation(number, seller, held.created_at)?;
        Ok(())
    }

    /// Remove every reservation whose expiry has passed.
    ///
    /// Safe to run repeatedly and concurrently; returns how many records were
    /// removed. Individual delete failures are logged and skipped.
    pub fn reap(&mut self, now: DateTime<Utc>) -> Result<usize, LedgerError> {
        let reservations = self.ledger.reservations()?;
        let mut reaped = 0;
        for record in reservations.iter().filter(|r| !r.is_live(now)) {
            match self
                .ledger
                .delete_reservation(record.number, &record.seller, record.created_at)
            {
                Ok(true) => reaped += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        number = record.number,
                        seller = %record.seller,
                        error = %e,
                        "failed to reap expired hold"
                    );
                }
            }
        }
        Ok(reaped)
    }

    /// Sell `number` outright, without a prior hold.
    ///
    /// Converts the caller's own live hold if one exists; a live hold by
    /// anyone else is rejected.
    pub fn sell_direct(
        &mut self,
        number: TicketNo,
        seller: &str,
        buyer: Buyer,
        amount: Amount,
        note: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), SaleError> {
        if !self.in_range(number) {
            return Err(SaleError::InvalidNumber(number));
        }
        let seller = seller.trim();
        if seller.is_empty() {
            return Err(SaleError::MissingSeller);
        }
        if buyer.name.trim().is_empty() {
            return Err(SaleError::MissingField("buyer name"));
        }
        if buyer.phone.trim().is_empty() {
            return Err(SaleError::MissingField("buyer phone"));
        }

        let sales = self.ledger.sales()?;
        if Self::sale_for(&sales, number).is_some() {
            return Err(SaleError::AlreadySold(number));
        }

        let reservations = self.ledger.reservations()?;
        let own_hold = match Self::earliest_live(&reservations, number, now) {
            Some(held) if held.seller != seller => {
                return Err(SaleError::HeldByOther(number, held.seller.clone()));
            }
            Some(held) => Some(held.created_at),
            None => None,
        };

        self.ledger.append_sale(SaleRecord {
            number,
            seller: seller.to_string(),
            buyer,
            amount,
            created_at: now,
            note,
        })?;
        if let Some(held_at) = own_hold {
            if let Err(e) = self.ledger.delete_reservation(number, seller, held_at) {
                warn!(number, seller, error = %e, "sale recorded but hold not removed");
            }
        }
        Ok(())
    }

    /// Overwrite the note on an existing sale. Administrative escape hatch;
    /// never part of the ticket lifecycle.
    pub fn annotate_sale(&mut self, number: TicketNo, note: &str) -> Result<bool, LedgerError> {
        let updated = self.ledger.update_sale_note(number, note)?;
        info!(number, updated, "sale note edit");
        Ok(updated)
    }

    /// Read-only classified view of the whole pool.
    pub fn snapshot(&self, now: DateTime<Utc>) -> Result<Board, LedgerError> {
        let sales = self.ledger.sales()?;
        let reservations = self.ledger.reservations()?;
        let board = classify(self.pool, &sales, &reservations, now);
        for anomaly in board.anomalies() {
            error!(%anomaly, "ledger invariant violated");
        }
        Ok(board)
    }
}

/// Private API
impl<L: Ledger> Engine<L> {
    /// Small helper to log `apply` outcomes
    fn log_outcome<T, E: std::fmt::Display>(
        op: &'static str,
        number: TicketNo,
        seller: &str,
        result: &Result<T, E>,
    ) {
        match result {
            Ok(_) => info!(op, number, seller, "applied"),
            Err(e) => info!(op, number, seller, reason = %e, "rejected"),
        }
    }

    fn in_range(&self, number: TicketNo) -> bool {
        (1..=self.pool).contains(&number)
    }

    /// The sale occupying `number`, if any (last writer wins on duplicates).
    fn sale_for(sales: &[SaleRecord], number: TicketNo) -> Option<&SaleRecord> {
        sales.iter().rev().find(|s| s.number == number)
    }

    /// The live hold that owns `number`: earliest creation time, ties broken
    /// by seller name so every client resolves a race the same way.
    fn earliest_live(
        reservations: &[ReservationRecord],
        number: TicketNo,
        now: DateTime<Utc>,
    ) -> Option<&ReservationRecord> {
        reservations
            .iter()
            .filter(|r| r.number == number && r.is_live(now))
            .min_by(|a, b| (a.created_at, &a.seller).cmp(&(b.created_at, &b.seller)))
    }

    /// Re-read after an append and void every live hold on `number` except
    /// the earliest. Returns the surviving hold.
    fn reconcile(
        &mut self,
        number: TicketNo,
        now: DateTime<Utc>,
    ) -> Result<Option<ReservationRecord>, LedgerError> {
        let reservations = self.ledger.reservations()?;
        let mut live: Vec<&ReservationRecord> = reservations
            .iter()
            .filter(|r| r.number == number && r.is_live(now))
            .collect();
        live.sort_by(|a, b| (a.created_at, &a.seller).cmp(&(b.created_at, &b.seller)));

        let Some((&winner, losers)) = live.split_first() else {
            return Ok(None);
        };
        let winner = winner.clone();
        for loser in losers {
            warn!(
                number,
                loser = %loser.seller,
                winner = %winner.seller,
                "duplicate hold detected, voiding the later one"
            );
            if let Err(e) = self
                .ledger
                .delete_reservation(number, &loser.seller, loser.created_at)
            {
                warn!(number, seller = %loser.seller, error = %e, "failed to void duplicate hold");
            }
        }
        Ok(Some(winner))
    }
}
