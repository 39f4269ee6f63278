//! Pure classification of ticket state from a ledger snapshot.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{ReservationRecord, SaleRecord, TicketNo, TicketState};

/// A ledger condition the engine's invariants forbid.
///
/// Never resolved silently: classification still produces a state for the
/// ticket, and the anomaly is carried on the [`Board`] for the caller to
/// surface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Anomaly {
    #[error("ticket {0} has {1} sale records")]
    DuplicateSales(TicketNo, usize),

    #[error("ticket {0} has {1} live reservations")]
    DuplicateReservations(TicketNo, usize),
}

/// Classified snapshot of the whole pool at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Board {
    states: BTreeMap<TicketNo, TicketState>,
    anomalies: Vec<Anomaly>,
}

impl Board {
    pub fn state(&self, number: TicketNo) -> Option<&TicketState> {
        self.states.get(&number)
    }

    /// All tickets in number order.
    pub fn iter(&self) -> impl Iterator<Item = (TicketNo, &TicketState)> {
        self.states.iter().map(|(n, s)| (*n, s))
    }

    pub fn available(&self) -> impl Iterator<Item = TicketNo> + '_ {
        self.states
            .iter()
            .filter(|(_, s)| matches!(s, TicketState::Available))
            .map(|(n, _)| *n)
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.anomalies
    }
}

/// Compute the state of every ticket in `1..=pool` from the raw record sets.
///
/// A sale always shadows any reservation for the same number. Reservations
/// whose expiry has passed are treated as absent whether or not they have been
/// reaped yet. Duplicate sales resolve last-writer-wins for the displayed
/// owner; duplicate live reservations show the earliest holder, matching the
/// order the engine's reconciliation keeps. Both raise an [`Anomaly`].
pub fn classify(
    pool: TicketNo,
    sales: &[SaleRecord],
    reservations: &[ReservationRecord],
    now: DateTime<Utc>,
) -> Board {
    let in_range = |n: TicketNo| (1..=pool).contains(&n);

    let mut sold: HashMap<TicketNo, &SaleRecord> = HashMap::new();
    let mut sale_counts: HashMap<TicketNo, usize> = HashMap::new();
    for sale in sales.iter().filter(|s| in_range(s.number)) {
        *sale_counts.entry(sale.number).or_default() += 1;
        sold.insert(sale.number, sale);
    }

    let mut held: HashMap<TicketNo, &ReservationRecord> = HashMap::new();
    let mut live_counts: HashMap<TicketNo, usize> = HashMap::new();
    for reservation in reservations
        .iter()
        .filter(|r| in_range(r.number) && r.is_live(now))
    {
        *live_counts.entry(reservation.number).or_default() += 1;
        held.entry(reservation.number)
            .and_modify(|current| {
                if (reservation.created_at, &reservation.seller)
                    < (current.created_at, &current.seller)
                {
                    *current = reservation;
                }
            })
            .or_insert(reservation);
    }

    let mut anomalies: Vec<Anomaly> = Vec::new();
    for (&number, &count) in &sale_counts {
        if count > 1 {
            anomalies.push(Anomaly::DuplicateSales(number, count));
        }
    }
    for (&number, &count) in &live_counts {
        if count > 1 {
            anomalies.push(Anomaly::DuplicateReservations(number, count));
        }
    }
    anomalies.sort_by_key(|a| match *a {
        Anomaly::DuplicateSales(n, _) => (0, n),
        Anomaly::DuplicateReservations(n, _) => (1, n),
    });

    let states = (1..=pool)
        .map(|number| {
            let state = if let Some(sale) = sold.get(&number) {
                TicketState::Sold {
                    seller: sale.seller.clone(),
                    buyer: sale.buyer.name.clone(),
                }
            } else if let Some(reservation) = held.get(&number) {
                TicketState::Reserved {
                    seller: reservation.seller.clone(),
                    expires_at: reservation.expires_at,
                }
            } else {
                TicketState::Available
            };
            (number, state)
        })
        .collect();

    Board { states, anomalies }
}
