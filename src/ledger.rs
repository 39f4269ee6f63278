//! Ledger access for sale and reservation records.
//!
//! The ledger is the shared store all sellers coordinate through. It exposes
//! read-all, append and delete/update-row operations over two logical tables;
//! each call is atomic on its own, but read-then-write is not, which is the
//! constraint the engine is built around. No business logic lives here.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Amount;
use crate::model::{Buyer, ReservationRecord, SaleRecord, TicketNo};

/// Transient failure talking to the backing store.
///
/// Never interpreted as "available": callers see the error and retry.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Io(#[from] std::io::Error),

    #[error("ledger unavailable: {0}")]
    Csv(#[from] csv::Error),
}

/// Record store shared by all sellers.
pub trait Ledger {
    /// All sale records, in append order.
    fn sales(&self) -> Result<Vec<SaleRecord>, LedgerError>;

    /// All reservation records, in append order, expired ones included.
    fn reservations(&self) -> Result<Vec<ReservationRecord>, LedgerError>;

    fn append_sale(&mut self, record: SaleRecord) -> Result<(), LedgerError>;

    fn append_reservation(&mut self, record: ReservationRecord) -> Result<(), LedgerError>;

    /// Delete one reservation by its (number, seller, created_at) identity.
    /// Returns whether a record was removed; deleting an absent record is a no-op.
    fn delete_reservation(
        &mut self,
        number: TicketNo,
        seller: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError>;

    /// Overwrite the note of the sale for `number`, if one exists.
    /// Administrative edits only; the engine's own transitions never mutate sales.
    fn update_sale_note(&mut self, number: TicketNo, note: &str) -> Result<bool, LedgerError>;
}

/// In-process ledger for tests and benchmarks.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    sales: Vec<SaleRecord>,
    reservations: Vec<ReservationRecord>,
}

impl Ledger for MemoryLedger {
    fn sales(&self) -> Result<Vec<SaleRecord>, LedgerError> {
        Ok(self.sales.clone())
    }

    fn reservations(&self) -> Result<Vec<ReservationRecord>, LedgerError> {
        Ok(self.reservations.clone())
    }

    fn append_sale(&mut self, record: SaleRecord) -> Result<(), LedgerError> {
        self.sales.push(record);
        Ok(())
    }

    fn append_reservation(&mut self, record: ReservationRecord) -> Result<(), LedgerError> {
        self.reservations.push(record);
        Ok(())
    }

    fn delete_reservation(
        &mut self,
        number: TicketNo,
        seller: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let before = self.reservations.len();
        self.reservations
            .retain(|r| !(r.number == number && r.seller == seller && r.created_at == created_at));
        Ok(self.reservations.len() < before)
    }

    fn update_sale_note(&mut self, number: TicketNo, note: &str) -> Result<bool, LedgerError> {
        match self.sales.iter_mut().find(|s| s.number == number) {
            Some(sale) => {
                sale.note = Some(note.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

const SALES_FILE: &str = "sales.csv";
const RESERVATIONS_FILE: &str = "reservations.csv";

/// Persisted row layout for sales. The nested buyer is flattened here;
/// the shape of the files is this accessor's concern, not the engine's.
#[derive(Debug, Serialize, Deserialize)]
struct SaleRow {
    number: TicketNo,
    seller: String,
    buyer: String,
    phone: String,
    email: Option<String>,
    amount: Amount,
    created_at: DateTime<Utc>,
    note: Option<String>,
}

impl From<SaleRecord> for SaleRow {
    fn from(record: SaleRecord) -> Self {
        Self {
            number: record.number,
            seller: record.seller,
            buyer: record.buyer.name,
            phone: record.buyer.phone,
            email: record.buyer.email,
            amount: record.amount,
            created_at: record.created_at,
            note: record.note,
        }
    }
}

impl From<SaleRow> for SaleRecord {
    fn from(row: SaleRow) -> Self {
        Self {
            number: row.number,
            seller: row.seller,
            buyer: Buyer {
                name: row.buyer,
                phone: row.phone,
                email: row.email,
            },
            amount: row.amount,
            created_at: row.created_at,
            note: row.note,
        }
    }
}

/// Ledger backed by two csv files in a directory, one per table.
///
/// The counterpart of the original deployment's pair of shared worksheets:
/// everything is read back in full on every access, appends go to the end,
/// deletes rewrite the file.
#[derive(Debug)]
pub struct CsvLedger {
    dir: PathBuf,
}

impl CsvLedger {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn read_rows<T: DeserializeOwned>(&self, file: &str) -> Result<Vec<T>, LedgerError> {
        let path = self.dir.join(file);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut reader = csv::Reader::from_path(&path)?;
        let mut rows = Vec::new();
        for row in reader.deserialize() {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn append_row<T: Serialize>(&mut self, file: &str, row: &T) -> Result<(), LedgerError> {
        let path = self.dir.join(file);
        // only the first row of a file gets the header line
        let fresh = fs::metadata(&path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(fresh)
            .from_writer(file);
        writer.serialize(row)?;
        writer.flush()?;
        Ok(())
    }

    fn write_rows<T: Serialize>(&mut self, file: &str, rows: &[T]) -> Result<(), LedgerError> {
        let mut writer = csv::Writer::from_path(self.dir.join(file))?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl Ledger for CsvLedger {
    fn sales(&self) -> Result<Vec<SaleRecord>, LedgerError> {
        let rows: Vec<SaleRow> = self.read_rows(SALES_FILE)?;
        Ok(rows.into_iter().map(SaleRecord::from).collect())
    }

    fn reservations(&self) -> Result<Vec<ReservationRecord>, LedgerError> {
        self.read_rows(RESERVATIONS_FILE)
    }

    fn append_sale(&mut self, record: SaleRecord) -> Result<(), LedgerError> {
        self.append_row(SALES_FILE, &SaleRow::from(record))
    }

    fn append_reservation(&mut self, record: ReservationRecord) -> Result<(), LedgerError> {
        self.append_row(RESERVATIONS_FILE, &record)
    }

    fn delete_reservation(
        &mut self,
        number: TicketNo,
        seller: &str,
        created_at: DateTime<Utc>,
    ) -> Result<bool, LedgerError> {
        let rows = self.reservations()?;
        let before = rows.len();
        let kept: Vec<ReservationRecord> = rows
            .into_iter()
            .filter(|r| !(r.number == number && r.seller == seller && r.created_at == created_at))
            .collect();
        let hit = kept.len() < before;
        if hit {
            self.write_rows(RESERVATIONS_FILE, &kept)?;
        }
        Ok(hit)
    }

    fn update_sale_note(&mut self, number: TicketNo, note: &str) -> Result<bool, LedgerError> {
        let mut rows: Vec<SaleRow> = self.read_rows(SALES_FILE)?;
        match rows.iter_mut().find(|r| r.number == number) {
            Some(row) => {
                row.note = Some(note.to_string());
                self.write_rows(SALES_FILE, &rows)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
