use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use thiserror::Error;

use crate::Amount;
use crate::engine::Board;
use crate::model::{Buyer, Command, DEFAULT_LEASE_SECS, TicketNo, TicketState};

/// Price per ticket when a command row does not carry one.
const DEFAULT_PRICE: i64 = 10_000;

/// Errors that can occur when parsing csv command rows
#[derive(Debug, Error)]
pub enum CsvError {
    #[error("line {line}: failed to parse row: {source}")]
    Parse { line: usize, source: csv::Error },

    #[error("line {line}: unrecognized op '{op}'")]
    UnrecognizedOp { line: usize, op: String },

    #[error("line {line}: {op} missing {field}")]
    MissingField {
        line: usize,
        op: String,
        field: &'static str,
    },
}

#[derive(Debug, Deserialize)]
struct InputRow {
    op: String,
    at: Option<DateTime<Utc>>,
    number: Option<TicketNo>,
    seller: Option<String>,
    buyer: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    amount: Option<Amount>,
    note: Option<String>,
    lease_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
struct OutputRow {
    number: TicketNo,
    state: &'static str,
    seller: String,
    buyer: String,
    expires: String,
}

fn require<T>(
    value: Option<T>,
    line: usize,
    op: &'static str,
    field: &'static str,
) -> Result<T, CsvError> {
    value.ok_or(CsvError::MissingField {
        line,
        op: op.to_string(),
        field,
    })
}

/// Read commands from a csv file. Rows without an explicit timestamp are
/// stamped with the wall clock as they are read.
pub fn read_commands(path: impl AsRef<Path>) -> impl Iterator<Item = Result<Command, CsvError>> {
    let reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .expect("failed to open csv file");

    reader
        .into_deserialize::<InputRow>()
        .enumerate()
        .map(|(idx, result)| {
            let line = idx + 2; // 1-indexed, skip header
            let row = result.map_err(|source| CsvError::Parse { line, source })?;
            let at = row.at.unwrap_or_else(Utc::now);
            match row.op.as_str() {
                "reserve" => Ok(Command::Reserve {
                    number: require(row.number, line, "reserve", "number")?,
                    seller: require(row.seller, line, "reserve", "seller")?,
                    lease: Duration::seconds(row.lease_secs.unwrap_or(DEFAULT_LEASE_SECS)),
                    at,
                }),
                "confirm" => Ok(Command::Confirm {
                    number: require(row.number, line, "confirm", "number")?,
                    seller: require(row.seller, line, "confirm", "seller")?,
                    buyer: Buyer {
                        name: require(row.buyer, line, "confirm", "buyer")?,
                        phone: require(row.phone, line, "confirm", "phone")?,
                        email: row.email,
                    },
                    amount: row.amount.unwrap_or(Amount::from_major(DEFAULT_PRICE)),
                    note: row.note,
                    at,
                }),
                "cancel" => Ok(Command::Cancel {
                    number: require(row.number, line, "cancel", "number")?,
                    seller: require(row.seller, line, "cancel", "seller")?,
                    at,
                }),
                "sell" => Ok(Command::Sell {
                    number: require(row.number, line, "sell", "number")?,
                    seller: require(row.seller, line, "sell", "seller")?,
                    buyer: Buyer {
                        name: require(row.buyer, line, "sell", "buyer")?,
                        phone: require(row.phone, line, "sell", "phone")?,
                        email: row.email,
                    },
                    amount: row.amount.unwrap_or(Amount::from_major(DEFAULT_PRICE)),
                    note: row.note,
                    at,
                }),
                "reap" => Ok(Command::Reap { at }),
                other => Err(CsvError::UnrecognizedOp {
                    line,
                    op: other.to_string(),
                }),
            }
        })
}

/// write the classified board to stdout in csv format
pub fn write_board(board: &Board) {
    let stdout = io::stdout();
    let mut writer = csv::Writer::from_writer(stdout.lock());

    for (number, state) in board.iter() {
        let row = match state {
            TicketState::Available => OutputRow {
                number,
                state: "available",
                seller: String::new(),
                buyer: String::new(),
                expires: String::new(),
            },
            TicketState::Reserved { seller, expires_at } => OutputRow {
                number,
                state: "reserved",
                seller: seller.clone(),
                buyer: String::new(),
                expires: expires_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            },
            TicketState::Sold { seller, buyer } => OutputRow {
                number,
                state: "sold",
                seller: seller.clone(),
                buyer: buyer.clone(),
                expires: String::new(),
            },
        };
        writer.serialize(&row).expect("failed to write csv row");
    }

    writer.flush().expect("failed to flush csv writer");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "op,at,number,seller,buyer,phone,email,amount,note,lease_secs\n";

    fn write_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    #[test]
    fn read_reserve() {
        let file = write_csv(&format!(
            "{HEADER}reserve,2026-03-01T10:00:00Z,3,ana,,,,,,600\n"
        ));
        let results: Vec<_> = read_commands(file.path()).collect();
        assert_eq!(results.len(), 1);

        let cmd = results.into_iter().next().unwrap().unwrap();
        match cmd {
            Command::Reserve {
                number,
                seller,
                lease,
                at: stamp,
            } => {
                assert_eq!(number, 3);
                assert_eq!(seller, "ana");
                assert_eq!(lease, Duration::seconds(600));
                assert_eq!(stamp, at("2026-03-01T10:00:00Z"));
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn read_reserve_defaults_lease() {
        let file = write_csv(&format!("{HEADER}reserve,2026-03-01T10:00:00Z,3,ana,,,,,,\n"));
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        match cmd {
            Command::Reserve { lease, .. } => {
                assert_eq!(lease, Duration::seconds(DEFAULT_LEASE_SECS));
            }
            _ => panic!("expected reserve"),
        }
    }

    #[test]
    fn read_confirm_with_buyer_details() {
        let file = write_csv(&format!(
            "{HEADER}confirm,2026-03-01T10:02:00Z,3,ana,Ximena,555-0100,x@example.com,12500.50,paid,\n"
        ));
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        match cmd {
            Command::Confirm {
                number,
                seller,
                buyer,
                amount,
                note,
                ..
            } => {
                assert_eq!(number, 3);
                assert_eq!(seller, "ana");
                assert_eq!(buyer.name, "Ximena");
                assert_eq!(buyer.phone, "555-0100");
                assert_eq!(buyer.email.as_deref(), Some("x@example.com"));
                assert_eq!(amount, Amount::from_scaled(1_250_050));
                assert_eq!(note.as_deref(), Some("paid"));
            }
            _ => panic!("expected confirm"),
        }
    }

    #[test]
    fn read_confirm_defaults_amount() {
        let file = write_csv(&format!(
            "{HEADER}confirm,2026-03-01T10:02:00Z,3,ana,Ximena,555-0100,,,,\n"
        ));
        let cmd = read_commands(file.path()).next().unwrap().unwrap();
        match cmd {
            Command::Confirm { amount, .. } => {
                assert_eq!(amount, Amount::from_major(DEFAULT_PRICE));
            }
            _ => panic!("expected confirm"),
        }
    }

    #[test]
    fn read_cancel_and_reap() {
        let file = write_csv(&format!(
            "{HEADER}cancel,2026-03-01T10:03:00Z,3,ana,,,,,,\nreap,2026-03-01T10:04:00Z,,,,,,,,\n"
        ));
        let results: Vec<_> = read_commands(file.path()).collect();
        assert!(matches!(
            results[0].as_ref().unwrap(),
            Command::Cancel { number: 3, .. }
        ));
        assert!(matches!(results[1].as_ref().unwrap(), Command::Reap { .. }));
    }

    #[test]
    fn read_with_whitespace() {
        let file = write_csv(
            "op, at, number, seller, buyer, phone, email, amount, note, lease_secs\nreserve, 2026-03-01T10:00:00Z, 3, ana, , , , , , \n",
        );
        let results: Vec<_> = read_commands(file.path()).collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_ok());
    }

    #[test]
    fn read_returns_error_for_unknown_op() {
        let file = write_csv(&format!("{HEADER}frobnicate,,3,ana,,,,,,\n"));
        let results: Vec<_> = read_commands(file.path()).collect();
        let err = results[0].as_ref().unwrap_err();
        assert!(matches!(err, CsvError::UnrecognizedOp { line: 2, .. }));
    }

    #[test]
    fn read_returns_error_for_missing_field() {
        let file = write_csv(&format!(
            "{HEADER}reserve,2026-03-01T10:00:00Z,,ana,,,,,,\nconfirm,2026-03-01T10:01:00Z,3,ana,,555-0100,,,,\n"
        ));
        let results: Vec<_> = read_commands(file.path()).collect();
        assert!(matches!(
            results[0].as_ref().unwrap_err(),
            CsvError::MissingField {
                line: 2,
                field: "number",
                ..
            }
        ));
        assert!(matches!(
            results[1].as_ref().unwrap_err(),
            CsvError::MissingField {
                line: 3,
                field: "buyer",
                ..
            }
        ));
    }
}
