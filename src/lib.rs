pub mod amount;
pub mod csv;
pub mod engine;
pub mod ledger;
pub mod model;
pub mod session;

pub use amount::Amount;
pub use engine::Engine;
pub use ledger::{CsvLedger, Ledger, LedgerError, MemoryLedger};
pub use model::{Command, TicketNo, TicketState};
pub use session::SellerSession;
