use std::env;

use chrono::Utc;
use raffle_eng::Engine;
use raffle_eng::csv::{read_commands, write_board};
use raffle_eng::ledger::{CsvLedger, Ledger, MemoryLedger};
use tokio_stream::wrappers::ReceiverStream;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let path = env::args()
        .nth(1)
        .expect("usage: raffle-eng <commands.csv> [ledger-dir]");

    if !path.ends_with(".csv") {
        warn!(path, "input file seems to not be a csv file");
    }

    match env::args().nth(2) {
        Some(dir) => {
            let ledger = CsvLedger::open(dir).expect("failed to open ledger directory");
            run(Engine::new(ledger), path).await;
        }
        None => run(Engine::new(MemoryLedger::default()), path).await,
    }
}

async fn run<L: Ledger>(mut engine: Engine<L>, path: String) {
    let (cmd_sender, cmd_receiver) = tokio::sync::mpsc::channel(16);

    tokio::spawn(async move {
        for result in read_commands(&path) {
            match result {
                Ok(cmd) => {
                    cmd_sender.send(cmd).await.unwrap();
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    engine.run(ReceiverStream::new(cmd_receiver)).await;

    let board = engine.snapshot(Utc::now()).expect("failed to read ledger");
    write_board(&board);
}
