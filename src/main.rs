// src/main.rs
//
// Minimal demo node: in-memory storage, no real LLM service configured
// (falls back to the null handle, which always exhausts retries; under the
// default `Optional` validation policy this admits entries as
// `ValidationStatus::Pending` rather than rejecting them), a fixed-interval
// mining loop. Good enough to exercise the admission pipeline and
// proof-of-work end to end; a real deployment would swap in
// `RocksDbStorage` and `HttpLlmHandle`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use ledger::chain::ChainState;
use ledger::config::LedgerConfig;
use ledger::storage::InMemoryStorage;
use ledger::types::{Entry, Metadata};
use ledger::validation::NullLlmHandle;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(err) = run_node().await {
        error!(%err, "fatal error");
        std::process::exit(1);
    }
}

async fn run_node() -> Result<(), String> {
    let mut config = LedgerConfig::default();
    // The demo entries below are unsigned; a real node requires signatures.
    config.admission.require_signature = false;
    let storage = Arc::new(InMemoryStorage::new());
    let llm = Arc::new(NullLlmHandle);

    let chain = Arc::new(
        ChainState::load(storage, llm, config)
            .await
            .map_err(|e| format!("failed to load chain state: {e}"))?,
    );

    info!("starting demo node with in-memory storage and the null LLM handle");

    let mut tick: u64 = 0;
    loop {
        let entry = Entry::new(
            format!("Demo entry #{tick}: the node is alive and mining."),
            "demo-node".to_string(),
            "note".to_string(),
            Utc::now(),
            Metadata::new(),
        );

        match chain.submit(entry).await {
            Ok(()) => info!(tick, "submitted demo entry"),
            Err(err) => error!(%err, "failed to submit demo entry"),
        }

        match chain.mine().await {
            Ok(block) => info!(index = block.header.index, "mined block"),
            Err(err) => error!(%err, "failed to mine block"),
        }

        tick += 1;
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
}
