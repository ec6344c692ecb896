// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use reverso_node::config::{NodeConfig, NodeRole};
use reverso_node::coordinator::{Coordinator, Notifier};
use reverso_node::generation::GenerationEngine;
use reverso_node::ledger::VerificationLedger;
use reverso_node::network::{GeneratorClient, VerifierClient};
use reverso_node::scheduler::VerificationScheduler;
use reverso_node::server::{build_generator_router, build_verifier_router, GeneratorState};
use reverso_node::store::{file::FileStore, memory::MemoryStore, VariantStore};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    reverso_node::telemetry::init_telemetry();

    let cfg = NodeConfig::from_env()?;
    tracing::info!("Initializing Reverso node with config: {:?}", cfg);

    let app = match cfg.role {
        NodeRole::Generator => generator(&cfg)?,
        NodeRole::Verifier => verifier(&cfg)?,
    };

    let addr = cfg.bind_addr;
    tracing::info!("Listening on {} as {:?}", addr, cfg.role);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn generator(cfg: &NodeConfig) -> Result<axum::Router, BoxError> {
    let store: Arc<dyn VariantStore> = match &cfg.storage_dir {
        Some(dir) => {
            tracing::info!("Variant store at {:?}", dir);
            Arc::new(FileStore::open(dir)?)
        }
        None => {
            tracing::warn!("No storage dir configured; variants live in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let mut engine = GenerationEngine::new(store.clone(), cfg.generation.clone());
    match &cfg.protocol.peer_url {
        Some(url) => {
            let peer = Arc::new(VerifierClient::new(url, cfg.auth_token.clone()));
            let notifier = Arc::new(Notifier::new(store.clone(), peer, cfg.protocol.notify_retry));
            let (tx, rx) = mpsc::unbounded_channel();
            engine = engine.with_outbox(tx);
            tokio::spawn(notifier.clone().run(rx));
            notifier.spawn_reconciler(cfg.protocol.reconcile_interval, cfg.protocol.stuck_after);
            tracing::info!("Verifier peer at {}", url);
        }
        None => tracing::warn!("No verifier peer configured; variants stay unverified"),
    }

    let state = Arc::new(GeneratorState {
        engine: Arc::new(engine),
        coordinator: Arc::new(Coordinator::new(store, cfg.retention)),
        stuck_after: cfg.protocol.stuck_after,
    });
    Ok(build_generator_router(state, cfg.auth_token.clone()))
}

fn verifier(cfg: &NodeConfig) -> Result<axum::Router, BoxError> {
    let url = cfg
        .protocol
        .peer_url
        .as_deref()
        .ok_or("verifier needs REVERSO_PEER_URL")?;
    let peer = Arc::new(GeneratorClient::new(url, cfg.auth_token.clone()));

    let ledger = match &cfg.storage_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let ledger = VerificationLedger::open(dir.join("verifications.log"))?;
            tracing::info!("Ledger restored: {} records", ledger.len());
            ledger
        }
        None => VerificationLedger::in_memory(),
    };

    let scheduler = VerificationScheduler::new(peer, Arc::new(ledger), cfg.scheduler.clone());
    scheduler.start();
    scheduler.spawn_reconciler(cfg.protocol.reconcile_interval, cfg.protocol.stuck_after);
    tracing::info!("Generation peer at {}", url);

    Ok(build_verifier_router(scheduler, cfg.auth_token.clone()))
}
