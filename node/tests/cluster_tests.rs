// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::time::Duration;

use reverso_node::api::{HistoryPage, ImageStatsResponse, ReportVerdict, UploadResponse};
use reverso_node::config::{GenerationSettings, OriginalRetention, RetryPolicy, SchedulerSettings};
use reverso_node::coordinator::{Coordinator, Notifier};
use reverso_node::generation::GenerationEngine;
use reverso_node::ledger::VerificationLedger;
use reverso_node::network::{GeneratorClient, VerifierClient};
use reverso_node::scheduler::VerificationScheduler;
use reverso_node::server::{build_generator_router, build_verifier_router, GeneratorState};
use reverso_node::store::FileStore;
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const TOKEN: &str = "cluster-token";

// Generator and verifier as two HTTP services talking notify/pull/report.
#[tokio::test]
async fn test_two_node_cluster_verifies_uploaded_image() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let gen_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ver_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let gen_url = format!("http://{}", gen_listener.local_addr().unwrap());
    let ver_url = format!("http://{}", ver_listener.local_addr().unwrap());

    // ---- Generator ----
    let dir = tempdir().unwrap();
    let store = Arc::new(FileStore::open(dir.path().join("variants")).unwrap());
    let retry = RetryPolicy { max_attempts: 3, base_delay: Duration::from_millis(20), max_delay: Duration::from_millis(200) };
    let notifier = Arc::new(Notifier::new(
        store.clone(),
        Arc::new(VerifierClient::new(&ver_url, Some(TOKEN.into()))),
        retry,
    ));
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(notifier.clone().run(rx));
    notifier.spawn_reconciler(Duration::from_millis(200), Duration::from_millis(100));

    let engine = GenerationEngine::new(store.clone(), GenerationSettings { workers: 2, ..Default::default() }).with_outbox(tx);
    let state = Arc::new(GeneratorState {
        engine: Arc::new(engine),
        coordinator: Arc::new(Coordinator::new(store, OriginalRetention::Exact)),
        stuck_after: Duration::from_secs(60),
    });
    let gen_app = build_generator_router(state, Some(TOKEN.into()));
    tokio::spawn(async move {
        axum::serve(gen_listener, gen_app).await.unwrap();
    });

    // ---- Verifier ----
    let ledger = Arc::new(VerificationLedger::open(dir.path().join("verifications.log")).unwrap());
    let scheduler = VerificationScheduler::new(
        Arc::new(GeneratorClient::new(&gen_url, Some(TOKEN.into()))),
        ledger.clone(),
        SchedulerSettings { max_in_flight: 4, retry, ..Default::default() },
    );
    scheduler.start().unwrap();
    let ver_app = build_verifier_router(scheduler.clone(), Some(TOKEN.into()));
    tokio::spawn(async move {
        axum::serve(ver_listener, ver_app).await.unwrap();
    });

    // ---- Upload ----
    let client = reqwest::Client::new();
    let pixels: Vec<u8> = (0..12 * 10 * 4).map(|i| (i % 256) as u8).collect();
    let res = client
        .post(format!("{}/v1/images?width=12&height=10&format=rgba8&variants=8", gen_url))
        .bearer_auth(TOKEN)
        .body(pixels)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::ACCEPTED);
    let accepted: UploadResponse = res.json().await.unwrap();

    let mut last = None;
    for _ in 0..300 {
        let stats: ImageStatsResponse = client
            .get(format!("{}/v1/images/{}/stats", gen_url, accepted.image_id))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let done = stats.stats.verified_ok == 8;
        last = Some(stats.stats);
        if done {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let stats = last.unwrap();
    assert_eq!(stats.total, 8, "{:?}", stats);
    assert_eq!(stats.verified_ok, 8, "{:?}", stats);
    assert_eq!(stats.verified_failed + stats.verification_error, 0);

    // Verifier history is served over HTTP too.
    for _ in 0..100 {
        if ledger.len() == 8 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let page: HistoryPage = client
        .get(format!("{}/v1/verifications?limit=50", ver_url))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page.total, 8);
    assert!(page.records.iter().all(|r| r.verdict == ReportVerdict::Match));

    // Without the token the verifier refuses notifications.
    let res = client
        .post(format!("{}/internal/notify", ver_url))
        .json(&serde_json::json!({ "variant_id": page.records[0].variant_id }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), reqwest::StatusCode::UNAUTHORIZED);
}
