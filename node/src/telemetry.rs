// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use std::sync::OnceLock;

static PROM_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

pub const VARIANTS_GENERATED: &str = "reverso_variants_generated_total";
pub const VARIANTS_FAILED: &str = "reverso_variants_failed_total";
pub const VARIANT_GENERATION_SECONDS: &str = "reverso_variant_generation_seconds";
pub const NOTIFY_FAILURES: &str = "reverso_notify_failures_total";
pub const VERIFICATIONS: &str = "reverso_verifications_total";
pub const VERIFICATION_RETRIES: &str = "reverso_verification_retries_total";
pub const VERIFICATION_IN_FLIGHT: &str = "reverso_verification_in_flight";

/// Initialize telemetry (logs + metrics)
pub fn init_telemetry() {
    // Logs
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "reverso_node=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    // Metrics
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => {
            if PROM_HANDLE.set(handle).is_err() {
                tracing::warn!("Prometheus handle already set. Telemetry re-initialized?");
            }
        }
        Err(e) => {
            tracing::warn!("Prometheus recorder not installed: {}", e);
            return;
        }
    }

    metrics::describe_counter!(VARIANTS_GENERATED, "Variants generated and persisted");
    metrics::describe_counter!(VARIANTS_FAILED, "Variants that could not be generated or persisted");
    metrics::describe_histogram!(VARIANT_GENERATION_SECONDS, "Time to build one variant");
    metrics::describe_counter!(NOTIFY_FAILURES, "Notifications the verifier did not acknowledge");
    metrics::describe_counter!(VERIFICATIONS, "Finished verifications by verdict");
    metrics::describe_counter!(VERIFICATION_RETRIES, "Verification attempts retried after a transport error");
    metrics::describe_gauge!(VERIFICATION_IN_FLIGHT, "Verifications currently running");

    metrics::gauge!("reverso_node_up", 1.0);
}

/// Get the Prometheus handle to render metrics
pub fn get_metrics() -> String {
    if let Some(handle) = PROM_HANDLE.get() {
        handle.render()
    } else {
        "# metrics not initialized".to_string()
    }
}
