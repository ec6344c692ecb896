// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request as AxumRequest, State},
    http::{header, header::AUTHORIZATION, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use reverso_kernel::types::{ImageBuffer, ImageId, ImageShape, PixelFormat, VariantId};

use crate::api::*;
use crate::coordinator::Coordinator;
use crate::errors::EngineError;
use crate::generation::{GenerationEngine, JobState};
use crate::ledger::{VerificationRecord, VerificationStats};
use crate::scheduler::VerificationScheduler;

/// Largest raw pixel upload accepted.
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;
/// Upper bound on variants requested for one image.
pub const MAX_VARIANTS_PER_IMAGE: usize = 10_000;

pub struct GeneratorState {
    pub engine: Arc<GenerationEngine>,
    pub coordinator: Arc<Coordinator>,
    /// Default for `stuck?older_than_secs=` when omitted.
    pub stuck_after: Duration,
}

pub type SharedGenerator = Arc<GeneratorState>;
pub type SharedVerifier = Arc<VerificationScheduler>;

async fn auth_guard(
    State(token): State<Arc<String>>,
    req: AxumRequest,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.strip_prefix("Bearer "));

    match provided {
        Some(p) if p == token.as_str() => Ok(next.run(req).await),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

fn finish_router(app: Router, role: &'static str, auth_token: Option<String>) -> Router {
    let app = match auth_token {
        Some(token) => {
            tracing::info!("Auth Enabled: Bearer token required");
            app.layer(from_fn_with_state(Arc::new(token), auth_guard))
        }
        None => {
            tracing::warn!("Auth Disabled: No token configured");
            app
        }
    };

    // Liveness stays reachable without credentials.
    Router::new()
        .route("/health", get(move || health(role)))
        .merge(app)
        .layer(TraceLayer::new_for_http())
}

pub fn build_generator_router(state: SharedGenerator, auth_token: Option<String>) -> Router {
    let app = Router::new()
        .route(
            "/v1/images",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/v1/images/:id", get(image_progress))
        .route("/v1/images/:id/stats", get(image_stats))
        .route("/v1/images/:id/variants", get(image_variants))
        .route("/v1/images/:id/original", get(original_pixels))
        .route("/v1/variants/:id", get(variant_details))
        .route("/v1/variants/:id/pixels", get(variant_pixels))
        .route("/v1/variants/:id/sequence", get(variant_sequence))
        .route("/internal/variants/stuck", get(stuck_variants))
        .route("/internal/variants/:id/payload", get(pull_payload))
        .route("/internal/variants/:id/report", post(report_verdict))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    finish_router(app, "generator", auth_token)
}

pub fn build_verifier_router(state: SharedVerifier, auth_token: Option<String>) -> Router {
    let app = Router::new()
        .route("/internal/notify", post(notify))
        .route("/v1/verifications", get(verification_history))
        .route("/v1/verifications/stats", get(verification_stats))
        .route("/v1/verifications/:variant_id", get(variant_verifications))
        .route("/metrics", get(metrics_handler))
        .with_state(state);

    finish_router(app, "verifier", auth_token)
}

async fn health(role: &'static str) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "role": role }))
}

async fn metrics_handler() -> String {
    crate::telemetry::get_metrics()
}

// ---- Generation node ----

async fn upload_image(
    State(state): State<SharedGenerator>,
    Query(q): Query<UploadQuery>,
    body: Bytes,
) -> Result<(StatusCode, Json<UploadResponse>), EngineError> {
    let format = PixelFormat::parse(&q.format)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown pixel format {:?}", q.format)))?;
    let shape = ImageShape::new(q.width, q.height, format);
    let buffer = ImageBuffer::new(shape, body.to_vec()).map_err(|e| EngineError::InvalidInput(e.to_string()))?;

    let variant_count = q.variants.unwrap_or(state.engine.settings().variant_count);
    if variant_count == 0 || variant_count > MAX_VARIANTS_PER_IMAGE {
        return Err(EngineError::InvalidInput(format!(
            "variants must be within 1..={}",
            MAX_VARIANTS_PER_IMAGE
        )));
    }

    let image = state.engine.upload(buffer)?;
    let image_id = image.image_id;
    state.engine.begin(image_id, variant_count);

    let engine = state.engine.clone();
    tokio::spawn(async move {
        if let Err(e) = engine.generate(image_id, variant_count).await {
            tracing::error!("Generation for image {} failed: {}", image_id, e);
            engine.abandon(image_id, variant_count);
        }
    });

    Ok((StatusCode::ACCEPTED, Json(UploadResponse { image_id, variant_count })))
}

async fn image_progress(
    State(state): State<SharedGenerator>,
    Path(image_id): Path<ImageId>,
) -> Result<Json<ImageProgressResponse>, EngineError> {
    if let Some(job) = state.engine.job(image_id) {
        return Ok(Json(ImageProgressResponse {
            image_id,
            state: job.state,
            requested: job.requested,
            summary: job.summary,
        }));
    }

    // Generated before this process started: only the stored variants are known.
    state.engine.store().fetch_image(image_id)?;
    let stored = state.coordinator.variants(image_id)?.len();
    Ok(Json(ImageProgressResponse {
        image_id,
        state: if stored > 0 { JobState::Completed } else { JobState::Failed },
        requested: stored,
        summary: None,
    }))
}

async fn image_stats(
    State(state): State<SharedGenerator>,
    Path(image_id): Path<ImageId>,
) -> Result<Json<ImageStatsResponse>, EngineError> {
    state.engine.store().fetch_image(image_id)?;
    let generation_failed = state
        .engine
        .job(image_id)
        .and_then(|j| j.summary)
        .map(|s| s.failed.len())
        .unwrap_or(0);
    let stats = state.coordinator.image_stats(image_id, generation_failed)?;
    Ok(Json(ImageStatsResponse { image_id, stats }))
}

async fn image_variants(
    State(state): State<SharedGenerator>,
    Path(image_id): Path<ImageId>,
) -> Result<Json<Vec<VariantSummary>>, EngineError> {
    state.engine.store().fetch_image(image_id)?;
    Ok(Json(state.coordinator.variants(image_id)?))
}

fn octets(bytes: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/octet-stream")], bytes).into_response()
}

async fn original_pixels(
    State(state): State<SharedGenerator>,
    Path(image_id): Path<ImageId>,
) -> Result<Response, EngineError> {
    Ok(octets(state.coordinator.original_pixels(image_id)?))
}

async fn variant_details(
    State(state): State<SharedGenerator>,
    Path(variant_id): Path<VariantId>,
) -> Result<Json<VariantDetails>, EngineError> {
    Ok(Json(state.coordinator.details(variant_id)?))
}

async fn variant_pixels(
    State(state): State<SharedGenerator>,
    Path(variant_id): Path<VariantId>,
) -> Result<Response, EngineError> {
    Ok(octets(state.coordinator.variant_pixels(variant_id)?))
}

async fn variant_sequence(
    State(state): State<SharedGenerator>,
    Path(variant_id): Path<VariantId>,
) -> Result<Response, EngineError> {
    Ok(octets(state.coordinator.sequence_bytes(variant_id)?))
}

async fn pull_payload(
    State(state): State<SharedGenerator>,
    Path(variant_id): Path<VariantId>,
) -> Result<Response, EngineError> {
    let payload = state.coordinator.pull(variant_id)?;
    let bytes = payload.encode().map_err(|e| EngineError::Internal(e.to_string()))?;
    Ok(octets(bytes))
}

async fn report_verdict(
    State(state): State<SharedGenerator>,
    Path(variant_id): Path<VariantId>,
    Json(report): Json<ReportRequest>,
) -> Result<Json<ReportResponse>, EngineError> {
    Ok(Json(state.coordinator.report(variant_id, &report)?))
}

async fn stuck_variants(
    State(state): State<SharedGenerator>,
    Query(q): Query<StuckQuery>,
) -> Result<Json<StuckResponse>, EngineError> {
    let older_than = q.older_than_secs.map(Duration::from_secs).unwrap_or(state.stuck_after);
    Ok(Json(StuckResponse { variant_ids: state.coordinator.stuck(older_than)? }))
}

// ---- Verification node ----

async fn notify(
    State(scheduler): State<SharedVerifier>,
    Json(req): Json<NotifyRequest>,
) -> (StatusCode, Json<NotifyResponse>) {
    let admission = scheduler.submit(req.variant_id);
    tracing::debug!("Notify {}: {:?}", req.variant_id, admission);
    (
        StatusCode::ACCEPTED,
        Json(NotifyResponse { variant_id: req.variant_id, admission }),
    )
}

async fn verification_history(
    State(scheduler): State<SharedVerifier>,
    Query(q): Query<HistoryQuery>,
) -> Json<HistoryPage> {
    let offset = q.offset.unwrap_or(0);
    let (records, total, limit) = scheduler.ledger().history(q.limit.unwrap_or(20), offset);
    Json(HistoryPage { records, total, limit, offset })
}

async fn verification_stats(State(scheduler): State<SharedVerifier>) -> Json<VerificationStats> {
    Json(scheduler.ledger().stats())
}

async fn variant_verifications(
    State(scheduler): State<SharedVerifier>,
    Path(variant_id): Path<VariantId>,
) -> Result<Json<Vec<VerificationRecord>>, EngineError> {
    let records = scheduler.ledger().for_variant(variant_id);
    if records.is_empty() {
        return Err(EngineError::NotFound(format!("no verifications for variant {}", variant_id)));
    }
    Ok(Json(records))
}
