// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Coordination protocol seams.
//!
//! ```text
//! generator                               verifier
//!   Generated -> VerificationRequested
//!   notify(variant_id) ----------------->  admit to work queue
//!                      <-----------------  pull(variant_id)
//!   PullPayload ------------------------>  reverse + compare
//!                      <-----------------  report(variant_id, verdict)
//!   -> VerifiedOk | VerifiedFailed | VerificationError
//! ```
//! Messages carry identities only (the payload is fetched, never pushed),
//! and every message is idempotent by identity. Both sides are reachable
//! in-process (tests, single binary) or over HTTP (`network::client`).

use std::time::Duration;

use async_trait::async_trait;
use reverso_kernel::types::VariantId;

use crate::api::{Admission, PullPayload, ReportRequest, ReportResponse};
use crate::errors::TransportError;

/// The verification side, as seen by the generator.
#[async_trait]
pub trait VerificationPeer: Send + Sync {
    async fn notify(&self, variant_id: VariantId) -> Result<Admission, TransportError>;
}

/// The generation side, as seen by the verifier.
#[async_trait]
pub trait GenerationPeer: Send + Sync {
    async fn pull(&self, variant_id: VariantId) -> Result<PullPayload, TransportError>;

    async fn report(&self, variant_id: VariantId, report: ReportRequest) -> Result<ReportResponse, TransportError>;

    /// Variants still waiting for a verdict after `older_than`.
    async fn stuck(&self, older_than: Duration) -> Result<Vec<VariantId>, TransportError>;
}
