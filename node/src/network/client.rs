// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! HTTP implementations of the protocol peers.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use reverso_kernel::types::VariantId;

use crate::api::{Admission, NotifyRequest, NotifyResponse, PullPayload, ReportRequest, ReportResponse, StuckResponse};
use crate::errors::TransportError;
use crate::protocol::{GenerationPeer, VerificationPeer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

fn build_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(0)
    } else {
        TransportError::Unreachable(e.to_string())
    }
}

async fn check_status(resp: Response) -> Result<Response, TransportError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(match status {
        StatusCode::NOT_FOUND => TransportError::NotFound(message),
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            TransportError::Rejected(format!("{}: {}", status, message))
        }
        _ => TransportError::Status { status: status.as_u16(), message },
    })
}

#[derive(Debug, Clone)]
struct Endpoint {
    base_url: String,
    client: Client,
    auth_token: Option<String>,
}

impl Endpoint {
    fn new(url: &str, auth_token: Option<String>) -> Self {
        Self {
            base_url: url.trim_end_matches('/').to_string(),
            client: build_client(),
            auth_token,
        }
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response, TransportError> {
        let resp = self.authorize(req).send().await.map_err(map_send_error)?;
        check_status(resp).await
    }
}

/// The generation node, reached over HTTP by a verifier.
#[derive(Debug, Clone)]
pub struct GeneratorClient {
    endpoint: Endpoint,
}

impl GeneratorClient {
    pub fn new(url: &str, auth_token: Option<String>) -> Self {
        Self { endpoint: Endpoint::new(url, auth_token) }
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }
}

#[async_trait]
impl GenerationPeer for GeneratorClient {
    async fn pull(&self, variant_id: VariantId) -> Result<PullPayload, TransportError> {
        let url = format!("{}/internal/variants/{}/payload", self.endpoint.base_url, variant_id);
        let resp = self.endpoint.send(self.endpoint.client.get(&url)).await?;
        let bytes = resp.bytes().await.map_err(|e| TransportError::Unreachable(e.to_string()))?;
        PullPayload::decode(&bytes)
    }

    async fn report(&self, variant_id: VariantId, report: ReportRequest) -> Result<ReportResponse, TransportError> {
        let url = format!("{}/internal/variants/{}/report", self.endpoint.base_url, variant_id);
        let resp = self.endpoint.send(self.endpoint.client.post(&url).json(&report)).await?;
        resp.json().await.map_err(|e| TransportError::Decode(e.to_string()))
    }

    async fn stuck(&self, older_than: Duration) -> Result<Vec<VariantId>, TransportError> {
        let url = format!(
            "{}/internal/variants/stuck?older_than_secs={}",
            self.endpoint.base_url,
            older_than.as_secs()
        );
        let resp = self.endpoint.send(self.endpoint.client.get(&url)).await?;
        let body: StuckResponse = resp.json().await.map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(body.variant_ids)
    }
}

/// The verification node, reached over HTTP by the generator.
#[derive(Debug, Clone)]
pub struct VerifierClient {
    endpoint: Endpoint,
}

impl VerifierClient {
    pub fn new(url: &str, auth_token: Option<String>) -> Self {
        Self { endpoint: Endpoint::new(url, auth_token) }
    }

    pub fn base_url(&self) -> &str {
        &self.endpoint.base_url
    }
}

#[async_trait]
impl VerificationPeer for VerifierClient {
    async fn notify(&self, variant_id: VariantId) -> Result<Admission, TransportError> {
        let url = format!("{}/internal/notify", self.endpoint.base_url);
        let resp = self
            .endpoint
            .send(self.endpoint.client.post(&url).json(&NotifyRequest { variant_id }))
            .await?;
        let body: NotifyResponse = resp.json().await.map_err(|e| TransportError::Decode(e.to_string()))?;
        Ok(body.admission)
    }
}
