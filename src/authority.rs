/*!
 * Decision authority client
 *
 * The authority is consulted when policy says `refer`. It receives the
 * base64-encoded document and its detected type and answers with a verdict.
 *
 * HTTP contract of `HttpDecisionAuthority`:
 *
 * ```text
 * POST {base}/api/Decide
 *   {"Base64Body": "...", "DetectedFiletype": "Docx"}
 *
 * 200 OK
 *   ncfs-decision: block | relay | replace
 *   {"base64Replacement": "...", "replacementMimeType": "text/html"}
 * ```
 */

use crate::core::{EscalationVerdict, FileCategory};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Response header carrying the verdict
pub const DECISION_HEADER: &str = "ncfs-decision";

/// Path of the decision endpoint relative to the base URL
pub const DECIDE_PATH: &str = "/api/Decide";

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("decision authority unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("decision authority returned HTTP {0}")]
    Status(u16),

    #[error("decision authority response has no ncfs-decision header")]
    MissingDecision,

    #[error("unrecognised decision '{0}'")]
    UnknownDecision(String),

    #[error("invalid replacement payload: {0}")]
    InvalidReplacement(String),
}

pub type Result<T> = std::result::Result<T, AuthorityError>;

/// External service that rules on documents local policy will not decide
#[async_trait]
pub trait DecisionAuthority: Send + Sync + 'static {
    async fn decide(&self, base64_payload: &str, category: &FileCategory)
        -> Result<EscalationVerdict>;
}

#[derive(Debug, Serialize)]
struct DecideRequest<'a> {
    #[serde(rename = "Base64Body")]
    base64_body: &'a str,
    #[serde(rename = "DetectedFiletype")]
    detected_filetype: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DecideResponse {
    #[serde(default)]
    base64_replacement: Option<String>,
    #[serde(default)]
    replacement_mime_type: Option<String>,
}

/// Decision authority reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpDecisionAuthority {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDecisionAuthority {
    /// Client for `base_url` with a per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: format!("{}{}", base_url.trim_end_matches('/'), DECIDE_PATH),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DecisionAuthority for HttpDecisionAuthority {
    async fn decide(
        &self,
        base64_payload: &str,
        category: &FileCategory,
    ) -> Result<EscalationVerdict> {
        let request = DecideRequest {
            base64_body: base64_payload,
            detected_filetype: category.type_name(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AuthorityError::Status(status.as_u16()));
        }

        let decision = response
            .headers()
            .get(DECISION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;

        debug!(
            endpoint = %self.endpoint,
            decision = ?decision,
            body_len = body.len(),
            "Decision authority responded"
        );
        parse_decision(decision.as_deref(), &body)
    }
}

/// Turn the verdict header and response body into a verdict
pub fn parse_decision(decision: Option<&str>, body: &str) -> Result<EscalationVerdict> {
    let decision = decision
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or(AuthorityError::MissingDecision)?;

    match decision.to_ascii_lowercase().as_str() {
        "block" => Ok(EscalationVerdict::Block),
        "relay" => Ok(EscalationVerdict::Relay),
        "replace" => {
            let response: DecideResponse = if body.trim().is_empty() {
                DecideResponse::default()
            } else {
                serde_json::from_str(body)
                    .map_err(|e| AuthorityError::InvalidReplacement(e.to_string()))?
            };

            let encoded = response
                .base64_replacement
                .filter(|s| !s.is_empty())
                .ok_or_else(|| {
                    AuthorityError::InvalidReplacement("no replacement supplied".to_string())
                })?;
            let payload = STANDARD
                .decode(encoded.trim())
                .map_err(|e| AuthorityError::InvalidReplacement(e.to_string()))?;
            if payload.is_empty() {
                return Err(AuthorityError::InvalidReplacement(
                    "replacement is empty".to_string(),
                ));
            }

            Ok(EscalationVerdict::Replace {
                payload,
                mime_type: response.replacement_mime_type.filter(|m| !m.trim().is_empty()),
            })
        }
        other => Err(AuthorityError::UnknownDecision(other.to_string())),
    }
}
