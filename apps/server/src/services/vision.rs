//! Vision extraction client.
//!
//! Wraps one call to the external image-understanding service: fetches the
//! stored bet slip, sends it for analysis under a timeout, classifies failures
//! and scores the confidence of the fields it got back.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::VisionSettings;
use crate::error::AppError;
use crate::models::FieldConfidence;

use super::storage::ImageStore;

/// Confidence deducted for each unresolved critical field.
pub const MISSING_FIELD_PENALTY: f64 = 25.0;

/// Connect timeout for the vision service.
const HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Total timeout for the health probe.
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Per-attempt extraction failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VisionError {
    /// Upstream outage, 5xx or connection failure
    #[error("vision service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The service could not read the image
    #[error("image processing failed: {0}")]
    ImageProcessingFailed(String),

    /// The call exceeded its timeout (milliseconds)
    #[error("vision request timed out after {0}ms")]
    Timeout(u64),

    /// The stored image no longer exists
    #[error("bet slip image not found: {0}")]
    ImageNotFound(String),
}

impl VisionError {
    /// Whether another attempt could succeed.
    pub fn retryable(&self) -> bool {
        !matches!(self, VisionError::ImageNotFound(_))
    }
}

/// The external image-understanding service.
#[async_trait]
pub trait VisionBackend: Send + Sync {
    /// Analyse one image and return the service's raw JSON answer.
    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<JsonValue, VisionError>;

    /// Whether the service is reachable.
    async fn health(&self) -> bool;
}

/// `VisionBackend` over HTTP.
///
/// Sends `POST {endpoint}/analyze` with a base64 image and reads back a JSON
/// object with `betAmount`, `teamBetOn`, `odds`, `confidence` and
/// `fieldConfidence`.
pub struct HttpVisionBackend {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
    timeout: Duration,
}

impl HttpVisionBackend {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .connect_timeout(HTTP_CONNECT_TIMEOUT)
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build vision HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            timeout,
        })
    }

    pub fn from_settings(settings: &VisionSettings) -> Result<Option<Self>, AppError> {
        match settings.endpoint {
            Some(ref endpoint) => Ok(Some(Self::new(
                endpoint.clone(),
                settings.api_key.clone(),
                settings.timeout(),
            )?)),
            None => Ok(None),
        }
    }

    fn classify(&self, err: reqwest::Error) -> VisionError {
        if err.is_timeout() {
            VisionError::Timeout(self.timeout.as_millis() as u64)
        } else {
            VisionError::ServiceUnavailable(err.to_string())
        }
    }
}

#[async_trait]
impl VisionBackend for HttpVisionBackend {
    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<JsonValue, VisionError> {
        let mut request = self
            .client
            .post(format!("{}/analyze", self.endpoint))
            .json(&json!({
                "image": BASE64.encode(image),
                "contentType": content_type,
            }));

        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();

        if status.is_server_error() {
            return Err(VisionError::ServiceUnavailable(format!("upstream returned {}", status)));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(VisionError::ImageProcessingFailed(format!(
                "upstream returned {}: {}",
                status, body
            )));
        }

        response.json::<JsonValue>().await.map_err(|e| {
            if e.is_timeout() {
                self.classify(e)
            } else {
                VisionError::ServiceUnavailable(format!("invalid response body: {}", e))
            }
        })
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(format!("{}/health", self.endpoint))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Vision health probe failed: {}", e);
                false
            }
        }
    }
}

/// Parsed output of one successful extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionResult {
    pub bet_amount: Option<Decimal>,
    pub team_bet_on: Option<String>,
    pub odds: Option<String>,
    /// 0-100, two decimal places.
    pub confidence_score: f64,
    pub field_confidence: FieldConfidence,
    pub warnings: Vec<String>,
    pub raw_response: JsonValue,
}

impl ExtractionResult {
    /// Parse and score a raw service response.
    ///
    /// Each key is read on its own, so one malformed value only costs that
    /// value. Anything other than a JSON object is an unreadable answer.
    pub fn from_raw(raw: JsonValue) -> Result<Self, VisionError> {
        let Some(body) = raw.as_object() else {
            return Err(VisionError::ImageProcessingFailed(format!(
                "expected a JSON object from the vision service, got {}",
                json_kind(&raw)
            )));
        };

        let bet_amount = lookup(body, "betAmount", "bet_amount").and_then(parse_amount);
        let team_bet_on = lookup(body, "teamBetOn", "team_bet_on").and_then(parse_text);
        let odds = lookup(body, "odds", "odds").and_then(parse_text);

        let reported = lookup(body, "fieldConfidence", "field_confidence")
            .and_then(JsonValue::as_object);
        let reported_score = |camel: &str, snake: &str| {
            reported
                .and_then(|scores| lookup(scores, camel, snake))
                .and_then(parse_score)
        };

        let mut warnings = Vec::new();
        let mut missing = 0u32;

        let mut field = |present: bool, reported: Option<f64>, label: &str| -> f64 {
            if present {
                clamp_score(reported.unwrap_or(0.0))
            } else {
                missing += 1;
                warnings.push(format!("{} not detected", label));
                0.0
            }
        };

        let field_confidence = FieldConfidence {
            bet_amount: field(
                bet_amount.is_some(),
                reported_score("betAmount", "bet_amount"),
                "bet amount",
            ),
            team_bet_on: field(
                team_bet_on.is_some(),
                reported_score("teamBetOn", "team_bet_on"),
                "team bet on",
            ),
            odds: field(odds.is_some(), reported_score("odds", "odds"), "odds"),
        };

        let base = lookup(body, "confidence", "confidence")
            .and_then(parse_score)
            .map(clamp_score)
            .unwrap_or_else(|| {
                (field_confidence.bet_amount
                    + field_confidence.team_bet_on
                    + field_confidence.odds)
                    / 3.0
            });
        let confidence_score =
            round_2dp(clamp_score(base - MISSING_FIELD_PENALTY * f64::from(missing)));

        Ok(Self {
            bet_amount,
            team_bet_on,
            odds,
            confidence_score,
            field_confidence,
            warnings,
            raw_response: raw,
        })
    }
}

/// Read `camel`, falling back to its snake_case spelling. Nulls count as absent.
fn lookup<'a>(
    object: &'a serde_json::Map<String, JsonValue>,
    camel: &str,
    snake: &str,
) -> Option<&'a JsonValue> {
    object
        .get(camel)
        .or_else(|| object.get(snake))
        .filter(|value| !value.is_null())
}

/// Scores come back as numbers or numeric strings, optionally with a `%`.
fn parse_score(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

/// Amounts come back as numbers or as strings like "$1,250.00".
fn parse_amount(value: &JsonValue) -> Option<Decimal> {
    let amount = match value {
        JsonValue::Number(n) => Decimal::from_str(&n.to_string()).ok()?,
        JsonValue::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            Decimal::from_str(&cleaned).ok()?
        }
        _ => return None,
    };

    (amount > Decimal::ZERO).then(|| amount.round_dp(2))
}

fn parse_text(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

fn round_2dp(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Per-call options.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractOptions {
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
}

/// Result of a vision health probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct VisionHealth {
    pub available: bool,
}

/// Extraction client shared by the workers.
#[derive(Clone)]
pub struct VisionExtractionClient {
    backend: Option<Arc<dyn VisionBackend>>,
    images: Arc<dyn ImageStore>,
    default_timeout: Duration,
}

impl VisionExtractionClient {
    /// `backend` is `None` when no vision endpoint is configured; every
    /// attempt then fails as `ServiceUnavailable`.
    pub fn new(
        backend: Option<Arc<dyn VisionBackend>>,
        images: Arc<dyn ImageStore>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            images,
            default_timeout,
        }
    }

    /// Extract wager fields from a stored bet-slip image.
    pub async fn extract(
        &self,
        image_ref: &str,
        content_type: &str,
        options: ExtractOptions,
    ) -> Result<ExtractionResult, VisionError> {
        let backend = self.backend.as_ref().ok_or_else(|| {
            VisionError::ServiceUnavailable("no vision endpoint configured".to_string())
        })?;

        let image = self.images.get(image_ref).await.map_err(|e| match e {
            AppError::NotFound(_) => VisionError::ImageNotFound(image_ref.to_string()),
            other => VisionError::ServiceUnavailable(format!("image fetch failed: {}", other)),
        })?;

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let raw = tokio::time::timeout(timeout, backend.analyze(&image, content_type))
            .await
            .map_err(|_| VisionError::Timeout(timeout.as_millis() as u64))??;

        let result = ExtractionResult::from_raw(raw)?;
        if !result.warnings.is_empty() {
            warn!(
                image_ref,
                confidence = result.confidence_score,
                "Extraction incomplete: {}",
                result.warnings.join(", ")
            );
        }
        Ok(result)
    }

    /// Probe the vision service. Never fails.
    pub async fn health_check(&self) -> VisionHealth {
        let available = match self.backend {
            Some(ref backend) => backend.health().await,
            None => false,
        };
        VisionHealth { available }
    }
}
