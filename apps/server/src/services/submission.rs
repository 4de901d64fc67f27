//! Sign-up submission service.
//!
//! The synchronous entry point: validates the request, returns an earlier
//! sign-up for a repeated idempotency key, rejects duplicates, locks the
//! operator's commission rate, stores the bet-slip image and persists the
//! sign-up together with its extraction job.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::SubmissionSettings;
use crate::db::DbPool;
use crate::db::sign_ups::{InsertOutcome, NewSignUp};
use crate::error::{AppError, AppResult};
use crate::models::{
    SignUp, SignUpChannel, SubmitSignUpRequest, SubmitSignUpResponse, decimal_to_cents,
};

use super::rates::CommissionRates;
use super::storage::{ALLOWED_IMAGE_TYPES, ImageStore};

const MAX_NAME_LEN: usize = 200;
const MAX_EMAIL_LEN: usize = 254;
const MAX_PHONE_LEN: usize = 32;
const MAX_STATE_LEN: usize = 64;

/// A decoded, validated bet-slip image.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub bytes: Vec<u8>,
    pub content_type: String,
    pub sha256: String,
}

/// Request fields after validation and normalisation.
#[derive(Debug, Clone)]
struct ValidatedSubmission {
    idempotency_key: Uuid,
    operator_id: Uuid,
    event_id: Option<Uuid>,
    solo_chat_id: Option<Uuid>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    customer_state: Option<String>,
    image: Option<DecodedImage>,
}

#[derive(Clone)]
pub struct SubmissionService {
    pool: DbPool,
    rates: Arc<dyn CommissionRates>,
    images: Arc<dyn ImageStore>,
    settings: SubmissionSettings,
}

impl SubmissionService {
    pub fn new(
        pool: DbPool,
        rates: Arc<dyn CommissionRates>,
        images: Arc<dyn ImageStore>,
        settings: SubmissionSettings,
    ) -> Self {
        Self {
            pool,
            rates,
            images,
            settings,
        }
    }

    /// Submit a sign-up on behalf of `ambassador_id`.
    pub async fn submit(
        &self,
        channel: SignUpChannel,
        request: SubmitSignUpRequest,
        ambassador_id: Uuid,
        now: DateTime<Utc>,
    ) -> AppResult<SubmitSignUpResponse> {
        let input = validate(channel, request, self.settings.max_image_bytes)?;

        if let Some(existing) = self
            .pool
            .find_sign_up_by_idempotency_key(input.idempotency_key)
            .await?
        {
            info!(
                sign_up_id = %existing.id,
                "Idempotent replay for key {}", input.idempotency_key
            );
            return idempotent_return(existing);
        }

        let since = now - Duration::hours(self.settings.dedup_window_hours);
        if let Some(duplicate) = self
            .pool
            .find_recent_duplicate(&input.customer_email, input.operator_id, since)
            .await?
        {
            // A concurrent retry of this same request committed in between
            if duplicate.idempotency_key == input.idempotency_key {
                return idempotent_return(duplicate);
            }
            return Err(AppError::Duplicate(format!(
                "customer already signed up for this operator within {} hours (sign-up {})",
                self.settings.dedup_window_hours, duplicate.id
            )));
        }

        let rate = self.rates.resolve_rate(input.operator_id).await?;
        let cpa_amount_cents = rate_to_cents(rate)?;

        let (image_ref, content_type, sha256) = match input.image {
            Some(image) => {
                let image_ref = self
                    .images
                    .put(image.bytes, &image.content_type)
                    .await
                    .map_err(|e| AppError::ImageUpload(e.to_string()))?;
                (Some(image_ref), Some(image.content_type), Some(image.sha256))
            }
            None => (None, None, None),
        };

        let new = NewSignUp {
            id: Uuid::now_v7(),
            idempotency_key: input.idempotency_key,
            ambassador_id,
            event_id: input.event_id,
            solo_chat_id: input.solo_chat_id,
            operator_id: input.operator_id,
            customer_name: input.customer_name,
            customer_email: input.customer_email,
            customer_phone: input.customer_phone,
            customer_state: input.customer_state,
            cpa_amount_cents,
            bet_slip_image_ref: image_ref,
            bet_slip_content_type: content_type,
            bet_slip_sha256: sha256,
            submitted_at: now,
        };

        match self.pool.insert_submission(new).await? {
            InsertOutcome::Created { sign_up, .. } => {
                info!(
                    sign_up_id = %sign_up.id,
                    channel = channel.as_str(),
                    "Sign-up submitted"
                );
                Ok(SubmitSignUpResponse {
                    sign_up: SignUp::try_from(sign_up)?,
                    is_idempotent_return: false,
                })
            }
            InsertOutcome::Existing(existing) => {
                // The image stored above is left unreferenced.
                warn!(
                    sign_up_id = %existing.id,
                    "Concurrent submission with key {} resolved to existing sign-up",
                    input.idempotency_key
                );
                idempotent_return(existing)
            }
        }
    }
}

fn idempotent_return(
    existing: crate::entity::sign_up::Model,
) -> AppResult<SubmitSignUpResponse> {
    Ok(SubmitSignUpResponse {
        sign_up: SignUp::try_from(existing)?,
        is_idempotent_return: true,
    })
}

fn rate_to_cents(rate: Decimal) -> AppResult<i64> {
    if rate.is_sign_negative() {
        return Err(AppError::CpaLookup(format!("negative commission rate {}", rate)));
    }
    decimal_to_cents(rate)
        .ok_or_else(|| AppError::CpaLookup(format!("commission rate {} out of range", rate)))
}

fn validate(
    channel: SignUpChannel,
    request: SubmitSignUpRequest,
    max_image_bytes: usize,
) -> AppResult<ValidatedSubmission> {
    let idempotency_key = parse_idempotency_key(&request.idempotency_key)?;

    match (channel, request.event_id, request.solo_chat_id) {
        (SignUpChannel::Event, Some(_), None) | (SignUpChannel::Solo, None, Some(_)) => {}
        (SignUpChannel::Event, _, _) => {
            return Err(AppError::Validation(
                "event sign-ups require eventId and must not carry soloChatId".to_string(),
            ));
        }
        (SignUpChannel::Solo, _, _) => {
            return Err(AppError::Validation(
                "solo sign-ups require soloChatId and must not carry eventId".to_string(),
            ));
        }
    }

    let customer_name = request.customer_name.trim().to_string();
    if customer_name.is_empty() || customer_name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Validation(format!(
            "customerName must be 1-{} characters",
            MAX_NAME_LEN
        )));
    }

    let customer_email = normalize_email(&request.customer_email)?;
    let customer_phone = optional_field(request.customer_phone, "customerPhone", MAX_PHONE_LEN)?;
    let customer_state = optional_field(request.customer_state, "customerState", MAX_STATE_LEN)?;

    let image = match request.bet_slip_image {
        Some(data) if !data.trim().is_empty() => Some(decode_image(
            &data,
            request.bet_slip_content_type.as_deref(),
            max_image_bytes,
        )?),
        _ => None,
    };

    Ok(ValidatedSubmission {
        idempotency_key,
        operator_id: request.operator_id,
        event_id: request.event_id,
        solo_chat_id: request.solo_chat_id,
        customer_name,
        customer_email,
        customer_phone,
        customer_state,
        image,
    })
}

/// The key must be a version 4 UUID.
fn parse_idempotency_key(raw: &str) -> AppResult<Uuid> {
    let key = Uuid::parse_str(raw.trim())
        .map_err(|_| AppError::Validation("idempotencyKey must be a UUID".to_string()))?;
    if key.get_version_num() != 4 {
        return Err(AppError::Validation(
            "idempotencyKey must be a version 4 UUID".to_string(),
        ));
    }
    Ok(key)
}

/// Trim and lower-case an email address, rejecting obviously malformed ones.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    let valid = email.len() <= MAX_EMAIL_LEN
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };

    if !valid {
        return Err(AppError::Validation(
            "customerEmail is not a valid email address".to_string(),
        ));
    }
    Ok(email)
}

fn optional_field(value: Option<String>, name: &str, max_len: usize) -> AppResult<Option<String>> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => Ok(None),
        Some(v) if v.chars().count() > max_len => Err(AppError::Validation(format!(
            "{} must be at most {} characters",
            name, max_len
        ))),
        other => Ok(other),
    }
}

/// Decode a base64 image, optionally wrapped in a `data:` URL.
///
/// The content type comes from the request, or from the data URL when the
/// request omits it.
pub fn decode_image(
    data: &str,
    content_type: Option<&str>,
    max_bytes: usize,
) -> AppResult<DecodedImage> {
    let data = data.trim();
    let (url_type, payload) = match data.strip_prefix("data:") {
        Some(rest) => {
            let (header, payload) = rest.split_once(',').ok_or_else(|| {
                AppError::Validation("betSlipImage data URL has no payload".to_string())
            })?;
            let media_type = header.strip_suffix(";base64").ok_or_else(|| {
                AppError::Validation("betSlipImage data URL must be base64 encoded".to_string())
            })?;
            (Some(media_type), payload)
        }
        None => (None, data),
    };

    let content_type = content_type
        .or(url_type)
        .map(|ct| ct.trim().to_lowercase())
        .ok_or_else(|| AppError::Validation("betSlipContentType is required".to_string()))?;

    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(AppError::Validation(format!(
            "betSlipContentType must be one of {}",
            ALLOWED_IMAGE_TYPES.join(", ")
        )));
    }

    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|_| AppError::Validation("betSlipImage is not valid base64".to_string()))?;

    if bytes.is_empty() {
        return Err(AppError::Validation("betSlipImage is empty".to_string()));
    }
    if bytes.len() > max_bytes {
        return Err(AppError::Validation(format!(
            "betSlipImage exceeds {} bytes",
            max_bytes
        )));
    }

    let sha256 = hex::encode(Sha256::digest(&bytes));

    Ok(DecodedImage {
        bytes,
        content_type,
        sha256,
    })
}
