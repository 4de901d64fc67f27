//! Review queue and confirmation DTOs.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::sign_up::{MissingField, SignUp};

/// Reason recorded when a reviewer skips without giving one.
pub const DEFAULT_SKIP_REASON: &str = "Skipped by reviewer (no reason provided)";

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// Query parameters for the review queue.
#[derive(Debug, Clone, Default, Deserialize, ToSchema, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReviewQuery {
    /// 1-indexed page (default 1)
    pub page: Option<u64>,
    /// Items per page (default 20, max 100)
    pub page_size: Option<u64>,
    /// Restrict to sign-ups missing this field
    pub missing_fields: Option<MissingField>,
    /// Restrict to one operator
    pub operator_id: Option<Uuid>,
}

impl ReviewQuery {
    pub fn page(&self) -> u64 {
        self.page.unwrap_or(DEFAULT_PAGE).max(1)
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE)
    }

    /// `(page - 1) * page_size`
    pub fn offset(&self) -> u64 {
        (self.page() - 1) * self.page_size()
    }
}

/// One entry of the review queue.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub sign_up: SignUp,
    pub missing_fields: Vec<MissingField>,
}

impl From<SignUp> for ReviewItem {
    fn from(sign_up: SignUp) -> Self {
        let missing_fields = sign_up.missing_fields();
        Self {
            sign_up,
            missing_fields,
        }
    }
}

/// Paged review queue response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewListResponse {
    pub items: Vec<ReviewItem>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl ReviewListResponse {
    pub fn new(items: Vec<ReviewItem>, total: u64, page: u64, page_size: u64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(page_size)
        };

        Self {
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }
}

/// Reviewer corrections. Each present field overrides the extracted value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Corrections {
    #[serde(default)]
    pub bet_amount: Option<Decimal>,
    #[serde(default)]
    pub team_bet_on: Option<String>,
    #[serde(default)]
    pub odds: Option<String>,
}

impl Corrections {
    pub fn is_empty(&self) -> bool {
        self.bet_amount.is_none() && self.team_bet_on.is_none() && self.odds.is_none()
    }
}

/// Request body for confirming a sign-up.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    pub corrections: Option<Corrections>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Request body for skipping a sign-up.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkipRequest {
    #[serde(default)]
    pub reason: Option<String>,
}
