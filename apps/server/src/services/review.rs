//! Review queue.

use tracing::debug;

use crate::db::DbPool;
use crate::error::AppResult;
use crate::models::{ReviewItem, ReviewListResponse, ReviewQuery, SignUp};

/// Sign-ups awaiting resolution, highest priority first.
pub async fn list_for_review(pool: &DbPool, query: &ReviewQuery) -> AppResult<ReviewListResponse> {
    let (rows, total) = pool.list_review_queue(query).await?;

    let items = rows
        .into_iter()
        .map(|row| SignUp::try_from(row).map(ReviewItem::from))
        .collect::<AppResult<Vec<_>>>()?;

    debug!(
        "Review queue page {} ({} of {} items)",
        query.page(),
        items.len(),
        total
    );

    Ok(ReviewListResponse::new(
        items,
        total,
        query.page(),
        query.page_size(),
    ))
}
