//! Subscription API handlers
//!
//! CRUD for subscriptions plus the cost aggregate over a reporting window.

use crate::api::extract::{IdParam, ValidatedJson, ValidatedPath, ValidatedQuery};
use crate::error::AppError;
use crate::models::Subscription;
use crate::month::MonthDate;
use crate::repository::{NewSubscription, Page, TotalQuery, UpdateSubscription};
use crate::state::AppState;
use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;

/// Create subscription request
#[derive(Debug, Deserialize, Validate)]
pub struct AddSubscriptionRequest {
    /// Name of an existing service
    #[validate(length(min = 1))]
    pub service_name: String,
    /// Monthly price in minor currency units
    #[validate(range(min = 0))]
    pub price: i32,
    /// Subscribed user
    pub user_id: Uuid,
    /// First billed month, `"MM-YYYY"`
    pub start_date: MonthDate,
    /// Last billed month, absent or null for open-ended
    pub stop_date: Option<MonthDate>,
}

/// Replace subscription request; every field is overwritten
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSubscriptionRequest {
    /// Name of an existing service
    #[validate(length(min = 1))]
    pub service_name: String,
    /// Monthly price in minor currency units
    #[validate(range(min = 0))]
    pub price: i32,
    /// Subscribed user
    pub user_id: Uuid,
    /// First billed month, `"MM-YYYY"`
    pub start_date: MonthDate,
    /// Last billed month, absent or null for open-ended
    pub stop_date: Option<MonthDate>,
}

/// Paging parameters for the subscription list
#[derive(Debug, Default, Deserialize, Validate)]
pub struct ListSubscriptionsQuery {
    /// Rows to skip
    #[validate(range(min = 0))]
    pub offset: Option<i64>,
    /// Maximum rows to return
    #[validate(range(min = 0))]
    pub limit: Option<i64>,
}

/// Cost aggregate request
#[derive(Debug, Deserialize, Validate)]
pub struct SubscriptionTotalRequest {
    /// First month of the window
    pub start_date: MonthDate,
    /// Last month of the window
    pub stop_date: MonthDate,
    /// Only count this user's subscriptions
    pub user_id: Option<Uuid>,
    /// Only count subscriptions to this service
    #[validate(length(min = 1))]
    pub service_name: Option<String>,
}

/// Cost aggregate response
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionTotalResponse {
    /// Sum of price times billed months
    pub total: i64,
}

/// POST /api/v1/subscriptions - Create a subscription
pub async fn add_subscription(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<AddSubscriptionRequest>,
) -> Result<(StatusCode, Json<Subscription>), AppError> {
    let subscription = state
        .repository
        .add_subscription(&NewSubscription {
            service_name: request.service_name,
            price: request.price,
            user_id: request.user_id,
            start_date: request.start_date,
            stop_date: request.stop_date,
        })
        .await?;

    info!(
        subscription_id = subscription.subscription_id,
        user_id = %subscription.user_id,
        "Subscription created"
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// GET /api/v1/subscriptions/:id - Get a specific subscription
pub async fn get_subscription(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
) -> Result<Json<Subscription>, AppError> {
    Ok(Json(state.repository.get_subscription(id).await?))
}

/// GET /api/v1/subscriptions - List one page of subscriptions
pub async fn list_subscriptions(
    State(state): State<AppState>,
    ValidatedQuery(query): ValidatedQuery<ListSubscriptionsQuery>,
) -> Result<Json<Vec<Subscription>>, AppError> {
    let page = Page {
        offset: query.offset,
        limit: query.limit,
    };
    Ok(Json(state.repository.list_subscriptions(page).await?))
}

/// POST /api/v1/subscriptions/total - Total billed over a window
pub async fn subscription_total(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<SubscriptionTotalRequest>,
) -> Result<Json<SubscriptionTotalResponse>, AppError> {
    let query = TotalQuery {
        window_start: request.start_date,
        window_end: request.stop_date,
        user_id: request.user_id,
        service_name: request.service_name,
    };
    let total = state.repository.subscription_total(&query).await?;

    debug!(
        window_start = %query.window_start,
        window_end = %query.window_end,
        total,
        "Computed subscription total"
    );
    Ok(Json(SubscriptionTotalResponse { total }))
}

/// PUT /api/v1/subscriptions/:id - Replace a subscription
pub async fn update_subscription(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
    ValidatedJson(request): ValidatedJson<UpdateSubscriptionRequest>,
) -> Result<StatusCode, AppError> {
    state
        .repository
        .update_subscription(&UpdateSubscription {
            subscription_id: id,
            service_name: request.service_name,
            price: request.price,
            user_id: request.user_id,
            start_date: request.start_date,
            stop_date: request.stop_date,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/v1/subscriptions/:id - Delete a subscription
pub async fn remove_subscription(
    State(state): State<AppState>,
    ValidatedPath(IdParam { id }): ValidatedPath<IdParam>,
) -> Result<StatusCode, AppError> {
    state.repository.remove_subscription(id).await?;
    info!(subscription_id = id, "Subscription deleted");
    Ok(StatusCode::NO_CONTENT)
}
