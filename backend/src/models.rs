//! Domain records
//!
//! Defines the service and subscription rows as stored and returned by the API.

use crate::month::MonthDate;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A named offering that subscriptions reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Service {
    /// Generated identifier
    pub service_id: i32,
    /// Unique, non-empty name
    pub name: String,
}

/// A user's priced enrollment in a service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Subscription {
    /// Generated identifier
    pub subscription_id: i32,
    /// Service this subscription belongs to
    pub service_id: i32,
    /// Monthly price in minor currency units
    pub price: i32,
    /// Subscribed user
    pub user_id: Uuid,
    /// First billed month
    pub start_date: MonthDate,
    /// Last billed month, `None` while the subscription is open-ended
    pub stop_date: Option<MonthDate>,
}
