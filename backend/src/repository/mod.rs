//! Persistence gateway
//!
//! One trait method per entity-lifecycle action. Implementations map
//! "no row found" and "no row affected" to [`RepositoryError::NotFound`] and
//! every other storage failure to [`RepositoryError::Internal`], logging the
//! underlying cause where it happens.

pub mod memory;
pub mod postgres;

pub use memory::MemoryRepository;
pub use postgres::{PgRepository, RetryPolicy};

use crate::models::{Service, Subscription};
use crate::month::MonthDate;
use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

/// Page size used when a listing does not specify a limit
pub const DEFAULT_PAGE_LIMIT: i64 = 10;

/// Errors surfaced by repository operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// No row matched the requested id
    #[error("record not found")]
    NotFound,

    /// Storage failure; the cause has already been logged
    #[error("internal server error")]
    Internal,

    /// The initial connection could not be established
    #[error("failed to connect to database after {attempts} attempts")]
    Connect {
        /// Number of attempts made before giving up
        attempts: u32,
    },
}

/// Rename a service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateService {
    /// Service to rename
    pub service_id: i32,
    /// New name
    pub name: String,
}

/// Fields of a subscription to create; the service is referenced by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    /// Name resolved to a service id at write time
    pub service_name: String,
    /// Monthly price in minor currency units
    pub price: i32,
    /// Subscribed user
    pub user_id: Uuid,
    /// First billed month
    pub start_date: MonthDate,
    /// Last billed month, `None` for open-ended
    pub stop_date: Option<MonthDate>,
}

/// Wholesale replacement of a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSubscription {
    /// Subscription to replace
    pub subscription_id: i32,
    /// Name resolved to a service id at write time
    pub service_name: String,
    /// Monthly price in minor currency units
    pub price: i32,
    /// Subscribed user
    pub user_id: Uuid,
    /// First billed month
    pub start_date: MonthDate,
    /// Last billed month, `None` for open-ended
    pub stop_date: Option<MonthDate>,
}

/// Offset/limit paging for subscription listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Page {
    /// Rows to skip, 0 when unset
    pub offset: Option<i64>,
    /// Maximum rows to return, [`DEFAULT_PAGE_LIMIT`] when unset
    pub limit: Option<i64>,
}

impl Page {
    /// Offset with the default applied
    pub fn offset_or_default(&self) -> i64 {
        self.offset.unwrap_or(0)
    }

    /// Limit with the default applied
    pub fn limit_or_default(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_PAGE_LIMIT)
    }
}

/// Reporting window and optional filters for the cost aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TotalQuery {
    /// First month of the window
    pub window_start: MonthDate,
    /// Last month of the window
    pub window_end: MonthDate,
    /// Only count this user's subscriptions
    pub user_id: Option<Uuid>,
    /// Only count subscriptions to the service with this name
    pub service_name: Option<String>,
}

/// Storage for services and subscriptions
#[async_trait]
pub trait Repository: Send + Sync {
    /// Create a service
    async fn add_service(&self, name: &str) -> Result<Service, RepositoryError>;

    /// Fetch a service by id
    async fn get_service(&self, service_id: i32) -> Result<Service, RepositoryError>;

    /// All services in storage order
    async fn list_services(&self) -> Result<Vec<Service>, RepositoryError>;

    /// Rename a service
    async fn update_service(&self, update: &UpdateService) -> Result<(), RepositoryError>;

    /// Delete a service
    async fn remove_service(&self, service_id: i32) -> Result<(), RepositoryError>;

    /// Create a subscription, resolving its service by name
    async fn add_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, RepositoryError>;

    /// Fetch a subscription by id
    async fn get_subscription(&self, subscription_id: i32)
        -> Result<Subscription, RepositoryError>;

    /// One page of subscriptions in storage order
    async fn list_subscriptions(&self, page: Page) -> Result<Vec<Subscription>, RepositoryError>;

    /// Total billed over a window, 0 when nothing matches
    async fn subscription_total(&self, query: &TotalQuery) -> Result<i64, RepositoryError>;

    /// Replace every field of a subscription
    async fn update_subscription(
        &self,
        update: &UpdateSubscription,
    ) -> Result<(), RepositoryError>;

    /// Delete a subscription
    async fn remove_subscription(&self, subscription_id: i32) -> Result<(), RepositoryError>;

    /// Release storage resources
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_defaults() {
        let page = Page::default();
        assert_eq!(page.offset_or_default(), 0);
        assert_eq!(page.limit_or_default(), DEFAULT_PAGE_LIMIT);

        let page = Page {
            offset: Some(20),
            limit: Some(0),
        };
        assert_eq!(page.offset_or_default(), 20);
        assert_eq!(page.limit_or_default(), 0);
    }

    #[test]
    fn test_internal_error_hides_cause() {
        assert_eq!(RepositoryError::Internal.to_string(), "internal server error");
        assert_eq!(RepositoryError::NotFound.to_string(), "record not found");
    }
}
