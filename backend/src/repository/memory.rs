//! In-memory repository
//!
//! Keeps services and subscriptions in insertion order and reproduces the
//! constraint behavior of the PostgreSQL schema (unique service names,
//! required service reference, non-negative price, restricted deletes), so it
//! can stand in for the database in tests and local runs.

use super::{
    NewSubscription, Page, Repository, RepositoryError, TotalQuery, UpdateService,
    UpdateSubscription,
};
use crate::billing;
use crate::models::{Service, Subscription};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error};

#[derive(Debug)]
struct Tables {
    services: Vec<Service>,
    subscriptions: Vec<Subscription>,
    next_service_id: i32,
    next_subscription_id: i32,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            subscriptions: Vec::new(),
            next_service_id: 1,
            next_subscription_id: 1,
        }
    }
}

impl Tables {
    fn service_id_by_name(&self, name: &str) -> Option<i32> {
        self.services
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.service_id)
    }

    /// Resolve a service name for a subscription write
    fn resolve_service(&self, name: &str, action: &str) -> Result<i32, RepositoryError> {
        self.service_id_by_name(name).ok_or_else(|| {
            error!(
                service_name = %name,
                "failed to {}: service name does not resolve",
                action
            );
            RepositoryError::Internal
        })
    }
}

fn check_price(price: i32, action: &str) -> Result<(), RepositoryError> {
    if price < 0 {
        error!(price, "failed to {}: price must not be negative", action);
        return Err(RepositoryError::Internal);
    }
    Ok(())
}

fn to_index(value: i64, what: &str) -> Result<usize, RepositoryError> {
    usize::try_from(value).map_err(|_| {
        error!(value, "failed to get subscriptions: {} must not be negative", what);
        RepositoryError::Internal
    })
}

/// Repository holding all rows in process memory
#[derive(Debug, Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn add_service(&self, name: &str) -> Result<Service, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.service_id_by_name(name).is_some() {
            error!(name = %name, "failed to add service: name already exists");
            return Err(RepositoryError::Internal);
        }

        let service = Service {
            service_id: tables.next_service_id,
            name: name.to_string(),
        };
        tables.next_service_id += 1;
        tables.services.push(service.clone());

        debug!(service_id = service.service_id, "added service");
        Ok(service)
    }

    async fn get_service(&self, service_id: i32) -> Result<Service, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .services
            .iter()
            .find(|s| s.service_id == service_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_services(&self) -> Result<Vec<Service>, RepositoryError> {
        Ok(self.tables.read().await.services.clone())
    }

    async fn update_service(&self, update: &UpdateService) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let index = tables
            .services
            .iter()
            .position(|s| s.service_id == update.service_id)
            .ok_or(RepositoryError::NotFound)?;

        if matches!(tables.service_id_by_name(&update.name), Some(id) if id != update.service_id)
        {
            error!(name = %update.name, "failed to update service: name already exists");
            return Err(RepositoryError::Internal);
        }

        tables.services[index].name = update.name.clone();
        Ok(())
    }

    async fn remove_service(&self, service_id: i32) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let index = tables
            .services
            .iter()
            .position(|s| s.service_id == service_id)
            .ok_or(RepositoryError::NotFound)?;

        if tables
            .subscriptions
            .iter()
            .any(|s| s.service_id == service_id)
        {
            error!(
                service_id,
                "failed to remove service: still referenced by subscriptions"
            );
            return Err(RepositoryError::Internal);
        }

        tables.services.remove(index);
        Ok(())
    }

    async fn add_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, RepositoryError> {
        let mut tables = self.tables.write().await;
        let service_id = tables.resolve_service(&subscription.service_name, "add subscription")?;
        check_price(subscription.price, "add subscription")?;

        let created = Subscription {
            subscription_id: tables.next_subscription_id,
            service_id,
            price: subscription.price,
            user_id: subscription.user_id,
            start_date: subscription.start_date,
            stop_date: subscription.stop_date,
        };
        tables.next_subscription_id += 1;
        tables.subscriptions.push(created.clone());

        debug!(
            subscription_id = created.subscription_id,
            "added subscription"
        );
        Ok(created)
    }

    async fn get_subscription(
        &self,
        subscription_id: i32,
    ) -> Result<Subscription, RepositoryError> {
        let tables = self.tables.read().await;
        tables
            .subscriptions
            .iter()
            .find(|s| s.subscription_id == subscription_id)
            .cloned()
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_subscriptions(&self, page: Page) -> Result<Vec<Subscription>, RepositoryError> {
        let offset = to_index(page.offset_or_default(), "offset")?;
        let limit = to_index(page.limit_or_default(), "limit")?;

        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn subscription_total(&self, query: &TotalQuery) -> Result<i64, RepositoryError> {
        let tables = self.tables.read().await;

        // An unknown service name matches nothing, as the SQL sub-select yields NULL
        let service_filter = query
            .service_name
            .as_deref()
            .map(|name| tables.service_id_by_name(name));

        let matching = tables.subscriptions.iter().filter(|s| {
            query.user_id.map_or(true, |user_id| s.user_id == user_id)
                && service_filter.map_or(true, |id| id == Some(s.service_id))
        });

        Ok(billing::window_total(
            matching,
            query.window_start,
            query.window_end,
        ))
    }

    async fn update_subscription(
        &self,
        update: &UpdateSubscription,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let index = tables
            .subscriptions
            .iter()
            .position(|s| s.subscription_id == update.subscription_id)
            .ok_or(RepositoryError::NotFound)?;

        let service_id = tables.resolve_service(&update.service_name, "update subscription")?;
        check_price(update.price, "update subscription")?;

        let row = &mut tables.subscriptions[index];
        row.service_id = service_id;
        row.price = update.price;
        row.user_id = update.user_id;
        row.start_date = update.start_date;
        row.stop_date = update.stop_date;
        Ok(())
    }

    async fn remove_subscription(&self, subscription_id: i32) -> Result<(), RepositoryError> {
        let mut tables = self.tables.write().await;
        let index = tables
            .subscriptions
            .iter()
            .position(|s| s.subscription_id == subscription_id)
            .ok_or(RepositoryError::NotFound)?;

        tables.subscriptions.remove(index);
        Ok(())
    }

    async fn close(&self) {
        debug!("in-memory repository closed");
    }
}
