//! PostgreSQL repository
//!
//! Every operation is a single parameterized statement against one persistent
//! connection. Service names are resolved to ids by sub-selects at write time,
//! and the cost aggregate is computed entirely in SQL.

use super::{
    NewSubscription, Page, Repository, RepositoryError, TotalQuery, UpdateService,
    UpdateSubscription,
};
use crate::config::DbConfig;
use crate::models::{Service, Subscription};
use async_trait::async_trait;
use sqlx::migrate::{MigrateError, Migrator};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Connection attempts before startup is abandoned
pub const CONNECT_ATTEMPTS: u32 = 5;

/// Time allowed for a single connection attempt
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Pause between connection attempts
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Time allowed for the connection to close on shutdown
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(10);

/// How hard [`PgRepository::connect_with_retry`] tries before giving up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Connection attempts before startup is abandoned
    pub attempts: u32,
    /// Time allowed for a single attempt
    pub timeout: Duration,
    /// Pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: CONNECT_ATTEMPTS,
            timeout: CONNECT_TIMEOUT,
            delay: CONNECT_RETRY_DELAY,
        }
    }
}

const ADD_SERVICE: &str = "INSERT INTO services (name) VALUES ($1) RETURNING service_id, name";
const GET_SERVICE: &str = "SELECT service_id, name FROM services WHERE service_id = $1";
const LIST_SERVICES: &str = "SELECT service_id, name FROM services ORDER BY service_id";
const UPDATE_SERVICE: &str = "UPDATE services SET name = $2 WHERE service_id = $1";
const REMOVE_SERVICE: &str = "DELETE FROM services WHERE service_id = $1";

const ADD_SUBSCRIPTION: &str = r#"
INSERT INTO subscriptions (service_id, price, user_id, start_date, stop_date)
VALUES ((SELECT service_id FROM services WHERE "name" = $1), $2, $3, $4, $5)
RETURNING subscription_id, service_id, price, user_id, start_date, stop_date"#;

const GET_SUBSCRIPTION: &str = r#"
SELECT subscription_id, service_id, price, user_id, start_date, stop_date
FROM subscriptions WHERE subscription_id = $1"#;

const LIST_SUBSCRIPTIONS: &str = r#"
SELECT subscription_id, service_id, price, user_id, start_date, stop_date
FROM subscriptions ORDER BY subscription_id
OFFSET COALESCE($1, 0) LIMIT COALESCE($2, 10)"#;

// $1/$2 window bounds, $3 optional user, $4 optional service name
const SUBSCRIPTION_TOTAL: &str = r#"
WITH overlap AS (
    SELECT
        AGE(LEAST(COALESCE(stop_date, $2), $2), GREATEST(start_date, $1)) AS span,
        price
    FROM subscriptions
    WHERE
        (start_date <= $2 AND (stop_date IS NULL OR stop_date >= $1)) AND
        ($3::uuid IS NULL OR user_id = $3) AND
        ($4::character varying IS NULL OR
            service_id = (SELECT service_id FROM services WHERE "name" = $4))
)
SELECT COALESCE(
    SUM((EXTRACT(YEAR FROM span) * 12 + EXTRACT(MONTH FROM span) + 1) * price),
    0
)::BIGINT
FROM overlap"#;

const UPDATE_SUBSCRIPTION: &str = r#"
UPDATE subscriptions
SET service_id = (SELECT service_id FROM services WHERE "name" = $2),
    price = $3, user_id = $4, start_date = $5, stop_date = $6
WHERE subscription_id = $1"#;

const REMOVE_SUBSCRIPTION: &str = "DELETE FROM subscriptions WHERE subscription_id = $1";

/// Log a storage failure and hide it behind [`RepositoryError::Internal`]
fn internal(action: &'static str) -> impl FnOnce(sqlx::Error) -> RepositoryError {
    move |e| {
        error!(error = %e, "failed to {}", action);
        RepositoryError::Internal
    }
}

/// Map an update/delete outcome to `NotFound` when nothing was touched
fn require_affected(rows_affected: u64) -> Result<(), RepositoryError> {
    if rows_affected == 0 {
        Err(RepositoryError::NotFound)
    } else {
        Ok(())
    }
}

/// Repository backed by a single PostgreSQL connection
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    /// Connect with the default [`RetryPolicy`]
    ///
    /// Makes up to [`CONNECT_ATTEMPTS`] attempts of [`CONNECT_TIMEOUT`] each,
    /// pausing [`CONNECT_RETRY_DELAY`] between them.
    pub async fn connect(config: &DbConfig) -> Result<Self, RepositoryError> {
        Self::connect_with_retry(config, RetryPolicy::default()).await
    }

    /// Connect with bounded retry
    ///
    /// # Returns
    /// * `Ok(PgRepository)` once a connection is open
    /// * `Err(RepositoryError::Connect)` after every attempt failed
    pub async fn connect_with_retry(
        config: &DbConfig,
        policy: RetryPolicy,
    ) -> Result<Self, RepositoryError> {
        let options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.name)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(config.ssl_mode);

        for attempt in 1..=policy.attempts {
            let connecting = PgPoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .acquire_timeout(policy.timeout)
                .connect_with(options.clone());

            match tokio::time::timeout(policy.timeout, connecting).await {
                Ok(Ok(pool)) => {
                    info!(
                        host = %config.host,
                        port = config.port,
                        database = %config.name,
                        "repository connected successfully"
                    );
                    return Ok(Self { pool });
                }
                Ok(Err(e)) => {
                    error!(attempt, error = %e, "failed to connect repository");
                }
                Err(_) => {
                    error!(
                        attempt,
                        timeout_ms = policy.timeout.as_millis(),
                        "repository connection attempt timed out"
                    );
                }
            }

            if attempt < policy.attempts {
                tokio::time::sleep(policy.delay).await;
            }
        }

        Err(RepositoryError::Connect {
            attempts: policy.attempts,
        })
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply pending migrations from a directory of `.sql` files
    pub async fn migrate(&self, path: &Path) -> Result<(), MigrateError> {
        let migrator = Migrator::new(path).await?;
        migrator.run(&self.pool).await
    }

    /// Underlying pool, for statements outside the repository surface such
    /// as resetting tables between integration tests
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Repository for PgRepository {
    async fn add_service(&self, name: &str) -> Result<Service, RepositoryError> {
        let service = sqlx::query_as::<_, Service>(ADD_SERVICE)
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(internal("add service"))?;

        debug!(service_id = service.service_id, "added service");
        Ok(service)
    }

    async fn get_service(&self, service_id: i32) -> Result<Service, RepositoryError> {
        sqlx::query_as::<_, Service>(GET_SERVICE)
            .bind(service_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("get service"))?
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_services(&self) -> Result<Vec<Service>, RepositoryError> {
        sqlx::query_as::<_, Service>(LIST_SERVICES)
            .fetch_all(&self.pool)
            .await
            .map_err(internal("get services"))
    }

    async fn update_service(&self, update: &UpdateService) -> Result<(), RepositoryError> {
        let result = sqlx::query(UPDATE_SERVICE)
            .bind(update.service_id)
            .bind(&update.name)
            .execute(&self.pool)
            .await
            .map_err(internal("update service"))?;

        require_affected(result.rows_affected())
    }

    async fn remove_service(&self, service_id: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(REMOVE_SERVICE)
            .bind(service_id)
            .execute(&self.pool)
            .await
            .map_err(internal("remove service"))?;

        require_affected(result.rows_affected())
    }

    async fn add_subscription(
        &self,
        subscription: &NewSubscription,
    ) -> Result<Subscription, RepositoryError> {
        let created = sqlx::query_as::<_, Subscription>(ADD_SUBSCRIPTION)
            .bind(&subscription.service_name)
            .bind(subscription.price)
            .bind(subscription.user_id)
            .bind(subscription.start_date)
            .bind(subscription.stop_date)
            .fetch_one(&self.pool)
            .await
            .map_err(internal("add subscription"))?;

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
        sqlx::query_as::<_, Subscription>(GET_SUBSCRIPTION)
            .bind(subscription_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal("get subscription"))?
            .ok_or(RepositoryError::NotFound)
    }

    async fn list_subscriptions(&self, page: Page) -> Result<Vec<Subscription>, RepositoryError> {
        sqlx::query_as::<_, Subscription>(LIST_SUBSCRIPTIONS)
            .bind(page.offset)
            .bind(page.limit)
            .fetch_all(&self.pool)
            .await
            .map_err(internal("get subscriptions"))
    }

    async fn subscription_total(&self, query: &TotalQuery) -> Result<i64, RepositoryError> {
        sqlx::query_scalar::<_, i64>(SUBSCRIPTION_TOTAL)
            .bind(query.window_start)
            .bind(query.window_end)
            .bind(query.user_id)
            .bind(query.service_name.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(internal("get subscription total"))
    }

    async fn update_subscription(
        &self,
        update: &UpdateSubscription,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(UPDATE_SUBSCRIPTION)
            .bind(update.subscription_id)
            .bind(&update.service_name)
            .bind(update.price)
            .bind(update.user_id)
            .bind(update.start_date)
            .bind(update.stop_date)
            .execute(&self.pool)
            .await
            .map_err(internal("update subscription"))?;

        require_affected(result.rows_affected())
    }

    async fn remove_subscription(&self, subscription_id: i32) -> Result<(), RepositoryError> {
        let result = sqlx::query(REMOVE_SUBSCRIPTION)
            .bind(subscription_id)
            .execute(&self.pool)
            .await
            .map_err(internal("remove subscription"))?;

        require_affected(result.rows_affected())
    }

    async fn close(&self) {
        match tokio::time::timeout(CLOSE_TIMEOUT, self.pool.close()).await {
            Ok(()) => info!("repository disconnected successfully"),
            Err(_) => warn!(
                timeout_secs = CLOSE_TIMEOUT.as_secs(),
                "timed out disconnecting repository"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::time::Instant;

    fn unreachable_db() -> DbConfig {
        DbConfig {
            host: "127.0.0.1".to_string(),
            // Nothing listens on the tcpmux port
            port: 1,
            name: "subscriptions".to_string(),
            user: "postgres".to_string(),
            password: "postgres".to_string(),
            ssl_mode: sqlx::postgres::PgSslMode::Disable,
            migrations_path: PathBuf::from("./migrations"),
        }
    }

    #[test]
    fn test_default_retry_policy() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(policy.timeout, Duration::from_secs(3));
        assert_eq!(policy.delay, Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_every_attempt() {
        let policy = RetryPolicy {
            attempts: 3,
            timeout: Duration::from_millis(500),
            delay: Duration::from_millis(50),
        };

        let started = Instant::now();
        let result = PgRepository::connect_with_retry(&unreachable_db(), policy).await;

        assert!(matches!(
            result,
            Err(RepositoryError::Connect { attempts: 3 })
        ));
        // Two pauses between three attempts
        assert!(started.elapsed() >= Duration::from_millis(100));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_require_affected() {
        assert_eq!(require_affected(0), Err(RepositoryError::NotFound));
        assert_eq!(require_affected(1), Ok(()));
    }

    #[test]
    fn test_internal_maps_any_failure() {
        let err = internal("get service")(sqlx::Error::PoolTimedOut);
        assert_eq!(err, RepositoryError::Internal);
    }

    #[test]
    fn test_listing_defaults_match_page_defaults() {
        assert!(LIST_SUBSCRIPTIONS.contains("COALESCE($1, 0)"));
        assert!(LIST_SUBSCRIPTIONS.contains(&format!(
            "COALESCE($2, {})",
            super::super::DEFAULT_PAGE_LIMIT
        )));
    }
}
