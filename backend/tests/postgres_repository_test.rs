//! PostgreSQL repository tests
//!
//! These run against a real database named by `TEST_DATABASE_URL` and are
//! skipped when it is unset. Every test starts from empty tables.

use serial_test::serial;
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use subscriptions_backend::month::MonthDate;
use subscriptions_backend::repository::{
    NewSubscription, Page, PgRepository, Repository, RepositoryError, TotalQuery, UpdateService,
    UpdateSubscription,
};
use uuid::Uuid;

const MIGRATIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations");

async fn create_test_repository() -> Option<PgRepository> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&url)
        .await
        .expect("Failed to connect to test database");
    let repository = PgRepository::from_pool(pool);
    repository
        .migrate(Path::new(MIGRATIONS))
        .await
        .expect("Failed to run migrations");

    sqlx::query("TRUNCATE subscriptions, services RESTART IDENTITY CASCADE")
        .execute(repository.pool())
        .await
        .expect("Failed to reset tables");

    Some(repository)
}

fn month(text: &str) -> MonthDate {
    text.parse().unwrap()
}

fn new_subscription(
    service: &str,
    price: i32,
    user_id: Uuid,
    start: &str,
    stop: Option<&str>,
) -> NewSubscription {
    NewSubscription {
        service_name: service.to_string(),
        price,
        user_id,
        start_date: month(start),
        stop_date: stop.map(month),
    }
}

fn window(start: &str, stop: &str) -> TotalQuery {
    TotalQuery {
        window_start: month(start),
        window_end: month(stop),
        user_id: None,
        service_name: None,
    }
}

#[tokio::test]
#[serial]
async fn test_service_round_trip() {
    let Some(repo) = create_test_repository().await else {
        return;
    };

    let created = repo.add_service("Netflix").await.unwrap();
    assert_eq!(created.service_id, 1);
    assert_eq!(repo.get_service(1).await.unwrap(), created);

    repo.update_service(&UpdateService {
        service_id: 1,
        name: "Netflix 4K".to_string(),
    })
    .await
    .unwrap();
    let services = repo.list_services().await.unwrap();
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].name, "Netflix 4K");

    repo.remove_service(1).await.unwrap();
    assert_eq!(repo.get_service(1).await, Err(RepositoryError::NotFound));
    assert_eq!(repo.remove_service(1).await, Err(RepositoryError::NotFound));
}

#[tokio::test]
#[serial]
async fn test_constraint_violations_are_internal() {
    let Some(repo) = create_test_repository().await else {
        return;
    };

    repo.add_service("Netflix").await.unwrap();
    assert_eq!(
        repo.add_service("Netflix").await,
        Err(RepositoryError::Internal)
    );

    let unknown = new_subscription("Hulu", 100, Uuid::new_v4(), "01-2025", None);
    assert_eq!(
        repo.add_subscription(&unknown).await,
        Err(RepositoryError::Internal)
    );

    let negative = new_subscription("Netflix", -5, Uuid::new_v4(), "01-2025", None);
    assert_eq!(
        repo.add_subscription(&negative).await,
        Err(RepositoryError::Internal)
    );

    // A referenced service cannot be removed
    repo.add_subscription(&new_subscription(
        "Netflix",
        100,
        Uuid::new_v4(),
        "01-2025",
        None,
    ))
    .await
    .unwrap();
    assert_eq!(repo.remove_service(1).await, Err(RepositoryError::Internal));
}

#[tokio::test]
#[serial]
async fn test_subscription_round_trip() {
    let Some(repo) = create_test_repository().await else {
        return;
    };
    repo.add_service("Netflix").await.unwrap();
    repo.add_service("Spotify").await.unwrap();
    let user_id = Uuid::new_v4();

    let created = repo
        .add_subscription(&new_subscription("Netflix", 400, user_id, "07-2025", None))
        .await
        .unwrap();
    assert_eq!(created.subscription_id, 1);
    assert_eq!(created.service_id, 1);
    assert_eq!(created.start_date, month("07-2025"));
    assert_eq!(created.stop_date, None);
    assert_eq!(repo.get_subscription(1).await.unwrap(), created);

    repo.update_subscription(&UpdateSubscription {
        subscription_id: 1,
        service_name: "Spotify".to_string(),
        price: 199,
        user_id,
        start_date: month("08-2025"),
        stop_date: Some(month("12-2025")),
    })
    .await
    .unwrap();

    let updated = repo.get_subscription(1).await.unwrap();
    assert_eq!(updated.service_id, 2);
    assert_eq!(updated.price, 199);
    assert_eq!(updated.stop_date, Some(month("12-2025")));

    repo.remove_subscription(1).await.unwrap();
    assert_eq!(
        repo.get_subscription(1).await,
        Err(RepositoryError::NotFound)
    );
}

#[tokio::test]
#[serial]
async fn test_update_missing_subscription_is_not_found() {
    let Some(repo) = create_test_repository().await else {
        return;
    };
    repo.add_service("Netflix").await.unwrap();

    let result = repo
        .update_subscription(&UpdateSubscription {
            subscription_id: 42,
            service_name: "Netflix".to_string(),
            price: 1,
            user_id: Uuid::new_v4(),
            start_date: month("01-2025"),
            stop_date: None,
        })
        .await;
    assert_eq!(result, Err(RepositoryError::NotFound));
}

#[tokio::test]
#[serial]
async fn test_list_subscriptions_paging() {
    let Some(repo) = create_test_repository().await else {
        return;
    };
    repo.add_service("Netflix").await.unwrap();
    for _ in 0..12 {
        repo.add_subscription(&new_subscription(
            "Netflix",
            1,
            Uuid::new_v4(),
            "01-2025",
            None,
        ))
        .await
        .unwrap();
    }

    let first = repo.list_subscriptions(Page::default()).await.unwrap();
    assert_eq!(first.len(), 10);

    let rest = repo
        .list_subscriptions(Page {
            offset: Some(10),
            limit: None,
        })
        .await
        .unwrap();
    let ids: Vec<i32> = rest.iter().map(|s| s.subscription_id).collect();
    assert_eq!(ids, vec![11, 12]);

    assert_eq!(
        repo.list_subscriptions(Page {
            offset: Some(-1),
            limit: None,
        })
        .await,
        Err(RepositoryError::Internal)
    );
}

#[tokio::test]
#[serial]
async fn test_subscription_total_matches_billing_rules() {
    let Some(repo) = create_test_repository().await else {
        return;
    };
    repo.add_service("Netflix").await.unwrap();
    repo.add_service("Spotify").await.unwrap();
    let alice = Uuid::new_v4();
    let bob = Uuid::new_v4();

    assert_eq!(
        repo.subscription_total(&window("01-2025", "12-2025"))
            .await
            .unwrap(),
        0
    );

    for subscription in [
        new_subscription("Netflix", 100, alice, "01-2025", Some("03-2025")),
        new_subscription("Spotify", 50, alice, "10-2025", None),
        new_subscription("Netflix", 1000, bob, "01-2024", Some("12-2024")),
        new_subscription("Netflix", 1000, bob, "01-2026", None),
        new_subscription("Spotify", 7, bob, "11-2024", Some("02-2025")),
    ] {
        repo.add_subscription(&subscription).await.unwrap();
    }

    let all = window("01-2025", "12-2025");
    assert_eq!(repo.subscription_total(&all).await.unwrap(), 464);

    let alice_only = TotalQuery {
        user_id: Some(alice),
        ..window("01-2025", "12-2025")
    };
    assert_eq!(repo.subscription_total(&alice_only).await.unwrap(), 450);

    let spotify_only = TotalQuery {
        service_name: Some("Spotify".to_string()),
        ..window("01-2025", "12-2025")
    };
    assert_eq!(repo.subscription_total(&spotify_only).await.unwrap(), 164);

    let unknown = TotalQuery {
        service_name: Some("Hulu".to_string()),
        ..window("01-2025", "12-2025")
    };
    assert_eq!(repo.subscription_total(&unknown).await.unwrap(), 0);

    // Window spanning a year boundary
    let straddle = window("12-2024", "01-2025");
    assert_eq!(repo.subscription_total(&straddle).await.unwrap(), 100 + 1000 + 14);
}

#[tokio::test]
#[serial]
async fn test_month_decodes_from_date_timestamp_and_text() {
    let Some(repo) = create_test_repository().await else {
        return;
    };
    let march = Some(month("03-2025"));

    for sql in [
        "SELECT DATE '2025-03-17'",
        "SELECT TIMESTAMP '2025-03-17 10:00'",
        "SELECT TIMESTAMPTZ '2025-03-17 10:00+00'",
        "SELECT '03-2025'::text",
        "SELECT '03-2025'::varchar",
    ] {
        let decoded = sqlx::query_scalar::<_, Option<MonthDate>>(sql)
            .fetch_one(repo.pool())
            .await
            .unwrap_or_else(|e| panic!("{sql}: {e}"));
        assert_eq!(decoded, march, "{sql}");
    }

    let null = sqlx::query_scalar::<_, Option<MonthDate>>("SELECT NULL::date")
        .fetch_one(repo.pool())
        .await
        .unwrap();
    assert_eq!(null, None);

    let bad = sqlx::query_scalar::<_, Option<MonthDate>>("SELECT 'bad'::text")
        .fetch_one(repo.pool())
        .await;
    match bad {
        Err(sqlx::Error::ColumnDecode { source, .. }) => {
            assert!(source.to_string().contains("MM-YYYY"), "{source}");
        }
        other => panic!("Expected ColumnDecode error, got: {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_timestamptz_is_truncated_in_utc() {
    let Some(repo) = create_test_repository().await else {
        return;
    };

    // The pool holds one connection, so the setting applies to the next query
    sqlx::query("SET TIME ZONE 'America/New_York'")
        .execute(repo.pool())
        .await
        .unwrap();

    // 31 March 22:00 in New York, 1 April in UTC
    let decoded =
        sqlx::query_scalar::<_, MonthDate>("SELECT TIMESTAMPTZ '2025-04-01 02:00+00'")
            .fetch_one(repo.pool())
            .await
            .unwrap();
    assert_eq!(decoded, month("04-2025"));
}
