// Integration tests for boardkeep
//
// The database tests require a running PostgreSQL instance reachable through
// DATABASE_URL. They are ignored by default.
//
// Run with: cargo test --test integration_test -- --ignored

use boardkeep::config::Config;
use boardkeep::db::models::NewBoard;
use boardkeep::db::{self, PoolManager, PoolSettings, repository, run_in_transaction};
use boardkeep::error::DbError;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Test helper to build a migrated pool manager from DATABASE_URL
async fn setup_test_db(settings: PoolSettings) -> PoolManager {
    let manager = PoolManager::from_env(settings);
    db::run_migrations(&manager)
        .await
        .expect("Failed to run migrations (is DATABASE_URL set?)");
    manager
}

async fn board_exists(manager: &PoolManager, id: Uuid) -> bool {
    let pool = manager.get_pool().unwrap();
    let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM boards WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .expect("Failed to query boards");
    row.is_some()
}

#[derive(Debug)]
#[allow(dead_code)]
enum TestError {
    InsertFailed,
    Db(DbError),
}

impl From<DbError> for TestError {
    fn from(err: DbError) -> Self {
        TestError::Db(err)
    }
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_ping_through_transaction() {
    let manager = setup_test_db(PoolSettings::default()).await;

    db::ping(&manager).await.expect("ping failed");

    manager.close().await;
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_committed_work_is_visible() {
    let manager = setup_test_db(PoolSettings::default()).await;
    let id = Uuid::new_v4();

    let value: i32 = run_in_transaction(&manager, move |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO boards (id, name) VALUES ($1, 'committed')")
                .bind(id)
                .execute(&mut **conn)
                .await?;
            Ok::<_, DbError>(42)
        })
    })
    .await
    .expect("transaction failed");

    assert_eq!(value, 42);
    assert!(board_exists(&manager, id).await);

    repository::delete_board(&manager, id).await.unwrap();
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_failed_work_is_rolled_back() {
    let manager = setup_test_db(PoolSettings::default()).await;
    let id = Uuid::new_v4();

    let result: Result<(), TestError> = run_in_transaction(&manager, move |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO boards (id, name) VALUES ($1, 'rolled back')")
                .bind(id)
                .execute(&mut **conn)
                .await
                .map_err(DbError::from)?;
            Err::<(), _>(TestError::InsertFailed)
        })
    })
    .await;

    assert!(matches!(result, Err(TestError::InsertFailed)));
    assert!(!board_exists(&manager, id).await);
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_failed_statement_rolls_back_earlier_writes() {
    let manager = setup_test_db(PoolSettings::default()).await;
    let id = Uuid::new_v4();

    let result: Result<(), DbError> = run_in_transaction(&manager, move |conn| {
        Box::pin(async move {
            sqlx::query("INSERT INTO boards (id, name) VALUES ($1, 'first')")
                .bind(id)
                .execute(&mut **conn)
                .await?;
            // Duplicate primary key
            sqlx::query("INSERT INTO boards (id, name) VALUES ($1, 'second')")
                .bind(id)
                .execute(&mut **conn)
                .await?;
            Ok::<_, DbError>(())
        })
    })
    .await;

    match result {
        Err(DbError::Transaction(err)) => {
            let message = err.to_string();
            assert!(
                message.contains("unique") || message.contains("duplicate"),
                "Expected unique constraint error, got: {}",
                message
            );
        }
        other => panic!("Expected transaction error, got: {:?}", other),
    }
    assert!(!board_exists(&manager, id).await);

    // The connection went back to the pool in a usable state.
    db::ping(&manager).await.expect("ping after rollback failed");
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_board_crud_operations() {
    let manager = setup_test_db(PoolSettings::default()).await;

    let created = repository::create_board(
        &manager,
        NewBoard {
            name: "Integration board".to_string(),
            description: Some("created by tests".to_string()),
            lists: vec!["Todo".to_string(), "Doing".to_string(), "Done".to_string()],
        },
    )
    .await
    .expect("Failed to create board");

    assert_eq!(created.board.name, "Integration board");
    let titles: Vec<_> = created.lists.iter().map(|l| l.title.as_str()).collect();
    assert_eq!(titles, vec!["Todo", "Doing", "Done"]);

    let fetched = repository::get_board(&manager, created.board.id)
        .await
        .expect("Failed to get board")
        .expect("Board not found");
    assert_eq!(fetched.lists.len(), 3);
    assert_eq!(fetched.lists[0].position, 0);
    assert_eq!(fetched.lists[2].title, "Done");

    let renamed = repository::rename_board(&manager, created.board.id, "Renamed".to_string())
        .await
        .expect("Failed to rename board")
        .expect("Board not found for rename");
    assert_eq!(renamed.name, "Renamed");

    let boards = repository::list_boards(&manager).await.expect("Failed to list boards");
    assert!(boards.iter().any(|b| b.id == created.board.id));

    assert!(repository::delete_board(&manager, created.board.id).await.unwrap());
    assert!(!repository::delete_board(&manager, created.board.id).await.unwrap());
    assert!(
        repository::get_board(&manager, created.board.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_concurrent_transactions_use_distinct_sessions() {
    let manager = Arc::new(
        setup_test_db(PoolSettings {
            max_connections: 4,
            ..PoolSettings::default()
        })
        .await,
    );

    let mut handles = Vec::new();
    for _ in 0..4 {
        let manager = Arc::clone(&manager);
        handles.push(tokio::spawn(async move {
            run_in_transaction(manager.as_ref(), |conn| {
                Box::pin(async move {
                    let (pid,): (i32,) = sqlx::query_as("SELECT pg_backend_pid()")
                        .fetch_one(&mut **conn)
                        .await?;
                    sqlx::query("SELECT pg_sleep(0.2)").execute(&mut **conn).await?;
                    Ok::<_, DbError>(pid)
                })
            })
            .await
        }));
    }

    let mut pids = Vec::new();
    for handle in handles {
        pids.push(handle.await.unwrap().expect("transaction failed"));
    }
    pids.sort();
    pids.dedup();
    assert_eq!(pids.len(), 4);
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_exhausted_pool_times_out() {
    let manager = setup_test_db(PoolSettings {
        max_connections: 1,
        acquire_timeout: Duration::from_millis(200),
        ..PoolSettings::default()
    })
    .await;

    let _held = manager.get_pool().unwrap().acquire().await.unwrap();

    let result = db::ping(&manager).await;
    assert!(matches!(result, Err(DbError::ConnectionAcquisition(_))));
}

#[tokio::test]
#[ignore] // Ignored by default - requires DATABASE_URL
async fn test_cancelled_transaction_closes_session() {
    let manager = setup_test_db(PoolSettings {
        max_connections: 2,
        ..PoolSettings::default()
    })
    .await;
    let pool = manager.get_pool().unwrap().clone();
    let id = Uuid::new_v4();

    // Migrations may leave idle connections behind; start from an empty pool.
    while pool.num_idle() > 0 {
        pool.acquire().await.unwrap().close().await.unwrap();
    }
    let size_before = pool.size();

    let outcome = tokio::time::timeout(
        Duration::from_millis(300),
        run_in_transaction(&manager, move |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO boards (id, name) VALUES ($1, 'cancelled')")
                    .bind(id)
                    .execute(&mut **conn)
                    .await?;
                sqlx::query("SELECT pg_sleep(5)").execute(&mut **conn).await?;
                Ok::<_, DbError>(())
            })
        }),
    )
    .await;
    assert!(outcome.is_err(), "transaction should have been cancelled");

    // The discarded session is closed in the background, not returned as idle.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while pool.size() > size_before && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(pool.size(), size_before);
    assert_eq!(pool.num_idle(), 0);

    assert!(!board_exists(&manager, id).await);
    db::ping(&manager).await.expect("ping after cancellation failed");
}

#[test]
fn test_config_from_env() {
    // Set a minimal pool override; everything else falls back to defaults
    unsafe {
        std::env::set_var("DB_MAX_CONNECTIONS", "8");
    }

    let config = Config::from_env().expect("Failed to load config");

    assert_eq!(config.pool_settings().max_connections, 8);
    assert!(config.port > 0);
}

#[tokio::test]
async fn test_unset_database_url_fails_before_connecting() {
    let manager = PoolManager::with_url_source(PoolSettings::default(), || None);

    let result = db::ping(&manager).await;

    assert!(matches!(result, Err(DbError::Configuration(_))));
    assert!(!manager.is_initialized());
}
