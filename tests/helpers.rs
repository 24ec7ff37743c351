#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fabric_submit_queue::{
    BackoffPolicy, DbJob, PgJobStore, PgStoreOptions, ShutdownTrigger, WorkerOptions,
};
use sqlx::postgres::PgConnectOptions;
use sqlx::PgPool;
use tokio::sync::OnceCell;
use tokio::task::LocalSet;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

pub const TEST_SCHEMA: &str = "fabric_submit_queue";

/// Worker options tuned for tests: short intervals, immediate retries, and a
/// programmatic shutdown instead of OS signals.
pub fn test_worker_options(trigger: &ShutdownTrigger) -> WorkerOptions {
    WorkerOptions::default()
        .concurrency(4)
        .poll_interval(Duration::from_millis(20))
        .backoff(BackoffPolicy::fixed(Duration::ZERO))
        .scheduler(false)
        .shutdown_signal(trigger.signal())
}

/// Clonable call counter shared between a test and its handler.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicU32>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tracks how many handler calls are running at once.
#[derive(Clone, Default)]
pub struct InFlight {
    current: Arc<AtomicUsize>,
    max: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn enter(&self) -> InFlightGuard {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(current, Ordering::SeqCst);
        InFlightGuard(self.current.clone())
    }

    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

pub struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub async fn wait_until<F, Fut>(timeout: Duration, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    tokio::time::timeout(timeout, async {
        while !condition().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("Condition not met in time");
}

pub async fn enable_logs() {
    static ONCE: OnceCell<()> = OnceCell::const_new();

    ONCE.get_or_init(|| async {
        let fmt_layer = tracing_subscriber::fmt::layer().with_test_writer();
        // Debug for the queue, warn for sqlx (to not show all sql requests)
        let filter_layer = EnvFilter::try_new("debug,sqlx=warn").unwrap();

        tracing_subscriber::registry()
            .with(filter_layer)
            .with(fmt_layer)
            .init();
    })
    .await;
}

#[derive(Clone, Debug)]
pub struct TestDatabase {
    pub source_pool: PgPool,
    pub test_pool: PgPool,
    pub name: String,
}

impl TestDatabase {
    async fn drop(&self) {
        self.test_pool.close().await;
        sqlx::query(&format!("DROP DATABASE {} WITH (FORCE)", self.name))
            .execute(&self.source_pool)
            .await
            .expect("Failed to drop test database");
    }

    pub fn store_options(&self) -> PgStoreOptions {
        PgStoreOptions::default()
            .pg_pool(self.test_pool.clone())
            .schema(TEST_SCHEMA)
    }

    pub async fn connect_store(&self) -> PgJobStore {
        self.store_options()
            .connect()
            .await
            .expect("Failed to connect store")
    }

    pub async fn get_jobs(&self) -> Vec<DbJob> {
        sqlx::query_as(&format!(
            "select * from {TEST_SCHEMA}._private_jobs order by seq asc"
        ))
        .fetch_all(&self.test_pool)
        .await
        .expect("Failed to get jobs")
    }

    pub async fn get_migration_ids(&self) -> Vec<i32> {
        sqlx::query_scalar(&format!(
            "select id from {TEST_SCHEMA}.migrations order by id asc"
        ))
        .fetch_all(&self.test_pool)
        .await
        .expect("Failed to get migrations")
    }
}

pub async fn create_test_database(db_url: &str) -> TestDatabase {
    let mut pg_conn_options: PgConnectOptions =
        db_url.parse().expect("Failed to parse DATABASE_URL");
    pg_conn_options = pg_conn_options.application_name("__test_fabric_submit_queue");

    let pg_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect_with(pg_conn_options.clone())
        .await
        .expect("Failed to connect to database");

    let db_id = uuid::Uuid::now_v7();
    let db_name = format!("__test_fabric_submit_queue_{}", db_id.simple());

    sqlx::query(&format!("CREATE DATABASE {}", db_name))
        .execute(&pg_pool)
        .await
        .expect("Failed to create test database");

    let test_options = pg_conn_options.database(&db_name);

    let test_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(8)
        .connect_with(test_options)
        .await
        .expect("Failed to connect to test database");

    TestDatabase {
        source_pool: pg_pool,
        test_pool,
        name: db_name,
    }
}

/// Runs `test_fn` against a throwaway database created from `DATABASE_URL`.
///
/// Does nothing when `DATABASE_URL` is not set, so the suite still runs
/// without a Postgres server.
pub async fn with_test_db<F, Fut>(test_fn: F)
where
    F: FnOnce(TestDatabase) -> Fut + 'static,
    Fut: Future<Output = ()>,
{
    let Ok(db_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL is not set, skipping postgres test");
        return;
    };

    let local_set = LocalSet::new();

    local_set
        .run_until(async move {
            let test_db = create_test_database(&db_url).await;
            let test_db_2 = test_db.clone();

            let result = tokio::task::spawn_local(async move {
                test_fn(test_db_2).await;
            })
            .await;

            test_db.drop().await;
            result.expect("Test failed");
        })
        .await;
}
