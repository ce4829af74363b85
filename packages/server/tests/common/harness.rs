//! Test harness with testcontainers for integration testing.
//!
//! Uses a shared Postgres container across all tests. Each test gets its own
//! freshly migrated database, so queue claims in one test never see another
//! test's items.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::future::Future;
use std::sync::Arc;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use pipeline_core::domains::analysis::store::{PostgresResultStore, PostgresRunStore};
use pipeline_core::kernel::jobs::PostgresWorkQueue;
use pipeline_core::kernel::test_dependencies::TestDependencies;
use pipeline_core::kernel::PipelineDeps;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    /// Admin connection string; each harness creates its own database
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --ignored --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .with_cmd(["-c", "max_connections=200"])
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let pg_host = postgres.get_host().await?;
        let pg_port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!(
            "postgresql://postgres:postgres@{}:{}/postgres",
            pg_host, pg_port
        );

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

/// Test harness backed by the shared Postgres container.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// #[ignore] // Requires Docker
/// async fn my_test(ctx: &TestHarness) { ... }
/// ```
pub struct TestHarness {
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    fn setup() -> impl Future<Output = Self> + Send {
        async { Self::new().await.expect("Failed to create test harness") }
    }

    fn teardown(self) -> impl Future<Output = ()> + Send {
        // Database pool is automatically dropped
        async {}
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;
        let admin = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        let db_name = format!("test_{}", Uuid::new_v4().simple());
        sqlx::query(&format!("CREATE DATABASE {db_name}"))
            .execute(&admin)
            .await
            .context("Failed to create test database")?;
        admin.close().await;

        let (base, _) = infra
            .db_url
            .rsplit_once('/')
            .context("database URL has no path")?;
        let db_pool = PgPool::connect(&format!("{base}/{db_name}"))
            .await
            .context("Failed to connect to test database")?;

        sqlx::migrate!("./migrations")
            .run(&db_pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self { db_pool })
    }

    pub fn queue(&self) -> PostgresWorkQueue {
        PostgresWorkQueue::new(self.db_pool.clone())
    }

    pub fn runs(&self) -> PostgresRunStore {
        PostgresRunStore::new(self.db_pool.clone())
    }

    /// Postgres stores with mocked collaborators from `test`.
    pub fn deps(&self, test: &TestDependencies) -> PipelineDeps {
        let mut deps = test.deps();
        deps.queue = Arc::new(self.queue());
        deps.runs = Arc::new(self.runs());
        deps.results = Arc::new(PostgresResultStore::new(self.db_pool.clone()));
        deps
    }
}
