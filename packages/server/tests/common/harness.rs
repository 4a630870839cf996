//! Test harnesses for integration testing.
//!
//! `TestHarness` wires the real services over the in-memory store and the
//! mock collaborators. `PgHarness` runs against a shared Postgres container;
//! the container and migrations are initialized once, then reused.

use std::time::Duration;

use anyhow::{Context, Result};
use briefcast_core::domains::digest::DigestConfig;
use briefcast_core::domains::items::WorkerPoolConfig;
use briefcast_core::domains::podcasts::PodcastConfig;
use briefcast_core::kernel::store::{MemoryStore, PgStore};
use briefcast_core::kernel::{CoreServices, TestDependencies};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Initialize tracing subscriber to respect RUST_LOG.
/// Run tests with: RUST_LOG=debug cargo test -- --nocapture
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Worker settings that keep real-clock tests fast.
pub fn fast_worker_config() -> WorkerPoolConfig {
    WorkerPoolConfig {
        worker_count: 1,
        poll_interval: Duration::from_millis(10),
        batch_size: 10,
        max_attempts: 3,
        backoff_base: Duration::from_millis(5),
        claim_error_backoff: Duration::from_millis(10),
    }
}

// =============================================================================
// In-memory harness
// =============================================================================

pub struct TestHarness {
    pub deps: TestDependencies,
    pub services: CoreServices,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_deps(TestDependencies::new())
    }

    pub fn with_deps(deps: TestDependencies) -> Self {
        Self::with_config(
            deps,
            fast_worker_config(),
            PodcastConfig::default(),
            DigestConfig::default(),
        )
    }

    pub fn with_config(
        deps: TestDependencies,
        workers: WorkerPoolConfig,
        podcasts: PodcastConfig,
        digest: DigestConfig,
    ) -> Self {
        init_tracing();
        let services = deps.deps().services(workers, podcasts, digest);
        Self { deps, services }
    }

    pub fn store(&self) -> &MemoryStore {
        &self.deps.store
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Postgres harness
// =============================================================================

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

/// Global shared infrastructure - initialized once, reused by all tests.
static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        init_tracing();

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

        // Run migrations once on the shared database
        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

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

/// Each test gets a fresh pool on the shared database.
pub struct PgHarness {
    pub db_pool: PgPool,
    pub store: PgStore,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        // Database pool is automatically dropped
    }
}

impl PgHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let db_pool = PgPool::connect(&infra.db_url)
            .await
            .context("Failed to connect to test database")?;

        Ok(Self {
            store: PgStore::new(db_pool.clone()),
            db_pool,
        })
    }
}
