use std::time::Duration;

use axum::{extract::Extension, http::StatusCode, Json};
use serde::Serialize;
use sqlx::PgPool;

use crate::server::app::AppState;

const DB_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    database: DatabaseCheck,
    pool: PoolStats,
    /// `running` or `stopped`
    workers: &'static str,
    /// Users with at least one open item stream
    streaming_users: usize,
}

#[derive(Debug, Serialize)]
pub struct DatabaseCheck {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PoolStats {
    size: u32,
    idle: usize,
    max: u32,
}

async fn check_database(pool: &PgPool) -> DatabaseCheck {
    let error = match tokio::time::timeout(DB_CHECK_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => None,
        Ok(Err(e)) => Some(format!("query failed: {}", e)),
        Err(_) => Some(format!("no answer within {:?}", DB_CHECK_TIMEOUT)),
    };
    DatabaseCheck {
        status: if error.is_none() { "ok" } else { "error" },
        error,
    }
}

/// Liveness of the processing core.
///
/// Only the database decides the status code. A stopped worker pool is
/// reported but still answers 200, since items simply wait in the queue.
pub async fn health_handler(Extension(state): Extension<AppState>) -> (StatusCode, Json<HealthReport>) {
    let database = check_database(&state.db_pool).await;
    let healthy = database.error.is_none();

    let report = HealthReport {
        status: if healthy { "healthy" } else { "unhealthy" },
        database,
        pool: PoolStats {
            size: state.db_pool.size(),
            idle: state.db_pool.num_idle(),
            max: state.db_pool.options().get_max_connections(),
        },
        workers: if state.worker_pool.is_running() {
            "running"
        } else {
            "stopped"
        },
        streaming_users: state.stream_hub.user_count(),
    };

    let code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(report))
}
