//! Health check endpoints.

use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};

use crate::db::migrations::{Migrator, current_version};
use crate::state::AppState;

/// Liveness health check endpoint.
///
/// Returns ok if the server is running. Does not check dependencies.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Readiness health check endpoint.
///
/// Returns 503 unless the database answers and the schema is at the
/// embedded version and not dirty.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let check = tokio::time::timeout(state.config().db_query_timeout, current_version(state.pool()));

    let (version, dirty) = match check.await {
        Ok(Ok(status)) => status,
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "readiness check failed");
            return unavailable("database unavailable");
        }
        Err(_) => {
            tracing::warn!("readiness check timed out");
            return unavailable("database unavailable");
        }
    };

    if dirty {
        return unavailable("schema is dirty");
    }

    let expected = Migrator::embedded().map(|m| m.latest_version()).unwrap_or_default();
    if version < expected {
        return unavailable("schema is behind");
    }

    (
        StatusCode::OK,
        Json(json!({ "status": "ready", "schema_version": version })),
    )
}

fn unavailable(reason: &str) -> (StatusCode, Json<Value>) {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "status": "unavailable", "reason": reason })),
    )
}
