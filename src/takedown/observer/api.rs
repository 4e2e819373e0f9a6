//! HTTP handlers for the report, listing and download endpoints.
//!
//! Handlers only translate between the wire and the core: bodies are parsed
//! into [`ReportRequest`]s, validated, and the blocking store work is moved
//! onto tokio's blocking pool.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error, warn};

use crate::takedown::observer::aggregate;
use crate::takedown::observer::error::{ObserverError, Result};
use crate::takedown::observer::export;
use crate::takedown::observer::model::{AccountsPage, ReportRequest};
use crate::takedown::observer::query::{self, ListQuery};
use crate::takedown::observer::store::AccountStore;
use crate::takedown::observer::validation::validate_report;

/// File name offered to browsers for the CSV export.
pub const EXPORT_FILE_NAME: &str = "takedowns.csv";

/// State shared across handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<AccountStore>,
}

impl AppState {
    pub fn new(store: Arc<AccountStore>) -> Self {
        Self { store }
    }
}

/// Routes under `/api`.
pub fn api_router(state: AppState) -> Router {
    Router::new()
        .route("/api/report", post(submit_report))
        .route("/api/accounts", get(list_accounts))
        .route("/api/download", get(download_csv))
        .with_state(state)
}

/// Error returned by the API handlers.
#[derive(Debug)]
pub enum ApiError {
    /// The request body was not a well-formed report payload.
    MalformedBody,
    Observer(ObserverError),
}

impl From<ObserverError> for ApiError {
    fn from(err: ObserverError) -> Self {
        ApiError::Observer(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::MalformedBody => {
                (StatusCode::BAD_REQUEST, "Invalid request body").into_response()
            }
            ApiError::Observer(err) if err.is_client_error() => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            ApiError::Observer(err @ ObserverError::Storage(_)) => {
                error!(error = %err, "store request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error").into_response()
            }
            ApiError::Observer(err) => {
                error!(error = %err, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

async fn submit_report(
    State(state): State<AppState>,
    body: Bytes,
) -> std::result::Result<Response, ApiError> {
    let request: ReportRequest = serde_json::from_slice(&body).map_err(|err| {
        debug!(error = %err, "malformed report body");
        ApiError::MalformedBody
    })?;

    let intake = validate_report(&request).map_err(|rejection| {
        warn!(%rejection, "rejected report");
        ObserverError::from(rejection)
    })?;

    let store = Arc::clone(&state.store);
    let outcome = run_blocking(move || aggregate::submit(&store, &intake)).await?;

    Ok(Json(json!({ "status": "success", "outcome": outcome })).into_response())
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    page: Option<String>,
    country: Option<String>,
    search: Option<String>,
}

async fn list_accounts(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> std::result::Result<Json<AccountsPage>, ApiError> {
    let query = ListQuery::from_params(
        params.page.as_deref(),
        params.country.as_deref(),
        params.search.as_deref(),
    );
    let store = Arc::clone(&state.store);
    let page = run_blocking(move || query::list_accounts(&store, &query)).await?;
    Ok(Json(page))
}

async fn download_csv(State(state): State<AppState>) -> std::result::Result<Response, ApiError> {
    let store = Arc::clone(&state.store);
    let document = run_blocking(move || export::export_csv(&store)).await?;

    let disposition = format!("attachment; filename={EXPORT_FILE_NAME}");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        document,
    )
        .into_response())
}

async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| ObserverError::Runtime(err.to_string()))?
}
