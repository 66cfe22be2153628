// 🌐 REST API with Axum
// Thin adapter: parse the request, run one view on a blocking session, serialize.

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::analytics::AnalyticsEngine;
use crate::config::AppConfig;
use crate::db::{Database, Session};
use crate::error::{ErrorClass, Result, ServiceError};
use crate::identity::IdentityHasher;
use crate::ingestion::{IngestReport, IngestionPipeline};
use crate::model::{AuthContext, OwnerId, RawTransaction};
use crate::query::ViewParams;

/// Header set by the upstream auth gateway.
pub const OWNER_HEADER: &str = "x-owner-id";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    db: Arc<Database>,
    hasher: Arc<IdentityHasher>,
    page_limit: i64,
}

impl AppState {
    pub fn new(db: Database, config: &AppConfig) -> Self {
        AppState {
            db: Arc::new(db),
            hasher: Arc::new(config.identity_hasher()),
            page_limit: config.page_limit,
        }
    }

    /// Run `work` on the blocking pool with a fresh session. The session is
    /// dropped when `work` returns, successful or not.
    async fn with_session<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session, &IdentityHasher) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let hasher = Arc::clone(&self.hasher);

        tokio::task::spawn_blocking(move || {
            let session = db.session()?;
            work(&session, &hasher)
        })
        .await
        .map_err(|e| ServiceError::Internal(format!("worker task failed: {}", e)))?
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let class = self.class();
        if class == ErrorClass::Service {
            tracing::error!(error = %self, "request failed");
        }

        let status =
            StatusCode::from_u16(class.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

fn owner_from(headers: &HeaderMap) -> Result<OwnerId> {
    let subject = headers
        .get(OWNER_HEADER)
        .map(|value| {
            value
                .to_str()
                .map_err(|_| ServiceError::Unauthorized("owner header is not valid text".into()))
        })
        .transpose()?;

    AuthContext::from_subject(subject)?.require_owner().cloned()
}

// ============================================================================
// Router
// ============================================================================

pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let payments = Router::new()
        .route("/transactions", get(list_transactions).post(ingest_transactions))
        .route("/transactions/analysis", get(transaction_range))
        .route("/transactions/monthly", get(monthly_totals))
        .route("/transactions/average", get(average_daily_spend))
        .route("/transactions/pattern", get(weekly_pattern))
        .route("/transactions/time", get(hourly_scatter))
        .route("/transactions/debitvscredit", get(debit_vs_credit))
        .route("/transactions/:id", get(get_transaction));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/payments", payments)
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

pub async fn run_server(state: AppState, config: &AppConfig) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = config.address().parse::<SocketAddr>()?;
    tracing::info!("Starting server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

#[derive(Serialize)]
struct IngestResponse {
    status: &'static str,
    message: String,
    #[serde(flatten)]
    report: IngestReport,
}

/// POST /api/v1/payments/transactions
async fn ingest_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IngestResponse>> {
    let owner = owner_from(&headers)?;
    let batch: Vec<RawTransaction> = serde_json::from_slice(&body)
        .map_err(|e| ServiceError::client_input(format!("invalid transaction batch: {}", e)))?;

    let report = state
        .with_session(move |session, hasher| {
            IngestionPipeline::new(session, hasher).ingest(&owner, &batch)
        })
        .await?;

    Ok(Json(IngestResponse {
        status: "success",
        message: format!(
            "{} transaction(s) saved, {} duplicate(s) skipped",
            report.accepted, report.duplicates
        ),
        report,
    }))
}

/// GET /api/v1/payments/transactions?page=&limit=&sort=
async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let paginate = params.paginate(state.page_limit)?;

    let page = state
        .with_session(move |session, _| {
            AnalyticsEngine::new(session).list_transactions(&owner, &paginate)
        })
        .await?;

    Ok(Json(page))
}

/// GET /api/v1/payments/transactions/:id
async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;

    let transaction = state
        .with_session(move |session, _| AnalyticsEngine::new(session).get_transaction(&owner, &id))
        .await?;

    Ok(Json(transaction))
}

/// GET /api/v1/payments/transactions/analysis?start_date=&end_date=&type=
async fn transaction_range(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let range = params.range()?;

    let result = state
        .with_session(move |session, _| {
            AnalyticsEngine::new(session).transactions_in_range(&owner, &range)
        })
        .await?;

    Ok(Json(result))
}

/// GET /api/v1/payments/transactions/monthly?type=
async fn monthly_totals(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let kind = params.kind_or_debit()?;

    let totals = state
        .with_session(move |session, _| AnalyticsEngine::new(session).monthly_totals(&owner, kind))
        .await?;

    Ok(Json(totals))
}

/// GET /api/v1/payments/transactions/average?year=&month=&type=
async fn average_daily_spend(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let now = Utc::now();
    let year = params.year_or(now)?;
    let month = params.month_or(now)?;
    let kind = params.kind_or_debit()?;

    let trend = state
        .with_session(move |session, _| {
            AnalyticsEngine::new(session).average_daily_spend(&owner, year, month, kind)
        })
        .await?;

    Ok(Json(trend))
}

/// GET /api/v1/payments/transactions/pattern?year=&month=&type=
async fn weekly_pattern(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let now = Utc::now();
    let year = params.year_or(now)?;
    let month = params.month_or(now)?;
    let kind = params.kind_or_debit()?;

    let pattern = state
        .with_session(move |session, _| {
            AnalyticsEngine::new(session).weekly_pattern(&owner, year, month, kind)
        })
        .await?;

    Ok(Json(pattern))
}

/// GET /api/v1/payments/transactions/time?type=
async fn hourly_scatter(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let kind = params.kind_or_debit()?;

    let points = state
        .with_session(move |session, _| AnalyticsEngine::new(session).hourly_scatter(&owner, kind))
        .await?;

    Ok(Json(points))
}

/// GET /api/v1/payments/transactions/debitvscredit?year=
async fn debit_vs_credit(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ViewParams>,
) -> Result<impl IntoResponse> {
    let owner = owner_from(&headers)?;
    let year = params.year_or(Utc::now())?;

    let report = state
        .with_session(move |session, _| AnalyticsEngine::new(session).debit_vs_credit(&owner, year))
        .await?;

    Ok(Json(report))
}
