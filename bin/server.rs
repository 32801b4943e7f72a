// Open Bid - Web Server
// JSON API over the bid service for the presentation layer

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use open_bid::{
    distance_label, distance_to_project, telemetry, BidError, BidService, Category, ContractorBid,
    GeoPoint, MemoryStore, SpeckleClient, SpeckleConfig,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
struct AppState {
    service: BidService,
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }
}

fn error_response(err: &BidError) -> Response {
    let status = match err {
        BidError::NotFound(_) => StatusCode::NOT_FOUND,
        BidError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        BidError::SchemaMismatch(_) => StatusCode::UNPROCESSABLE_ENTITY,
        BidError::RemoteUnavailable(_) => StatusCode::BAD_GATEWAY,
        BidError::ConfigMissing(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    tracing::warn!(%status, error = %err, "request failed");
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(err.to_string()),
        }),
    )
        .into_response()
}

/// Run a blocking service call off the async workers
async fn blocking<T, F>(state: AppState, call: F) -> Response
where
    T: Serialize + Send + 'static,
    F: FnOnce(&BidService) -> open_bid::Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || call(&state.service)).await {
        Ok(Ok(data)) => ApiResponse::ok(data),
        Ok(Err(err)) => error_response(&err),
        Err(join_error) => error_response(&BidError::RemoteUnavailable(format!(
            "worker failed: {}",
            join_error
        ))),
    }
}

fn parse_category(raw: &str) -> Result<Category, Response> {
    raw.parse::<Category>().map_err(|err| error_response(&err))
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/models - Model branches
async fn get_models(State(state): State<AppState>) -> Response {
    blocking(state, |service| service.list_models()).await
}

/// GET /api/:category/names - Distinct item names
async fn get_names(State(state): State<AppState>, Path(category): Path<String>) -> Response {
    match parse_category(&category) {
        Ok(category) => blocking(state, move |service| service.names(category)).await,
        Err(response) => response,
    }
}

/// GET /api/:category/quantities - Volumes or piece counts
async fn get_quantities(State(state): State<AppState>, Path(category): Path<String>) -> Response {
    match parse_category(&category) {
        Ok(category) => blocking(state, move |service| service.quantities(category)).await,
        Err(response) => response,
    }
}

/// GET /api/summary - Totals for both categories
async fn get_summary(State(state): State<AppState>) -> Response {
    blocking(state, |service| service.quantity_summary()).await
}

#[derive(Serialize)]
struct CompareResponse {
    rows: Vec<open_bid::ComparisonRow>,
    chart: open_bid::ComparisonChart,
}

/// POST /api/compare/:category - Price comparison for submitted bids
async fn post_compare(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(bids): Json<Vec<ContractorBid>>,
) -> Response {
    let category = match parse_category(&category) {
        Ok(category) => category,
        Err(response) => return response,
    };

    blocking(state, move |service| {
        let rows = service.compare(&bids, category)?;
        let chart = open_bid::ComparisonChart::from_rows(category, &rows);
        Ok(CompareResponse { rows, chart })
    })
    .await
}

/// POST /api/prices - Push every contractor's prices into the model
async fn post_prices(State(state): State<AppState>, Json(bids): Json<Vec<ContractorBid>>) -> Response {
    blocking(state, move |service| service.push_all(&bids)).await
}

#[derive(Deserialize)]
struct DistanceQuery {
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Serialize)]
struct DistanceResponse {
    km: Option<f64>,
    label: Option<String>,
}

/// GET /api/distance?lat=..&lon=.. - Distance to the project site
async fn get_distance(Query(query): Query<DistanceQuery>) -> Response {
    let location = match (query.lat, query.lon) {
        (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
        _ => None,
    };
    ApiResponse::ok(DistanceResponse {
        km: distance_to_project(location.as_ref()),
        label: distance_label(location.as_ref()),
    })
}

// ============================================================================
// Main Server
// ============================================================================

fn build_service() -> anyhow::Result<BidService> {
    if std::env::args().any(|arg| arg == "--offline") {
        tracing::info!("using in-memory demo model store");
        return Ok(BidService::new(Arc::new(MemoryStore::demo()?)));
    }
    let config = SpeckleConfig::from_env()?;
    tracing::info!(host = %config.host, stream = %config.stream_id, "using Speckle model store");
    Ok(BidService::new(Arc::new(SpeckleClient::new(config))))
}

fn router(service: BidService) -> Router {
    let state = AppState { service };

    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/models", get(get_models))
        .route("/summary", get(get_summary))
        .route("/distance", get(get_distance))
        .route("/prices", post(post_prices))
        .route("/compare/:category", post(post_compare))
        .route("/:category/names", get(get_names))
        .route("/:category/quantities", get(get_quantities))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init_logging(0)?;

    let service = build_service()?;
    let app = router(service);

    let addr = std::env::var("OPEN_BID_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
