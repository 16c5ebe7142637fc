use std::sync::Arc;

use axum::{
    Router,
    extract::{Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Deserialize;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{
    clients::{database::NotificationStore, health::HealthChecker, rbmq::DeliveryBroker},
    error::{BrokerError, StoreError},
    models::{
        health::HealthStatus,
        message::NotificationRequest,
        notification::{Fingerprint, ListFilter},
        response::{AcceptedResponse, ErrorResponse},
        validation::{ValidationError, mask_email, validate_request},
    },
};

pub struct AppState {
    store: Arc<dyn NotificationStore>,
    broker: Arc<dyn DeliveryBroker>,
    health_checker: HealthChecker,
}

impl AppState {
    pub fn new(store: Arc<dyn NotificationStore>, broker: Arc<dyn DeliveryBroker>) -> Self {
        Self {
            health_checker: HealthChecker::new(store.clone(), broker.clone()),
            store,
            broker,
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid json")]
    InvalidJson(#[from] JsonRejection),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to store")]
    Store(#[source] StoreError),

    #[error("query failed")]
    Query(#[source] StoreError),

    #[error("failed to enqueue")]
    Publish(#[from] BrokerError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::InvalidJson(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Publish(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, Json(ErrorResponse::new(self.to_string()))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

impl From<ListParams> for ListFilter {
    /// Empty filters are ignored, and so are numbers that do not parse.
    fn from(params: ListParams) -> Self {
        Self {
            sender: params.sender.filter(|s| !s.is_empty()),
            recipient: params.recipient.filter(|r| !r.is_empty()),
            limit: params.limit.and_then(|v| v.parse().ok()),
            offset: params.offset.and_then(|v| v.parse().ok()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/notifications",
            post(create_notification).get(list_notifications),
        )
        .route("/notifications/async", post(enqueue_notification))
        .route("/health", get(health_check))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    port: u16,
    state: Arc<AppState>,
    shutdown: CancellationToken,
) -> Result<(), std::io::Error> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "HTTP server started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn create_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    validate_request(&request)?;

    let outcome = state.store.persist(&request).await.map_err(|e| {
        error!(error = %e, "Direct persistence failed");
        ApiError::Store(e)
    })?;

    info!(
        sender = %mask_email(&request.sender),
        recipient = %mask_email(&request.recipient),
        outcome = %outcome,
        "Stored notification"
    );

    Ok((
        StatusCode::CREATED,
        Json(AcceptedResponse {
            status: outcome.to_string(),
            fingerprint: Fingerprint::of(&request).to_string(),
        }),
    ))
}

async fn enqueue_notification(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NotificationRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(request) = payload?;
    validate_request(&request)?;

    state.broker.publish(&request).await.map_err(|e| {
        warn!(error = %e, "Failed to enqueue notification");
        e
    })?;

    info!(
        sender = %mask_email(&request.sender),
        recipient = %mask_email(&request.recipient),
        "Queued notification"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            status: "queued".to_string(),
            fingerprint: Fingerprint::of(&request).to_string(),
        }),
    ))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = ListFilter::from(params);

    let notifications = state.store.list(&filter).await.map_err(|e| {
        error!(error = %e, "Listing notifications failed");
        ApiError::Query(e)
    })?;

    Ok(Json(notifications))
}

async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_checker.check_all().await;

    let status_code = match health.status {
        HealthStatus::Ok => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}
