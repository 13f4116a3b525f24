use std::sync::Arc;

use axum::extract::{Path, Query, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use stride_core::remote::{ActivityList, ActivityPayload, ListFilter, RemoteActivity};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::verify_api_token;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::store::{ActivityStore, Created};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    store: Arc<ActivityStore>,
}

impl AppState {
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let store = ActivityStore::open(config.db_path.as_deref(), config.max_page).await?;
        Ok(Self {
            config,
            store: Arc::new(store),
        })
    }
}

pub fn app_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/activities", get(list_activities).post(create_activity))
        .route(
            "/activities/{id}",
            patch(update_activity).delete(delete_activity),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
}

async fn healthz() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(expected) = state.config.api_token.as_deref() {
        verify_api_token(request.headers(), expected)?;
    }
    Ok(next.run(request).await)
}

async fn list_activities(
    State(state): State<AppState>,
    Query(filter): Query<ListFilter>,
) -> Result<Json<ActivityList>, AppError> {
    let activities = state.store.list(&filter).await?;
    tracing::debug!(
        endpoint = "list_activities",
        modified_since = filter.modified_since,
        include_deleted = filter.include_deleted,
        count = activities.len(),
        "Listed activities"
    );
    Ok(Json(ActivityList { activities }))
}

async fn create_activity(
    State(state): State<AppState>,
    Json(payload): Json<ActivityPayload>,
) -> Result<(StatusCode, Json<RemoteActivity>), AppError> {
    match state.store.create(payload).await? {
        Created::New(record) => {
            tracing::info!(
                endpoint = "create_activity",
                id = record.id.as_str(),
                "Created activity"
            );
            Ok((StatusCode::CREATED, Json(record)))
        }
        Created::Existing(record) => {
            tracing::info!(
                endpoint = "create_activity",
                id = record.id.as_str(),
                "Create replayed; returning existing activity"
            );
            Ok((StatusCode::OK, Json(record)))
        }
    }
}

async fn update_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<ActivityPayload>,
) -> Result<Json<RemoteActivity>, AppError> {
    let record = state.store.update(&id, payload).await?;
    tracing::info!(endpoint = "update_activity", id = %id, "Updated activity");
    Ok(Json(record))
}

async fn delete_activity(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state.store.delete(&id).await?;
    tracing::info!(endpoint = "delete_activity", id = %id, "Deleted activity");
    Ok(StatusCode::NO_CONTENT)
}
