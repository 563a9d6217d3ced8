use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use syncdeck_core::conflicts::PendingConflicts;
use syncdeck_core::engine::{Installation, QuickConnect};
use syncdeck_core::export::{ExportBundle, ImportBundle};
use syncdeck_core::models::{
    Conflict, Connection, ConnectionConfig, ConnectionId, DaemonStatus, InitialSyncDirection,
    ResolutionDecision, Session, SessionAction, SessionRef, Side,
};
use syncdeck_core::services::ImportReport;
use syncdeck_core::ssh::SshKey;
use syncdeck_core::Engine;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::AppError;
use crate::ws;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub const fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

pub fn app_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/system/mutagen-installed", get(mutagen_installed))
        .route("/ssh-keys", get(ssh_keys))
        .route("/daemon/status", get(daemon_status))
        .route("/daemon/start", post(start_daemon))
        .route("/connections", get(list_connections).post(create_connection))
        .route(
            "/connections/{id}",
            get(get_connection)
                .put(update_connection)
                .delete(delete_connection),
        )
        .route("/connections/{id}/connect", post(quick_connect))
        .route("/connections/{id}/duplicate", post(duplicate_connection))
        .route("/export", post(export_connections))
        .route("/import", post(import_connections))
        .route("/sessions", get(list_sessions))
        .route("/sessions/create", post(create_session))
        .route("/sessions/action", post(session_action))
        .route("/sessions/{name}/conflicts", get(session_conflicts))
        .route("/sessions/{name}/resolve-conflicts", post(resolve_conflicts))
        .route("/conflicts/pending", get(pending_conflicts));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(ws::handler))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

fn parse_id(raw: &str) -> Result<ConnectionId, AppError> {
    raw.parse()
        .map_err(|_| AppError::bad_request(format!("'{raw}' is not a connection id")))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    subscribers: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        subscribers: state.engine.hub().subscriber_count(),
    })
}

async fn mutagen_installed(State(state): State<AppState>) -> Json<Installation> {
    Json(state.engine.installation())
}

#[derive(Debug, Serialize)]
struct KeysResponse {
    keys: Vec<SshKey>,
}

async fn ssh_keys(State(state): State<AppState>) -> Json<KeysResponse> {
    Json(KeysResponse {
        keys: state.engine.ssh_keys(),
    })
}

#[derive(Debug, Serialize)]
struct DaemonStatusResponse {
    status: DaemonStatus,
}

async fn daemon_status(State(state): State<AppState>) -> Json<DaemonStatusResponse> {
    Json(DaemonStatusResponse {
        status: state.engine.daemon_status().await,
    })
}

async fn start_daemon(
    State(state): State<AppState>,
) -> Result<Json<DaemonStatusResponse>, AppError> {
    state.engine.start_daemon().await?;
    Ok(Json(DaemonStatusResponse {
        status: state.engine.daemon_status().await,
    }))
}

async fn list_connections(
    State(state): State<AppState>,
) -> Result<Json<Vec<Connection>>, AppError> {
    Ok(Json(state.engine.list_connections().await?))
}

async fn create_connection(
    State(state): State<AppState>,
    Json(config): Json<ConnectionConfig>,
) -> Result<(StatusCode, Json<Connection>), AppError> {
    let connection = state.engine.create_connection(config).await?;
    tracing::info!(connection = %connection.name, "Connection created");
    Ok((StatusCode::CREATED, Json(connection)))
}

async fn get_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Connection>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.get_connection(&id).await?))
}

async fn update_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(config): Json<ConnectionConfig>,
) -> Result<Json<Connection>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.update_connection(&id, config).await?))
}

async fn delete_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    let connection = state.engine.delete_connection(&id).await?;
    tracing::info!(connection = %connection.name, "Connection deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn quick_connect(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<QuickConnect>, AppError> {
    let id = parse_id(&id)?;
    Ok(Json(state.engine.quick_connect(&id).await?))
}

async fn duplicate_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<Connection>), AppError> {
    let id = parse_id(&id)?;
    let copy = state.engine.duplicate_connection(&id).await?;
    Ok((StatusCode::CREATED, Json(copy)))
}

async fn export_connections(
    State(state): State<AppState>,
) -> Result<Json<ExportBundle>, AppError> {
    Ok(Json(state.engine.export_connections().await?))
}

async fn import_connections(
    State(state): State<AppState>,
    Json(bundle): Json<ImportBundle>,
) -> Result<Json<ImportReport>, AppError> {
    let report = state.engine.import_connections(&bundle).await?;
    tracing::info!(
        imported = report.imported,
        skipped = report.skipped,
        "Connections imported"
    );
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct SessionsResponse {
    sessions: Vec<Session>,
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionsResponse>, AppError> {
    Ok(Json(SessionsResponse {
        sessions: state.engine.list_sessions().await?,
    }))
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    #[serde(flatten)]
    connection: ConnectionConfig,
    #[serde(default)]
    initial_sync: Option<InitialSyncDirection>,
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session: SessionRef,
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let session = state
        .engine
        .create_session(
            request.connection,
            request.initial_sync.unwrap_or(InitialSyncDirection::Skip),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(SessionResponse { session })))
}

#[derive(Debug, Deserialize)]
struct SessionActionRequest {
    session_name: String,
    action: String,
}

#[derive(Debug, Serialize)]
struct SessionActionResponse {
    session_name: String,
    action: SessionAction,
}

async fn session_action(
    State(state): State<AppState>,
    Json(request): Json<SessionActionRequest>,
) -> Result<Json<SessionActionResponse>, AppError> {
    let action: SessionAction = request.action.parse()?;
    state
        .engine
        .session_action(&request.session_name, action)
        .await?;
    Ok(Json(SessionActionResponse {
        session_name: request.session_name,
        action,
    }))
}

#[derive(Debug, Serialize)]
struct ConflictsResponse {
    conflicts: Vec<Conflict>,
    count: usize,
}

async fn session_conflicts(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ConflictsResponse>, AppError> {
    let conflicts = state.engine.conflicts(&name).await?;
    Ok(Json(ConflictsResponse {
        count: conflicts.len(),
        conflicts,
    }))
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    winner: String,
}

async fn resolve_conflicts(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    let winner: Side = request.winner.parse()?;
    let session = state
        .engine
        .resolve_conflict(&ResolutionDecision {
            session_name: name,
            winner,
        })
        .await?;
    Ok(Json(SessionResponse { session }))
}

async fn pending_conflicts(State(state): State<AppState>) -> Json<PendingConflicts> {
    Json(state.engine.pending_conflicts())
}
