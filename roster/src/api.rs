use crate::config::Listener as ListenerConfig;
use crate::error::SyncError;
use crate::sync_engine::SyncEngine;
use crate::types::{CharacterRecord, Ocid, Synced};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;

#[derive(thiserror::Error, Debug)]
pub enum RosterApiError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub fn router(engine: Arc<SyncEngine>) -> Router {
    Router::new()
        .route("/characters/sync", post(sync_handler))
        .route("/characters/{ocid}", get(record_handler))
        .route(
            "/characters/by-name/{name}/parent",
            get(parent_handler),
        )
        .route("/groups/{parent_ocid}/members", get(members_handler))
        .route("/ranking/seed", post(seed_handler))
        .with_state(engine)
}

pub async fn serve(listener: TcpListener, engine: Arc<SyncEngine>) -> Result<(), RosterApiError> {
    tracing::info!(addr = ?listener.local_addr().ok(), "serving roster api");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

pub async fn bind(listener: &ListenerConfig) -> Result<TcpListener, RosterApiError> {
    let addr = format!("{}:{}", listener.host, listener.port);
    Ok(TcpListener::bind(addr).await?)
}

#[derive(Deserialize, Debug)]
struct NameBody {
    name: String,
}

#[derive(Serialize)]
struct ParentResponse {
    parent_ocid: Ocid,
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error_message: String,
}

async fn sync_handler(
    State(engine): State<Arc<SyncEngine>>,
    Json(body): Json<NameBody>,
) -> Result<Json<Synced>, SyncError> {
    engine.sync_character(&body.name).await.map(Json)
}

async fn seed_handler(
    State(engine): State<Arc<SyncEngine>>,
    Json(body): Json<NameBody>,
) -> Result<StatusCode, SyncError> {
    engine.sync_from_ranking_entry(&body.name).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn record_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(ocid): Path<Ocid>,
) -> Result<Json<CharacterRecord>, SyncError> {
    engine.get_record(&ocid).await.map(Json)
}

async fn members_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(parent_ocid): Path<Ocid>,
) -> Result<Json<Vec<CharacterRecord>>, SyncError> {
    let members = engine.get_grouping_members(&parent_ocid).await?;
    Ok(Json(members.as_ref().clone()))
}

async fn parent_handler(
    State(engine): State<Arc<SyncEngine>>,
    Path(name): Path<String>,
) -> Result<Json<ParentResponse>, SyncError> {
    let parent_ocid = engine.parent_ocid_by_name(&name).await?;
    Ok(Json(ParentResponse { parent_ocid }))
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = match self {
            SyncError::IdentityNotFound(_) | SyncError::RecordNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            SyncError::Store(_) | SyncError::InvalidUpstreamData(_) => {
                tracing::error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(ApiErrorResponse {
            error_message: self.to_string(),
        });

        (status, body).into_response()
    }
}
