//! The two named HTTP entry points: `POST /api/streaming/start/{device_id}`
//! and `/stop/{device_id}`, mapping directly onto
//! `StreamingSupervisor::start_streaming` / `stop_streaming`. Everything
//! else in the browser's scan/list surface is out of core.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;

use crate::error::Result;
use crate::state::AppState;

#[derive(Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

pub async fn start_streaming(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<ActionResponse>> {
    let transport_id = state.resolve_transport_id(&device_id).await?;
    state.supervisor.start_streaming(&device_id, &transport_id);
    Ok(Json(ActionResponse {
        success: true,
        message: format!("streaming started for {device_id}"),
    }))
}

pub async fn stop_streaming(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<String>,
) -> Result<Json<ActionResponse>> {
    state.supervisor.stop_streaming(&device_id).await?;
    Ok(Json(ActionResponse {
        success: true,
        message: format!("streaming stopped for {device_id}"),
    }))
}
