//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::audio::device::list_output_devices;
use crate::error::{Error, LibraryError};
use crate::library::SoundDraft;
use crate::protocol::{AudioDeviceInfo, SoundSummary, SoundboardStatus};
use crate::soundboard::{PreviewRequest, SettingsUpdate};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

type ApiResult<T> = (StatusCode, Json<ApiResponse<T>>);

fn error_status(error: &Error) -> StatusCode {
    match error {
        Error::Library(LibraryError::NotFound(_)) => StatusCode::NOT_FOUND,
        Error::Library(_) => StatusCode::BAD_REQUEST,
        Error::Closed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T>(result: crate::Result<T>) -> ApiResult<T> {
    match result {
        Ok(data) => (StatusCode::OK, Json(ApiResponse::ok(data))),
        Err(e) => (error_status(&e), Json(ApiResponse::error(e.to_string()))),
    }
}

/// Get soundboard status
pub async fn get_status(State(state): State<Arc<AppState>>) -> ApiResult<SoundboardStatus> {
    respond(state.soundboard.status().await)
}

/// Get sounds in display order
pub async fn get_sounds(State(state): State<Arc<AppState>>) -> ApiResult<Vec<SoundSummary>> {
    respond(state.soundboard.sounds().await)
}

/// Get available output devices
pub async fn get_devices() -> Json<ApiResponse<Vec<AudioDeviceInfo>>> {
    let devices = list_output_devices();
    Json(ApiResponse::ok(devices))
}

/// Play a sound, or stop it when it is already playing
pub async fn play_sound(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<()> {
    respond(state.soundboard.play(name).await)
}

/// Stop the main channel
pub async fn stop(State(state): State<Arc<AppState>>) -> ApiResult<bool> {
    respond(state.soundboard.stop(None).await)
}

/// Start or stop a preview
pub async fn preview(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PreviewRequest>,
) -> ApiResult<()> {
    respond(state.soundboard.preview(request).await)
}

/// Set local mute state
#[derive(serde::Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

pub async fn set_mute(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MuteRequest>,
) -> ApiResult<()> {
    respond(state.soundboard.set_local_mute(req.muted).await)
}

/// Add a sound, or edit one when `original_name` is set
pub async fn save_sound(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<SoundDraft>,
) -> ApiResult<String> {
    respond(state.soundboard.save_sound(draft).await)
}

/// Remove a sound and its stored file
pub async fn remove_sound(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<()> {
    respond(state.soundboard.remove_sound(name).await)
}

/// Move a sound within the display order
#[derive(serde::Deserialize)]
pub struct MoveRequest {
    pub from: usize,
    pub to: usize,
}

pub async fn move_sound(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MoveRequest>,
) -> ApiResult<()> {
    respond(state.soundboard.move_sound(req.from, req.to).await)
}

/// Update output device and boost settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(update): Json<SettingsUpdate>,
) -> ApiResult<()> {
    respond(state.soundboard.update_settings(update).await)
}
