use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use image::ImageFormat;
use tracing::info;

use super::{ApiError, AppState};
use crate::models::{Component, Team};

// Path ids that are not integers behave like ids that do not exist.
fn parse_id(raw: &str) -> Option<i32> {
    raw.trim().parse().ok()
}

// Components API
pub async fn list_components(
    State(state): State<AppState>,
) -> Result<Json<Vec<Component>>, ApiError> {
    state
        .store
        .list_components()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_repository("list components", e))
}

pub async fn create_component(
    State(state): State<AppState>,
    payload: Result<Json<Component>, JsonRejection>,
) -> Result<(StatusCode, Json<Component>), ApiError> {
    let Json(component) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state
        .store
        .create_component(&component)
        .await
        .map_err(|e| ApiError::from_repository("create component", e))?;

    info!(component_id = component.id, "Created component");
    Ok((StatusCode::CREATED, Json(component)))
}

pub async fn get_component(
    Path(component_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Component>, ApiError> {
    let Some(id) = parse_id(&component_id) else {
        return Err(ApiError::NotFound("component not found"));
    };

    match state.store.get_component(id).await {
        Ok(Some(component)) => Ok(Json(component)),
        Ok(None) => Err(ApiError::NotFound("component not found")),
        Err(e) => Err(ApiError::from_repository("get component", e)),
    }
}

pub async fn get_component_identicon(
    Path(component_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let Some(id) = parse_id(&component_id) else {
        return Err(ApiError::NotFound("identicon not found"));
    };

    match state.store.get_image(id).await {
        Ok(Some(image)) => Ok((
            [
                (header::CONTENT_TYPE, identicon_content_type(&image)),
                (header::CACHE_CONTROL, "public, max-age=3600"),
            ],
            image,
        )
            .into_response()),
        Ok(None) => Err(ApiError::NotFound("identicon not found")),
        Err(e) => Err(ApiError::from_repository("get identicon", e)),
    }
}

/// Sniff the stored bytes; the generator does not tell us what it produced
pub fn identicon_content_type(image: &[u8]) -> &'static str {
    match image::guess_format(image) {
        Ok(ImageFormat::Png) => "image/png",
        Ok(ImageFormat::Jpeg) => "image/jpeg",
        Ok(ImageFormat::Gif) => "image/gif",
        Ok(ImageFormat::WebP) => "image/webp",
        Ok(ImageFormat::Bmp) => "image/bmp",
        _ if looks_like_svg(image) => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

fn looks_like_svg(image: &[u8]) -> bool {
    let head = &image[..image.len().min(256)];
    let head = String::from_utf8_lossy(head);
    let head = head.trim_start();
    head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg"))
}

// Teams API
pub async fn list_teams(State(state): State<AppState>) -> Result<Json<Vec<Team>>, ApiError> {
    state
        .store
        .list_teams()
        .await
        .map(Json)
        .map_err(|e| ApiError::from_repository("list teams", e))
}

pub async fn create_team(
    State(state): State<AppState>,
    payload: Result<Json<Team>, JsonRejection>,
) -> Result<(StatusCode, Json<Team>), ApiError> {
    let Json(team) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    state
        .store
        .create_team(&team)
        .await
        .map_err(|e| ApiError::from_repository("create team", e))?;

    info!(team_id = team.id, "Created team");
    Ok((StatusCode::CREATED, Json(team)))
}

pub async fn get_team(
    Path(team_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Team>, ApiError> {
    let Some(id) = parse_id(&team_id) else {
        return Err(ApiError::NotFound("team not found"));
    };

    match state.store.get_team(id).await {
        Ok(Some(team)) => Ok(Json(team)),
        Ok(None) => Err(ApiError::NotFound("team not found")),
        Err(e) => Err(ApiError::from_repository("get team", e)),
    }
}

pub async fn list_team_components(
    Path(team_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<Vec<Component>>, ApiError> {
    let Some(id) = parse_id(&team_id) else {
        return Ok(Json(Vec::new()));
    };

    state
        .store
        .list_components_by_team(id)
        .await
        .map(Json)
        .map_err(|e| ApiError::from_repository("list team components", e))
}
