pub mod store;

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::IntoResponse,
};

use crate::state::AppState;

/// GET /media/{name}
/// Serve a stored image by its content-addressed file name.
pub async fn get_media(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, StatusCode> {
    let data = store::get(&state.data_dir, &name)
        .map_err(|_| StatusCode::BAD_REQUEST)?
        .ok_or(StatusCode::NOT_FOUND)?;

    let content_type = store::content_type_for(&name).ok_or(StatusCode::NOT_FOUND)?;

    Ok(([(header::CONTENT_TYPE, content_type)], data))
}
