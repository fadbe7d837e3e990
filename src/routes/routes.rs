//! Defines routes for the record API, blob retrieval and probes.
//!
//! ## Structure
//! - **Record endpoints**
//!   - `POST   /api/upload`      : multipart upload (`name`, `image`)
//!   - `GET    /api/latest`      : most recent record
//!   - `GET    /api/latest-5`    : five most recent records
//!   - `GET    /api/images`      : paginated list (`page`, `limit`)
//!   - `DELETE /api/images/{id}` : delete record and its blob
//!   - `GET    /api/info`        : instance address and server number
//!
//! - **Blob retrieval**
//!   - `GET    /uploads/{key}`
//!
//! - **Probes**
//!   - `GET    /health`, `GET /readyz`
//!
//! Every response carries `X-Server-Number`.

use crate::{
    handlers::{
        health_handlers::{health, readyz},
        object_handlers::get_upload,
        record_handlers::{
            X_SERVER_NUMBER, delete_image, info, latest, latest_five, list_images, upload,
        },
    },
    state::AppState,
};
use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::HeaderValue,
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
};

/// Build the application router around `state`.
///
/// `max_upload_bytes` bounds request bodies, which in practice means uploads.
pub fn routes(state: AppState, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/api/info", get(info))
        .route("/api/upload", post(upload))
        .route("/api/latest", get(latest))
        .route("/api/latest-5", get(latest_five))
        .route("/api/images", get(list_images))
        .route("/api/images/{id}", delete(delete_image))
        .route("/uploads/{key}", get(get_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            server_number_header,
        ))
        .with_state(state)
}

async fn server_number_header(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&state.server_number) {
        response.headers_mut().insert(X_SERVER_NUMBER, value);
    }
    response
}
