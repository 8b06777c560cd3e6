pub mod dto;
pub mod handlers;
pub mod repo;
pub mod repo_types;

use crate::state::AppState;
use axum::Router;

pub fn router(max_body_bytes: usize) -> Router<AppState> {
    Router::new()
        .merge(handlers::convert_routes(max_body_bytes))
        .merge(handlers::download_routes())
}
