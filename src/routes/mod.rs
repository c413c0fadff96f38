//! HTTP route assembly

pub mod upload;
pub mod web;

use axum::Router;

use crate::state::AppState;

/// All routes. Upload verbs are registered before the presentation
/// fallbacks so `/c`, `/u`, `/f`, `/r`, `/d` never collide with `/:item_id`.
pub fn router() -> Router<AppState> {
    Router::new().merge(upload::router()).merge(web::router())
}
