pub mod codes;
pub mod cv_analysis;
mod dto;
pub mod gc;
pub mod handlers;
pub mod rate_limit;
pub mod repo_types;
pub mod services;
pub mod temp_store;
pub mod uploads;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::begin_routes())
        .merge(handlers::code_routes())
}
