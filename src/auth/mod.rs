use crate::state::AppState;
use axum::Router;

mod dto;
pub mod claims;
pub mod handlers;
pub mod jwt;
pub mod password;
pub mod store;
pub mod user;
pub(crate) mod extractors;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::me_routes())
}
