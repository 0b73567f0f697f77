//! Stripe webhook intake: signature verification over the raw body, then
//! typed dispatch.

pub mod events;
pub mod handlers;
pub mod processor;
pub mod repo;
pub mod signature;

use crate::state::AppState;
use axum::Router;

pub fn router() -> Router<AppState> {
    handlers::webhook_routes()
}
