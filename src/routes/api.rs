use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// API Router Module
///
/// Nested under `/api`. Not role-scoped by the guard, so every handler here
/// that needs a role enforces it through its extractor.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // GET /api/me
        .route("/me", get(handlers::get_me))
        // GET /api/users
        // Admin only.
        .route("/users", get(handlers::list_users))
        // POST /api/admin/invite
        // Admin only. Provider rejections come back as 422.
        .route("/admin/invite", post(handlers::invite_admin))
        // POST /api/webhooks/clerk
        // Signed user synchronization events; on the public allow-list.
        .route("/webhooks/clerk", post(handlers::clerk_webhook))
}
