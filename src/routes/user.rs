use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Intern Router Module
///
/// Nested under `/user`. Every handler takes the `InternUser` extractor, so a
/// request that somehow bypassed the guard still gets a 403 for the wrong role.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        // GET /user/dashboard
        // Totals and per-day activity over the last 365 days.
        .route("/dashboard", get(handlers::user_dashboard))
        // GET/POST /user/logs
        .route(
            "/logs",
            get(handlers::list_my_logs).post(handlers::create_log),
        )
        // GET/PUT /user/logs/{id}
        // Edits are refused with 409 once an administrator has left feedback.
        .route(
            "/logs/{id}",
            get(handlers::get_my_log).put(handlers::update_log),
        )
}
