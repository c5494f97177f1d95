use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Admin Router Module
///
/// Nested under `/admin`: intern oversight, feedback and reports. Handlers take
/// the `AdminUser` extractor in addition to the guard's scope rule.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/dashboard
        .route("/dashboard", get(handlers::admin_dashboard))
        // GET /admin/users
        // Interns with their log counts.
        .route("/users", get(handlers::list_interns))
        // POST /admin/users/{id}/toggle-active
        .route(
            "/users/{id}/toggle-active",
            post(handlers::toggle_intern_active),
        )
        // GET /admin/users/{id}/logs
        .route("/users/{id}/logs", get(handlers::intern_logs))
        // GET/PUT /admin/logs/{id}/feedback
        // A log has at most one feedback entry; PUT creates or replaces it.
        .route(
            "/logs/{id}/feedback",
            get(handlers::get_log_feedback).put(handlers::put_log_feedback),
        )
        // GET /admin/report?user_id=...
        .route("/report", get(handlers::intern_report))
        // GET /admin/admins
        .route("/admins", get(handlers::list_admins))
}
