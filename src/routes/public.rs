use crate::{AppState, handlers};
use axum::{Router, routing::get};

/// Public Router Module
///
/// Pages every visitor can reach. `/` is not on the public allow-list: an
/// anonymous visitor is sent to sign in and a signed-in user with a role is
/// sent to their role home, so only role-less accounts see the landing page.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /
        .route("/", get(handlers::landing))
        // GET /unauthorized
        // Target of every scope violation. Public so the redirect cannot loop.
        .route("/unauthorized", get(handlers::unauthorized))
        // GET /auth/complete
        // Where the sign-in page returns to; forwards to the role home.
        .route("/auth/complete", get(handlers::auth_complete))
}
