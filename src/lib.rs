use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request, State},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Access control: session verification, the route guard and the extractors built on them.
pub mod auth;
pub mod guard;
pub mod session;

// Core application services and components.
pub mod config;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod webhook;

// Routers grouped by role scope (public, user, admin, api).
pub mod routes;
use routes::{admin, api, public, user};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::ApiError;
pub use guard::{Decision, GuardScope, RoutePolicy};
pub use identity::{ClerkClient, IdentityState};
pub use repository::{PostgresRepository, RepositoryState};
pub use session::{JwtSessionVerifier, LocalBypassVerifier, SessionStatus, SessionVerifierState};

/// ApiDoc
///
/// OpenAPI document for the JSON endpoints, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::clerk_webhook,
        handlers::user_dashboard, handlers::list_my_logs, handlers::create_log,
        handlers::get_my_log, handlers::update_log,
        handlers::admin_dashboard, handlers::list_interns, handlers::toggle_intern_active,
        handlers::intern_logs, handlers::get_log_feedback, handlers::put_log_feedback,
        handlers::intern_report, handlers::list_admins,
        handlers::get_me, handlers::list_users, handlers::invite_admin,
    ),
    components(
        schemas(
            models::User, models::WorkLog, models::Feedback, models::TaskHours,
            models::WorkLogRequest, models::FeedbackRequest, models::InviteRequest,
            models::InviteResponse, models::AdminDashboardStats, models::DailyActivity,
            models::UserDashboardStats, models::InternSummary, models::InternLogs,
            models::LogFeedbackView, models::ReportSummary, models::SessionProfile,
            session::Role,
        )
    ),
    tags(
        (name = "intern-logger", description = "Intern Logger API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request may need, shared across all requests. Handlers pull
/// individual components through the `FromRef` impls below.
#[derive(Clone)]
pub struct AppState {
    /// Users, work logs and feedback.
    pub repo: RepositoryState,
    /// Identity provider back-office API (roles, invitations).
    pub identity: IdentityState,
    /// Session verification used by the route guard and the extractors.
    pub sessions: SessionVerifierState,
    pub policy: Arc<RoutePolicy>,
    pub scope: Arc<GuardScope>,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for IdentityState {
    fn from_ref(app_state: &AppState) -> IdentityState {
        app_state.identity.clone()
    }
}

impl FromRef<AppState> for SessionVerifierState {
    fn from_ref(app_state: &AppState) -> SessionVerifierState {
        app_state.sessions.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// route_guard
///
/// Runs on every in-scope request before routing. Classifies the session once,
/// evaluates the policy and either short-circuits with a redirect or passes the
/// request on with the `SessionStatus` stored in its extensions for the extractors.
pub async fn route_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();
    if !state.scope.applies_to(&path) {
        return next.run(request).await;
    }

    let session = session::classify(state.sessions.as_ref(), request.headers()).await;
    let decision = state.policy.evaluate(&session, &path);

    let origin = guard::return_origin(
        &state.config.sign_in_url,
        state.config.app_url.as_deref(),
        request.headers(),
    );
    if let Some(redirect) =
        decision.redirect(&state.config.sign_in_url, request.uri(), origin.as_deref())
    {
        tracing::debug!(
            %path,
            ?decision,
            user_id = session.user_id.as_deref().unwrap_or("-"),
            "route guard redirect"
        );
        return redirect;
    }

    request.extensions_mut().insert(session);
    next.run(request).await
}

/// create_router
///
/// Assembles every router behind the route guard, then adds the unguarded
/// operational endpoints and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // `Router::layer` only wraps routes (and the fallback) registered before it:
    // everything above the guard layer is guarded, `/health` and the docs below
    // it are not. Unrouted paths hit the fallback, so they are guarded too.
    let base_router = Router::new()
        .merge(public::public_routes())
        .nest("/user", user::user_routes())
        .nest("/admin", admin::admin_routes())
        .nest("/api", api::api_routes())
        .fallback(handlers::not_found)
        .layer(middleware::from_fn_with_state(state.clone(), route_guard))
        // GET /health
        // Liveness check for the load balancer.
        .route("/health", get(|| async { "ok" }))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Request span carrying the `x-request-id` so every log line of a request can
/// be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
