use crate::{
    AppState,
    auth::{AdminUser, AuthUser, InternUser},
    error::ApiError,
    guard::{ROOT_PATH, UNAUTHORIZED_PATH},
    identity::IdentityProvider,
    models::{
        AdminDashboardStats, DASHBOARD_WINDOW_DAYS, FeedbackRequest, InternLogs, InternSummary,
        InviteRequest, InviteResponse, LogFeedbackView, REPORT_TOP_TASKS, ReportQuery,
        ReportSummary, SessionProfile, User, UserDashboardStats, UserUpsert, WorkLog,
        WorkLogRequest,
    },
    session::{Role, SessionStatus},
    webhook::{UserEventData, WebhookError, WebhookEvent, WebhookVerifier},
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use uuid::Uuid;

// --- Public Handlers ---

/// landing
///
/// Root page for a signed-in account that has no role yet. Signed-in users
/// with a role never get here: the route guard sends them to their role home.
pub async fn landing() -> Json<Value> {
    Json(json!({
        "name": "Intern Logger",
        "description": "Log work, track skills and receive feedback in one place.",
    }))
}

/// unauthorized
///
/// [Public Route] Target of every scope violation redirect.
pub async fn unauthorized() -> Json<Value> {
    Json(json!({
        "error": "Unauthorized Access",
        "message": "Sorry, you don't have permission to view this page.",
        "home": ROOT_PATH,
    }))
}

/// auth_complete
///
/// Post-sign-in landing: forwards the user to the home page of their role.
pub async fn auth_complete(session: SessionStatus) -> Redirect {
    let target = match (session.authenticated, session.role) {
        (false, _) => ROOT_PATH,
        (true, Some(role)) => role.home_path(),
        (true, None) => UNAUTHORIZED_PATH,
    };
    Redirect::temporary(target)
}

/// Fallback for unrouted paths. Only reached once the route guard allowed the request.
pub async fn not_found() -> ApiError {
    ApiError::NotFound("page")
}

/// clerk_webhook
///
/// [Public Route] User-record synchronization. Verifies the delivery signature,
/// resolves the account's role from the identity provider (assigning `user`
/// when none is set) and upserts the mirror record keyed by email.
#[utoipa::path(
    post,
    path = "/api/webhooks/clerk",
    responses(
        (status = 200, description = "Synchronized"),
        (status = 400, description = "Invalid signature, payload or event type"),
        (status = 500, description = "Store failure")
    )
)]
pub async fn clerk_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<Value>, ApiError> {
    let verifier = WebhookVerifier::new(&state.config.webhook_secret)?;
    if let Err(e) = verifier.verify(&headers, &body, Utc::now()) {
        tracing::warn!(error = %e, "webhook verification failed");
        return Err(e.into());
    }

    let event: WebhookEvent = serde_json::from_str(&body).map_err(WebhookError::from)?;
    if !event.is_user_sync() {
        return Err(ApiError::BadRequest(format!(
            "unsupported event type `{}`",
            event.event_type
        )));
    }

    let data: UserEventData = serde_json::from_value(event.data).map_err(WebhookError::from)?;
    let email = match data.primary_email() {
        Some(email) if !data.id.is_empty() => email.to_string(),
        _ => return Err(ApiError::BadRequest("invalid payload".to_string())),
    };

    // The provider writes public metadata shortly after the account event.
    if !state.config.webhook_sync_delay.is_zero() {
        tokio::time::sleep(state.config.webhook_sync_delay).await;
    }
    let role = resolve_role(state.identity.as_ref(), &data.id).await;

    let user = state
        .repo
        .upsert_user(UserUpsert {
            id: data.id.clone(),
            full_name: data.full_name(),
            email,
            role,
        })
        .await?;

    tracing::info!(user_id = %user.id, role = %role, event = %event.event_type, "user record synchronized");
    Ok(Json(json!({ "success": true })))
}

/// Best effort: lookup failures fall back to `user` without failing the delivery.
/// Only an absent role is written back to the provider; an unrecognised value
/// is left in place and mirrored locally as `user`.
async fn resolve_role(identity: &dyn IdentityProvider, user_id: &str) -> Role {
    match identity.user_role(user_id).await {
        Ok(Some(raw)) => Role::from_claim(&raw).unwrap_or_else(|| {
            tracing::warn!(user_id, role = %raw, "unrecognised provider role, storing as user");
            Role::User
        }),
        Ok(None) => {
            if let Err(e) = identity.assign_role(user_id, Role::User).await {
                tracing::error!(error = %e, user_id, "failed to assign default role");
            }
            Role::User
        }
        Err(e) => {
            tracing::error!(error = %e, user_id, "failed to read user metadata");
            Role::User
        }
    }
}

// --- Intern (user-scoped) Handlers ---

/// user_dashboard
///
/// [User Route] Log count, hours and per-day activity over the last year.
#[utoipa::path(
    get,
    path = "/user/dashboard",
    responses((status = 200, description = "Dashboard", body = UserDashboardStats))
)]
pub async fn user_dashboard(
    InternUser(user): InternUser,
    State(state): State<AppState>,
) -> Result<Json<UserDashboardStats>, ApiError> {
    let since = Utc::now().date_naive() - Duration::days(DASHBOARD_WINDOW_DAYS);
    let rows = state.repo.log_activity_since(&user.id, since).await?;
    Ok(Json(UserDashboardStats::from_activity(&rows)))
}

/// list_my_logs
///
/// [User Route] The caller's logs, newest first, with feedback status.
#[utoipa::path(
    get,
    path = "/user/logs",
    responses((status = 200, description = "My Logs", body = [WorkLog]))
)]
pub async fn list_my_logs(
    InternUser(user): InternUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<WorkLog>>, ApiError> {
    Ok(Json(state.repo.list_logs(&user.id).await?))
}

/// create_log
///
/// [User Route] Records a new work log for the caller.
#[utoipa::path(
    post,
    path = "/user/logs",
    request_body = WorkLogRequest,
    responses(
        (status = 200, description = "Created", body = WorkLog),
        (status = 400, description = "Validation failed")
    )
)]
pub async fn create_log(
    InternUser(user): InternUser,
    State(state): State<AppState>,
    Json(payload): Json<WorkLogRequest>,
) -> Result<Json<WorkLog>, ApiError> {
    payload.validate(Utc::now().date_naive())?;
    let log = state.repo.create_log(&user.id, payload).await?;
    tracing::debug!(log_id = %log.id, user_id = %user.id, "work log created");
    Ok(Json(log))
}

/// get_my_log
///
/// [User Route] One of the caller's logs with its feedback. Logs owned by
/// someone else are reported as missing.
#[utoipa::path(
    get,
    path = "/user/logs/{id}",
    params(("id" = Uuid, Path, description = "Work log ID")),
    responses(
        (status = 200, description = "Found", body = WorkLog),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_my_log(
    InternUser(user): InternUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkLog>, ApiError> {
    match state.repo.get_log(id).await? {
        Some(log) if log.user_id == user.id => Ok(Json(log)),
        _ => Err(ApiError::NotFound("work log")),
    }
}

/// update_log
///
/// [User Route] Edits one of the caller's logs. Locked once feedback exists.
#[utoipa::path(
    put,
    path = "/user/logs/{id}",
    params(("id" = Uuid, Path, description = "Work log ID")),
    request_body = WorkLogRequest,
    responses(
        (status = 200, description = "Updated", body = WorkLog),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Not Found"),
        (status = 409, description = "Feedback already given")
    )
)]
pub async fn update_log(
    InternUser(user): InternUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<WorkLogRequest>,
) -> Result<Json<WorkLog>, ApiError> {
    payload.validate(Utc::now().date_naive())?;

    let existing = match state.repo.get_log(id).await? {
        Some(log) if log.user_id == user.id => log,
        _ => return Err(ApiError::NotFound("work log")),
    };
    if existing.has_feedback() {
        return Err(ApiError::Conflict("work log already has feedback"));
    }

    // None here means feedback landed between the read and the write.
    state
        .repo
        .update_log(id, &user.id, payload)
        .await?
        .map(Json)
        .ok_or(ApiError::Conflict("work log already has feedback"))
}

// --- Admin (admin-scoped) Handlers ---

/// admin_dashboard
///
/// [Admin Route] Intern head-count and total hours logged.
#[utoipa::path(
    get,
    path = "/admin/dashboard",
    responses((status = 200, description = "Stats", body = AdminDashboardStats))
)]
pub async fn admin_dashboard(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<AdminDashboardStats>, ApiError> {
    Ok(Json(state.repo.admin_stats().await?))
}

/// list_interns
///
/// [Admin Route] Interns with their total log count.
#[utoipa::path(
    get,
    path = "/admin/users",
    responses((status = 200, description = "Interns", body = [InternSummary]))
)]
pub async fn list_interns(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<InternSummary>>, ApiError> {
    Ok(Json(state.repo.list_interns().await?))
}

/// toggle_intern_active
///
/// [Admin Route] Activates or deactivates an intern.
#[utoipa::path(
    post,
    path = "/admin/users/{id}/toggle-active",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Toggled", body = User),
        (status = 404, description = "Not Found")
    )
)]
pub async fn toggle_intern_active(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let user = state
        .repo
        .toggle_user_active(&id)
        .await?
        .ok_or(ApiError::NotFound("intern"))?;
    tracing::info!(admin_id = %admin.id, user_id = %user.id, active = user.active, "intern active flag changed");
    Ok(Json(user))
}

/// intern_logs
///
/// [Admin Route] An intern's name and all their logs with feedback.
#[utoipa::path(
    get,
    path = "/admin/users/{id}/logs",
    params(("id" = String, Path, description = "User ID")),
    responses(
        (status = 200, description = "Logs", body = InternLogs),
        (status = 404, description = "Not Found")
    )
)]
pub async fn intern_logs(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InternLogs>, ApiError> {
    let user = state
        .repo
        .get_user(&id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let logs = state.repo.list_logs(&user.id).await?;
    Ok(Json(InternLogs {
        user_id: user.id,
        full_name: user.full_name,
        logs,
    }))
}

/// get_log_feedback
///
/// [Admin Route] A log, its author's name and the current feedback, if any.
#[utoipa::path(
    get,
    path = "/admin/logs/{id}/feedback",
    params(("id" = Uuid, Path, description = "Work log ID")),
    responses(
        (status = 200, description = "Feedback view", body = LogFeedbackView),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_log_feedback(
    _admin: AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LogFeedbackView>, ApiError> {
    Ok(Json(feedback_view(&state, id).await?))
}

/// put_log_feedback
///
/// [Admin Route] Creates the log's feedback or replaces its text.
#[utoipa::path(
    put,
    path = "/admin/logs/{id}/feedback",
    params(("id" = Uuid, Path, description = "Work log ID")),
    request_body = FeedbackRequest,
    responses(
        (status = 200, description = "Saved", body = LogFeedbackView),
        (status = 400, description = "Validation failed"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn put_log_feedback(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<FeedbackRequest>,
) -> Result<Json<LogFeedbackView>, ApiError> {
    payload.validate()?;
    if state.repo.get_log(id).await?.is_none() {
        return Err(ApiError::NotFound("work log"));
    }

    state.repo.upsert_feedback(id, payload.feedback_text).await?;
    tracing::info!(admin_id = %admin.id, log_id = %id, "feedback saved");
    Ok(Json(feedback_view(&state, id).await?))
}

async fn feedback_view(state: &AppState, log_id: Uuid) -> Result<LogFeedbackView, ApiError> {
    let log = state
        .repo
        .get_log(log_id)
        .await?
        .ok_or(ApiError::NotFound("work log"))?;
    let intern_name = state
        .repo
        .get_user(&log.user_id)
        .await?
        .map(|u| u.full_name)
        .unwrap_or_else(|| "Unknown User".to_string());
    let feedback = state.repo.get_feedback(log_id).await?;
    Ok(LogFeedbackView {
        log,
        intern_name,
        feedback,
    })
}

/// intern_report
///
/// [Admin Route] Report data for one intern: name and top tasks by hours.
#[utoipa::path(
    get,
    path = "/admin/report",
    params(ReportQuery),
    responses(
        (status = 200, description = "Report", body = ReportSummary),
        (status = 404, description = "Not Found")
    )
)]
pub async fn intern_report(
    _admin: AdminUser,
    State(state): State<AppState>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ReportSummary>, ApiError> {
    let user = state
        .repo
        .get_user(&query.user_id)
        .await?
        .ok_or(ApiError::NotFound("user"))?;
    let top_tasks = state.repo.top_tasks(&user.id, REPORT_TOP_TASKS).await?;
    Ok(Json(ReportSummary {
        user_id: user.id,
        full_name: user.full_name,
        top_tasks,
    }))
}

/// list_admins
///
/// [Admin Route] Administrator accounts.
#[utoipa::path(
    get,
    path = "/admin/admins",
    responses((status = 200, description = "Administrators", body = [User]))
)]
pub async fn list_admins(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.list_users_by_role(Role::Admin).await?))
}

// --- API Handlers ---

/// get_me
///
/// [Authenticated Route] The caller's identity and role home.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = SessionProfile),
        (status = 401, description = "No session")
    )
)]
pub async fn get_me(AuthUser { id, role }: AuthUser) -> Json<SessionProfile> {
    Json(SessionProfile {
        id,
        role,
        home: role.map(|r| r.home_path().to_string()),
    })
}

/// list_users
///
/// [Admin Route] Every mirrored user record.
#[utoipa::path(
    get,
    path = "/api/users",
    responses(
        (status = 200, description = "Users", body = [User]),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn list_users(
    _admin: AdminUser,
    State(state): State<AppState>,
) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.repo.list_users().await?))
}

/// invite_admin
///
/// [Admin Route] Invites an email address as a new administrator through the
/// identity provider. Provider rejections surface as 422.
#[utoipa::path(
    post,
    path = "/api/admin/invite",
    request_body = InviteRequest,
    responses(
        (status = 200, description = "Invitation sent", body = InviteResponse),
        (status = 400, description = "Invalid email"),
        (status = 422, description = "Rejected by the identity provider")
    )
)]
pub async fn invite_admin(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(payload): Json<InviteRequest>,
) -> Result<Json<InviteResponse>, ApiError> {
    payload.validate()?;
    let email = payload.email.trim();

    match state.identity.invite(email, Role::Admin).await {
        Ok(invitation_id) => {
            tracing::info!(admin_id = %admin.id, %invitation_id, "administrator invitation sent");
            Ok(Json(InviteResponse {
                success: true,
                invitation_id,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "invitation creation failed");
            Err(e.into())
        }
    }
}
