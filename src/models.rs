use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use thiserror::Error;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::session::Role;

/// Logs may be back-dated at most this many days.
pub const LOG_BACKDATE_DAYS: i64 = 7;

/// Window covered by the intern dashboard.
pub const DASHBOARD_WINDOW_DAYS: i64 = 365;

/// Number of tasks listed in an intern report.
pub const REPORT_TOP_TASKS: i64 = 5;

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// Mirror of an identity provider account stored in the `users` table.
/// Kept in sync by the user synchronization webhook.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct User {
    // Provider-assigned identifier (opaque string).
    pub id: String,
    pub full_name: String,
    pub email: String,
    // 'admin' or 'user'.
    pub role: String,
    pub active: bool,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Input for the webhook upsert; keyed by email.
#[derive(Debug, Clone, PartialEq)]
pub struct UserUpsert {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: Role,
}

/// WorkLog
///
/// One entry from the `work_logs` table. `feedback_text` is filled by a LEFT JOIN
/// on `feedback` when the query selects it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct WorkLog {
    pub id: Uuid,
    pub user_id: String,
    pub task_title: String,
    pub description: String,
    #[ts(type = "string")]
    pub date_worked: NaiveDate,
    pub hours_worked: f64,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[sqlx(default)]
    pub feedback_text: Option<String>,
}

impl WorkLog {
    /// Once feedback exists the intern can no longer edit the entry.
    pub fn has_feedback(&self) -> bool {
        self.feedback_text.is_some()
    }
}

/// Feedback
///
/// The administrator's single feedback entry on a work log.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct Feedback {
    pub id: Uuid,
    pub log_id: Uuid,
    pub feedback_text: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

/// Row shape for the dashboard aggregation.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct LogActivity {
    pub date_worked: NaiveDate,
    pub hours_worked: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct TaskHours {
    pub task_title: String,
    pub hours_worked: f64,
}

// --- Request Payloads (Input Schemas) ---

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("task title is required")]
    MissingTaskTitle,
    #[error("description is required")]
    MissingDescription,
    #[error("hours must be at least 1")]
    HoursTooLow,
    #[error("date must be within the last 7 days (including today)")]
    DateOutOfRange,
    #[error("feedback text is required")]
    MissingFeedback,
    #[error("a valid email address is required")]
    InvalidEmail,
}

/// WorkLogRequest
///
/// Payload for creating (POST /user/logs) or editing (PUT /user/logs/{id}) a log.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct WorkLogRequest {
    pub task_title: String,
    pub description: String,
    #[ts(type = "string")]
    #[schema(value_type = String, example = "2025-06-02")]
    pub date_worked: NaiveDate,
    pub hours_worked: f64,
}

impl WorkLogRequest {
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationError> {
        if self.task_title.trim().is_empty() {
            return Err(ValidationError::MissingTaskTitle);
        }
        if self.description.trim().is_empty() {
            return Err(ValidationError::MissingDescription);
        }
        // Also rejects NaN.
        if !(self.hours_worked >= 1.0) {
            return Err(ValidationError::HoursTooLow);
        }
        let earliest = today - Duration::days(LOG_BACKDATE_DAYS);
        if self.date_worked > today || self.date_worked < earliest {
            return Err(ValidationError::DateOutOfRange);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct FeedbackRequest {
    pub feedback_text: String,
}

impl FeedbackRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.feedback_text.trim().is_empty() {
            return Err(ValidationError::MissingFeedback);
        }
        Ok(())
    }
}

/// InviteRequest
///
/// Payload for inviting a new administrator (POST /api/admin/invite).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct InviteRequest {
    pub email: String,
}

impl InviteRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(ValidationError::InvalidEmail),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct InviteResponse {
    pub success: bool,
    pub invitation_id: String,
}

#[derive(Debug, Clone, Deserialize, utoipa::IntoParams)]
pub struct ReportQuery {
    pub user_id: String,
}

// --- Dashboard & View Schemas (Output) ---

/// AdminDashboardStats
///
/// Output of GET /admin/dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct AdminDashboardStats {
    /// Users whose role is not `admin`.
    pub total_interns: i64,
    pub total_hours: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DailyActivity {
    #[ts(type = "string")]
    #[schema(value_type = String)]
    pub date: NaiveDate,
    pub count: i64,
}

/// UserDashboardStats
///
/// Output of GET /user/dashboard: totals and a per-day activity heatmap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserDashboardStats {
    pub total_logs: i64,
    pub total_hours: f64,
    pub activity: Vec<DailyActivity>,
}

impl UserDashboardStats {
    pub fn from_activity(rows: &[LogActivity]) -> Self {
        let mut per_day: BTreeMap<NaiveDate, i64> = BTreeMap::new();
        for row in rows {
            *per_day.entry(row.date_worked).or_default() += 1;
        }

        Self {
            total_logs: rows.len() as i64,
            total_hours: rows.iter().map(|r| r.hours_worked).sum(),
            activity: per_day
                .into_iter()
                .map(|(date, count)| DailyActivity { date, count })
                .collect(),
        }
    }
}

/// InternSummary
///
/// Row of the user management table (GET /admin/users).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow)]
#[ts(export)]
pub struct InternSummary {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub active: bool,
    pub total_logs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct InternLogs {
    pub user_id: String,
    pub full_name: String,
    pub logs: Vec<WorkLog>,
}

/// A work log as seen from the feedback screen.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LogFeedbackView {
    pub log: WorkLog,
    pub intern_name: String,
    pub feedback: Option<Feedback>,
}

/// ReportSummary
///
/// Data behind the intern report (GET /admin/report). Rendering is left to the client.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ReportSummary {
    pub user_id: String,
    pub full_name: String,
    pub top_tasks: Vec<TaskHours>,
}

/// SessionProfile
///
/// Output of GET /api/me.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionProfile {
    pub id: String,
    pub role: Option<Role>,
    pub home: Option<String>,
}
