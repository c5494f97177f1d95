#![allow(dead_code)]

use async_trait::async_trait;
use axum::http::HeaderMap;
use chrono::{NaiveDate, Utc};
use intern_logger::{
    AppState,
    config::{AppConfig, LOCAL_JWT_SECRET},
    guard::{GuardScope, RoutePolicy},
    identity::{IdentityError, IdentityProvider, IdentityState},
    models::{
        AdminDashboardStats, Feedback, InternSummary, LogActivity, TaskHours, User, UserUpsert,
        WorkLog, WorkLogRequest,
    },
    repository::{RepoResult, Repository, RepositoryState},
    session::{
        JwtSessionVerifier, Role, SessionVerifier, SessionVerifierState, VerifiedSession,
        VerifyError,
    },
};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::json;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use uuid::Uuid;

// --- In-memory Repository ---

#[derive(Default)]
struct MemoryState {
    users: Vec<User>,
    logs: Vec<WorkLog>,
    feedback: Vec<Feedback>,
}

/// Repository double backed by vectors. Mirrors the Postgres semantics the
/// handlers rely on: email-keyed upserts, the feedback lock on edits and the
/// LEFT JOIN of feedback text onto logs.
#[derive(Default)]
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    fail_reads: bool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get_user` call fails as if the pool were exhausted.
    pub fn failing() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn with_user(self, id: &str, full_name: &str, role: Role) -> Self {
        let now = Utc::now();
        self.state.lock().unwrap().users.push(User {
            id: id.to_string(),
            full_name: full_name.to_string(),
            email: format!("{id}@example.com"),
            role: role.as_str().to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        });
        self
    }

    /// Inserts a log directly, bypassing request validation.
    pub fn insert_log(
        &self,
        user_id: &str,
        task_title: &str,
        date_worked: NaiveDate,
        hours_worked: f64,
    ) -> Uuid {
        let now = Utc::now();
        let id = Uuid::new_v4();
        self.state.lock().unwrap().logs.push(WorkLog {
            id,
            user_id: user_id.to_string(),
            task_title: task_title.to_string(),
            description: format!("{task_title} details"),
            date_worked,
            hours_worked,
            created_at: now,
            updated_at: now,
            feedback_text: None,
        });
        id
    }

    pub fn users(&self) -> Vec<User> {
        self.state.lock().unwrap().users.clone()
    }

    fn joined(state: &MemoryState, log: &WorkLog) -> WorkLog {
        let mut log = log.clone();
        log.feedback_text = state
            .feedback
            .iter()
            .find(|f| f.log_id == log.id)
            .map(|f| f.feedback_text.clone());
        log
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_user(&self, id: &str) -> RepoResult<Option<User>> {
        if self.fail_reads {
            return Err(sqlx::Error::PoolTimedOut);
        }
        let state = self.state.lock().unwrap();
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn upsert_user(&self, user: UserUpsert) -> RepoResult<User> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        if let Some(pos) = state.users.iter().position(|u| u.email == user.email) {
            let old_id = state.users[pos].id.clone();
            for log in state.logs.iter_mut().filter(|l| l.user_id == old_id) {
                log.user_id = user.id.clone();
            }
            let existing = &mut state.users[pos];
            existing.id = user.id;
            existing.full_name = user.full_name;
            existing.role = user.role.as_str().to_string();
            existing.active = true;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let created = User {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            role: user.role.as_str().to_string(),
            active: true,
            created_at: now,
            updated_at: now,
        };
        state.users.push(created.clone());
        Ok(created)
    }

    async fn list_users(&self) -> RepoResult<Vec<User>> {
        let mut users = self.state.lock().unwrap().users.clone();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }

    async fn list_users_by_role(&self, role: Role) -> RepoResult<Vec<User>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| u.role == role.as_str())
            .cloned()
            .collect())
    }

    async fn list_interns(&self) -> RepoResult<Vec<InternSummary>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter()
            .filter(|u| u.role == "user")
            .map(|u| InternSummary {
                id: u.id.clone(),
                full_name: u.full_name.clone(),
                email: u.email.clone(),
                role: u.role.clone(),
                active: u.active,
                total_logs: state.logs.iter().filter(|l| l.user_id == u.id).count() as i64,
            })
            .collect())
    }

    async fn toggle_user_active(&self, id: &str) -> RepoResult<Option<User>> {
        let mut state = self.state.lock().unwrap();
        Ok(state
            .users
            .iter_mut()
            .find(|u| u.id == id && u.role == "user")
            .map(|u| {
                u.active = !u.active;
                u.clone()
            }))
    }

    async fn list_logs(&self, user_id: &str) -> RepoResult<Vec<WorkLog>> {
        let state = self.state.lock().unwrap();
        let mut logs: Vec<WorkLog> = state
            .logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| Self::joined(&state, l))
            .collect();
        logs.sort_by(|a, b| b.date_worked.cmp(&a.date_worked));
        Ok(logs)
    }

    async fn get_log(&self, id: Uuid) -> RepoResult<Option<WorkLog>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .find(|l| l.id == id)
            .map(|l| Self::joined(&state, l)))
    }

    async fn create_log(&self, user_id: &str, req: WorkLogRequest) -> RepoResult<WorkLog> {
        let now = Utc::now();
        let log = WorkLog {
            id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            task_title: req.task_title,
            description: req.description,
            date_worked: req.date_worked,
            hours_worked: req.hours_worked,
            created_at: now,
            updated_at: now,
            feedback_text: None,
        };
        self.state.lock().unwrap().logs.push(log.clone());
        Ok(log)
    }

    async fn update_log(
        &self,
        id: Uuid,
        user_id: &str,
        req: WorkLogRequest,
    ) -> RepoResult<Option<WorkLog>> {
        let mut state = self.state.lock().unwrap();
        if state.feedback.iter().any(|f| f.log_id == id) {
            return Ok(None);
        }
        Ok(state
            .logs
            .iter_mut()
            .find(|l| l.id == id && l.user_id == user_id)
            .map(|l| {
                l.task_title = req.task_title;
                l.description = req.description;
                l.date_worked = req.date_worked;
                l.hours_worked = req.hours_worked;
                l.updated_at = Utc::now();
                l.clone()
            }))
    }

    async fn log_activity_since(
        &self,
        user_id: &str,
        since: NaiveDate,
    ) -> RepoResult<Vec<LogActivity>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .logs
            .iter()
            .filter(|l| l.user_id == user_id && l.date_worked >= since)
            .map(|l| LogActivity {
                date_worked: l.date_worked,
                hours_worked: l.hours_worked,
            })
            .collect())
    }

    async fn top_tasks(&self, user_id: &str, limit: i64) -> RepoResult<Vec<TaskHours>> {
        let state = self.state.lock().unwrap();
        let mut tasks: Vec<TaskHours> = state
            .logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .map(|l| TaskHours {
                task_title: l.task_title.clone(),
                hours_worked: l.hours_worked,
            })
            .collect();
        tasks.sort_by(|a, b| b.hours_worked.total_cmp(&a.hours_worked));
        tasks.truncate(limit as usize);
        Ok(tasks)
    }

    async fn get_feedback(&self, log_id: Uuid) -> RepoResult<Option<Feedback>> {
        let state = self.state.lock().unwrap();
        Ok(state.feedback.iter().find(|f| f.log_id == log_id).cloned())
    }

    async fn upsert_feedback(&self, log_id: Uuid, text: String) -> RepoResult<Feedback> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        if let Some(existing) = state.feedback.iter_mut().find(|f| f.log_id == log_id) {
            existing.feedback_text = text;
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let created = Feedback {
            id: Uuid::new_v4(),
            log_id,
            feedback_text: text,
            created_at: now,
            updated_at: now,
        };
        state.feedback.push(created.clone());
        Ok(created)
    }

    async fn admin_stats(&self) -> RepoResult<AdminDashboardStats> {
        let state = self.state.lock().unwrap();
        Ok(AdminDashboardStats {
            total_interns: state.users.iter().filter(|u| u.role != "admin").count() as i64,
            total_hours: state.logs.iter().map(|l| l.hours_worked).sum(),
        })
    }
}

// --- Identity Provider Double ---

#[derive(Default)]
pub struct MockIdentity {
    /// Raw public-metadata role values, as the provider would return them.
    pub roles: Mutex<HashMap<String, String>>,
    pub assigned: Mutex<Vec<(String, Role)>>,
    pub invites: Mutex<Vec<(String, Role)>>,
    pub reject_invites: bool,
    pub fail_lookups: bool,
}

impl MockIdentity {
    pub fn with_role(self, user_id: &str, role: Role) -> Self {
        self.with_raw_role(user_id, role.as_str())
    }

    pub fn with_raw_role(self, user_id: &str, role: &str) -> Self {
        self.roles
            .lock()
            .unwrap()
            .insert(user_id.to_string(), role.to_string());
        self
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    async fn user_role(&self, user_id: &str) -> Result<Option<String>, IdentityError> {
        if self.fail_lookups {
            return Err(IdentityError::Rejected {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self.roles.lock().unwrap().get(user_id).cloned())
    }

    async fn assign_role(&self, user_id: &str, role: Role) -> Result<(), IdentityError> {
        self.assigned
            .lock()
            .unwrap()
            .push((user_id.to_string(), role));
        self.roles
            .lock()
            .unwrap()
            .insert(user_id.to_string(), role.as_str().to_string());
        Ok(())
    }

    async fn invite(&self, email: &str, role: Role) -> Result<String, IdentityError> {
        if self.reject_invites {
            return Err(IdentityError::Rejected {
                status: 422,
                message: "duplicate invitation".to_string(),
            });
        }
        let mut invites = self.invites.lock().unwrap();
        invites.push((email.to_string(), role));
        Ok(format!("inv_{}", invites.len()))
    }
}

// --- Session Verifier Doubles ---

/// Always returns the same verification outcome, regardless of headers.
pub struct StaticVerifier(pub Option<VerifiedSession>);

#[async_trait]
impl SessionVerifier for StaticVerifier {
    async fn verify(&self, _headers: &HeaderMap) -> Result<Option<VerifiedSession>, VerifyError> {
        Ok(self.0.clone())
    }
}

/// Simulates an unreachable verification backend.
pub struct FailingVerifier;

#[async_trait]
impl SessionVerifier for FailingVerifier {
    async fn verify(&self, _headers: &HeaderMap) -> Result<Option<VerifiedSession>, VerifyError> {
        Err(VerifyError::Unavailable("verification backend down".to_string()))
    }
}

// --- Tokens & State ---

/// Mints an HS256 session token signed with the local secret. `role` is put
/// verbatim into the public metadata so unknown values can be exercised.
pub fn mint_token(sub: &str, role: Option<&str>, expires_in_secs: i64) -> String {
    let now = Utc::now().timestamp();
    let mut claims = json!({
        "sub": sub,
        "iat": now,
        "exp": now + expires_in_secs,
    });
    if let Some(role) = role {
        claims["metadata"] = json!({ "role": role });
    }
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(LOCAL_JWT_SECRET.as_bytes()),
    )
    .expect("token encoding")
}

pub fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn app_state(
    repo: Arc<MemoryRepository>,
    identity: Arc<MockIdentity>,
    sessions: SessionVerifierState,
) -> AppState {
    app_state_with_config(repo, identity, sessions, AppConfig::default())
}

pub fn app_state_with_config(
    repo: Arc<MemoryRepository>,
    identity: Arc<MockIdentity>,
    sessions: SessionVerifierState,
    config: AppConfig,
) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        identity: identity as IdentityState,
        sessions,
        policy: Arc::new(RoutePolicy::new(&config.public_routes).expect("default policy")),
        scope: Arc::new(GuardScope::default()),
        config,
    }
}

/// State whose sessions are verified from real HS256 tokens.
pub fn jwt_state(repo: Arc<MemoryRepository>, identity: Arc<MockIdentity>) -> AppState {
    app_state(
        repo,
        identity,
        Arc::new(JwtSessionVerifier::hs256(LOCAL_JWT_SECRET)),
    )
}
