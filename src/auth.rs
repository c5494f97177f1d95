use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};

use crate::{
    error::ApiError,
    session::{self, Role, SessionStatus, SessionVerifierState},
};

/// SessionStatus Extractor
///
/// The route guard classifies every guarded request once and stores the result
/// in the request extensions; handlers reuse it. Requests that bypassed the
/// guard are classified here with the same verifier.
impl<S> FromRequestParts<S> for SessionStatus
where
    S: Send + Sync,
    SessionVerifierState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(status) = parts.extensions.get::<SessionStatus>() {
            return Ok(status.clone());
        }
        let verifier = SessionVerifierState::from_ref(state);
        Ok(session::classify(verifier.as_ref(), &parts.headers).await)
    }
}

/// AuthUser Extractor Result
///
/// The resolved identity of an authenticated request: the provider's user id
/// and the role claim, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub role: Option<Role>,
}

/// Rejects with 401 when the request carries no valid session.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    SessionVerifierState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let status = SessionStatus::from_request_parts(parts, state).await?;
        match status {
            SessionStatus {
                authenticated: true,
                user_id: Some(id),
                role,
            } => Ok(AuthUser { id, role }),
            _ => Err(ApiError::Unauthorized),
        }
    }
}

/// AdminUser Extractor
///
/// An `AuthUser` whose role claim is `admin`; 403 for any other role.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser(pub AuthUser);

impl<S> FromRequestParts<S> for AdminUser
where
    S: Send + Sync,
    SessionVerifierState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Some(Role::Admin) {
            return Err(ApiError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

/// InternUser Extractor
///
/// An `AuthUser` whose role claim is `user`; 403 for any other role.
#[derive(Debug, Clone, PartialEq)]
pub struct InternUser(pub AuthUser);

impl<S> FromRequestParts<S> for InternUser
where
    S: Send + Sync,
    SessionVerifierState: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if user.role != Some(Role::User) {
            return Err(ApiError::Forbidden);
        }
        Ok(InternUser(user))
    }
}
