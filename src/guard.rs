//! Route guard: the per-request access decision for every page and API path.
//!
//! The decision is a pure function of the classified session and the request
//! path. Rules are evaluated in a fixed, explicit order so that a public route
//! is never turned into a sign-in redirect and an unauthenticated redirect is
//! never overridden by a later rule.

use axum::{
    http::{HeaderMap, Uri, header},
    response::{IntoResponse, Redirect, Response},
};
use regex::Regex;
use thiserror::Error;

use crate::session::{Role, SessionStatus};

pub const ROOT_PATH: &str = "/";
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";
pub const ADMIN_HOME: &str = "/admin/dashboard";
pub const USER_HOME: &str = "/user/dashboard";

/// Paths reachable without a session.
pub const DEFAULT_PUBLIC_ROUTES: &[&str] = &[
    "/sign-in(.*)",
    "/sign-up(.*)",
    "/unauthorized(.*)",
    "/api/webhooks(.*)",
];

/// Prefixes the guard never runs on (bundled assets and framework internals).
pub const DEFAULT_INTERNAL_PREFIXES: &[&str] = &["/_next", "/assets"];

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("invalid route pattern `{pattern}`: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// PathPattern
///
/// A glob-like path pattern such as `/sign-in(.*)`, matched against the whole path.
#[derive(Debug, Clone)]
pub struct PathPattern {
    pattern: String,
    regex: Regex,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Result<Self, GuardError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            GuardError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path)
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

/// The partition a path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    Scoped(Role),
    Root,
    Other,
}

/// Routing decision for one request. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    RedirectToSignIn,
    RedirectToUnauthorized,
    RedirectToRoleHome(Role),
}

impl Decision {
    /// redirect
    ///
    /// Turns a redirect decision into a `307` response. `Allow` yields `None`:
    /// the request passes through untouched.
    pub fn redirect(
        &self,
        sign_in_url: &str,
        original: &Uri,
        origin: Option<&str>,
    ) -> Option<Response> {
        let location = match self {
            Decision::Allow => return None,
            Decision::RedirectToSignIn => sign_in_location(sign_in_url, original, origin),
            Decision::RedirectToUnauthorized => UNAUTHORIZED_PATH.to_string(),
            Decision::RedirectToRoleHome(role) => role.home_path().to_string(),
        };
        Some(Redirect::temporary(&location).into_response())
    }
}

/// Sign-in URL carrying the originally requested path so the provider can send
/// the user back after signing in. With an `origin` the return target is absolute.
pub fn sign_in_location(sign_in_url: &str, original: &Uri, origin: Option<&str>) -> String {
    let path = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(ROOT_PATH);
    let target = match origin {
        Some(origin) => format!("{}{path}", origin.trim_end_matches('/')),
        None => path.to_string(),
    };
    let separator = if sign_in_url.contains('?') { '&' } else { '?' };
    format!(
        "{sign_in_url}{separator}redirect_url={}",
        urlencoding::encode(&target)
    )
}

/// return_origin
///
/// Origin of this application as seen by the browser, needed only when the
/// sign-in page is hosted elsewhere (an absolute `sign_in_url`). The configured
/// `app_url` wins; otherwise it is rebuilt from `Host` and `X-Forwarded-Proto`.
pub fn return_origin(
    sign_in_url: &str,
    app_url: Option<&str>,
    headers: &HeaderMap,
) -> Option<String> {
    if sign_in_url.starts_with('/') {
        return None;
    }
    if let Some(app_url) = app_url {
        return Some(app_url.trim_end_matches('/').to_string());
    }
    let host = headers.get(header::HOST)?.to_str().ok()?;
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("http");
    Some(format!("{scheme}://{host}"))
}

/// One step of the ordered routing policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    /// Marks allow-listed paths public; later `Auth` and `Scope` rules skip them.
    Public,
    /// Non-public paths require a session.
    Auth,
    /// Paths starting with `prefix` require exactly `role`.
    Scope { prefix: String, role: Role },
    /// Signed-in users with a role landing on `/` go to their role home.
    RootRedirect,
}

impl Rule {
    pub fn scope(prefix: &str, role: Role) -> Self {
        Rule::Scope {
            prefix: prefix.to_string(),
            role,
        }
    }
}

/// RoutePolicy
///
/// The public allow-list plus the ordered rule list.
#[derive(Debug, Clone)]
pub struct RoutePolicy {
    public: Vec<PathPattern>,
    rules: Vec<Rule>,
}

impl RoutePolicy {
    /// Builds the standard policy over the given public patterns.
    pub fn new<S: AsRef<str>>(public_patterns: &[S]) -> Result<Self, GuardError> {
        let public = public_patterns
            .iter()
            .map(|p| PathPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            public,
            rules: Self::standard_rules(),
        })
    }

    pub fn standard_rules() -> Vec<Rule> {
        vec![
            Rule::Public,
            Rule::Auth,
            Rule::scope("/admin", Role::Admin),
            Rule::scope("/user", Role::User),
            Rule::RootRedirect,
        ]
    }

    pub fn with_rules(mut self, rules: Vec<Rule>) -> Self {
        self.rules = rules;
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn is_public(&self, path: &str) -> bool {
        self.public.iter().any(|p| p.matches(path))
    }

    pub fn classify_route(&self, path: &str) -> RouteClass {
        if self.is_public(path) {
            return RouteClass::Public;
        }
        let scoped = self.rules.iter().find_map(|rule| match rule {
            Rule::Scope { prefix, role } if path.starts_with(prefix.as_str()) => Some(*role),
            _ => None,
        });
        match scoped {
            Some(role) => RouteClass::Scoped(role),
            None if path == ROOT_PATH => RouteClass::Root,
            None => RouteClass::Other,
        }
    }

    /// evaluate
    ///
    /// Walks the rules in order; the first rule producing a decision wins,
    /// otherwise the request is allowed.
    pub fn evaluate(&self, session: &SessionStatus, path: &str) -> Decision {
        let mut public = false;

        for rule in &self.rules {
            let decision = match rule {
                Rule::Public => {
                    public = self.is_public(path);
                    None
                }
                Rule::Auth if !public && !session.authenticated => Some(Decision::RedirectToSignIn),
                Rule::Scope { prefix, role }
                    if !public
                        && path.starts_with(prefix.as_str())
                        && session.role != Some(*role) =>
                {
                    Some(Decision::RedirectToUnauthorized)
                }
                Rule::RootRedirect if session.authenticated && path == ROOT_PATH => {
                    session.role.map(Decision::RedirectToRoleHome)
                }
                _ => None,
            };

            if let Some(decision) = decision {
                return decision;
            }
        }

        Decision::Allow
    }
}

/// GuardScope
///
/// Which requests the guard runs on: everything except static assets (any
/// path containing a `.`) and framework-internal prefixes. API paths are
/// always guarded.
#[derive(Debug, Clone)]
pub struct GuardScope {
    internal_prefixes: Vec<String>,
}

impl Default for GuardScope {
    fn default() -> Self {
        Self {
            internal_prefixes: DEFAULT_INTERNAL_PREFIXES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl GuardScope {
    pub fn applies_to(&self, path: &str) -> bool {
        if path.starts_with("/api") || path.starts_with("/trpc") {
            return true;
        }
        if path.contains('.') {
            return false;
        }
        !self
            .internal_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
    }
}
