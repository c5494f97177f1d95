/// Router Module Index
///
/// Routers are grouped by the role scope the route guard assigns to their
/// paths. The guard makes the coarse decision; handlers re-check the role
/// through their extractors.

/// Reachable without a session: landing, unauthorized page and sign-in completion.
pub mod public;

/// Mounted under `/user`; the guard restricts it to the `user` role.
pub mod user;

/// Mounted under `/admin`; the guard restricts it to the `admin` role.
pub mod admin;

/// Mounted under `/api`. Always guarded; admin operations check the role in
/// the handler. The webhook is on the public allow-list.
pub mod api;
