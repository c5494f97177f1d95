use intern_logger::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    guard::{GuardScope, RoutePolicy},
    identity::{ClerkClient, IdentityState},
    repository::{PostgresRepository, RepositoryState},
    session::{JwtSessionVerifier, LocalBypassVerifier, SessionVerifierState},
};
use sqlx::postgres::PgPoolOptions;
use std::{process, sync::Arc};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, sets up logging, connects and migrates the database,
/// wires the session verifier and identity client into the shared state and
/// serves the router.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail fast on missing production secrets)
    dotenv::dotenv().ok();
    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e}");
            process::exit(1);
        }
    };

    // 2. Logging: pretty locally, JSON for log aggregation in production.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "intern_logger=debug,tower_http=info,axum=trace".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database
    let pool = match PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
    {
        Ok(pool) => pool,
        Err(e) => {
            tracing::error!(error = %e, "failed to connect to Postgres, check DATABASE_URL");
            process::exit(1);
        }
    };
    if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
        tracing::error!(error = %e, "database migration failed");
        process::exit(1);
    }
    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Route policy and session verification
    let policy = match RoutePolicy::new(&config.public_routes) {
        Ok(policy) => policy,
        Err(e) => {
            tracing::error!(error = %e, "invalid PUBLIC_ROUTES");
            process::exit(1);
        }
    };
    let jwt = match JwtSessionVerifier::from_config(&config) {
        Ok(verifier) => Arc::new(verifier) as SessionVerifierState,
        Err(e) => {
            tracing::error!(error = %e, "invalid session verification key");
            process::exit(1);
        }
    };

    // LOCAL-ONLY: `x-user-id` header bypass for manual testing.
    let sessions = if config.env == Env::Local {
        tracing::warn!("local session bypass enabled (x-user-id header)");
        Arc::new(LocalBypassVerifier::new(jwt, repo.clone())) as SessionVerifierState
    } else {
        jwt
    };

    // 5. Identity provider back-office client
    let identity = Arc::new(ClerkClient::from_config(&config)) as IdentityState;

    let bind_addr = config.bind_addr.clone();
    let app_state = AppState {
        repo,
        identity,
        sessions,
        policy: Arc::new(policy),
        scope: Arc::new(GuardScope::default()),
        config,
    };

    // 6. Router and server
    let app = create_router(app_state);

    let listener = match TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, %bind_addr, "failed to bind listener");
            process::exit(1);
        }
    };

    tracing::info!("Listening on {bind_addr}");
    tracing::info!("API Documentation (Swagger UI) available at: http://{bind_addr}/swagger-ui");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "server terminated");
        process::exit(1);
    }
}
