//! Jeevan Aahar Backend
//!
//! REST backend for food donation coordination: Firebase-authenticated profiles,
//! a profile completion gate and donation listings, persisted in SQLite.

mod api;
mod auth;
mod config;
mod db;
mod errors;
mod models;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use auth::{FirebaseVerifier, IdentityVerifier};
use config::{Config, LogFormat};
use db::{Database, Repository};
use errors::{ApiError, AppError};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<Repository>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Wrap an error for the wire, honoring the deployment's detail policy.
    pub fn reject(&self, error: AppError) -> ApiError {
        ApiError {
            error,
            expose_internal: self.config.expose_internal_errors(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_tracing(&config);

    tracing::info!("Starting Jeevan Aahar Backend");
    tracing::info!("Database path: {:?}", config.db_path);
    tracing::info!("Bind address: {}", config.bind_addr);
    tracing::info!("First-contact policy: {:?}", config.first_contact);

    let verifier = FirebaseVerifier::from_config(&config)?;

    // Initialize database
    let database = Database::new(config.db_path.clone());
    let pool = database.ensure_connected().await?.clone();
    let repo = Arc::new(Repository::new(pool));

    // Create application state
    let state = AppState {
        repo,
        verifier: Arc::new(verifier),
        config: Arc::new(config.clone()),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &Config) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Create the application router with all routes.
pub fn create_router(state: AppState) -> Router {
    let cors = cors_layer(state.config.cors_origin.as_deref());

    // Credential only: the profile does not exist yet
    let signup_routes = Router::new()
        .route("/auth/signup", post(api::signup))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::verify_credential,
        ));

    let profile_routes = Router::new()
        .route(
            "/profile",
            get(api::get_profile).patch(api::update_profile),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_profile,
        ));

    // Outermost layer runs first: resolve, then completion, then role
    let donor_routes = Router::new()
        .route("/donation", post(api::create_donation))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_donor,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_completed_profile,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::resolve_profile,
        ));

    let public_routes = Router::new()
        .route("/profile/{uid}", get(api::get_public_profile))
        .route("/donation", get(api::list_donations));

    let api_routes = Router::new()
        .merge(signup_routes)
        .merge(profile_routes)
        .merge(donor_routes)
        .merge(public_routes);

    // Health check (no auth required)
    let health_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api/v1", api_routes)
        .merge(health_routes)
        .layer(DefaultBodyLimit::max(state.config.body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origin: Option<&str>) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match origin.and_then(|o| HeaderValue::from_str(o).ok()) {
        Some(origin) => cors.allow_origin(origin).allow_credentials(true),
        None => cors.allow_origin(Any),
    }
}

/// Health check endpoint.
async fn health_check() -> &'static str {
    "OK"
}
