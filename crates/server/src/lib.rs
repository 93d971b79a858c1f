use std::path::Path;

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{header, Request, StatusCode},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tower::util::ServiceExt;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

use config::Config;
use db::Database;
use error::AppError;
use services::uploads::UploadStore;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub uploads: UploadStore,
}

impl AppState {
    /// Connects the database, applies the schema and prepares the upload
    /// directory.
    pub async fn init(config: Config) -> anyhow::Result<Self> {
        let db = Database::connect(&config.database_url, config.database_max_connections).await?;
        db.run_migrations().await?;

        let uploads = UploadStore::new(&config.upload_dir);
        uploads.init().await?;

        Ok(Self {
            db,
            config,
            uploads,
        })
    }
}

pub fn app(state: AppState) -> Router {
    // Build protected routes (require authentication)
    let protected_routes = Router::new()
        .merge(routes::users::router())
        .merge(routes::classes::router())
        .merge(routes::posts::router())
        .merge(routes::assignments::router())
        .merge(routes::todos::router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    let api_router = Router::new()
        .merge(routes::auth::router())
        .merge(protected_routes)
        .fallback(api_not_found);

    let body_limit = state.config.max_upload_bytes;
    let uploads = ServeDir::new(state.uploads.base_path());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_router)
        .nest_service("/uploads", uploads)
        .fallback(serve_spa)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}

// Unknown API paths answer in JSON instead of falling through to the SPA
async fn api_not_found() -> AppError {
    AppError::NotFound("Not found".to_string())
}

async fn serve_spa(State(state): State<AppState>, req: Request<Body>) -> Response {
    let static_dir = Path::new(&state.config.static_dir);
    let path = req.uri().path().trim_start_matches('/');

    // Try to serve static file first
    if !path.is_empty() && !path.contains("..") && static_dir.join(path).is_file() {
        match ServeDir::new(static_dir).oneshot(req).await {
            Ok(res) => return res.into_response(),
            Err(never) => match never {},
        }
    }

    // For SPA routes, serve index.html
    match tokio::fs::read(static_dir.join("index.html")).await {
        Ok(contents) => ([(header::CONTENT_TYPE, "text/html")], contents).into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Not found").into_response(),
    }
}
