pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use tfgate_core::config::TfgateConfig;
use tfgate_core::notify::WebhookNotifier;
use tfgate_core::orchestrator::Orchestrator;
use tfgate_core::paths;
use tfgate_core::store::ActionStore;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(orchestrator: Arc<Orchestrator>) -> Router {
    let app_state = state::AppState::new(orchestrator);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Configurations
        .route("/v1/configuration", post(routes::configs::create_config))
        .route(
            "/v1/configuration/{config}",
            delete(routes::configs::delete_config),
        )
        // Operations
        .route(
            "/v1/configuration/{config}/{operation}",
            post(routes::actions::submit_operation).get(routes::actions::list_actions),
        )
        .route(
            "/v1/configuration/{config}/{operation}/{id}/status",
            get(routes::actions::get_status),
        )
        .route(
            "/v1/configuration/{config}/{operation}/{id}/log",
            get(routes::actions::get_log),
        )
        // Raw artifact bytes
        .route("/v1/logs/{file}", get(routes::actions::view_log))
        // Discovery import / statefile restore
        .route(
            "/v2/configuration/{config}/import",
            post(routes::import::import),
        )
        .route(
            "/v2/configuration/{config}/statefile",
            post(routes::import::restore_statefile),
        )
        .layer(cors)
        .with_state(app_state)
}

/// Construct the orchestrator stack from config and start serving.
pub async fn serve(config: TfgateConfig) -> anyhow::Result<()> {
    tfgate_core::io::ensure_dir(&config.data_dir)?;
    let store = Arc::new(ActionStore::open(&paths::actions_db(&config.data_dir))?);
    let orchestrator = Arc::new(Orchestrator::new(
        &config,
        store,
        Arc::new(WebhookNotifier::new()),
    )?);

    let app = build_router(orchestrator);

    let addr = format!("{}:{}", config.listen_addr, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("tfgate listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
