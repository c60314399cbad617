use std::sync::Arc;

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use coze_client::CozeClient;
use tripatlas_collector::{Collector, WorkflowRunner};
use tripatlas_common::Config;
use tripatlas_store::AtlasStore;

mod rest;

pub struct AppState {
    pub store: AtlasStore,
    pub collector: Collector<CozeClient>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tripatlas=info".parse()?))
        .init();

    let config = Config::from_env();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    let store = AtlasStore::new(pool);
    store.migrate().await?;
    info!("Migrations complete");

    let mut client = CozeClient::new(config.coze_api_token.clone());
    if let Some(base_url) = &config.coze_base_url {
        client = client.with_base_url(base_url);
    }
    let runner = WorkflowRunner::new(client, &config.coze_workflow_id);
    let collector = Collector::new(store.clone(), runner);

    let state = Arc::new(AppState { store, collector });

    let app = Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Collection
        .route("/api/collect", post(rest::collect::api_collect))
        .route("/api/collect/tasks", get(rest::collect::api_tasks))
        .route("/api/collect/tasks/{id}", get(rest::collect::api_task))
        .route(
            "/api/collect/tasks/{id}/details",
            get(rest::collect::api_task_details),
        )
        // Review queue
        .route("/api/reviews", get(rest::review::api_reviews))
        .route("/api/reviews/{id}", post(rest::review::api_decide_review))
        // Browse
        .route("/api/cities", get(rest::browse::api_cities))
        .route("/api/cities/{id}", get(rest::browse::api_city))
        .route(
            "/api/cities/{id}/attractions",
            get(rest::browse::api_city_attractions),
        )
        .route(
            "/api/cities/{id}/restaurants",
            get(rest::browse::api_city_restaurants),
        )
        .route("/api/cities/{id}/hotels", get(rest::browse::api_city_hotels))
        .route(
            "/api/cities/{id}/overview",
            get(rest::browse::api_city_overview),
        )
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Logging layer: method + path only, query params stay out of logs
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        );

    let addr = format!("{}:{}", config.web_host, config.web_port);
    info!("TripAtlas API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
