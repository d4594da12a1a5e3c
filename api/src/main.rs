use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use triage_engine::clock::SystemClock;
use triage_engine::kv::MemoryKv;
use triage_engine::rules::RulesCache;
use triage_engine::{Engine, EngineConfig};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod error;
mod middleware;
mod routes;
mod state;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Triage API",
        version = "0.1.0",
        description = "Notification prioritization service. One POST classifies an event as NOW, LATER or NEVER."
    ),
    paths(routes::health::health_check, routes::evaluate::evaluate),
    components(schemas(
        HealthResponse,
        triage_core::error::ApiError,
        triage_core::event::EvaluateRequest,
        triage_core::event::Decision,
        triage_core::event::Verdict,
        triage_core::event::PriorityHint,
        triage_core::event::Channel,
    ))
)]
struct ApiDoc;

#[derive(Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triage_api=debug,triage_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = EngineConfig::from_env();

    // Rules snapshot + 30s background reload; a missing or broken file
    // leaves the last good snapshot (initially empty) in effect.
    let rules = Arc::new(RulesCache::new(
        config.rules_path.clone(),
        config.rules_reload_secs,
    ));
    rules.clone().spawn_reloader();

    let clock = Arc::new(SystemClock);
    let engine = Engine::new(
        &config,
        Arc::new(MemoryKv::new(clock.clone())),
        Arc::new(triage_engine::audit::MemoryAuditSink::new()),
        Arc::new(triage_engine::dispatch::MemoryDispatchQueue::new()),
        rules,
        clock,
    );

    let app_state = state::AppState {
        engine: Arc::new(engine),
    };

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .merge(routes::health::router())
        .merge(routes::evaluate::router().layer(middleware::rate_limit::evaluate_layer()))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Triage API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind listener");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("server error");
}
