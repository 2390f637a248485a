use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Router,
};
use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{SpanExporter, WithExportConfig};
use opentelemetry_sdk::{
    trace::{Sampler, SdkTracerProvider},
    Resource,
};
use std::env;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::handlers::{
    admin_catalog, admin_claims, admin_config, admin_dashboard, admin_orders, admin_users, auth, internal, rewards,
    scan, user,
};
use crate::api::state::AppState;
use crate::config::AppConfig;
use crate::db;
use crate::security::spawn_sweeper;

const DEFAULT_LOG_FILTER: &str = "info,sqlx=warn,tower_http=info,hyper=warn";

/// JSON logs, plus OTLP trace export over HTTP when `OTEL_ENABLED=true`.
/// Returns the tracer provider so it can be flushed on shutdown.
pub fn init_tracing() -> Option<SdkTracerProvider> {
    let enable_otel = env::var("OTEL_ENABLED").map(|v| v == "true").unwrap_or(false);

    let subscriber = tracing_subscriber::registry()
        .with(fmt::layer().json().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)));

    if !enable_otel {
        subscriber.init();
        return None;
    }

    let endpoint = env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        .unwrap_or_else(|_| "http://localhost:4318/v1/traces".to_string());

    match init_opentelemetry(&endpoint) {
        Ok(provider) => {
            opentelemetry::global::set_tracer_provider(provider.clone());
            let tracer = provider.tracer("loyalty-points");
            subscriber.with(OpenTelemetryLayer::new(tracer)).init();
            info!("OpenTelemetry enabled: {}", endpoint);
            Some(provider)
        }
        Err(e) => {
            subscriber.init();
            error!("Failed to initialize OpenTelemetry: {}. Continuing with logs only.", e);
            None
        }
    }
}

fn init_opentelemetry(endpoint: &str) -> Result<SdkTracerProvider, Box<dyn std::error::Error>> {
    let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
    let service_name = env::var("OTEL_SERVICE_NAME").unwrap_or_else(|_| "loyalty-points".to_string());

    let sampling_rate = env::var("OTEL_TRACE_SAMPLING_RATE")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(0.1)
        .clamp(0.0, 1.0);

    let resource = Resource::builder()
        .with_attribute(KeyValue::new("service.name", service_name))
        .with_attribute(KeyValue::new("service.version", env!("CARGO_PKG_VERSION")))
        .with_attribute(KeyValue::new("deployment.environment", environment))
        .build();

    let exporter = SpanExporter::builder().with_http().with_endpoint(endpoint).build()?;

    let provider = SdkTracerProvider::builder()
        .with_resource(resource)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_rate))
        .with_batch_exporter(exporter)
        .build();

    info!("OpenTelemetry sampling rate: {}%", sampling_rate * 100.0);
    Ok(provider)
}

pub fn create_router(state: AppState) -> Router {
    let public = Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/me", get(auth::me))
        .route("/api/user/complete-profile", put(user::complete_profile))
        .route("/api/user/scans", get(user::scan_history))
        .route("/api/user/claims", get(user::claim_history))
        .route("/api/scan/{code}", get(scan::preview).post(scan::credit))
        .route("/api/rewards", get(rewards::list_active))
        .route("/api/rewards/{id}/claim", post(rewards::claim))
        .route("/api/config/public", get(rewards::public_config));

    let admin = Router::new()
        .route(
            "/api/admin/config",
            get(admin_config::get_config).put(admin_config::update_config),
        )
        .route(
            "/api/admin/config/recalculate-points",
            post(admin_config::recalculate),
        )
        .route(
            "/api/admin/config/recalculate-points-async",
            post(admin_config::recalculate_batched),
        )
        .route(
            "/api/admin/validate-security-key",
            post(admin_config::validate_security_key),
        )
        .route(
            "/api/admin/products",
            get(admin_catalog::list_products).post(admin_catalog::create_product),
        )
        .route(
            "/api/admin/products/{id}",
            put(admin_catalog::update_product).delete(admin_catalog::delete_product),
        )
        .route(
            "/api/admin/rewards",
            get(admin_catalog::list_rewards).post(admin_catalog::create_reward),
        )
        .route(
            "/api/admin/rewards/{id}",
            put(admin_catalog::update_reward).delete(admin_catalog::delete_reward),
        )
        .route("/api/admin/users", get(admin_users::list_users))
        .route(
            "/api/admin/users/{id}",
            get(admin_users::get_user).put(admin_users::update_user),
        )
        .route(
            "/api/admin/orders",
            get(admin_orders::list_orders).post(admin_orders::create_order),
        )
        .route("/api/admin/orders/backup", post(admin_orders::backup_orders))
        .route(
            "/api/admin/orders/{id}",
            get(admin_orders::get_order).delete(admin_orders::delete_order),
        )
        .route("/api/admin/claims", get(admin_claims::list_claims))
        .route("/api/admin/claims/{id}", put(admin_claims::validate_claim))
        .route("/api/admin/security/alerts", get(admin_dashboard::security_alerts))
        .route("/api/admin/stats", get(admin_dashboard::stats));

    Router::new()
        .merge(public)
        .merge(admin)
        .route("/internal/oauth/session", post(internal::sync_oauth_session))
        .route("/health", get(health_check))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// 200 only while the database answers
async fn health_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match db::health_check(&state.pool).await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(e) => {
            error!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE")
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutting down gracefully...");
}

pub async fn run_server() -> Result<(), Box<dyn std::error::Error>> {
    let tracer_provider = init_tracing();

    let config = AppConfig::from_env()?;
    info!(port = config.port, "Starting loyalty points server");

    let pool = db::create_pool(&config.database).await?;
    if config.database.run_migrations {
        db::run_migrations(&pool).await?;
    }

    let sweep_every = config.rate_limit_sweep;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    let state = AppState::new(pool, config);
    let sweeper = spawn_sweeper(state.limiter.store().clone(), sweep_every);
    let app = create_router(state);

    info!("Server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    sweeper.abort();
    if let Some(provider) = tracer_provider {
        if let Err(e) = provider.shutdown() {
            error!("Failed to flush traces: {}", e);
        }
    }

    Ok(())
}
