//! dwd-backend - content store, admin API and public pages for the
//! Divorce with Direction coaching site.

pub mod db;
pub mod logging;
pub mod realtime;
pub mod routes;

use axum::{
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use realtime::ChangeBroadcaster;

/// Shared per-request context. Passed explicitly through the router rather
/// than hidden in a global so handlers and tests can construct their own.
#[derive(Clone)]
pub struct AppState {
    pub changes: Arc<ChangeBroadcaster>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            changes: Arc::new(ChangeBroadcaster::new()),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to localhost origins in development.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                "http://localhost:3000".parse().unwrap(),
                "http://127.0.0.1:3000".parse().unwrap(),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
        ])
        .allow_credentials(true)
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    Router::new()
        // public pages
        .route("/", get(routes::pages::home_page))
        .route("/services", get(routes::pages::services_page))
        .route("/privacy", get(routes::pages::privacy_page))
        .route("/faq", get(routes::pages::faq_page))
        // admin auth
        .route("/api/auth/register", post(routes::auth::register))
        .route("/api/auth/login", post(routes::auth::login))
        .route("/api/auth/verify", post(routes::auth::verify_token))
        .route("/api/auth/refresh", post(routes::auth::refresh))
        .route("/api/auth/logout", post(routes::auth::logout))
        // singleton content
        .route(
            "/api/hero",
            get(routes::hero::get_hero).put(routes::hero::update_hero),
        )
        .route(
            "/api/intro",
            get(routes::intro::get_intro).put(routes::intro::update_intro),
        )
        .route(
            "/api/sections",
            get(routes::sections::get_sections).put(routes::sections::update_sections),
        )
        .route(
            "/api/settings/footer",
            get(routes::settings::get_footer).put(routes::settings::update_footer),
        )
        .route(
            "/api/settings/login",
            get(routes::settings::get_login).put(routes::settings::update_login),
        )
        .route(
            "/api/settings/calendar",
            get(routes::settings::get_calendar).put(routes::settings::update_calendar),
        )
        .route(
            "/api/privacy",
            get(routes::privacy::get_policy).put(routes::privacy::update_policy),
        )
        // ordered collections
        .route(
            "/api/services",
            get(routes::services::list_services).post(routes::services::create_service),
        )
        .route(
            "/api/services/{id}",
            axum::routing::patch(routes::services::update_service)
                .delete(routes::services::delete_service),
        )
        .route("/api/services/{id}/move", post(routes::services::move_service))
        .route(
            "/api/services/{id}/visibility",
            post(routes::services::toggle_visibility),
        )
        .route(
            "/api/testimonials",
            get(routes::testimonials::list_testimonials)
                .post(routes::testimonials::create_testimonial),
        )
        .route(
            "/api/testimonials/{id}",
            axum::routing::patch(routes::testimonials::update_testimonial)
                .delete(routes::testimonials::delete_testimonial),
        )
        .route(
            "/api/faqs",
            get(routes::faqs::list_faqs).post(routes::faqs::create_faq),
        )
        .route(
            "/api/faqs/{id}",
            axum::routing::patch(routes::faqs::update_faq).delete(routes::faqs::delete_faq),
        )
        .route("/api/faqs/{id}/move", post(routes::faqs::move_faq))
        // uploads + live events + client logs
        .route(
            "/api/uploads",
            post(routes::upload::upload_image).get(routes::upload::list_images),
        )
        .route(
            "/api/uploads/{kind}/{filename}",
            delete(routes::upload::delete_image),
        )
        .route("/api/events", get(routes::events::content_events))
        .route("/api/logs", post(routes::logs::receive_client_logs))
        .nest_service("/uploads", ServeDir::new("uploads"))
        // health
        .route("/health", get(routes::health::health_ping))
        .route("/health/detailed", get(routes::health::health_detailed))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        // Sized for the 5 MB image cap plus multipart framing overhead
        .layer(RequestBodyLimitLayer::new(6 * 1024 * 1024))
        .layer(cors)
        .with_state(state)
}

/// Run the server (used by main).
pub async fn run() {
    dotenvy::dotenv().ok();

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init();

    routes::health::init_start_time();

    // Refuse to start in production with the insecure default JWT secret.
    let environment = std::env::var("ENVIRONMENT").unwrap_or_default();
    if environment == "production" {
        let secret = std::env::var("JWT_SECRET").unwrap_or_default();
        if secret.is_empty() || secret == "default-jwt-secret-change-in-production" {
            panic!(
                "FATAL: JWT_SECRET must be set to a secure, unique value in production. \
                 Refusing to start with the default secret."
            );
        }

        // Warn (don't panic) about default admin credentials in production.
        let admin_email = std::env::var("ADMIN_EMAIL").unwrap_or_default();
        let admin_password_set =
            std::env::var("ADMIN_HASH_PASSWORD").is_ok() || std::env::var("ADMIN_PASSWORD").is_ok();

        if admin_email.is_empty() || admin_email == "admin@example.com" {
            tracing::warn!(
                "SECURITY: ADMIN_EMAIL is using an insecure default. \
                 Set ADMIN_EMAIL env var to a real address before registering."
            );
        }
        if !admin_password_set {
            tracing::warn!(
                "SECURITY: Neither ADMIN_HASH_PASSWORD nor ADMIN_PASSWORD is set. \
                 The fallback default password 'admin123' is insecure. \
                 Set ADMIN_HASH_PASSWORD to a bcrypt hash of a strong password."
            );
        }
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!("Failed to run database migrations: {}", e);
                }
            }
            Err(e) => {
                tracing::warn!(
                    "Failed to initialize database pool: {}. Continuing without database.",
                    e
                );
            }
        }
    } else {
        tracing::info!("DATABASE_URL not set. Running without database connection.");
    }

    let app = create_app(AppState::new());

    // Bind address is configurable via HOST / PORT env vars, defaulting to
    // 127.0.0.1:3001 so existing dev setups keep working unchanged.
    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(3001);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .expect("Invalid HOST/PORT configuration");
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("Server error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_app_returns_router() {
        let _app = create_app(AppState::new());
        // Just test that it compiles and doesn't panic
    }
}
