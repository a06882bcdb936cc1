use axum::{
    Router,
    routing::{get, patch, post},
    middleware::from_fn_with_state,
    middleware::from_fn,
    extract::DefaultBodyLimit,
    http::HeaderValue,
};

use http::{Method, header};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_cookies::CookieManagerLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::{
    trace::{TraceLayer, DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, DefaultOnFailure},
    cors::CorsLayer,
    set_header::SetResponseHeaderLayer,
};

use tracing::Level;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cache;
mod config;
mod error;
mod response;
mod state;
mod db;
mod crypto {
    pub mod otp;
    pub mod password;
    pub mod tokens;
}

mod models {
    pub mod course;
    pub mod pagination;
    pub mod session;
    pub mod user;
}

mod repositories {
    pub mod course;
    pub mod user;
}

mod services {
    pub mod admin;
    pub mod auth;
    pub mod courses;
    pub mod mail;
    pub mod media;
    pub mod notifications;
    pub mod otp;
}

mod handlers {
    pub mod admin;
    pub mod auth;
    pub mod courses;
    pub mod health;
    pub mod socket;
    pub mod upload;
}

mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

mod validation {
    pub mod auth;
    pub mod course;
    pub mod extract;
}

use config::Config;
use middleware_layer::{auth as auth_mw, rate_limit};
use state::AppState;

const BODY_LIMIT: usize = 10 * 1024 * 1024;
/// Five images of 5 MiB plus multipart framing.
const UPLOAD_BODY_LIMIT: usize = 26 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    tracing::info!("✅ Configuration loaded ({})", config.app_env);

    let state = AppState::new(&config).await?;
    tracing::info!("✅ AppState initialized");

    if let Err(e) = db::migrate(&state.db).await {
        tracing::error!("❌ Failed to apply schema: {}", e);
        return Err(e.into());
    }
    tracing::info!("✅ Schema is up to date");

    let origins: Vec<HeaderValue> = config
        .frontend_urls
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    // 100 requests per IP every 15 minutes.
    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(9)
            .burst_size(100)
            .use_headers()
            .finish()
            .ok_or_else(|| anyhow::anyhow!("invalid rate limiter configuration"))?,
    );

    let app = Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        .layer(tower_governor::GovernorLayer::new(governor_conf))
        .route("/health", get(handlers::health::health))
        .fallback(handlers::health::not_found)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(CookieManagerLayer::new())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors);
    let app = with_security_headers(app).with_state(state.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

/// Hardening headers set on every response.
fn with_security_headers<S>(router: Router<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("no-referrer"),
        ))
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/users", user_routes(state.clone()))
        .nest("/courses", course_routes(state.clone()))
        .nest("/admin", admin_routes(state.clone()))
        .nest("/upload", upload_routes(state.clone()))
        .route("/socket", get(handlers::socket::ws_handler))
}

fn user_routes(state: AppState) -> Router<AppState> {
    use handlers::auth;

    let register_routes = Router::new()
        .route("/register", post(auth::register))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_register));

    let login_routes = Router::new()
        .route("/login", post(auth::login))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_login));

    let otp_request_routes = Router::new()
        .route("/forgot-password", post(auth::forgot_password))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_otp_request));

    let otp_verify_routes = Router::new()
        .route("/reset-password", post(auth::reset_password))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_otp_verify));

    let public_routes = Router::new().route("/refresh-token", post(auth::refresh_token));

    // Rate limits run inside `require_auth` so they can key on the caller.
    let protected_otp_request_routes = Router::new()
        .route("/resend-otp", post(auth::resend_otp))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_otp_request))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let protected_otp_verify_routes = Router::new()
        .route("/verify-email", post(auth::verify_email))
        .route_layer(from_fn_with_state(state.clone(), rate_limit::rate_limit_otp_verify))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let protected_routes = Router::new()
        .route("/logout", post(auth::logout))
        .route("/change-password", post(auth::change_password))
        .route("/profile", get(auth::get_profile).patch(auth::update_profile))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    Router::new()
        .merge(register_routes)
        .merge(login_routes)
        .merge(otp_request_routes)
        .merge(otp_verify_routes)
        .merge(public_routes)
        .merge(protected_otp_request_routes)
        .merge(protected_otp_verify_routes)
        .merge(protected_routes)
}

fn course_routes(state: AppState) -> Router<AppState> {
    use handlers::courses;

    let public_routes = Router::new()
        .route("/", get(courses::list_courses))
        .route("/{id}", get(courses::get_course));

    let member_routes = Router::new()
        .route("/my-courses", get(courses::my_courses))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let student_routes = Router::new()
        .route("/{id}/enroll", post(courses::enroll))
        .route_layer(from_fn(auth_mw::require_student))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    let instructor_routes = Router::new()
        .route("/", post(courses::create_course))
        .route(
            "/{id}",
            patch(courses::update_course).delete(courses::delete_course),
        )
        .route("/{id}/milestones", post(courses::add_milestone))
        .route(
            "/{id}/milestones/{milestone_id}/videos",
            post(courses::add_video),
        )
        .route_layer(from_fn(auth_mw::require_instructor))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(member_routes)
        .merge(student_routes)
        .merge(instructor_routes)
}

fn admin_routes(state: AppState) -> Router<AppState> {
    use handlers::admin;

    Router::new()
        .route("/stats", get(admin::stats))
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            patch(admin::update_user).delete(admin::delete_user),
        )
        .route("/courses", get(admin::list_courses))
        .route("/courses/{id}", patch(admin::moderate_course))
        .route_layer(from_fn_with_state(state.clone(), auth_mw::require_admin))
        .route_layer(from_fn_with_state(state, auth_mw::require_auth))
}

fn upload_routes(state: AppState) -> Router<AppState> {
    use handlers::upload;

    Router::new()
        .route("/single", post(upload::upload_single))
        .route("/multiple", post(upload::upload_multiple))
        .route_layer(from_fn_with_state(state, auth_mw::require_auth))
        .layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("🛑 Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    #[tokio::test]
    async fn every_response_carries_security_headers() {
        let app = with_security_headers(
            Router::new()
                .route("/ok", get(|| async { "ok" }))
                .fallback(handlers::health::not_found),
        );

        for uri in ["/ok", "/missing"] {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            let response = app.clone().oneshot(request).await.unwrap();
            let headers = response.headers();
            assert_eq!(headers[header::X_CONTENT_TYPE_OPTIONS], "nosniff", "{}", uri);
            assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY", "{}", uri);
            assert_eq!(headers[header::REFERRER_POLICY], "no-referrer", "{}", uri);
        }
    }
}
