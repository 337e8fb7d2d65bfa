//! Bookshelf API - REST server
//!
//! Book and user CRUD behind token authentication and role-based
//! authorization.

pub mod audit;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    routing::get,
    Router,
};
use handlers::{auth as auth_handlers, books, health, users};
use state::AppState;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

/// Security scheme modifier for OpenAPI
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        health::readiness_check,
        auth_handlers::register_handler,
        auth_handlers::login_handler,
        auth_handlers::me_handler,
        books::list_books,
        books::get_book,
        books::create_book,
        books::update_book,
        books::delete_book,
        users::list_users,
        users::get_user,
        users::update_user,
        users::update_user_role,
        users::delete_user,
    ),
    components(schemas(
        error::ApiError,
        health::HealthResponse,
        health::ReadinessResponse,
        auth::RegisterRequest,
        auth::LoginRequest,
        auth::LoginResponse,
        auth::UserInfo,
        users::UpdateUserRequest,
        users::UpdateRoleRequest,
        bookshelf_core::Role,
        bookshelf_core::Book,
        bookshelf_core::NewBook,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Liveness and readiness probes"),
        (name = "auth", description = "Registration, login and the current user"),
        (name = "books", description = "Book catalogue"),
        (name = "users", description = "User accounts and role assignment"),
    ),
    info(title = "Bookshelf API", description = "Book and user management with role-based access")
)]
pub struct ApiDoc;

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
}

/// Build the full application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let timeout = TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs));

    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics))
        .merge(routes::api_routes(&state))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::metrics_middleware,
        ))
        .layer(timeout)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
