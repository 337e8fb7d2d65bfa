//! API route definitions
//!
//! | Route                     | Access               |
//! |---------------------------|----------------------|
//! | POST /api/register        | public               |
//! | POST /api/login           | public               |
//! | GET  /api/me, books, users| any authenticated    |
//! | POST/PUT books, PUT users | supervisor or higher |
//! | DELETE books, users       | manager or higher    |
//! | PUT /api/users/:id/role   | admin only           |

use crate::auth::{auth_middleware, require, AuthorizationPolicy};
use crate::handlers::{auth, books, users};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use bookshelf_core::Role;
use std::sync::Arc;

fn guarded(policy: AuthorizationPolicy, routes: Router<Arc<AppState>>) -> Router<Arc<AppState>> {
    routes.route_layer(middleware::from_fn(require(policy)))
}

/// Create the `/api` routes
pub fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/api/register", post(auth::register_handler))
        .route("/api/login", post(auth::login_handler));

    // Any authenticated role
    let read_routes = Router::new()
        .route("/api/me", get(auth::me_handler))
        .route("/api/books", get(books::list_books))
        .route("/api/books/:id", get(books::get_book))
        .route("/api/users", get(users::list_users))
        .route("/api/users/:id", get(users::get_user));

    let supervisor_routes = guarded(
        AuthorizationPolicy::at_least(Role::Supervisor),
        Router::new()
            .route("/api/books", post(books::create_book))
            .route("/api/books/:id", put(books::update_book))
            .route("/api/users/:id", put(users::update_user)),
    );

    let manager_routes = guarded(
        AuthorizationPolicy::at_least(Role::Manager),
        Router::new()
            .route("/api/books/:id", delete(books::delete_book))
            .route("/api/users/:id", delete(users::delete_user)),
    );

    let admin_routes = guarded(
        AuthorizationPolicy::any_of([Role::Admin]),
        Router::new().route("/api/users/:id/role", put(users::update_user_role)),
    );

    // Policies run inside the gate
    let protected_routes = read_routes
        .merge(supervisor_routes)
        .merge(manager_routes)
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(
            Arc::clone(&state.tokens),
            auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}
