use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::Router;

use crate::app_state::AppState;

pub mod ai;
pub mod auth;
pub mod health;
pub mod metrics;
pub mod poetry;

/// Every JSON endpoint under `/api`.
pub fn api_router(state: AppState) -> Router {
    let body_limit = state.uploads.body_limit;

    let auth = Router::new()
        .route("/login", post(auth::login))
        .route("/register", post(auth::register))
        .route("/me", get(auth::me))
        .route("/profile", put(auth::update_profile))
        .route("/password", put(auth::change_password))
        .route("/users", get(auth::list_users))
        .route("/users/{id}/approve", put(auth::approve_user))
        .route("/users/{id}", axum::routing::delete(auth::delete_user));

    let poetry = Router::new()
        .route("/", get(poetry::list_poetry).post(poetry::create_poetry))
        .route("/stats", get(poetry::poetry_stats))
        .route("/dynasties", get(poetry::list_dynasties))
        .route("/authors", get(poetry::list_authors))
        .route(
            "/{id}",
            get(poetry::get_poetry)
                .put(poetry::update_poetry)
                .delete(poetry::delete_poetry),
        )
        .route("/{id}/like", post(poetry::like_poetry));

    let ai = Router::new()
        .route("/verify/{id}", post(ai::retry_verify))
        .route("/generate-image/{id}", post(ai::retry_generate_image))
        .route("/status/{id}", get(ai::enrichment_status));

    Router::new()
        .route("/api/health", get(health::health_check))
        .nest("/api/auth", auth)
        .nest("/api/poetry", poetry)
        .nest("/api/ai", ai)
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
