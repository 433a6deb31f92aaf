//! Auth Router

use axum::{
    Router, middleware,
    routing::{get, post, put},
};

use crate::application::config::AuthConfig;
use crate::infra::postgres::PgAuthRepository;
use crate::presentation::handlers::{self, AuthAppState, AuthStore};
use crate::presentation::middleware::require_auth;

/// Create the Auth router with PostgreSQL repository
pub fn auth_router(repo: PgAuthRepository, config: AuthConfig) -> Router {
    auth_router_generic(repo, config)
}

/// Create a generic Auth router for any repository implementation
pub fn auth_router_generic<R>(repo: R, config: AuthConfig) -> Router
where
    R: AuthStore,
{
    auth_router_with_state(AuthAppState::new(repo, config))
}

/// Create the Auth router from prepared state
pub fn auth_router_with_state<R>(state: AuthAppState<R>) -> Router
where
    R: AuthStore,
{
    let protected = Router::new()
        .route("/logout", post(handlers::logout::<R>))
        .route("/me", get(handlers::me::<R>))
        .route("/2fa/setup", post(handlers::totp_setup::<R>))
        .route("/2fa/confirm", post(handlers::totp_confirm::<R>))
        .route("/2fa/disable", post(handlers::totp_disable::<R>))
        .route(
            "/clients/{client_id}/policy",
            put(handlers::update_client_policy::<R>),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_auth::<R>,
        ));

    Router::new()
        .route("/register", post(handlers::register::<R>))
        .route("/login", post(handlers::login::<R>))
        .route("/2fa/verify", post(handlers::verify_two_factor::<R>))
        .route("/refresh", post(handlers::refresh::<R>))
        .merge(protected)
        .with_state(state)
}
