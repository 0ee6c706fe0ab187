//! HTTP router: public routes, authenticated routes and shared layers.

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{handlers, middleware, state::AppState};

pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password));

    let authenticated_routes = Router::new()
        // Profile
        .route(
            "/users/profile",
            get(handlers::users::get_profile).put(handlers::users::update_profile),
        )
        // Wallet
        .route("/wallet", get(handlers::wallet::get_wallet))
        .route(
            "/wallet/transactions",
            get(handlers::wallet::get_wallet_transactions),
        )
        .route("/wallet/transfer", post(handlers::wallet::transfer))
        // Ledger
        .route("/transactions", get(handlers::transactions::list_transactions))
        .route(
            "/transactions/sync",
            post(handlers::transactions::sync_transactions),
        )
        .route(
            "/transactions/{id}",
            get(handlers::transactions::get_transaction),
        )
        // Bonuses
        .route("/bonus", get(handlers::bonus::list_bonuses))
        .route("/bonus/eligibility", get(handlers::bonus::check_eligibility))
        .route(
            "/bonus/wheel-of-fortune/spin",
            post(handlers::bonus::spin_wheel),
        )
        .route("/bonus/claim/{id}", post(handlers::bonus::claim_bonus))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .nest("/api", public_routes.merge(authenticated_routes))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
