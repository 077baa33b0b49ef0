//! API routes

pub mod admin;
pub mod automations;
pub mod entities;
pub mod finance;
pub mod health;
pub mod plans;


use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::{
    auth::{require_auth, require_platform_admin, tenant_scope},
    state::AppState,
};

/// Plan, automation and ledger routes, identical for both scopes
fn scoped_routes() -> Router<AppState> {
    Router::new()
        // Plans
        .route("/plans", get(plans::list_plans).post(plans::create_plan))
        // Automations
        .route(
            "/automations",
            get(automations::list_rules).post(automations::create_rule),
        )
        .route(
            "/automations/{id}",
            axum::routing::put(automations::update_rule).delete(automations::delete_rule),
        )
        .route(
            "/automations/{id}/notifications",
            get(automations::list_rule_notifications),
        )
        // Finance
        .route(
            "/finance/entries",
            get(finance::list_entries).post(finance::create_entry),
        )
        .route("/finance/summary", get(finance::summary))
}

/// Lifecycle routes for one entity family, mounted under its own prefix
fn entity_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(entities::list_entities).post(entities::create_entity),
        )
        .route(
            "/{id}",
            get(entities::get_entity)
                .patch(entities::update_entity)
                .delete(entities::delete_entity),
        )
        .route("/{id}/renew", post(entities::renew))
        .route("/{id}/due-today", post(entities::set_due_today))
        .route("/{id}/status", post(entities::change_status))
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    // Tenant routes: the caller's own clients
    let tenant_routes = Router::new()
        .nest("/clients", entity_routes())
        .merge(scoped_routes())
        .route_layer(middleware::from_fn(tenant_scope));

    // Platform admin routes: subscribers and maintenance jobs
    let admin_routes = Router::new()
        .nest("/subscribers", entity_routes())
        .merge(scoped_routes())
        .route("/invariants/run", post(admin::run_invariants))
        .route("/sweep", post(admin::run_sweep))
        .route_layer(middleware::from_fn(require_platform_admin));

    // Layers run bottom-up, so require_auth sees the request first
    let api_routes = Router::new()
        .merge(tenant_routes)
        .nest("/admin", admin_routes)
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
