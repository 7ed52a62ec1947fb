// ============================================================================
// HTTP API
// ============================================================================
//
// Thin actix-web layer over the coordinator. Handlers translate JSON to
// coordinator calls and coordinator errors to status codes; nothing here
// touches order state directly.
//
// ============================================================================

mod api_types;
mod handlers;

use actix_web::web;
use std::sync::Arc;

use crate::actors::Supervisor;
use crate::coordinator::DispenseCoordinator;
use crate::metrics::metrics_handler;

pub use api_types::*;
pub use handlers::ApiError;

/// Shared state handed to every handler
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: DispenseCoordinator,
    pub supervisor: Arc<Supervisor>,
}

/// Register all routes. Expects `web::Data<ApiState>` and
/// `web::Data<Arc<Metrics>>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/orders", web::post().to(handlers::create_order))
            .route("/orders", web::get().to(handlers::list_orders))
            .route("/orders/{id}/confirm-payment", web::post().to(handlers::confirm_payment))
            .route("/orders/{id}/dispense", web::post().to(handlers::dispense))
            .route("/orders/{id}/status", web::get().to(handlers::order_status))
            .route("/admin/dead-letters", web::get().to(handlers::dead_letters)),
    )
    .route("/health", web::get().to(handlers::health))
    .route("/metrics", web::get().to(metrics_handler));
}
