//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Compose the interceptor chain in its fixed order
//! - Raise the body limit so the per-file ceiling is enforced at the boundary
//! - Serve until the shutdown coordinator terminates
//!
//! # Design Decisions
//! - Handlers receive every service through `AppState`; nothing is global
//! - Unknown routes and panics answer with the same JSON error shape as
//!   every other failure

use std::any::Any;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;

use crate::config::Settings;
use crate::error::AppError;
use crate::http::handlers;
use crate::http::middleware::{enforce_deadline, no_cache_guard, privacy_log};
use crate::lifecycle::{Services, ShutdownCoordinator};
use crate::transform::Dispatcher;
use crate::validation::BoundaryValidator;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub validator: BoundaryValidator,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(services: &Services) -> Self {
        Self {
            dispatcher: Dispatcher::new(services.tracker.clone(), services.settings.clone()),
            validator: BoundaryValidator::new(services.settings.limits.max_file_size_mb),
            settings: services.settings.clone(),
        }
    }
}

/// HTTP server for the document service.
pub struct HttpServer {
    router: Router,
    coordinator: ShutdownCoordinator,
}

impl HttpServer {
    pub fn new(services: &Services) -> Self {
        Self {
            router: Self::build_router(AppState::new(services)),
            coordinator: services.coordinator.clone(),
        }
    }

    /// Build the Axum router with all middleware layers.
    ///
    /// `routes` lets embedders and tests mount extra handlers under the same
    /// interceptor chain.
    pub fn build_router_with(state: AppState, routes: Router<AppState>) -> Router {
        let request_timeout = state.settings.request_timeout();
        let body_limit = state.settings.max_body_bytes();

        routes
            .fallback(not_found)
            .with_state(state)
            .layer(DefaultBodyLimit::max(body_limit))
            .layer(
                ServiceBuilder::new()
                    .layer(from_fn(no_cache_guard))
                    .layer(from_fn(privacy_log))
                    .layer(CatchPanicLayer::custom(panic_response))
                    .layer(from_fn_with_state(request_timeout, enforce_deadline)),
            )
    }

    pub fn build_router(state: AppState) -> Router {
        Self::build_router_with(state, handlers::routes())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        let coordinator = self.coordinator;
        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move { coordinator.wait().await })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn not_found() -> AppError {
    AppError::NotFound
}

fn panic_response(_payload: Box<dyn Any + Send + 'static>) -> Response {
    tracing::error!(kind = "internal", "Request handler panicked");
    AppError::Internal.into_response()
}
