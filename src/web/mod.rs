//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::db::Store;
use crate::render::Renderer;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    pub store: Arc<Store>,
    /// Backend for image/export routes; those routes answer 501 without one.
    pub renderer: Option<Arc<dyn Renderer>>,
}

/// Web server for Focuslight.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a new server with the given dependencies.
    pub fn new(config: ServerConfig, store: Arc<Store>) -> Self {
        Self {
            state: AppState {
                config,
                store,
                renderer: None,
            },
        }
    }

    /// Attach a time-series renderer.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.state.renderer = Some(renderer);
        self
    }

    /// Build the router with all routes.
    fn routes(&self) -> Router {
        let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

        Router::new()
            // Single series
            .route("/json/graph/{id}", get(handlers::handle_get_graph_by_id))
            .route(
                "/json/graph/{service}/{section}/{graph}",
                get(handlers::handle_get_graph),
            )
            .route(
                "/api/{service}/{section}/{graph}",
                get(handlers::handle_get_graph).post(handlers::handle_post_graph),
            )
            // Composites
            .route("/json/complex/{id}", get(handlers::handle_get_complex_by_id))
            .route(
                "/json/complex/{service}/{section}/{graph}",
                get(handlers::handle_get_complex),
            )
            .route("/json/create/complex", post(handlers::handle_create_complex))
            // Edit / delete / list
            .route("/json/edit/{kind}/{id}", post(handlers::handle_edit))
            .route("/json/delete/graph/{id}", post(handlers::handle_delete_graph_by_id))
            .route(
                "/json/delete/graph/{service}/{section}/{graph}",
                post(handlers::handle_delete_graph),
            )
            .route("/json/delete/complex/{id}", post(handlers::handle_delete_complex_by_id))
            .route(
                "/json/delete/complex/{service}/{section}/{graph}",
                post(handlers::handle_delete_complex),
            )
            .route("/delete/{service}/{section}", post(handlers::handle_delete_section))
            .route("/json/list/graph", get(handlers::handle_list_graphs))
            .route("/json/list/complex", get(handlers::handle_list_complex))
            .route("/json/list/all", get(handlers::handle_list_all))
            // Rendering
            .route("/graph/{service}/{section}/{graph}", get(handlers::handle_graph))
            .route("/xport/{service}/{section}/{graph}", get(handlers::handle_xport))
            .route(
                "/complex/graph/{service}/{section}/{graph}",
                get(handlers::handle_complex_graph),
            )
            .route(
                "/complex/xport/{service}/{section}/{graph}",
                get(handlers::handle_complex_xport),
            )
            .route("/graph/{complex}", get(handlers::handle_descriptor_graph))
            .route("/xport/{complex}", get(handlers::handle_descriptor_xport))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
            .with_state(self.state.clone())
    }

    /// Start the server on the configured port.
    pub async fn start(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.state.config.http_port));
        let router = self.routes();

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router).await?;

        Ok(())
    }
}
