use std::sync::Arc;

use axum::{middleware as axum_middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod session;

use services::{
    events::EventBus,
    notify::{Notifier, WhatsAppNotifier},
    storage::StorageService,
};
use session::{RoleResolver, SqlRoleResolver};

#[derive(Clone)]
pub struct AppState {
    pub db: db::Database,
    pub config: config::Config,
    pub storage: StorageService,
    pub events: EventBus,
    pub roles: Arc<dyn RoleResolver>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn new(db: db::Database, config: config::Config) -> Self {
        let roles = Arc::new(SqlRoleResolver::new(db.pool.clone()));
        let notifier = Arc::new(WhatsAppNotifier::new(
            config.whatsapp.clone(),
            reqwest::Client::new(),
        ));
        Self {
            storage: StorageService::new(&config.storage_path),
            events: EventBus::new(),
            roles,
            notifier,
            db,
            config,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }
}

pub fn create_router(state: AppState) -> Router {
    // Build protected routes (require authentication)
    let protected_routes = Router::new()
        .route("/auth/me", get(routes::auth::me))
        .nest("/projects", routes::projects::router())
        .nest("/checklist", routes::phases::checklist_router())
        .nest("/materials", routes::materials::router())
        .nest("/labour", routes::labour::router())
        .nest("/files", routes::files::router())
        .nest("/tasks", routes::tasks::router())
        .nest("/team", routes::team::router())
        .nest("/notifications", routes::notifications::router())
        .nest(
            "/reports",
            routes::reports::router().route_layer(axum_middleware::from_fn(
                middleware::guard::reports_only,
            )),
        )
        .nest(
            "/admin",
            routes::admin::router()
                .route_layer(axum_middleware::from_fn(middleware::guard::admin_only)),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::auth_middleware,
        ));

    // Build API router
    let api_router = Router::new()
        .nest("/auth", routes::auth::router())
        .merge(protected_routes);

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(handlers::ws::ws_handler))
        .nest("/api", api_router)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

async fn health_check() -> &'static str {
    "OK"
}
