use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    extract::MatchedPath,
    http::HeaderName,
    middleware,
    routing::{get, post},
};
use gigameter_access::policy::{
    CategoryChangeNotifier, CategoryReloadService, ReloadConfig, RouteTable,
};
use gigameter_access::{
    AccessPolicyEngine, CategoryRegistry, CategoryStore, DocumentDisclosureFilter,
    ResponseDisclosureFilter, StaticCategoryStore,
};
use serde_json::Value;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    docs, handlers,
    middleware::{self as app_middleware, CategoryResolution},
    store::{DEFAULT_WATCH_DEBOUNCE, FileCategoryStore, StoreWatchHandle},
};

// =============================================================================
// Application State
// =============================================================================

/// Shared state behind every route and the category layers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CategoryRegistry>,
    pub engine: Arc<AccessPolicyEngine>,
    pub routes: Arc<RouteTable>,
    pub disclosure: ResponseDisclosureFilter,
    pub documents: Arc<DocumentDisclosureFilter>,
    /// Source OpenAPI document, when documentation is configured.
    pub openapi: Option<Arc<Value>>,
    pub reload: Arc<CategoryReloadService>,
    pub resolution: CategoryResolution,
    pub body_limit: usize,
}

impl AppState {
    /// State over `registry` with the built-in route table and no document.
    pub fn new(registry: Arc<CategoryRegistry>, reload: ReloadConfig) -> Self {
        let notifier = Arc::new(CategoryChangeNotifier::default());
        let reload = Arc::new(CategoryReloadService::new(
            registry.clone(),
            notifier,
            reload,
        ));
        Self {
            registry,
            engine: Arc::new(AccessPolicyEngine::new()),
            routes: Arc::new(default_routes()),
            disclosure: ResponseDisclosureFilter::new(),
            documents: Arc::new(DocumentDisclosureFilter::new()),
            openapi: None,
            reload,
            resolution: CategoryResolution::default(),
            body_limit: 1024 * 1024,
        }
    }

    /// Add route requirements for additional routers.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        let mut table = (*self.routes).clone();
        table.extend(routes);
        self.routes = Arc::new(table);
        self
    }

    pub fn with_document(mut self, document: Value) -> Self {
        self.openapi = Some(Arc::new(document));
        self
    }

    pub fn with_resolution(mut self, resolution: CategoryResolution) -> Self {
        self.resolution = resolution;
        self
    }

    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Access requirements of the routes served by [`build_app_with`].
pub fn default_routes() -> RouteTable {
    RouteTable::new()
        .public("GET", "/healthz")
        .public("GET", "/readyz")
        .public("GET", "/api/docs/openapi.json")
        .public("GET", "/api/{category}/openapi.json")
        .public("GET", "/api/v1/category-config/allowed-countries")
        .require("GET", "/api/v1/category-config", ["admin"])
        .require("GET", "/api/v1/category-config/default", ["admin"])
        .require("POST", "/api/v1/category-config/reload", ["admin"])
}

/// Build the state described by `cfg` and load the category registry.
pub async fn build_state(cfg: &AppConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn CategoryStore> = match &cfg.categories.store_path {
        Some(path) => Arc::new(FileCategoryStore::new(path)),
        None => Arc::new(StaticCategoryStore::empty()),
    };
    let registry = Arc::new(CategoryRegistry::with_fetch_timeout(
        store,
        cfg.categories.fetch_timeout(),
    ));

    registry.initialize().await;

    let resolution = if cfg.categories.trust_category_header {
        let header =
            HeaderName::from_bytes(cfg.categories.category_header.to_ascii_lowercase().as_bytes())
                .map_err(|e| anyhow::anyhow!("invalid categories.category_header: {e}"))?;
        CategoryResolution::trusted_header(header)
    } else {
        CategoryResolution::untrusted()
    };

    let mut state = AppState::new(
        registry,
        ReloadConfig::with_periodic_refresh(cfg.categories.refresh_interval_secs),
    )
    .with_resolution(resolution)
    .with_body_limit(cfg.server.body_limit_bytes);

    if cfg.docs.enabled {
        if let Some(path) = &cfg.docs.document_path {
            state = state.with_document(docs::load_document(path).await?);
            tracing::info!(path = %path, "OpenAPI document loaded");
        }
    }

    Ok(state)
}

// =============================================================================
// Router
// =============================================================================

pub async fn build_app(cfg: &AppConfig) -> anyhow::Result<Router> {
    let state = build_state(cfg).await?;
    Ok(build_app_with(state, Router::new()))
}

/// Mount `routes` next to the built-in routes, behind the category gate and
/// response disclosure layers. Their requirements belong in
/// [`AppState::with_routes`].
pub fn build_app_with(state: AppState, routes: Router<AppState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        // Health
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        // Documentation
        .route("/api/docs/openapi.json", get(docs::default_document))
        .route("/api/{category}/openapi.json", get(docs::category_document))
        // Category administration
        .route("/api/v1/category-config", get(handlers::list_categories))
        .route(
            "/api/v1/category-config/default",
            get(handlers::default_category),
        )
        .route(
            "/api/v1/category-config/allowed-countries",
            get(handlers::allowed_countries),
        )
        .route(
            "/api/v1/category-config/reload",
            post(handlers::reload_categories),
        )
        .merge(routes)
        // Category layers (order: gate -> disclosure -> handler)
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::response_disclosure,
        ))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::category_guard,
        ))
        // Outer stack (order: request id -> trace -> cors/compression -> body limit)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let span = tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.route = Empty,
                        http.status_code = Empty,
                        request_id = %req_id
                    );
                    if let Some(route) = req.extensions().get::<MatchedPath>() {
                        span.record("http.route", route.as_str());
                    }
                    span
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

// =============================================================================
// Server
// =============================================================================

pub struct GigameterServer {
    addr: SocketAddr,
    app: Router,
    reload: Arc<CategoryReloadService>,
    watch: Option<StoreWatchHandle>,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub async fn build(self) -> anyhow::Result<GigameterServer> {
        let state = build_state(&self.config).await?;
        let reload = state.reload.clone();

        let watch = match (&self.config.categories.store_path, self.config.categories.watch) {
            (Some(path), true) => Some(
                FileCategoryStore::new(path).watch(reload.notifier().clone(), DEFAULT_WATCH_DEBOUNCE),
            ),
            _ => None,
        };

        Ok(GigameterServer {
            addr: self.addr,
            app: build_app_with(state, Router::new()),
            reload,
            watch,
        })
    }
}

impl GigameterServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let reload = self.reload.clone();
        let reload_task = tokio::spawn(async move { reload.run().await });

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        self.reload.shutdown();
        reload_task.abort();
        if let Some(watch) = self.watch {
            watch.stop().await;
        }
        Ok(())
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
