//! HTTP API layer

mod error;
pub mod handlers;

use anyhow::{Context, Result};
use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::config::Settings;
use crate::db::{Database, SiteRepository};
use crate::indexer::{BrowserRenderer, HttpFetcher, SiteFetcher};
use crate::service::SearchService;
use crate::site::{IndexerCatalog, IndexerDefinitions, SiteCategoryHelper};

pub use error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub search_service: Arc<SearchService>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Result<Self> {
        let indexer = &settings.indexer;
        let http = HttpFetcher::new(indexer.proxy.as_deref()).context("Failed to build HTTP client")?;
        let browser = settings.browser.enabled.then(|| {
            Arc::new(BrowserRenderer::new(
                settings.browser.chrome_path.clone(),
                settings.browser.headless,
                indexer.proxy.clone(),
            ))
        });
        let definitions = match &indexer.definitions_dir {
            Some(dir) => IndexerDefinitions::load_dir(dir),
            None => IndexerDefinitions::default(),
        };
        let category_helper = match &indexer.category_file {
            Some(path) => SiteCategoryHelper::load(path),
            None => SiteCategoryHelper::default(),
        };
        info!(
            "Indexer ready: {} bundled definitions, browser {}",
            definitions.len(),
            if browser.is_some() { "enabled" } else { "disabled" }
        );

        let search_service = SearchService::new(
            SiteRepository::new(db),
            IndexerCatalog::new(definitions),
            Arc::new(SiteFetcher::new(http, browser)),
            category_helper,
            indexer.clone(),
        );
        Ok(Self::with_service(settings, search_service))
    }

    pub fn with_service(settings: Settings, search_service: SearchService) -> Self {
        Self {
            settings,
            search_service: Arc::new(search_service),
        }
    }
}

/// Create the application router
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check
        .route("/health", get(handlers::health))

        // Sites
        .route("/sites", get(handlers::site::list))
        .route("/sites/{domain}", get(handlers::site::get_one))
        .route("/sites/{domain}/search", get(handlers::site::search))
        .route("/sites/{domain}/browse", get(handlers::site::browse))

        // Search across sites
        .route("/search", get(handlers::search::search_all));

    Router::new()
        .nest("/api", api_routes)
        .route("/crawl/page", get(handlers::crawl::page))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
}
