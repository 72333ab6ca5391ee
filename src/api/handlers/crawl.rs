//! Single-field page extraction for `crawl_page` links

use axum::extract::{Query, State};
use serde::Deserialize;

use crate::api::{AppError, AppState};
use crate::indexer::SelectorSpec;

#[derive(Debug, Deserialize)]
pub struct CrawlQuery {
    pub url: String,
    /// JSON selector spec
    pub query: String,
}

/// Fetch `url` with its site's settings and return the selected value as text
pub async fn page(
    State(state): State<AppState>,
    Query(params): Query<CrawlQuery>,
) -> Result<String, AppError> {
    let spec: SelectorSpec = serde_json::from_str(&params.query)?;
    state
        .search_service
        .crawl_page(&params.url, &spec)
        .await?
        .ok_or_else(|| AppError::not_found(format!("No indexer for {}", params.url)))
}
