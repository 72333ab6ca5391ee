//! Per-site handlers

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use super::SearchQuery;
use crate::api::{AppError, AppState};
use crate::service::SiteTorrents;
use crate::site::{ParserKind, SiteConfiguration};

#[derive(Debug, Serialize)]
pub struct SiteSummary {
    pub id: String,
    pub name: String,
    pub domain: String,
    pub url: String,
    pub parser: ParserKind,
    pub public: bool,
    pub render: bool,
    pub priority: i64,
    pub types: Vec<String>,
    pub can_search: bool,
    pub can_browse: bool,
}

impl From<&SiteConfiguration> for SiteSummary {
    fn from(site: &SiteConfiguration) -> Self {
        Self {
            id: site.id.clone(),
            name: site.name.clone(),
            domain: site.domain.clone(),
            url: site.url.clone(),
            parser: site.parser,
            public: site.public,
            render: site.render,
            priority: site.priority(),
            types: site.types.clone(),
            can_search: site.search.is_some(),
            can_browse: site.browse.is_some() || site.search.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    pub keyword: Option<String>,
    pub category: Option<String>,
    #[serde(default)]
    pub page: u32,
}

fn indexer(state: &AppState, domain: &str) -> Result<SiteConfiguration, AppError> {
    state
        .search_service
        .get_indexer(domain)?
        .ok_or_else(|| AppError::not_found(format!("No indexer for {}", domain)))
}

/// List active sites
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<SiteSummary>>, AppError> {
    let indexers = state.search_service.list_indexers()?;
    Ok(Json(indexers.iter().map(SiteSummary::from).collect()))
}

/// Full indexer configuration of one site, secrets left out
pub async fn get_one(
    State(state): State<AppState>,
    Path(domain): Path<String>,
) -> Result<Json<SiteConfiguration>, AppError> {
    Ok(Json(indexer(&state, &domain)?))
}

/// Search one site
pub async fn search(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SiteTorrents>, AppError> {
    let keywords = query.keywords();
    if keywords.is_empty() {
        return Err(AppError::bad_request("keyword is required"));
    }
    let mtype = query.media_type()?;
    let site = indexer(&state, &domain)?;
    let result = state
        .search_service
        .search_torrents(&site, &keywords, mtype, query.page)
        .await;
    Ok(Json(result))
}

/// Latest torrents of one site
pub async fn browse(
    State(state): State<AppState>,
    Path(domain): Path<String>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<SiteTorrents>, AppError> {
    let site = indexer(&state, &domain)?;
    let result = state
        .search_service
        .refresh_torrents(&site, query.keyword, query.category, query.page)
        .await;
    Ok(Json(result))
}
