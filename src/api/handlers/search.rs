//! Search across every active site

use axum::{
    extract::{Query, State},
    Json,
};

use super::SearchQuery;
use crate::api::{AppError, AppState};
use crate::service::SiteTorrents;

pub async fn search_all(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<SiteTorrents>>, AppError> {
    let keywords = query.keywords();
    if keywords.is_empty() {
        return Err(AppError::bad_request("keyword is required"));
    }
    let mtype = query.media_type()?;
    let results = state
        .search_service
        .search_all(&keywords, mtype, query.page)
        .await?;
    Ok(Json(results))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::api::handlers::tests::{get, router};
    use crate::indexer::testing::ScriptedFetcher;

    #[tokio::test]
    async fn test_results_per_site() {
        let fetcher = ScriptedFetcher::new().with_page(
            "https://alpha.org/torrents.php?search=Foo",
            r#"<div class="item"><a class="title">Foo</a></div><div class="item"><a class="title">Foo 2</a></div>"#,
        );
        let (status, body) = get(router(fetcher), "/api/search?keyword=Foo").await;
        assert_eq!(status, StatusCode::OK);
        let results: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(results[0]["name"], "Beta");
        assert_eq!(results[0]["torrents"].as_array().unwrap().len(), 0);
        assert_eq!(results[1]["torrents"].as_array().unwrap().len(), 2);
    }
}
