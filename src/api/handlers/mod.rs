//! API request handlers

pub mod crawl;
pub mod search;
pub mod site;

use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::AppError;
use crate::site::MediaType;

/// Health check endpoint
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Query accepted by the search endpoints
///
/// `keyword` may hold several titles separated by `|`, searched as a batch
/// where the site supports it.
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub keyword: String,
    pub mtype: Option<String>,
    #[serde(default)]
    pub page: u32,
}

impl SearchQuery {
    pub fn keywords(&self) -> Vec<String> {
        self.keyword
            .split('|')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn media_type(&self) -> Result<Option<MediaType>, AppError> {
        match self.mtype.as_deref().filter(|m| !m.is_empty()) {
            Some(mtype) => Ok(Some(mtype.parse()?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use tower::ServiceExt;

    use crate::api::{create_router, AppState};
    use crate::config::Settings;
    use crate::indexer::testing::ScriptedFetcher;
    use crate::service::{site_record, test_service};

    pub(crate) fn router(fetcher: ScriptedFetcher) -> Router {
        let records = [site_record("Alpha", "alpha.org", 2), site_record("Beta", "beta.org", 1)];
        let state = AppState::with_service(Settings::default(), test_service(&records, fetcher));
        create_router(state)
    }

    pub(crate) async fn get(router: Router, uri: &str) -> (StatusCode, String) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_health() {
        let (status, body) = get(router(ScriptedFetcher::new()), "/api/health").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"ok\""));
    }

    #[test]
    fn test_query_keywords() {
        let query = super::SearchQuery {
            keyword: "Foo Bar | Baz|".to_string(),
            ..Default::default()
        };
        assert_eq!(query.keywords(), vec!["Foo Bar", "Baz"]);
        assert!(query.media_type().unwrap().is_none());
    }
}
