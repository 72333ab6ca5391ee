//! Search and browse URL construction

use serde_json::Value;
use url::form_urlencoded;

use super::fetcher::HttpMethod;
use crate::site::{BatchConfig, MediaType, SearchPath, SiteConfiguration};

/// What to search for
#[derive(Debug, Clone, PartialEq)]
pub enum SearchKeyword {
    Single(String),
    /// Several titles searched in one request
    Batch(Vec<String>),
}

impl SearchKeyword {
    pub fn is_imdb_id(&self) -> bool {
        matches!(self, SearchKeyword::Single(k) if k.starts_with("tt"))
    }

    /// Whether a list row titled `title` belongs to this search
    ///
    /// A single keyword admits any title it contains; a batch needs an exact
    /// member.
    pub fn admits_title(&self, title: &str) -> bool {
        match self {
            SearchKeyword::Single(keyword) => keyword.contains(title),
            SearchKeyword::Batch(keywords) => keywords.iter().any(|k| k == title),
        }
    }

    /// The search word and the site's search mode (`0` = AND, `1` = OR)
    pub fn join(&self, batch: Option<&BatchConfig>) -> (String, &'static str) {
        match self {
            SearchKeyword::Single(keyword) => (keyword.clone(), "0"),
            SearchKeyword::Batch(keywords) => {
                let word = match batch {
                    Some(batch) => {
                        let delimiter = batch.delimiter.as_deref().filter(|d| !d.is_empty()).unwrap_or(" ");
                        let space = batch.space_replace.as_deref().filter(|s| !s.is_empty()).unwrap_or(" ");
                        keywords
                            .iter()
                            .map(|k| k.replace(' ', space))
                            .collect::<Vec<_>>()
                            .join(delimiter)
                    }
                    None => keywords.join(" "),
                };
                (word, "1")
            }
        }
    }
}

impl From<&str> for SearchKeyword {
    fn from(value: &str) -> Self {
        SearchKeyword::Single(value.to_string())
    }
}

impl From<Vec<String>> for SearchKeyword {
    fn from(value: Vec<String>) -> Self {
        SearchKeyword::Batch(value)
    }
}

/// A fully resolved page request for a search or browse
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub url: String,
    pub method: HttpMethod,
    /// POST form fields
    pub form: Vec<(String, String)>,
}

/// Builds the search or browse request for one site
pub struct SearchRequestBuilder<'a> {
    site: &'a SiteConfiguration,
    keyword: Option<&'a SearchKeyword>,
    page: u32,
    mtype: Option<MediaType>,
    category: Option<&'a str>,
}

/// Set `key`, keeping its position when it already exists
fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    match params.iter_mut().find(|(k, _)| k == key) {
        Some(entry) => entry.1 = value,
        None => params.push((key.to_string(), value)),
    }
}

fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        _ => true,
    }
}

/// Percent-encode a keyword for a URL path, leaving `/` readable
fn quote(keyword: &str) -> String {
    urlencoding::encode(keyword).replace("%2F", "/")
}

fn fill_template(path: &str, keyword: &str, page: i64) -> String {
    path.replace("{keyword}", keyword).replace("{page}", &page.to_string())
}

impl<'a> SearchRequestBuilder<'a> {
    pub fn new(site: &'a SiteConfiguration) -> Self {
        Self {
            site,
            keyword: None,
            page: 0,
            mtype: None,
            category: None,
        }
    }

    pub fn keyword(mut self, keyword: Option<&'a SearchKeyword>) -> Self {
        self.keyword = keyword;
        self
    }

    pub fn page(mut self, page: u32) -> Self {
        self.page = page;
        self
    }

    pub fn media_type(mut self, mtype: Option<MediaType>) -> Self {
        self.mtype = mtype;
        self
    }

    /// Restrict to one site category code instead of the media type's codes
    pub fn category(mut self, category: Option<&'a str>) -> Self {
        self.category = category.filter(|c| !c.is_empty());
        self
    }

    /// Whether the site configures a path for this request
    ///
    /// A search needs a search path; browsing takes the browse path or
    /// falls back to the search path.
    pub fn has_path(&self) -> bool {
        let search_path = self.select_path().is_some_and(|p| !p.path.is_empty());
        match self.keyword {
            Some(_) => search_path,
            None => self.site.browse.as_ref().is_some_and(|b| !b.path.is_empty()) || search_path,
        }
    }

    pub fn build(&self) -> SearchRequest {
        match self.keyword {
            Some(keyword) => self.search_request(keyword),
            None => self.browse_request(),
        }
    }

    /// Search path for the requested media type
    ///
    /// Exact type match first, then an untyped or `all` path, then the first.
    fn select_path(&self) -> Option<&'a SearchPath> {
        let paths = &self.site.search.as_ref()?.paths;
        if paths.len() == 1 {
            return paths.first();
        }
        let wanted = self.mtype.map(|m| m.to_string());
        let is_generic = |p: &&SearchPath| p.kind.as_deref().map_or(true, |k| k == "all");
        paths
            .iter()
            .find(|p| match (&p.kind, &wanted) {
                (Some(kind), Some(wanted)) => kind == wanted,
                (_, None) => is_generic(p),
                (None, Some(_)) => false,
            })
            .or_else(|| paths.iter().find(is_generic))
            .or_else(|| paths.first())
    }

    fn category_codes(&self) -> Vec<String> {
        if let Some(category) = self.category {
            return vec![category.to_string()];
        }
        let Some(category) = &self.site.category else {
            return Vec::new();
        };
        let entries: Vec<_> = match self.mtype {
            Some(MediaType::Tv) => category.tv.iter().collect(),
            Some(MediaType::Movie) => category.movie.iter().collect(),
            _ => category.movie.iter().chain(category.tv.iter()).collect(),
        };
        entries.into_iter().map(|c| c.id.clone()).collect()
    }

    fn inject_categories(&self, params: &mut Vec<(String, String)>) {
        let Some(category) = &self.site.category else {
            return;
        };
        for code in self.category_codes() {
            match category.field.as_deref().filter(|f| !f.is_empty()) {
                Some(field) => {
                    let delimiter = category.delimiter.as_deref().unwrap_or(" ");
                    let current = params
                        .iter()
                        .find(|(k, _)| k == field)
                        .map(|(_, v)| v.clone())
                        .unwrap_or_default();
                    let value = if current.is_empty() {
                        code
                    } else {
                        format!("{}{}{}", current, delimiter, code)
                    };
                    set_param(params, field, value);
                }
                None => set_param(params, &format!("cat{}", code), "1".to_string()),
            }
        }
    }

    fn search_request(&self, keyword: &SearchKeyword) -> SearchRequest {
        let selected = self.select_path();
        let path = selected.map(|p| p.path.as_str()).unwrap_or_default();
        let method = selected.map(SearchPath::http_method).unwrap_or_default();
        let (word, mode) = keyword.join(self.site.batch_config());
        let page = i64::from(self.page);

        let mut extras = self
            .site
            .search
            .as_ref()
            .map(|s| s.params.clone())
            .unwrap_or_default();

        if extras.is_empty() {
            let url = format!("{}{}", self.site.url, fill_template(path, &quote(&word), page));
            return SearchRequest {
                url,
                method,
                form: Vec::new(),
            };
        }

        // an id search on a title keyword would find nothing
        if extras.get("search_area").is_some_and(truthy) && !keyword.is_imdb_id() {
            extras.shift_remove("search_area");
        }

        if method == HttpMethod::Post {
            let body = extras.get("search").map(param_text).unwrap_or_default().replace("{keyword}", &word);
            let mut form: Vec<(String, String)> = form_urlencoded::parse(body.as_bytes()).into_owned().collect();
            self.inject_categories(&mut form);
            let url = format!("{}{}", self.site.url, fill_template(path, &quote(&word), page));
            return SearchRequest { url, method, form };
        }

        let mut params = vec![
            ("search_mode".to_string(), mode.to_string()),
            ("search_area".to_string(), "0".to_string()),
            ("page".to_string(), page.to_string()),
            ("notnewword".to_string(), "1".to_string()),
        ];
        for (key, value) in &extras {
            set_param(&mut params, key, param_text(value).replace("{keyword}", &word));
        }
        self.inject_categories(&mut params);

        let query = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(params.iter())
            .finish();
        SearchRequest {
            url: format!("{}{}?{}", self.site.url, path, query),
            method,
            form: Vec::new(),
        }
    }

    fn browse_request(&self) -> SearchRequest {
        let mut page = i64::from(self.page);
        let (path, method) = match &self.site.browse {
            Some(browse) => {
                if let Some(start) = browse.start {
                    page += start;
                }
                (browse.path.clone(), HttpMethod::from_config(browse.method.as_deref()))
            }
            None => {
                let selected = self.select_path();
                let mut path = selected.map(|p| p.path.clone()).unwrap_or_default();
                if self.page > 0 {
                    path = format!("{}?page={}", path, self.page);
                }
                (path, HttpMethod::Get)
            }
        };
        SearchRequest {
            url: format!("{}{}", self.site.url, fill_template(&path, "", page)),
            method,
            form: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn site(json: Value) -> SiteConfiguration {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_batch_join() {
        let batch = BatchConfig {
            delimiter: Some(" ".to_string()),
            space_replace: Some("_".to_string()),
        };
        let keyword = SearchKeyword::Batch(vec!["Foo Bar".to_string(), "Baz".to_string()]);
        assert_eq!(keyword.join(Some(&batch)), ("Foo_Bar Baz".to_string(), "1"));
        assert_eq!(keyword.join(None), ("Foo Bar Baz".to_string(), "1"));
        assert_eq!(SearchKeyword::from("Foo").join(Some(&batch)), ("Foo".to_string(), "0"));
    }

    #[test]
    fn test_admits_title() {
        assert!(SearchKeyword::from("The Show S01").admits_title("The Show"));
        assert!(!SearchKeyword::from("The Show").admits_title("Other"));
        let batch = SearchKeyword::Batch(vec!["A".to_string(), "B".to_string()]);
        assert!(batch.admits_title("B"));
        assert!(!batch.admits_title("AB"));
    }

    #[test]
    fn test_template_path_quotes_keyword() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {"paths": [{"path": "search/{keyword}/{page}"}]}
        }));
        let keyword = SearchKeyword::from("Foo Bar");
        let request = SearchRequestBuilder::new(&site).keyword(Some(&keyword)).page(2).build();
        assert_eq!(request.url, "https://example.org/search/Foo%20Bar/2");
        assert_eq!(request.method, HttpMethod::Get);
    }

    #[test]
    fn test_slash_in_keyword_stays_readable() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {"paths": [{"path": "torrents.php?search={keyword}"}]}
        }));
        let keyword = SearchKeyword::from("AC/DC & Co");
        let request = SearchRequestBuilder::new(&site).keyword(Some(&keyword)).build();
        assert_eq!(request.url, "https://example.org/torrents.php?search=AC/DC%20%26%20Co");
    }

    #[test]
    fn test_params_and_search_area() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {
                "paths": [{"path": "torrents.php"}],
                "params": {"search": "{keyword}", "search_area": 4}
            },
            "category": {"movie": [{"id": 401}], "tv": [{"id": 402}]}
        }));
        let keyword = SearchKeyword::from("Foo");
        let request = SearchRequestBuilder::new(&site)
            .keyword(Some(&keyword))
            .media_type(Some(MediaType::Tv))
            .build();
        assert_eq!(
            request.url,
            "https://example.org/torrents.php?search_mode=0&search_area=0&page=0&notnewword=1&search=Foo&cat402=1"
        );

        let imdb = SearchKeyword::from("tt0111161");
        let request = SearchRequestBuilder::new(&site).keyword(Some(&imdb)).build();
        assert!(request.url.contains("search_area=4"));
        assert!(request.url.contains("cat401=1&cat402=1"));
    }

    #[test]
    fn test_category_field_accumulates() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {"paths": [{"path": "t"}], "params": {"q": "{keyword}"}},
            "category": {"field": "cats", "delimiter": ",", "movie": [{"id": "1"}, {"id": "2"}]}
        }));
        let keyword = SearchKeyword::from("Foo");
        let request = SearchRequestBuilder::new(&site)
            .keyword(Some(&keyword))
            .media_type(Some(MediaType::Movie))
            .build();
        assert!(request.url.ends_with("q=Foo&cats=1%2C2"));

        let request = SearchRequestBuilder::new(&site)
            .keyword(Some(&keyword))
            .category(Some("9"))
            .build();
        assert!(request.url.ends_with("q=Foo&cats=9"));
    }

    #[test]
    fn test_path_selection_by_type() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {"paths": [
                {"path": "movies?q={keyword}", "type": "movie"},
                {"path": "tv?q={keyword}", "type": "tv"},
                {"path": "all?q={keyword}", "type": "all"}
            ]}
        }));
        let keyword = SearchKeyword::from("x");
        let url = |mtype| {
            SearchRequestBuilder::new(&site)
                .keyword(Some(&keyword))
                .media_type(mtype)
                .build()
                .url
        };
        assert_eq!(url(Some(MediaType::Tv)), "https://example.org/tv?q=x");
        assert_eq!(url(Some(MediaType::Movie)), "https://example.org/movies?q=x");
        assert_eq!(url(None), "https://example.org/all?q=x");
        assert_eq!(url(Some(MediaType::Anime)), "https://example.org/all?q=x");
    }

    #[test]
    fn test_post_search_form() {
        let site = site(json!({
            "url": "https://example.org/",
            "search": {
                "paths": [{"path": "search.php", "method": "HTTP_POST"}],
                "params": {"search": "keyword={keyword}&mode=all"}
            }
        }));
        let keyword = SearchKeyword::from("Foo Bar");
        let request = SearchRequestBuilder::new(&site).keyword(Some(&keyword)).build();
        assert_eq!(request.method, HttpMethod::Post);
        assert_eq!(request.url, "https://example.org/search.php");
        assert_eq!(
            request.form,
            vec![
                ("keyword".to_string(), "Foo Bar".to_string()),
                ("mode".to_string(), "all".to_string())
            ]
        );
    }

    #[test]
    fn test_browse_pagination() {
        let with_browse = site(json!({
            "url": "https://example.org/",
            "browse": {"path": "torrents.php?page={page}", "start": 1}
        }));
        let request = SearchRequestBuilder::new(&with_browse).page(2).build();
        assert_eq!(request.url, "https://example.org/torrents.php?page=3");

        let search_only = site(json!({
            "url": "https://example.org/",
            "search": {"paths": [{"path": "torrents.php"}]}
        }));
        assert_eq!(
            SearchRequestBuilder::new(&search_only).page(4).build().url,
            "https://example.org/torrents.php?page=4"
        );
        assert_eq!(
            SearchRequestBuilder::new(&search_only).build().url,
            "https://example.org/torrents.php"
        );
    }
}
