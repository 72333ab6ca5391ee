//! Filter pipeline applied to extracted values
//!
//! Site configurations describe filters as `{"name": ..., "args": ...}`.
//! They are decoded once into [`FilterStep`] variants so bad patterns and
//! unknown names surface when the configuration is loaded.

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use super::{IndexerError, Result};

/// Output format of `dateparse`
const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One post-processing step
#[derive(Debug, Clone)]
pub enum FilterStep {
    /// Regex search, keeping capture `group` (negative counts from the end)
    ReSearch { pattern: Regex, group: i64 },
    /// Split on a literal separator and keep segment `index`
    Split { separator: String, index: i64 },
    /// Replace every occurrence of `old`
    Replace { old: String, new: String },
    /// Parse as a timestamp with a strftime-style format
    DateParse { format: String },
    /// Trim the given characters, or whitespace
    Strip { chars: Option<String> },
    /// Prepend a literal
    AppendLeft { prefix: String },
    /// First value of a query parameter, empty when absent
    QueryString { param: String },
    /// Marker resolved later by a detail-page fetch
    DetailParse { args: Value },
    /// Callback descriptor for the `/crawl/page` endpoint
    CrawlPage { args: Value },
}

/// Settings the pipeline needs from outside the site configuration
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    /// Public base URL of this service
    pub app_domain: &'a str,
}

impl Default for FilterContext<'_> {
    fn default() -> Self {
        Self {
            app_domain: "http://127.0.0.1:3000",
        }
    }
}

/// Wire form of a filter step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFilter {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
}

fn invalid(name: &str, reason: impl Into<String>) -> IndexerError {
    IndexerError::InvalidFilter {
        name: name.to_string(),
        reason: reason.into(),
    }
}

fn string_arg(name: &str, value: Option<&Value>) -> Result<String> {
    match value {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(invalid(name, "expected a string argument")),
    }
}

fn int_arg(name: &str, value: Option<&Value>) -> Result<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64().ok_or_else(|| invalid(name, "expected an integer")),
        Some(Value::String(s)) => s.parse().map_err(|_| invalid(name, "expected an integer")),
        _ => Err(invalid(name, "expected an integer")),
    }
}

fn pair_args<'a>(name: &str, args: &'a Option<Value>) -> Result<&'a Vec<Value>> {
    match args {
        Some(Value::Array(items)) if items.len() >= 2 => Ok(items),
        _ => Err(invalid(name, "expected [value, value] arguments")),
    }
}

impl TryFrom<RawFilter> for FilterStep {
    type Error = IndexerError;

    fn try_from(raw: RawFilter) -> Result<Self> {
        let name = raw.name.as_str();
        let step = match name {
            "re_search" => {
                let items = pair_args(name, &raw.args)?;
                let source = string_arg(name, items.first())?;
                let pattern = Regex::new(&source).map_err(|e| invalid(name, e.to_string()))?;
                let group = int_arg(name, items.last())?;
                FilterStep::ReSearch { pattern, group }
            }
            "split" => {
                let items = pair_args(name, &raw.args)?;
                let separator = string_arg(name, items.first())?;
                if separator.is_empty() {
                    return Err(invalid(name, "empty separator"));
                }
                let index = int_arg(name, items.last())?;
                FilterStep::Split { separator, index }
            }
            "replace" => {
                let items = pair_args(name, &raw.args)?;
                if items.len() != 2 {
                    return Err(invalid(name, "expected exactly [old, new]"));
                }
                FilterStep::Replace {
                    old: string_arg(name, items.first())?,
                    new: string_arg(name, items.last())?,
                }
            }
            "dateparse" => FilterStep::DateParse {
                format: string_arg(name, raw.args.as_ref())?,
            },
            "strip" => FilterStep::Strip {
                chars: match &raw.args {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    _ => None,
                },
            },
            "appendleft" => FilterStep::AppendLeft {
                prefix: string_arg(name, raw.args.as_ref())?,
            },
            "querystring" => FilterStep::QueryString {
                param: string_arg(name, raw.args.as_ref())?,
            },
            "detailparse" => FilterStep::DetailParse {
                args: raw.args.unwrap_or(Value::Null),
            },
            "crawl_page" => FilterStep::CrawlPage {
                args: raw.args.unwrap_or(Value::Null),
            },
            other => return Err(invalid(other, "unknown filter")),
        };
        Ok(step)
    }
}

impl From<FilterStep> for RawFilter {
    fn from(step: FilterStep) -> Self {
        let (name, args) = match step {
            FilterStep::ReSearch { pattern, group } => ("re_search", json!([pattern.as_str(), group])),
            FilterStep::Split { separator, index } => ("split", json!([separator, index])),
            FilterStep::Replace { old, new } => ("replace", json!([old, new])),
            FilterStep::DateParse { format } => ("dateparse", json!(format)),
            FilterStep::Strip { chars } => ("strip", json!(chars)),
            FilterStep::AppendLeft { prefix } => ("appendleft", json!(prefix)),
            FilterStep::QueryString { param } => ("querystring", json!(param)),
            FilterStep::DetailParse { args } => ("detailparse", args),
            FilterStep::CrawlPage { args } => ("crawl_page", args),
        };
        RawFilter {
            name: name.to_string(),
            args: if args.is_null() { None } else { Some(args) },
        }
    }
}

impl Serialize for FilterStep {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        RawFilter::from(self.clone()).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FilterStep {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = RawFilter::deserialize(deserializer)?;
        FilterStep::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl PartialEq for FilterStep {
    fn eq(&self, other: &Self) -> bool {
        RawFilter::from(self.clone()) == RawFilter::from(other.clone())
    }
}

/// Resolve a possibly negative position against `len`
fn position(index: i64, len: usize) -> Option<usize> {
    let len = len as i64;
    let resolved = if index < 0 { len + index } else { index };
    (0..len).contains(&resolved).then_some(resolved as usize)
}

impl FilterStep {
    pub fn name(&self) -> &'static str {
        match self {
            FilterStep::ReSearch { .. } => "re_search",
            FilterStep::Split { .. } => "split",
            FilterStep::Replace { .. } => "replace",
            FilterStep::DateParse { .. } => "dateparse",
            FilterStep::Strip { .. } => "strip",
            FilterStep::AppendLeft { .. } => "appendleft",
            FilterStep::QueryString { .. } => "querystring",
            FilterStep::DetailParse { .. } => "detailparse",
            FilterStep::CrawlPage { .. } => "crawl_page",
        }
    }

    fn failed(&self, reason: impl Into<String>) -> IndexerError {
        IndexerError::FilterFailed {
            name: self.name().to_string(),
            reason: reason.into(),
        }
    }

    /// Apply this step to `text`
    pub fn apply(&self, text: &str, ctx: &FilterContext<'_>) -> Result<String> {
        match self {
            FilterStep::ReSearch { pattern, group } => {
                let Some(captures) = pattern.captures(text) else {
                    return Ok(text.to_string());
                };
                let index = position(*group, captures.len())
                    .ok_or_else(|| self.failed(format!("no such group {}", group)))?;
                Ok(captures
                    .get(index)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default())
            }
            FilterStep::Split { separator, index } => {
                let parts: Vec<&str> = text.split(separator.as_str()).collect();
                let at = position(*index, parts.len())
                    .ok_or_else(|| self.failed(format!("index {} out of range", index)))?;
                Ok(parts[at].to_string())
            }
            FilterStep::Replace { old, new } => Ok(text.replace(old.as_str(), new)),
            FilterStep::DateParse { format } => {
                let value = text.replace('\n', " ");
                let value = value.trim();
                let parsed = NaiveDateTime::parse_from_str(value, format).or_else(|_| {
                    NaiveDate::parse_from_str(value, format)
                        .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
                });
                parsed
                    .map(|dt| dt.format(DATE_FORMAT).to_string())
                    .map_err(|_| IndexerError::DateParse {
                        value: value.to_string(),
                        format: format.clone(),
                    })
            }
            FilterStep::Strip { chars } => Ok(match chars {
                Some(chars) => text.trim_matches(|c: char| chars.contains(c)).to_string(),
                None => text.trim().to_string(),
            }),
            FilterStep::AppendLeft { prefix } => Ok(format!("{}{}", prefix, text)),
            FilterStep::QueryString { param } => Ok(query_param(text, param).unwrap_or_default()),
            FilterStep::DetailParse { args } => Ok(format!("@:【{}】【{}】", args, text)),
            FilterStep::CrawlPage { args } => {
                let descriptor = json!({
                    "method": "get",
                    "params": format!("url={}&query={}", text, args),
                });
                let encoded = base64::engine::general_purpose::STANDARD.encode(descriptor.to_string());
                Ok(format!(
                    "[{}]{}/crawl/page",
                    encoded,
                    ctx.app_domain.trim_end_matches('/')
                ))
            }
        }
    }
}

/// First non-empty value of `param` in the query string of `url`
fn query_param(url: &str, param: &str) -> Option<String> {
    let (_, query) = url.split_once('?')?;
    let query = query.split('#').next().unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, value)| key == param && !value.is_empty())
        .map(|(_, value)| value.into_owned())
}

/// Run `filters` over `text` in order
///
/// A failing step is logged and skipped, except `dateparse` whose failure
/// aborts the pipeline. The result is trimmed.
pub fn apply_filters(text: &str, filters: &[FilterStep], ctx: &FilterContext<'_>) -> Result<String> {
    let mut value = text.to_string();
    for step in filters {
        if value.is_empty() {
            break;
        }
        match step.apply(&value, ctx) {
            Ok(next) => value = next,
            Err(err @ IndexerError::DateParse { .. }) => return Err(err),
            Err(err) => debug!("Filter {} skipped: {}", step.name(), err),
        }
    }
    Ok(value.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steps(json: &str) -> Vec<FilterStep> {
        serde_json::from_str(json).unwrap()
    }

    fn run(text: &str, json: &str) -> Result<String> {
        apply_filters(text, &steps(json), &FilterContext::default())
    }

    #[test]
    fn test_re_search_groups() {
        assert_eq!(run("id=123&x", r#"[{"name": "re_search", "args": ["id=(\\d+)", 1]}]"#).unwrap(), "123");
        assert_eq!(run("a-b", r#"[{"name": "re_search", "args": ["(a)-(b)", -1]}]"#).unwrap(), "b");
        // no match leaves the value alone
        assert_eq!(run("plain", r#"[{"name": "re_search", "args": ["(\\d+)", 1]}]"#).unwrap(), "plain");
    }

    #[test]
    fn test_split_and_replace() {
        assert_eq!(run("12 / 34", r#"[{"name": "split", "args": ["/", 0]}]"#).unwrap(), "12");
        assert_eq!(run("a.b.c", r#"[{"name": "replace", "args": [".", " "]}]"#).unwrap(), "a b c");
    }

    #[test]
    fn test_failing_step_is_skipped() {
        let out = run(
            "a/b",
            r#"[{"name": "split", "args": ["/", 9]}, {"name": "appendleft", "args": "x"}]"#,
        )
        .unwrap();
        assert_eq!(out, "xa/b");
    }

    #[test]
    fn test_dateparse_failure_propagates() {
        let ok = run("2024-01-02\n10:20:30", r#"[{"name": "dateparse", "args": "%Y-%m-%d %H:%M:%S"}]"#);
        assert_eq!(ok.unwrap(), "2024-01-02 10:20:30");

        let err = run("yesterday", r#"[{"name": "dateparse", "args": "%Y-%m-%d"}]"#);
        assert!(matches!(err, Err(IndexerError::DateParse { .. })));
    }

    #[test]
    fn test_querystring_and_strip() {
        assert_eq!(
            run("download.php?id=42&passkey=x", r#"[{"name": "querystring", "args": "id"}]"#).unwrap(),
            "42"
        );
        assert_eq!(run("details.php", r#"[{"name": "querystring", "args": "id"}]"#).unwrap(), "");
        assert_eq!(run("[tag]", r#"[{"name": "strip", "args": "[]"}]"#).unwrap(), "tag");
    }

    #[test]
    fn test_markers() {
        let detail = run("details.php?id=1", r#"[{"name": "detailparse", "args": {"selector": "a"}}]"#).unwrap();
        assert_eq!(detail, r#"@:【{"selector":"a"}】【details.php?id=1】"#);

        let crawl = run("https://x.org/d?id=1", r#"[{"name": "crawl_page", "args": {"selector": "a"}}]"#).unwrap();
        assert!(crawl.starts_with('['));
        assert!(crawl.ends_with("]http://127.0.0.1:3000/crawl/page"));
    }

    #[test]
    fn test_decode_rejects_bad_filters() {
        let bad_replace: std::result::Result<Vec<FilterStep>, _> =
            serde_json::from_str(r#"[{"name": "replace", "args": ["a", "b", "c"]}]"#);
        assert!(bad_replace.is_err());

        let unknown: std::result::Result<Vec<FilterStep>, _> = serde_json::from_str(r#"[{"name": "nope"}]"#);
        assert!(unknown.is_err());

        let bad_regex: std::result::Result<Vec<FilterStep>, _> =
            serde_json::from_str(r#"[{"name": "re_search", "args": ["(", 1]}]"#);
        assert!(bad_regex.is_err());
    }
}
