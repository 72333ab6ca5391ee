//! Selector specs and the text extraction primitives
//!
//! Extraction happens in two stages: every node matched by the selector
//! yields a string (attribute value or normalized text), then `contents` /
//! `index` reduce the list to a single value.

use scraper::node::Node;
use scraper::{ElementRef, Selector};
use serde::{Deserialize, Deserializer, Serialize};

use super::filter::FilterStep;
use super::{IndexerError, Result};

/// A CSS selector compiled once when the configuration is decoded
#[derive(Clone)]
pub struct CssSelector {
    source: String,
    selector: Selector,
}

impl CssSelector {
    pub fn parse(source: &str) -> Result<Self> {
        let selector = Selector::parse(source)
            .map_err(|_| IndexerError::InvalidSelector(source.to_string()))?;
        Ok(Self {
            source: source.to_string(),
            selector,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn selector(&self) -> &Selector {
        &self.selector
    }

    /// Matches of this selector under `node`, the node itself included
    pub fn select_within<'a>(&self, node: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let mut matched = Vec::new();
        if self.selector.matches(&node) {
            matched.push(node);
        }
        matched.extend(node.select(&self.selector).filter(|el| el.id() != node.id()));
        matched
    }

    /// Whether anything under `node` (or the node itself) matches
    pub fn matches_within(&self, node: ElementRef<'_>) -> bool {
        self.selector.matches(&node) || node.select(&self.selector).next().is_some()
    }
}

impl std::fmt::Debug for CssSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CssSelector").field(&self.source).finish()
    }
}

impl PartialEq for CssSelector {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl TryFrom<String> for CssSelector {
    type Error = IndexerError;

    fn try_from(value: String) -> Result<Self> {
        CssSelector::parse(&value)
    }
}

impl From<CssSelector> for String {
    fn from(value: CssSelector) -> Self {
        value.source
    }
}

impl Serialize for CssSelector {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for CssSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        CssSelector::parse(&source).map_err(serde::de::Error::custom)
    }
}

/// Blank selector strings mean "no selector"
pub(crate) fn optional_selector<'de, D>(deserializer: D) -> std::result::Result<Option<CssSelector>, D::Error>
where
    D: Deserializer<'de>,
{
    let source: Option<String> = Option::deserialize(deserializer)?;
    match source {
        Some(s) if !s.trim().is_empty() => CssSelector::parse(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

/// The unit of extraction for one field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorSpec {
    #[serde(
        default,
        alias = "selectors",
        deserialize_with = "optional_selector",
        skip_serializing_if = "Option::is_none"
    )]
    pub selector: Option<CssSelector>,

    /// Descendants to leave out of the extracted text (comma separated)
    #[serde(default, deserialize_with = "optional_selector", skip_serializing_if = "Option::is_none")]
    pub remove: Option<CssSelector>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<usize>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<FilterStep>,

    /// Applied to the download link after it was made absolute
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sp_filters: Vec<FilterStep>,

    /// Template composing the value from sibling sub-fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl SelectorSpec {
    pub fn new(selector: &str) -> Result<Self> {
        Ok(Self {
            selector: Some(CssSelector::parse(selector)?),
            ..Self::default()
        })
    }

    /// Nodes matched by this spec under `node`
    pub fn select<'a>(&self, node: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        match &self.selector {
            Some(selector) => selector.select_within(node),
            None => Vec::new(),
        }
    }

    /// Attribute value or text of every matched node, in document order
    pub fn attribute_or_text(&self, nodes: &[ElementRef<'_>]) -> Vec<String> {
        let remove = self.remove.as_ref().map(CssSelector::selector);
        nodes
            .iter()
            .map(|node| match &self.attribute {
                Some(attr) => node.value().attr(attr).unwrap_or_default().to_string(),
                None => node_text(*node, remove),
            })
            .collect()
    }

    /// Reduce the extracted list to one value
    ///
    /// `contents` re-splits the first item on newlines; `index` picks an item.
    /// Both are skipped when there are not enough items, leaving the first one.
    pub fn reduce(&self, items: Vec<String>) -> Option<String> {
        if items.is_empty() {
            return None;
        }
        let len = items.len() as i64;

        if let Some(contents) = self.contents.filter(|c| len > *c as i64) {
            return items[0].split('\n').nth(contents).map(str::to_string);
        }
        if let Some(index) = self.index.filter(|i| len > *i) {
            let position = if index < 0 { len + index } else { index };
            if position < 0 {
                return None;
            }
            return items.into_iter().nth(position as usize);
        }

        items.into_iter().next()
    }

    /// Select, extract and reduce in one go
    pub fn extract(&self, node: ElementRef<'_>) -> Option<String> {
        let nodes = self.select(node);
        self.reduce(self.attribute_or_text(&nodes))
    }

    /// Select and extract without reducing
    pub fn extract_all(&self, node: ElementRef<'_>) -> Vec<String> {
        let nodes = self.select(node);
        self.attribute_or_text(&nodes)
    }
}

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "dd", "div", "dl", "dt", "fieldset",
    "figcaption", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header",
    "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
];

/// Text of `node` with whitespace squashed, one line per block element
///
/// Descendants matching `remove` are skipped entirely.
pub fn node_text(node: ElementRef<'_>, remove: Option<&Selector>) -> String {
    let mut raw = String::new();
    collect_text(node, remove, &mut raw);

    raw.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn collect_text(node: ElementRef<'_>, remove: Option<&Selector>, out: &mut String) {
    for child in node.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => {
                let Some(child_ref) = ElementRef::wrap(child) else {
                    continue;
                };
                if remove.is_some_and(|r| r.matches(&child_ref)) {
                    continue;
                }
                let name = element.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                collect_text(child_ref, remove, out);
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn spec(json: &str) -> SelectorSpec {
        serde_json::from_str(json).unwrap()
    }

    fn first<'a>(doc: &'a Html, css: &str) -> ElementRef<'a> {
        doc.select(&Selector::parse(css).unwrap()).next().unwrap()
    }

    #[test]
    fn test_text_extraction_skips_removed_nodes() {
        let doc = Html::parse_fragment(
            r#"<div class="row"><a class="t">Show.S01E01 <span class="tag">Free</span></a></div>"#,
        );
        let row = first(&doc, "div.row");
        let s = spec(r#"{"selector": "a.t", "remove": "span.tag"}"#);
        assert_eq!(s.extract(row), Some("Show.S01E01".to_string()));

        // the source tree is untouched
        let plain = spec(r#"{"selector": "a.t"}"#);
        assert_eq!(plain.extract(row), Some("Show.S01E01 Free".to_string()));
    }

    #[test]
    fn test_attribute_extraction() {
        let doc = Html::parse_fragment(
            r#"<div class="row"><a href="/t/1">one</a><a href="/t/2">two</a></div>"#,
        );
        let row = first(&doc, "div.row");
        let s = spec(r#"{"selector": "a", "attribute": "href", "index": 1}"#);
        assert_eq!(s.extract(row), Some("/t/2".to_string()));
    }

    #[test]
    fn test_index_gate_falls_back_to_first() {
        let s = spec(r#"{"selector": "a", "index": 5}"#);
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(s.reduce(items), Some("a".to_string()));

        let s = spec(r#"{"selector": "a", "index": -1}"#);
        let items = vec!["a".to_string(), "b".to_string()];
        assert_eq!(s.reduce(items), Some("b".to_string()));
    }

    #[test]
    fn test_contents_splits_first_item() {
        let doc = Html::parse_fragment(r#"<div class="c">1.2 GB<br>2024-01-01</div>"#);
        let cell = first(&doc, "div.c");
        let s = spec(r#"{"selector": "div.c", "contents": 0}"#);
        // one item only, so `contents: 0` is allowed but `contents: 1` is gated
        assert_eq!(s.extract(cell), Some("1.2 GB".to_string()));
        let gated = spec(r#"{"selector": "div.c", "contents": 1}"#);
        assert_eq!(gated.extract(cell), Some("1.2 GB\n2024-01-01".to_string()));
    }

    #[test]
    fn test_empty_selection_yields_nothing() {
        let doc = Html::parse_fragment(r#"<div class="row"></div>"#);
        let row = first(&doc, "div.row");
        assert_eq!(spec(r#"{"selector": "span.none"}"#).extract(row), None);
        assert_eq!(spec(r#"{"selector": ""}"#).extract(row), None);
        assert!(SelectorSpec::default().extract_all(row).is_empty());
    }

    #[test]
    fn test_invalid_selector_rejected_at_decode() {
        let result: std::result::Result<SelectorSpec, _> = serde_json::from_str(r#"{"selector": "a[["}"#);
        assert!(result.is_err());
    }
}
