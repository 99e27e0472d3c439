//! Lightweight HTML inspection over a response body
//!
//! Only what the suites need: title, text content, meta tags, forms and the
//! sub-resources a browser would request while loading the page.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use url::Url;

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title\s*>").expect("valid regex"));
static BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<body\b[^>]*>(.*?)(?:</body\s*>|\z)").expect("valid regex"));
static COMMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ELEMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<([a-z][a-z0-9-]*)\b([^>]*)>").expect("valid regex"));
static FORM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<form\b([^>]*)>(.*?)(?:</form\s*>|\z)").expect("valid regex")
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([^\s"'>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("valid regex")
});
static ENTITY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]+|#[xX][0-9a-fA-F]+|[a-zA-Z]+);").expect("valid regex"));

/// An element start tag with its attributes (names lower-cased)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attributes: BTreeMap<String, String>,
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Attribute is present (possibly with an empty value)
    pub fn has_attr(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }
}

/// A `<form>` and the inputs nested in it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub attributes: BTreeMap<String, String>,
    pub inputs: Vec<Element>,
}

impl Form {
    /// First input with the given `name` attribute
    pub fn input(&self, name: &str) -> Option<&Element> {
        self.inputs.iter().find(|i| i.attr("name") == Some(name))
    }
}

/// Parsed view of a page
#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    elements: Vec<Element>,
}

impl Document {
    pub fn parse(source: &str) -> Self {
        let without_comments = COMMENT_RE.replace_all(source, "");
        let elements = ELEMENT_RE
            .captures_iter(&without_comments)
            .map(|c| Element {
                name: c[1].to_ascii_lowercase(),
                attributes: parse_attributes(&c[2]),
            })
            .collect();
        Self {
            source: without_comments.into_owned(),
            elements,
        }
    }

    /// Text of `<title>`, whitespace-collapsed
    pub fn title(&self) -> Option<String> {
        TITLE_RE
            .captures(&self.source)
            .map(|c| collapse_whitespace(&decode_entities(&c[1])))
    }

    /// Text content of `<body>`; the whole document when there is no body tag
    pub fn body_text(&self) -> String {
        let body = BODY_RE
            .captures(&self.source)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&self.source);
        decode_entities(&TAG_RE.replace_all(body, ""))
    }

    /// Whether the document has a `<body>` element
    pub fn has_body(&self) -> bool {
        self.elements.iter().any(|e| e.name == "body")
    }

    /// All start tags with the given element name
    pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.elements.iter().filter(move |e| e.name == name)
    }

    /// `content` of the first `<meta name=...>` with this name
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        self.elements("meta")
            .find(|e| e.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .and_then(|e| e.attr("content"))
    }

    /// Whether a `<meta name=...>` with this name exists at all
    pub fn has_meta(&self, name: &str) -> bool {
        self.elements("meta")
            .any(|e| e.attr("name").is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }

    /// Forms in document order
    pub fn forms(&self) -> Vec<Form> {
        FORM_RE
            .captures_iter(&self.source)
            .map(|c| Form {
                attributes: parse_attributes(&c[1]),
                inputs: ELEMENT_RE
                    .captures_iter(&c[2])
                    .filter(|i| i[1].eq_ignore_ascii_case("input"))
                    .map(|i| Element {
                        name: "input".to_string(),
                        attributes: parse_attributes(&i[2]),
                    })
                    .collect(),
            })
            .collect()
    }

    /// Sub-resources a browser fetches while loading the page, resolved
    /// against `base` and deduplicated in document order
    pub fn subresources(&self, base: &Url) -> Vec<Url> {
        let mut urls: Vec<Url> = Vec::new();
        for element in &self.elements {
            let reference = match element.name.as_str() {
                "link" if element.attr("rel").is_some_and(is_fetched_rel) => element.attr("href"),
                "script" | "img" | "source" | "iframe" => element.attr("src"),
                _ => None,
            };
            let Some(reference) = reference.map(str::trim).filter(|r| !r.is_empty()) else {
                continue;
            };
            if reference.starts_with("data:") || reference.starts_with('#') {
                continue;
            }
            if let Ok(url) = base.join(&decode_entities(reference)) {
                if matches!(url.scheme(), "http" | "https") && !urls.contains(&url) {
                    urls.push(url);
                }
            }
        }
        urls
    }
}

/// `rel` tokens whose target the browser loads with the page
const FETCHED_RELS: [&str; 5] = ["stylesheet", "preload", "modulepreload", "icon", "apple-touch-icon"];

fn is_fetched_rel(rel: &str) -> bool {
    rel.split_ascii_whitespace()
        .any(|token| FETCHED_RELS.iter().any(|r| token.eq_ignore_ascii_case(r)))
}

fn parse_attributes(raw: &str) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();
    for c in ATTR_RE.captures_iter(raw) {
        let name = c[1].to_ascii_lowercase();
        let value = c
            .get(2)
            .or_else(|| c.get(3))
            .or_else(|| c.get(4))
            .map(|m| decode_entities(m.as_str()))
            .unwrap_or_default();
        // first occurrence wins, as in browsers
        attributes.entry(name).or_insert(value);
    }
    attributes
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Decode the character references that show up in practice
pub fn decode_entities(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |c: &regex::Captures<'_>| {
            let entity = &c[1];
            let decoded = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok().and_then(char::from_u32)
            } else if let Some(dec) = entity.strip_prefix('#') {
                dec.parse::<u32>().ok().and_then(char::from_u32)
            } else {
                match entity {
                    "amp" => Some('&'),
                    "lt" => Some('<'),
                    "gt" => Some('>'),
                    "quot" => Some('"'),
                    "apos" => Some('\''),
                    "nbsp" => Some('\u{a0}'),
                    "copy" => Some('©'),
                    _ => None,
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| c[0].to_string())
        })
        .into_owned()
}
