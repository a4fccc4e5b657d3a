//! Visible-text extraction from rendered HTML.
//!
//! All functions here are synchronous and keep the parsed [`Html`] on the
//! stack: `scraper::Html` is not `Send`, so async callers must finish with
//! the document before their next `.await`.

use std::collections::HashSet;

use scraper::{ElementRef, Html, Node, Selector};
use url::Url;

use crate::urls::is_fetchable;

/// Subtrees never considered visible content.
pub const SKIP_TAGS: &[&str] = &[
    "script", "style", "nav", "footer", "header", "noscript", "svg", "iframe", "template",
];

/// Elements checked for query keywords by [`has_relevant_region`].
const REGION_SELECTOR: &str = "p, h1, h2, h3, article, section";

/// Images at or below this size in both dimensions are treated as chrome.
pub const MIN_IMAGE_DIMENSION: u32 = 150;

/// Everything learned from one parse of a rendered page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageAnalysis {
    /// Cleaned, whitespace-collapsed visible text (not truncated).
    pub text: String,
    /// Whether a content region mentions one of the query keywords.
    pub relevant: bool,
    /// Absolute URLs of content-sized images, in document order.
    pub images: Vec<String>,
}

/// Parse `html` once and extract text, relevance and image candidates.
pub fn analyze_page(html: &str, query: &str, base_url: &str, max_images: usize) -> PageAnalysis {
    let doc = Html::parse_document(html);
    let keywords = query_keywords(query);
    PageAnalysis {
        text: visible_text(&doc),
        relevant: region_matches(&doc, &keywords),
        images: if max_images == 0 {
            Vec::new()
        } else {
            images_in(&doc, base_url, max_images)
        },
    }
}

/// Lower-cased query words longer than three characters.
pub fn query_keywords(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(|w| w.to_lowercase())
        .collect()
}

/// Visible text of `html` with noisy subtrees removed and whitespace collapsed.
pub fn clean_text(html: &str) -> String {
    visible_text(&Html::parse_document(html))
}

/// Whether any paragraph, heading, article or section mentions a keyword.
///
/// An empty keyword list counts as relevant.
pub fn has_relevant_region(html: &str, keywords: &[String]) -> bool {
    region_matches(&Html::parse_document(html), keywords)
}

/// Absolute URLs of up to `max` content-sized `<img>` elements.
pub fn image_sources(html: &str, base_url: &str, max: usize) -> Vec<String> {
    images_in(&Html::parse_document(html), base_url, max)
}

/// First `max` characters of `text`.
pub fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

fn visible_text(doc: &Html) -> String {
    let mut buf = String::new();
    collect_text(doc.root_element(), &mut buf);
    collapse_whitespace(&buf)
}

fn collect_text(el: ElementRef<'_>, buf: &mut String) {
    for child in el.children() {
        match child.value() {
            Node::Text(text) => {
                buf.push_str(text);
                buf.push(' ');
            }
            Node::Element(e) => {
                if SKIP_TAGS.contains(&e.name()) {
                    continue;
                }
                if let Some(child_ref) = ElementRef::wrap(child) {
                    collect_text(child_ref, buf);
                }
            }
            _ => {}
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn region_matches(doc: &Html, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return true;
    }
    let Ok(selector) = Selector::parse(REGION_SELECTOR) else {
        return false;
    };
    doc.select(&selector).any(|el| {
        let mut buf = String::new();
        collect_text(el, &mut buf);
        let text = buf.to_lowercase();
        keywords.iter().any(|k| text.contains(k.as_str()))
    })
}

fn images_in(doc: &Html, base_url: &str, max: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse("img[src]") else {
        return Vec::new();
    };
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for img in doc.select(&selector) {
        if out.len() >= max {
            break;
        }
        let attrs = img.value();
        if is_small(attrs.attr("width"), attrs.attr("height")) {
            continue;
        }
        let Some(src) = attrs.attr("src").map(str::trim) else {
            continue;
        };
        if src.starts_with("data:") {
            continue;
        }
        let resolved = match &base {
            Some(b) => match b.join(src) {
                Ok(u) => u.to_string(),
                Err(_) => continue,
            },
            None => src.to_string(),
        };
        if is_fetchable(&resolved) && seen.insert(resolved.clone()) {
            out.push(resolved);
        }
    }
    out
}

/// Declared dimensions at or below the threshold. Undeclared sizes pass.
fn is_small(width: Option<&str>, height: Option<&str>) -> bool {
    let parse = |v: Option<&str>| v.and_then(|s| s.trim().trim_end_matches("px").parse::<u32>().ok());
    match (parse(width), parse(height)) {
        (Some(w), Some(h)) => w <= MIN_IMAGE_DIMENSION || h <= MIN_IMAGE_DIMENSION,
        (Some(d), None) | (None, Some(d)) => d <= MIN_IMAGE_DIMENSION,
        (None, None) => false,
    }
}
