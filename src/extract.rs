use readability_js::{Readability, ReadabilityError, ReadabilityOptions};
use scraper::{Html, Selector};
use url::Url;

use crate::model::truncate_excerpt;

/// Result of a successful content extraction.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    pub title: String,
    /// Rich-text fragment (HTML).
    pub content: String,
    pub excerpt: String,
    pub site_name: String,
}

/// Seam for the content-extraction capability. `Ok(None)` means the page
/// had no usable content; the fetcher then tries [`fallback_extract`].
pub trait ContentExtractor: Send + Sync {
    fn extract(&self, markup: &str, origin: &Url) -> anyhow::Result<Option<ExtractedContent>>;
}

/// Mozilla Readability, with a relaxed-options retry when the initial
/// readability check rejects the page.
pub struct ReadabilityExtractor;

impl ContentExtractor for ReadabilityExtractor {
    fn extract(&self, markup: &str, origin: &Url) -> anyhow::Result<Option<ExtractedContent>> {
        let readability = Readability::new()
            .map_err(|err| anyhow::anyhow!("initialize readability-js: {err}"))?;

        let article = match readability.parse_with_url(markup, origin.as_str()) {
            Ok(article) => article,
            Err(ReadabilityError::ReadabilityCheckFailed) => {
                let options = ReadabilityOptions::new()
                    .char_threshold(0)
                    .nb_top_candidates(10)
                    .link_density_modifier(2.0);
                match readability.parse_with_options(markup, Some(origin.as_str()), Some(options)) {
                    Ok(article) => article,
                    Err(err) => {
                        tracing::debug!(url = %origin, ?err, "relaxed readability pass failed");
                        return Ok(None);
                    }
                }
            }
            Err(err) => {
                tracing::debug!(url = %origin, ?err, "readability extraction failed");
                return Ok(None);
            }
        };

        if article.content.trim().is_empty() {
            return Ok(None);
        }

        let mut title = article.title.trim().to_owned();
        if title.is_empty() {
            title = origin.to_string();
        }

        let excerpt = truncate_excerpt(&visible_text(&article.content));
        Ok(Some(ExtractedContent {
            title,
            content: article.content,
            excerpt,
            site_name: site_name_of(origin),
        }))
    }
}

/// Generic containers likely to hold the main content on templates
/// Readability gives up on. Ordered from most to least specific.
const FALLBACK_SELECTORS: &[&str] = &[
    "article", ".article", ".content", "#content", ".post", ".entry", ".text", "main", ".main",
    "#main", "body",
];

/// Minimum visible text for a fallback container to count as content.
const FALLBACK_MIN_TEXT_CHARS: usize = 100;

/// Last-resort extraction: first generic container with enough visible
/// text, raw markup as content.
pub fn fallback_extract(markup: &str, origin: &Url) -> Option<ExtractedContent> {
    let document = Html::parse_document(markup);
    let title = document_title(&document).unwrap_or_else(|| "Untitled".to_owned());

    for raw in FALLBACK_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        let Some(element) = document.select(&selector).next() else {
            continue;
        };

        let text = element.text().collect::<String>();
        let text = text.trim();
        if text.chars().count() <= FALLBACK_MIN_TEXT_CHARS {
            continue;
        }

        let content = element.inner_html();
        if content.trim().is_empty() {
            continue;
        }

        return Some(ExtractedContent {
            title,
            content,
            excerpt: truncate_excerpt(text),
            site_name: site_name_of(origin),
        });
    }

    None
}

/// Host of the source URL, used when the page supplies no site name.
pub fn site_name_of(url: &Url) -> String {
    url.host_str().unwrap_or("unknown").to_owned()
}

fn document_title(document: &Html) -> Option<String> {
    for raw in &["title", "h1"] {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        if let Some(element) = document.select(&selector).next() {
            let text = element.text().collect::<String>().trim().to_owned();
            if !text.is_empty() {
                return Some(text);
            }
        }
    }
    None
}

fn visible_text(fragment: &str) -> String {
    Html::parse_fragment(fragment)
        .root_element()
        .text()
        .collect::<String>()
}
