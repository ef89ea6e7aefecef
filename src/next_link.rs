use scraper::{ElementRef, Html, Selector};
use url::Url;

/// Localized "next" phrases, tried first because the primary targets are
/// Chinese serialized-fiction sites. Compared case-sensitively (no case
/// ambiguity in this set).
const PHRASES_ZH: &[&str] = &[
    "下一章",
    "下一页",
    "下章",
    "下页",
    "下一节",
    "继续阅读",
    "下一篇",
];

/// Generic English phrases, compared case-insensitively.
const PHRASES_EN: &[&str] = &["next chapter", "next page", "next"];

/// Structural fallbacks for templates whose navigation text matched no
/// phrase. Ordered: first selector yielding a resolvable link wins.
const STRUCTURAL_SELECTORS: &[&str] = &[
    "a.next",
    "a#next",
    ".next a",
    "#next a",
    r#"a[rel="next"]"#,
    "a.nextchapter",
    "a.next-chapter",
    ".chapter-nav a:last-child",
    ".pagination a:last-child",
];

/// Compute the single best candidate URL for the next item in the
/// sequence, or `None` if the page has no recognizable next-link.
///
/// `None` is a valid terminal condition for a crawl, not an error.
pub fn resolve_next(markup: &str, origin: &Url) -> Option<Url> {
    let document = Html::parse_document(markup);
    let anchors = Selector::parse("a").ok()?;

    // Tier 1: localized phrase match, document order.
    for anchor in document.select(&anchors) {
        let Some(href) = usable_href(&anchor) else {
            continue;
        };
        let text = anchor_text(&anchor);
        if PHRASES_ZH.iter().any(|phrase| text.contains(phrase)) {
            if let Ok(resolved) = origin.join(href) {
                return Some(resolved);
            }
        }
    }

    // Tier 2: generic English phrases, case-insensitive.
    for anchor in document.select(&anchors) {
        let Some(href) = usable_href(&anchor) else {
            continue;
        };
        let text = anchor_text(&anchor).to_lowercase();
        if PHRASES_EN.iter().any(|phrase| text.contains(phrase)) {
            if let Ok(resolved) = origin.join(href) {
                return Some(resolved);
            }
        }
    }

    // Tier 3: structural selectors.
    for raw in STRUCTURAL_SELECTORS {
        let Ok(selector) = Selector::parse(raw) else {
            continue;
        };
        for element in document.select(&selector) {
            let Some(href) = usable_href(&element) else {
                continue;
            };
            if let Ok(resolved) = origin.join(href) {
                return Some(resolved);
            }
        }
    }

    None
}

fn usable_href<'a>(element: &ElementRef<'a>) -> Option<&'a str> {
    let href = element.value().attr("href")?;
    if href.is_empty() || href == "#" || href.starts_with("javascript:") {
        return None;
    }
    Some(href)
}

fn anchor_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_owned()
}
