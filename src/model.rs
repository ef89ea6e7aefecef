use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Plain-text excerpt length bound for persisted chapters.
pub const EXCERPT_MAX_CHARS: usize = 200;

/// A named collection of ordered chapters discovered by following
/// next-links from a starting page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: i64,
    pub name: String,
    pub site_name: String,
    /// Denormalized count, refreshed at job completion. May lag the real
    /// row count while a job is in flight or after an aborted job.
    pub chapter_count: u32,
    pub created_at: DateTime<Utc>,
}

/// One rendered-and-extracted unit of content.
///
/// With `book_id` set this is a chapter ordered within a book; without it,
/// a standalone saved article (`order` is irrelevant then).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
    /// 1-based position within the book, strictly increasing.
    pub order: u32,
    pub title: String,
    /// Extracted rich-text fragment (HTML).
    pub content: String,
    pub excerpt: String,
    pub site_name: String,
    pub source_url: String,
    /// Resolved next-chapter URL, if one was discovered on the page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Insert payload for a chapter; the gateway assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct NewChapter {
    pub book_id: Option<i64>,
    pub order: u32,
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub site_name: String,
    pub source_url: String,
    pub next_url: Option<String>,
}

/// Insert payload for a book.
#[derive(Debug, Clone)]
pub struct NewBook {
    pub name: String,
    pub site_name: String,
}

/// Listing row for saved standalone articles (no content payload).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: i64,
    pub title: String,
    pub site_name: String,
    pub created_at: DateTime<Utc>,
}

/// Trim and bound a plain-text excerpt to [`EXCERPT_MAX_CHARS`].
pub fn truncate_excerpt(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= EXCERPT_MAX_CHARS {
        return trimmed.to_owned();
    }
    trimmed.chars().take(EXCERPT_MAX_CHARS).collect()
}
