use async_trait::async_trait;

use crate::model::{ArticleSummary, Book, Chapter, NewBook, NewChapter};

pub mod json;
pub mod sqlite;

pub use json::JsonStore;
pub use sqlite::SqliteStore;

/// Durable persistence for books, chapters, and standalone articles.
///
/// Backends serialize their own conflicting writes; callers get no
/// cross-call transactionality beyond that.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn insert_book(&self, book: NewBook) -> anyhow::Result<Book>;
    async fn insert_chapter(&self, chapter: NewChapter) -> anyhow::Result<Chapter>;

    /// Refresh a book's denormalized chapter count.
    async fn update_book_chapter_count(&self, book_id: i64, count: u32) -> anyhow::Result<()>;

    /// Highest chapter `order` for the book, or `None` if it has none.
    async fn max_chapter_order(&self, book_id: i64) -> anyhow::Result<Option<u32>>;

    /// Actual persisted chapter rows for the book.
    async fn count_chapters(&self, book_id: i64) -> anyhow::Result<u32>;

    async fn get_book(&self, book_id: i64) -> anyhow::Result<Option<Book>>;
    async fn list_books(&self) -> anyhow::Result<Vec<Book>>;

    /// Chapters of a book, ascending by `order`.
    async fn list_chapters(&self, book_id: i64) -> anyhow::Result<Vec<Chapter>>;

    /// Standalone saved articles (no book), newest first.
    async fn list_articles(&self) -> anyhow::Result<Vec<ArticleSummary>>;

    async fn get_chapter(&self, id: i64) -> anyhow::Result<Option<Chapter>>;

    /// Delete a book and cascade its chapters. Returns whether it existed.
    async fn delete_book(&self, book_id: i64) -> anyhow::Result<bool>;

    /// Delete a single chapter/article. Returns whether it existed.
    async fn delete_chapter(&self, id: i64) -> anyhow::Result<bool>;
}
