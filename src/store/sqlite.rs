use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension as _, Row};

use crate::model::{ArticleSummary, Book, Chapter, NewBook, NewChapter};
use crate::store::StorageGateway;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS books (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    site_name     TEXT NOT NULL,
    chapter_count INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chapters (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    book_id    INTEGER REFERENCES books(id) ON DELETE CASCADE,
    position   INTEGER NOT NULL DEFAULT 0,
    title      TEXT NOT NULL,
    content    TEXT NOT NULL,
    excerpt    TEXT NOT NULL,
    site_name  TEXT NOT NULL,
    source_url TEXT NOT NULL,
    next_url   TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chapters_book ON chapters(book_id, position);
";

/// SQLite backend. rusqlite is synchronous, so every operation hops to
/// the blocking pool with the connection behind a mutex.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create data dir: {}", parent.display()))?;
        }
        let conn = Connection::open(&path)
            .with_context(|| format!("open database: {}", path.display()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("enable foreign keys")?;
        conn.execute_batch(SCHEMA).context("apply schema")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Connection) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| anyhow::anyhow!("sqlite connection lock poisoned"))?;
            f(&guard)
        })
        .await
        .context("join sqlite task")?
    }
}

fn parse_timestamp(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("parse timestamp: {raw}"))?
        .with_timezone(&Utc))
}

fn book_from_row(row: &Row<'_>) -> anyhow::Result<Book> {
    let created_at: String = row.get("created_at")?;
    Ok(Book {
        id: row.get("id")?,
        name: row.get("name")?,
        site_name: row.get("site_name")?,
        chapter_count: row.get("chapter_count")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn chapter_from_row(row: &Row<'_>) -> anyhow::Result<Chapter> {
    let created_at: String = row.get("created_at")?;
    Ok(Chapter {
        id: row.get("id")?,
        book_id: row.get("book_id")?,
        order: row.get("position")?,
        title: row.get("title")?,
        content: row.get("content")?,
        excerpt: row.get("excerpt")?,
        site_name: row.get("site_name")?,
        source_url: row.get("source_url")?,
        next_url: row.get("next_url")?,
        created_at: parse_timestamp(&created_at)?,
    })
}

#[async_trait]
impl StorageGateway for SqliteStore {
    async fn insert_book(&self, book: NewBook) -> anyhow::Result<Book> {
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO books (name, site_name, chapter_count, created_at)
                 VALUES (?1, ?2, 0, ?3)",
                params![book.name, book.site_name, created_at.to_rfc3339()],
            )
            .context("insert book")?;
            Ok(Book {
                id: conn.last_insert_rowid(),
                name: book.name,
                site_name: book.site_name,
                chapter_count: 0,
                created_at,
            })
        })
        .await
    }

    async fn insert_chapter(&self, chapter: NewChapter) -> anyhow::Result<Chapter> {
        self.with_conn(move |conn| {
            let created_at = Utc::now();
            conn.execute(
                "INSERT INTO chapters
                 (book_id, position, title, content, excerpt, site_name, source_url, next_url, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    chapter.book_id,
                    chapter.order,
                    chapter.title,
                    chapter.content,
                    chapter.excerpt,
                    chapter.site_name,
                    chapter.source_url,
                    chapter.next_url,
                    created_at.to_rfc3339(),
                ],
            )
            .context("insert chapter")?;
            Ok(Chapter {
                id: conn.last_insert_rowid(),
                book_id: chapter.book_id,
                order: chapter.order,
                title: chapter.title,
                content: chapter.content,
                excerpt: chapter.excerpt,
                site_name: chapter.site_name,
                source_url: chapter.source_url,
                next_url: chapter.next_url,
                created_at,
            })
        })
        .await
    }

    async fn update_book_chapter_count(&self, book_id: i64, count: u32) -> anyhow::Result<()> {
        self.with_conn(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE books SET chapter_count = ?1 WHERE id = ?2",
                    params![count, book_id],
                )
                .context("update chapter count")?;
            if updated == 0 {
                anyhow::bail!("book {book_id} does not exist");
            }
            Ok(())
        })
        .await
    }

    async fn max_chapter_order(&self, book_id: i64) -> anyhow::Result<Option<u32>> {
        self.with_conn(move |conn| {
            let max: Option<u32> = conn
                .query_row(
                    "SELECT MAX(position) FROM chapters WHERE book_id = ?1",
                    params![book_id],
                    |row| row.get(0),
                )
                .context("query max chapter order")?;
            Ok(max)
        })
        .await
    }

    async fn count_chapters(&self, book_id: i64) -> anyhow::Result<u32> {
        self.with_conn(move |conn| {
            let count: u32 = conn
                .query_row(
                    "SELECT COUNT(*) FROM chapters WHERE book_id = ?1",
                    params![book_id],
                    |row| row.get(0),
                )
                .context("count chapters")?;
            Ok(count)
        })
        .await
    }

    async fn get_book(&self, book_id: i64) -> anyhow::Result<Option<Book>> {
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, site_name, chapter_count, created_at
                     FROM books WHERE id = ?1",
                    params![book_id],
                    |row| {
                        Ok((
                            row.get::<_, i64>("id")?,
                            row.get::<_, String>("name")?,
                            row.get::<_, String>("site_name")?,
                            row.get::<_, u32>("chapter_count")?,
                            row.get::<_, String>("created_at")?,
                        ))
                    },
                )
                .optional()
                .context("query book")?;
            match row {
                Some((id, name, site_name, chapter_count, created_at)) => Ok(Some(Book {
                    id,
                    name,
                    site_name,
                    chapter_count,
                    created_at: parse_timestamp(&created_at)?,
                })),
                None => Ok(None),
            }
        })
        .await
    }

    async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, name, site_name, chapter_count, created_at
                     FROM books ORDER BY id",
                )
                .context("prepare book listing")?;
            let mut rows = stmt.query([]).context("query books")?;
            let mut books = Vec::new();
            while let Some(row) = rows.next().context("read book row")? {
                books.push(book_from_row(row)?);
            }
            Ok(books)
        })
        .await
    }

    async fn list_chapters(&self, book_id: i64) -> anyhow::Result<Vec<Chapter>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, book_id, position, title, content, excerpt, site_name,
                            source_url, next_url, created_at
                     FROM chapters WHERE book_id = ?1 ORDER BY position",
                )
                .context("prepare chapter listing")?;
            let mut rows = stmt.query(params![book_id]).context("query chapters")?;
            let mut chapters = Vec::new();
            while let Some(row) = rows.next().context("read chapter row")? {
                chapters.push(chapter_from_row(row)?);
            }
            Ok(chapters)
        })
        .await
    }

    async fn list_articles(&self) -> anyhow::Result<Vec<ArticleSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, title, site_name, created_at
                     FROM chapters WHERE book_id IS NULL ORDER BY id DESC",
                )
                .context("prepare article listing")?;
            let mut rows = stmt.query([]).context("query articles")?;
            let mut articles = Vec::new();
            while let Some(row) = rows.next().context("read article row")? {
                let created_at: String = row.get("created_at")?;
                articles.push(ArticleSummary {
                    id: row.get("id")?,
                    title: row.get("title")?,
                    site_name: row.get("site_name")?,
                    created_at: parse_timestamp(&created_at)?,
                });
            }
            Ok(articles)
        })
        .await
    }

    async fn get_chapter(&self, id: i64) -> anyhow::Result<Option<Chapter>> {
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, book_id, position, title, content, excerpt, site_name,
                            source_url, next_url, created_at
                     FROM chapters WHERE id = ?1",
                )
                .context("prepare chapter lookup")?;
            let mut rows = stmt.query(params![id]).context("query chapter")?;
            match rows.next().context("read chapter row")? {
                Some(row) => Ok(Some(chapter_from_row(row)?)),
                None => Ok(None),
            }
        })
        .await
    }

    async fn delete_book(&self, book_id: i64) -> anyhow::Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM books WHERE id = ?1", params![book_id])
                .context("delete book")?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn delete_chapter(&self, id: i64) -> anyhow::Result<bool> {
        self.with_conn(move |conn| {
            let deleted = conn
                .execute("DELETE FROM chapters WHERE id = ?1", params![id])
                .context("delete chapter")?;
            Ok(deleted > 0)
        })
        .await
    }
}
