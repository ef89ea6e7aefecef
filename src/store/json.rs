use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::model::{ArticleSummary, Book, Chapter, NewBook, NewChapter};
use crate::store::StorageGateway;

/// Single-file JSON backend. Every mutation is a locked
/// read-modify-write with an atomic tmp+rename, so a crash never leaves
/// a half-written data file behind.
pub struct JsonStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct DataFile {
    #[serde(default)]
    books: Vec<Book>,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

impl DataFile {
    fn next_book_id(&self) -> i64 {
        self.books.iter().map(|b| b.id).max().unwrap_or(0) + 1
    }

    fn next_chapter_id(&self) -> i64 {
        self.chapters.iter().map(|c| c.id).max().unwrap_or(0) + 1
    }
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> anyhow::Result<DataFile> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DataFile::default());
            }
            Err(err) => {
                return Err(err).with_context(|| format!("read: {}", self.path.display()));
            }
        };
        serde_json::from_slice(&bytes)
            .with_context(|| format!("parse data file: {}", self.path.display()))
    }

    async fn save(&self, data: &DataFile) -> anyhow::Result<()> {
        write_json_atomic(&self.path, data).await
    }
}

async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}

#[async_trait]
impl StorageGateway for JsonStore {
    async fn insert_book(&self, book: NewBook) -> anyhow::Result<Book> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let record = Book {
            id: data.next_book_id(),
            name: book.name,
            site_name: book.site_name,
            chapter_count: 0,
            created_at: Utc::now(),
        };
        data.books.push(record.clone());
        self.save(&data).await?;
        Ok(record)
    }

    async fn insert_chapter(&self, chapter: NewChapter) -> anyhow::Result<Chapter> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let record = Chapter {
            id: data.next_chapter_id(),
            book_id: chapter.book_id,
            order: chapter.order,
            title: chapter.title,
            content: chapter.content,
            excerpt: chapter.excerpt,
            site_name: chapter.site_name,
            source_url: chapter.source_url,
            next_url: chapter.next_url,
            created_at: Utc::now(),
        };
        data.chapters.push(record.clone());
        self.save(&data).await?;
        Ok(record)
    }

    async fn update_book_chapter_count(&self, book_id: i64, count: u32) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let book = data
            .books
            .iter_mut()
            .find(|b| b.id == book_id)
            .ok_or_else(|| anyhow::anyhow!("book {book_id} does not exist"))?;
        book.chapter_count = count;
        self.save(&data).await
    }

    async fn max_chapter_order(&self, book_id: i64) -> anyhow::Result<Option<u32>> {
        let data = self.load().await?;
        Ok(data
            .chapters
            .iter()
            .filter(|c| c.book_id == Some(book_id))
            .map(|c| c.order)
            .max())
    }

    async fn count_chapters(&self, book_id: i64) -> anyhow::Result<u32> {
        let data = self.load().await?;
        Ok(data
            .chapters
            .iter()
            .filter(|c| c.book_id == Some(book_id))
            .count() as u32)
    }

    async fn get_book(&self, book_id: i64) -> anyhow::Result<Option<Book>> {
        let data = self.load().await?;
        Ok(data.books.iter().find(|b| b.id == book_id).cloned())
    }

    async fn list_books(&self) -> anyhow::Result<Vec<Book>> {
        let data = self.load().await?;
        Ok(data.books)
    }

    async fn list_chapters(&self, book_id: i64) -> anyhow::Result<Vec<Chapter>> {
        let data = self.load().await?;
        let mut chapters: Vec<Chapter> = data
            .chapters
            .into_iter()
            .filter(|c| c.book_id == Some(book_id))
            .collect();
        chapters.sort_by_key(|c| c.order);
        Ok(chapters)
    }

    async fn list_articles(&self) -> anyhow::Result<Vec<ArticleSummary>> {
        let data = self.load().await?;
        let mut articles: Vec<ArticleSummary> = data
            .chapters
            .iter()
            .filter(|c| c.book_id.is_none())
            .map(|c| ArticleSummary {
                id: c.id,
                title: c.title.clone(),
                site_name: c.site_name.clone(),
                created_at: c.created_at,
            })
            .collect();
        articles.sort_by_key(|a| std::cmp::Reverse(a.id));
        Ok(articles)
    }

    async fn get_chapter(&self, id: i64) -> anyhow::Result<Option<Chapter>> {
        let data = self.load().await?;
        Ok(data.chapters.iter().find(|c| c.id == id).cloned())
    }

    async fn delete_book(&self, book_id: i64) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let before = data.books.len();
        data.books.retain(|b| b.id != book_id);
        if data.books.len() == before {
            return Ok(false);
        }
        data.chapters.retain(|c| c.book_id != Some(book_id));
        self.save(&data).await?;
        Ok(true)
    }

    async fn delete_chapter(&self, id: i64) -> anyhow::Result<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        let before = data.chapters.len();
        data.chapters.retain(|c| c.id != id);
        if data.chapters.len() == before {
            return Ok(false);
        }
        self.save(&data).await?;
        Ok(true)
    }
}
