use std::sync::Arc;

use anyhow::Context as _;
use tokio::sync::Semaphore;
use url::Url;

use crate::app::model::{Job, JobStatus};
use crate::app::registry::JobRegistry;
use crate::config::CrawlConfig;
use crate::error::Error;
use crate::extract::{site_name_of, ContentExtractor};
use crate::fetcher::ChapterFetcher;
use crate::model::{Chapter, NewBook, NewChapter};
use crate::render::{RenderSession, Renderer};
use crate::store::StorageGateway;

/// Crawl job orchestrator.
///
/// `start_new_book` / `continue_book` return a job id immediately and run
/// the chapter loop as an independent background task; callers observe
/// progress by polling [`CrawlService::job_status`]. Jobs are independent:
/// the registry and the storage gateway are the only shared state.
#[derive(Clone)]
pub struct CrawlService {
    config: CrawlConfig,
    renderer: Arc<dyn Renderer>,
    store: Arc<dyn StorageGateway>,
    fetcher: Arc<ChapterFetcher>,
    registry: JobRegistry,
    permits: Arc<Semaphore>,
}

impl CrawlService {
    pub fn new(
        config: CrawlConfig,
        renderer: Arc<dyn Renderer>,
        extractor: Arc<dyn ContentExtractor>,
        store: Arc<dyn StorageGateway>,
    ) -> Self {
        let fetcher = Arc::new(ChapterFetcher::new(config.clone(), extractor));
        let registry = JobRegistry::new(config.job_retention);
        let permits = Arc::new(Semaphore::new(config.max_concurrent_jobs.max(1)));
        Self {
            config,
            renderer,
            store,
            fetcher,
            registry,
            permits,
        }
    }

    /// Create a book and start crawling the chain from `url`. The book
    /// row exists even if the very first chapter later fails; it then
    /// surfaces as an empty book alongside the job error.
    pub async fn start_new_book(
        &self,
        url: &str,
        name: Option<String>,
        max_chapters: u32,
    ) -> Result<String, Error> {
        let start = parse_start_url(url)?;
        let site_name = site_name_of(&start);
        let name = name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| site_name.clone());

        let book = self
            .store
            .insert_book(NewBook { name, site_name })
            .await
            .context("create book")?;
        tracing::info!(book_id = book.id, name = %book.name, "book created");

        let job = self.registry.create(Some(book.id), 1).await;
        self.spawn_crawl(job.job_id.clone(), book.id, start, 1, max_chapters);
        Ok(job.job_id)
    }

    /// Resume a book from `url`, numbering new chapters after the highest
    /// existing order. `max_chapters` bounds further chapters, not the
    /// book's total.
    pub async fn continue_book(
        &self,
        book_id: i64,
        url: &str,
        max_chapters: u32,
    ) -> Result<String, Error> {
        let start = parse_start_url(url)?;
        self.store
            .get_book(book_id)
            .await
            .context("look up book")?
            .ok_or(Error::NotFound("book"))?;

        let start_order = self
            .store
            .max_chapter_order(book_id)
            .await
            .context("look up max chapter order")?
            .unwrap_or(0)
            + 1;

        let job = self.registry.create(Some(book_id), start_order).await;
        self.spawn_crawl(job.job_id.clone(), book_id, start, start_order, max_chapters);
        Ok(job.job_id)
    }

    /// Poll a job. `None` for unknown ids and for terminal jobs past the
    /// retention window.
    pub async fn job_status(&self, job_id: &str) -> Option<Job> {
        self.registry.get(job_id).await
    }

    /// Single-shot fetch with no job wrapper; errors propagate to the
    /// caller directly.
    pub async fn fetch_standalone_article(&self, url: &str) -> Result<Chapter, Error> {
        let target = parse_start_url(url)?;

        let mut session = self.renderer.new_session().await?;
        let result = self.fetcher.fetch(session.as_mut(), &target).await;
        session.close().await;
        let fetched = result?;

        let chapter = self
            .store
            .insert_chapter(NewChapter {
                book_id: None,
                order: 0,
                title: fetched.title,
                content: fetched.content,
                excerpt: fetched.excerpt,
                site_name: fetched.site_name,
                source_url: target.to_string(),
                next_url: fetched.next_url.map(|u| u.to_string()),
            })
            .await
            .context("persist article")?;
        tracing::info!(article_id = chapter.id, title = %chapter.title, "article saved");
        Ok(chapter)
    }

    fn spawn_crawl(
        &self,
        job_id: String,
        book_id: i64,
        start: Url,
        start_order: u32,
        max_chapters: u32,
    ) {
        let service = self.clone();
        let permits = Arc::clone(&self.permits);
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .expect("job semaphore is closed");
            service
                .run_crawl(&job_id, book_id, start, start_order, max_chapters)
                .await;
        });
    }

    /// Drive one job to a terminal state. Never propagates: every failure
    /// lands on the job record instead of killing the task silently.
    async fn run_crawl(
        &self,
        job_id: &str,
        book_id: i64,
        start: Url,
        start_order: u32,
        max_chapters: u32,
    ) {
        tracing::info!(job_id, book_id, %start, start_order, max_chapters, "crawl job started");

        let result = match self.renderer.new_session().await {
            Ok(mut session) => {
                let result = self
                    .crawl_chapters(job_id, session.as_mut(), book_id, start, start_order, max_chapters)
                    .await;
                // Release the page on every exit path, success or failure.
                session.close().await;
                result
            }
            Err(err) => Err(anyhow::Error::from(err).context("open render session")),
        };

        let result = match result {
            Ok(done) => self.finish_book(book_id, done).await,
            Err(err) => Err(err),
        };

        match result {
            Ok(done) => {
                tracing::info!(job_id, book_id, chapters = done, "crawl job completed");
                self.registry
                    .finish(job_id, |job| job.status = JobStatus::Completed)
                    .await;
            }
            Err(err) => {
                tracing::error!(job_id, book_id, ?err, "crawl job failed");
                self.registry
                    .finish(job_id, |job| {
                        job.status = JobStatus::Error;
                        job.error = Some(format!("{err:#}"));
                    })
                    .await;
            }
        }
    }

    async fn crawl_chapters(
        &self,
        job_id: &str,
        session: &mut dyn RenderSession,
        book_id: i64,
        start: Url,
        start_order: u32,
        max_chapters: u32,
    ) -> anyhow::Result<u32> {
        let mut current = Some(start);
        let mut order = start_order;
        let mut done: u32 = 0;

        while let Some(url) = current.take() {
            if done >= max_chapters {
                tracing::info!(job_id, max_chapters, "chapter bound reached");
                break;
            }

            self.registry
                .update(job_id, |job| job.current_chapter = order)
                .await;
            tracing::info!(job_id, %url, order, "fetching chapter");

            let fetched = self
                .fetcher
                .fetch(session, &url)
                .await
                .with_context(|| format!("fetch chapter {order} from {url}"))?;

            let chapter = self
                .store
                .insert_chapter(NewChapter {
                    book_id: Some(book_id),
                    order,
                    title: fetched.title,
                    content: fetched.content,
                    excerpt: fetched.excerpt,
                    site_name: fetched.site_name,
                    source_url: url.to_string(),
                    next_url: fetched.next_url.as_ref().map(|u| u.to_string()),
                })
                .await
                .with_context(|| format!("persist chapter {order}"))?;

            done += 1;
            order += 1;
            self.registry
                .update(job_id, |job| job.total_chapters = done)
                .await;
            tracing::info!(job_id, chapter_id = chapter.id, title = %chapter.title, "chapter saved");

            current = fetched.next_url;
            if current.is_some() && done < max_chapters {
                tokio::time::sleep(self.config.inter_chapter_delay).await;
            }
        }

        Ok(done)
    }

    /// Runs only on clean loop exit: an aborted job deliberately leaves
    /// the cached count stale relative to the persisted chapters.
    async fn finish_book(&self, book_id: i64, done: u32) -> anyhow::Result<u32> {
        let count = self
            .store
            .count_chapters(book_id)
            .await
            .context("count persisted chapters")?;
        self.store
            .update_book_chapter_count(book_id, count)
            .await
            .context("update book chapter count")?;
        Ok(done)
    }
}

fn parse_start_url(url: &str) -> Result<Url, Error> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidRequest("a start URL is required".to_owned()));
    }
    let parsed = Url::parse(trimmed)
        .map_err(|err| Error::InvalidRequest(format!("invalid URL {trimmed:?}: {err}")))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(Error::InvalidRequest(format!(
            "URL must be http/https: {parsed}"
        )));
    }
    Ok(parsed)
}
