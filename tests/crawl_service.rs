use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use url::Url;

use shiori::app::model::{Job, JobStatus};
use shiori::app::service::CrawlService;
use shiori::config::CrawlConfig;
use shiori::error::Error;
use shiori::extract::{ContentExtractor, ExtractedContent};
use shiori::render::{RenderSession, Renderer};
use shiori::store::{JsonStore, StorageGateway};

// ---- stub collaborators -------------------------------------------------

/// Scripted site: URL -> rendered markup. URLs absent from the map fail
/// to render, like a dead link.
#[derive(Clone)]
struct StubSite {
    pages: Arc<HashMap<String, String>>,
    closed_sessions: Arc<AtomicUsize>,
}

impl StubSite {
    fn new(pages: Vec<(&str, String)>) -> Self {
        Self {
            pages: Arc::new(
                pages
                    .into_iter()
                    .map(|(url, markup)| (url.to_owned(), markup))
                    .collect(),
            ),
            closed_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl Renderer for StubSite {
    async fn new_session(&self) -> Result<Box<dyn RenderSession>, Error> {
        Ok(Box::new(StubSession {
            pages: Arc::clone(&self.pages),
            closed_sessions: Arc::clone(&self.closed_sessions),
            current: None,
        }))
    }
}

struct StubSession {
    pages: Arc<HashMap<String, String>>,
    closed_sessions: Arc<AtomicUsize>,
    current: Option<String>,
}

#[async_trait]
impl RenderSession for StubSession {
    async fn render(&mut self, url: &Url, _timeout: Duration) -> Result<(), Error> {
        if !self.pages.contains_key(url.as_str()) {
            return Err(Error::Other(anyhow::anyhow!("connection refused: {url}")));
        }
        self.current = Some(url.as_str().to_owned());
        Ok(())
    }

    async fn current_markup(&mut self) -> Result<String, Error> {
        let url = self
            .current
            .as_deref()
            .ok_or_else(|| Error::Other(anyhow::anyhow!("no page rendered yet")))?;
        Ok(self.pages[url].clone())
    }

    async fn close(self: Box<Self>) {
        self.closed_sessions.fetch_add(1, Ordering::SeqCst);
    }
}

/// Trivial extractor: title tag plus the whole markup as content.
/// Markup containing "UNREADABLE" yields nothing, forcing the fallback.
struct StubExtractor;

impl ContentExtractor for StubExtractor {
    fn extract(&self, markup: &str, origin: &Url) -> anyhow::Result<Option<ExtractedContent>> {
        if markup.contains("UNREADABLE") {
            return Ok(None);
        }
        let title = markup
            .split("<title>")
            .nth(1)
            .and_then(|rest| rest.split("</title>").next())
            .unwrap_or("Untitled")
            .to_owned();
        Ok(Some(ExtractedContent {
            title,
            content: markup.to_owned(),
            excerpt: "stub excerpt".to_owned(),
            site_name: origin.host_str().unwrap_or("unknown").to_owned(),
        }))
    }
}

// ---- fixtures -----------------------------------------------------------

/// A chapter page, padded well past the challenge detector's minimum
/// plausible length.
fn page(title: &str, next_href: Option<&str>) -> String {
    let next = next_href
        .map(|href| format!(r#"<a href="{href}">下一章</a>"#))
        .unwrap_or_default();
    format!(
        "<!doctype html><html><head><title>{title}</title></head>\
         <body><div class=\"content\"><p>{}</p></div>{next}</body></html>",
        "正文内容在此。".repeat(60)
    )
}

fn fast_config() -> CrawlConfig {
    CrawlConfig {
        render_timeout: Duration::from_secs(5),
        challenge_poll_interval: Duration::from_millis(1),
        challenge_max_polls: 3,
        settle_delay: Duration::from_millis(1),
        inter_chapter_delay: Duration::from_millis(1),
        job_retention: Duration::from_millis(200),
        max_concurrent_jobs: 4,
    }
}

struct Harness {
    service: CrawlService,
    store: Arc<dyn StorageGateway>,
    site: StubSite,
    _tmp: TempDir,
}

fn harness(pages: Vec<(&str, String)>) -> Harness {
    let tmp = TempDir::new().expect("create tempdir");
    let store: Arc<dyn StorageGateway> =
        Arc::new(JsonStore::new(tmp.path().join("articles.json")));
    let site = StubSite::new(pages);
    let service = CrawlService::new(
        fast_config(),
        Arc::new(site.clone()),
        Arc::new(StubExtractor),
        Arc::clone(&store),
    );
    Harness {
        service,
        store,
        site,
        _tmp: tmp,
    }
}

async fn wait_terminal(service: &CrawlService, job_id: &str) -> Job {
    for _ in 0..400 {
        let job = service
            .job_status(job_id)
            .await
            .expect("job evicted before reaching a terminal state");
        if job.status.is_terminal() {
            return job;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} did not reach a terminal state in time");
}

// ---- tests --------------------------------------------------------------

#[tokio::test]
async fn single_chapter_crawl_resolves_next_but_does_not_follow_it() {
    let h = harness(vec![
        ("https://book.test/c/1", page("Chapter 1", Some("/c/2"))),
        ("https://book.test/c/2", page("Chapter 2", None)),
    ]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", None, 1)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chapters, 1);

    let book_id = job.book_id.unwrap();
    let chapters = h.store.list_chapters(book_id).await.unwrap();
    assert_eq!(chapters.len(), 1);
    assert_eq!(chapters[0].order, 1);
    assert_eq!(chapters[0].title, "Chapter 1");
    // Relative href stored resolved against the origin.
    assert_eq!(chapters[0].next_url.as_deref(), Some("https://book.test/c/2"));
    assert_eq!(chapters[0].source_url, "https://book.test/c/1");

    let book = h.store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.chapter_count, 1);
    assert_eq!(book.site_name, "book.test");
}

#[tokio::test]
async fn chain_is_followed_until_no_next_link() {
    let h = harness(vec![
        ("https://book.test/c/1", page("Chapter 1", Some("/c/2"))),
        ("https://book.test/c/2", page("Chapter 2", Some("/c/3"))),
        ("https://book.test/c/3", page("Chapter 3", None)),
    ]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", Some("My Book".to_owned()), 10)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chapters, 3);

    let book_id = job.book_id.unwrap();
    let chapters = h.store.list_chapters(book_id).await.unwrap();
    let orders: Vec<u32> = chapters.iter().map(|c| c.order).collect();
    assert_eq!(orders, vec![1, 2, 3]);
    assert!(chapters.last().unwrap().next_url.is_none());

    let book = h.store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.name, "My Book");
    assert_eq!(book.chapter_count, 3);

    // Exactly one rendering session, released at loop exit.
    assert_eq!(h.site.closed_sessions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn failure_mid_chain_keeps_earlier_chapters_and_leaves_count_stale() {
    // Chapter 3 points at a URL that will not render.
    let h = harness(vec![
        ("https://book.test/c/1", page("Chapter 1", Some("/c/2"))),
        ("https://book.test/c/2", page("Chapter 2", Some("/c/3"))),
    ]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", None, 10)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.total_chapters, 2);
    let message = job.error.expect("error message recorded on the job");
    assert!(message.contains("chapter 3"), "unexpected message: {message}");

    let book_id = job.book_id.unwrap();
    let chapters = h.store.list_chapters(book_id).await.unwrap();
    assert_eq!(chapters.len(), 2);
    assert_eq!(
        chapters.iter().map(|c| c.order).collect::<Vec<_>>(),
        vec![1, 2]
    );

    // The cached count is refreshed only on clean loop exit; an aborted
    // job leaves it stale on purpose.
    let book = h.store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.chapter_count, 0);

    // The session is still released on the failure path.
    assert_eq!(h.site.closed_sessions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn continue_book_appends_after_highest_existing_order() {
    let h = harness(vec![
        ("https://book.test/c/1", page("Chapter 1", Some("/c/2"))),
        ("https://book.test/c/2", page("Chapter 2", None)),
        ("https://book.test/c/3", page("Chapter 3", Some("/c/4"))),
        ("https://book.test/c/4", page("Chapter 4", None)),
    ]);

    let first = h
        .service
        .start_new_book("https://book.test/c/1", None, 10)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &first).await;
    let book_id = job.book_id.unwrap();

    let second = h
        .service
        .continue_book(book_id, "https://book.test/c/3", 10)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &second).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chapters, 2);

    let chapters = h.store.list_chapters(book_id).await.unwrap();
    let orders: Vec<u32> = chapters.iter().map(|c| c.order).collect();
    assert_eq!(orders, vec![1, 2, 3, 4]);
    assert_eq!(chapters[2].title, "Chapter 3");

    let book = h.store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.chapter_count, 4);
}

#[tokio::test]
async fn continue_bound_limits_further_chapters_not_total() {
    let h = harness(vec![
        ("https://book.test/c/1", page("Chapter 1", Some("/c/2"))),
        ("https://book.test/c/2", page("Chapter 2", Some("/c/3"))),
        ("https://book.test/c/3", page("Chapter 3", Some("/c/4"))),
        ("https://book.test/c/4", page("Chapter 4", None)),
    ]);

    let first = h
        .service
        .start_new_book("https://book.test/c/1", None, 2)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &first).await;
    let book_id = job.book_id.unwrap();
    assert_eq!(job.total_chapters, 2);

    // A further bound of 1 fetches exactly one more chapter even though
    // the book already holds two.
    let second = h
        .service
        .continue_book(book_id, "https://book.test/c/3", 1)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &second).await;
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chapters, 1);

    let chapters = h.store.list_chapters(book_id).await.unwrap();
    assert_eq!(
        chapters.iter().map(|c| c.order).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[tokio::test]
async fn terminal_job_is_not_found_after_retention_window() {
    let h = harness(vec![(
        "https://book.test/c/1",
        page("Chapter 1", None),
    )]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", None, 5)
        .await
        .unwrap();
    wait_terminal(&h.service, &job_id).await;

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(h.service.job_status(&job_id).await.is_none());
}

#[tokio::test]
async fn unknown_job_id_is_not_found() {
    let h = harness(vec![]);
    assert!(h.service.job_status("no-such-job").await.is_none());
}

#[tokio::test]
async fn challenge_page_that_never_clears_is_processed_best_effort() {
    let markup = format!(
        "<!doctype html><html><head><title>Chapter 1</title></head>\
         <body>Just a moment...<div class=\"content\"><p>{}</p></div></body></html>",
        "正文内容在此。".repeat(60)
    );
    let h = harness(vec![("https://book.test/c/1", markup)]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", None, 5)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;

    // Retries exhaust, then the last-seen markup is used anyway.
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.total_chapters, 1);
}

#[tokio::test]
async fn fallback_container_extraction_rescues_unreadable_pages() {
    let body = "备用内容提取。".repeat(40);
    let markup = format!(
        "<!doctype html><html><head><title>第五章</title></head>\
         <body><!-- UNREADABLE --><div class=\"content\"><p>{body}</p></div></body></html>"
    );
    let h = harness(vec![("https://book.test/c/5", markup)]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/5", None, 1)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;
    assert_eq!(job.status, JobStatus::Completed);

    let chapters = h.store.list_chapters(job.book_id.unwrap()).await.unwrap();
    assert_eq!(chapters[0].title, "第五章");
    assert!(chapters[0].content.contains("备用内容提取"));
    assert_eq!(chapters[0].excerpt.chars().count(), 200);
}

#[tokio::test]
async fn first_chapter_extraction_failure_leaves_an_empty_book() {
    // Big enough to pass the challenge check, but no container has
    // usable text, and the primary extractor refuses it.
    let markup = format!(
        "<!doctype html><html><head><title>x</title></head>\
         <body><p>UNREADABLE</p><!-- {} --></body></html>",
        "pad".repeat(300)
    );
    let h = harness(vec![("https://book.test/c/1", markup)]);

    let job_id = h
        .service
        .start_new_book("https://book.test/c/1", None, 5)
        .await
        .unwrap();
    let job = wait_terminal(&h.service, &job_id).await;

    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.total_chapters, 0);
    assert!(job.error.unwrap().contains("no usable content"));

    // The book record stays behind, visible as an empty book.
    let book_id = job.book_id.unwrap();
    let book = h.store.get_book(book_id).await.unwrap().unwrap();
    assert_eq!(book.chapter_count, 0);
    assert!(h.store.list_chapters(book_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn standalone_article_is_saved_without_a_book() {
    let h = harness(vec![(
        "https://news.test/story",
        page("A Story", Some("/next")),
    )]);

    let chapter = h
        .service
        .fetch_standalone_article("https://news.test/story")
        .await
        .unwrap();
    assert_eq!(chapter.book_id, None);
    assert_eq!(chapter.title, "A Story");
    assert_eq!(chapter.site_name, "news.test");

    let articles = h.store.list_articles().await.unwrap();
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].id, chapter.id);

    assert!(h.store.delete_chapter(chapter.id).await.unwrap());
    assert!(h.store.get_chapter(chapter.id).await.unwrap().is_none());
}

#[tokio::test]
async fn standalone_fetch_failure_propagates_to_the_caller() {
    let h = harness(vec![]);
    let err = h
        .service
        .fetch_standalone_article("https://gone.test/404")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Other(_)));

    // The session is still released.
    assert_eq!(h.site.closed_sessions.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn empty_start_url_is_rejected_synchronously() {
    let h = harness(vec![]);
    let err = h.service.start_new_book("  ", None, 5).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
}

#[tokio::test]
async fn continue_unknown_book_is_not_found() {
    let h = harness(vec![]);
    let err = h
        .service
        .continue_book(999, "https://book.test/c/1", 5)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn concurrent_jobs_for_different_books_are_independent() {
    let h = harness(vec![
        ("https://a.test/c/1", page("A1", Some("/c/2"))),
        ("https://a.test/c/2", page("A2", None)),
        ("https://b.test/c/1", page("B1", None)),
    ]);

    let job_a = h
        .service
        .start_new_book("https://a.test/c/1", None, 10)
        .await
        .unwrap();
    let job_b = h
        .service
        .start_new_book("https://b.test/c/1", None, 10)
        .await
        .unwrap();

    let a = wait_terminal(&h.service, &job_a).await;
    let b = wait_terminal(&h.service, &job_b).await;
    assert_eq!(a.status, JobStatus::Completed);
    assert_eq!(b.status, JobStatus::Completed);
    assert_ne!(a.book_id, b.book_id);
    assert_eq!(a.total_chapters, 2);
    assert_eq!(b.total_chapters, 1);

    let books = h.store.list_books().await.unwrap();
    assert_eq!(books.len(), 2);
}
