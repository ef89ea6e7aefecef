use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;

use shiori::app::model::JobStatus;
use shiori::app::service::CrawlService;
use shiori::cli::{ArticlesCommand, BooksCommand, Cli, Command, StoreBackend};
use shiori::config::CrawlConfig;
use shiori::extract::ReadabilityExtractor;
use shiori::render::ChromiumRenderer;
use shiori::store::{JsonStore, SqliteStore, StorageGateway};

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    shiori::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    let store: Arc<dyn StorageGateway> = match cli.store {
        StoreBackend::Json => Arc::new(JsonStore::new(cli.data_dir.join("articles.json"))),
        StoreBackend::Sqlite => {
            Arc::new(SqliteStore::open(cli.data_dir.join("shiori.db")).context("open store")?)
        }
    };

    match cli.command {
        Command::Fetch(args) => {
            let service = crawl_service(store).await?;
            let chapter = service
                .fetch_standalone_article(&args.url)
                .await
                .context("fetch article")?;
            println!(
                "{}",
                serde_json::to_string_pretty(&chapter).context("serialize article")?
            );
        }
        Command::Crawl(args) => {
            let service = crawl_service(store).await?;
            let job_id = service
                .start_new_book(&args.url, args.name, args.max_chapters)
                .await
                .context("start crawl")?;
            wait_for_job(&service, &job_id).await?;
        }
        Command::Continue(args) => {
            let service = crawl_service(store).await?;
            let job_id = service
                .continue_book(args.book_id, &args.url, args.max_chapters)
                .await
                .context("continue book")?;
            wait_for_job(&service, &job_id).await?;
        }
        Command::Books { command } => match command {
            BooksCommand::List => {
                for book in store.list_books().await.context("list books")? {
                    println!(
                        "{}\t{}\t{} chapters\t{}\t{}",
                        book.id,
                        book.name,
                        book.chapter_count,
                        book.site_name,
                        book.created_at.to_rfc3339()
                    );
                }
            }
            BooksCommand::Chapters(args) => {
                for chapter in store
                    .list_chapters(args.book_id)
                    .await
                    .context("list chapters")?
                {
                    println!(
                        "{}\t#{}\t{}\t{}",
                        chapter.id, chapter.order, chapter.title, chapter.source_url
                    );
                }
            }
            BooksCommand::Delete(args) => {
                let deleted = store.delete_book(args.book_id).await.context("delete book")?;
                if !deleted {
                    anyhow::bail!("book {} not found", args.book_id);
                }
                tracing::info!(book_id = args.book_id, "book deleted");
            }
        },
        Command::Articles { command } => match command {
            ArticlesCommand::List => {
                for article in store.list_articles().await.context("list articles")? {
                    println!(
                        "{}\t{}\t{}\t{}",
                        article.id,
                        article.title,
                        article.site_name,
                        article.created_at.to_rfc3339()
                    );
                }
            }
            ArticlesCommand::Show(args) => {
                let chapter = store
                    .get_chapter(args.id)
                    .await
                    .context("load article")?
                    .ok_or_else(|| anyhow::anyhow!("article {} not found", args.id))?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&chapter).context("serialize article")?
                );
            }
            ArticlesCommand::Delete(args) => {
                let deleted = store
                    .delete_chapter(args.id)
                    .await
                    .context("delete article")?;
                if !deleted {
                    anyhow::bail!("article {} not found", args.id);
                }
                tracing::info!(article_id = args.id, "article deleted");
            }
        },
    }

    Ok(())
}

async fn crawl_service(store: Arc<dyn StorageGateway>) -> anyhow::Result<CrawlService> {
    let renderer = ChromiumRenderer::launch().await.context("launch renderer")?;
    Ok(CrawlService::new(
        CrawlConfig::default(),
        Arc::new(renderer),
        Arc::new(ReadabilityExtractor),
        store,
    ))
}

/// Poll the job the way an external client would, until terminal.
async fn wait_for_job(service: &CrawlService, job_id: &str) -> anyhow::Result<()> {
    tracing::info!(job_id, "job started");

    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let job = service
            .job_status(job_id)
            .await
            .ok_or_else(|| anyhow::anyhow!("job {job_id} no longer in registry"))?;

        match job.status {
            JobStatus::Downloading => {
                tracing::info!(
                    job_id,
                    current_chapter = job.current_chapter,
                    saved = job.total_chapters,
                    "downloading"
                );
            }
            JobStatus::Completed => {
                tracing::info!(
                    job_id,
                    chapters = job.total_chapters,
                    book_id = job.book_id,
                    "crawl completed"
                );
                return Ok(());
            }
            JobStatus::Error => {
                anyhow::bail!(
                    "crawl failed after {} chapters: {}",
                    job.total_chapters,
                    job.error.unwrap_or_else(|| "unknown error".to_owned())
                );
            }
        }
    }
}
