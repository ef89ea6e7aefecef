use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// Directory for persisted books and articles.
    #[arg(long, default_value = "data")]
    pub data_dir: PathBuf,

    /// Storage backend.
    #[arg(long, value_enum, default_value = "json")]
    pub store: StoreBackend,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreBackend {
    /// Single JSON data file.
    Json,
    /// SQLite database.
    Sqlite,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Save a single article from a URL, without creating a book.
    Fetch(FetchArgs),
    /// Crawl a chapter chain from a start URL into a new book.
    Crawl(CrawlArgs),
    /// Continue an existing book from a URL.
    Continue(ContinueArgs),
    /// Inspect or delete books.
    Books {
        #[command(subcommand)]
        command: BooksCommand,
    },
    /// Inspect or delete saved standalone articles.
    Articles {
        #[command(subcommand)]
        command: ArticlesCommand,
    },
}

#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Article URL (must be http/https).
    #[arg(long)]
    pub url: String,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// First chapter URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Book name (default: derived from the start URL's host).
    #[arg(long)]
    pub name: Option<String>,

    /// Maximum chapters to fetch.
    #[arg(long, default_value_t = 200)]
    pub max_chapters: u32,
}

#[derive(Debug, Args)]
pub struct ContinueArgs {
    /// Book to extend.
    #[arg(long)]
    pub book_id: i64,

    /// URL of the next chapter to fetch.
    #[arg(long)]
    pub url: String,

    /// Maximum further chapters to fetch.
    #[arg(long, default_value_t = 100)]
    pub max_chapters: u32,
}

#[derive(Debug, Subcommand)]
pub enum BooksCommand {
    /// List all books.
    List,
    /// List the chapters of one book.
    Chapters(BookIdArgs),
    /// Delete a book and all of its chapters.
    Delete(BookIdArgs),
}

#[derive(Debug, Args)]
pub struct BookIdArgs {
    #[arg(long)]
    pub book_id: i64,
}

#[derive(Debug, Subcommand)]
pub enum ArticlesCommand {
    /// List saved articles, newest first.
    List,
    /// Print one saved article as JSON.
    Show(ArticleIdArgs),
    /// Delete a saved article.
    Delete(ArticleIdArgs),
}

#[derive(Debug, Args)]
pub struct ArticleIdArgs {
    #[arg(long)]
    pub id: i64,
}
