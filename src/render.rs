use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt as _;
use url::Url;

use crate::error::Error;

/// Realistic request identity. Challenge services fingerprint headless
/// defaults, so sessions present a desktop browser instead.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9,zh-CN;q=0.8,zh;q=0.7";

/// One live page, scoped to a single chapter chain.
#[async_trait]
pub trait RenderSession: Send {
    /// Navigate and wait for the network to go idle, bounded by `timeout`.
    async fn render(&mut self, url: &Url, timeout: Duration) -> Result<(), Error>;

    /// Markup of the document as currently rendered. Re-readable: the
    /// challenge wait loop polls this while the page rewrites itself.
    async fn current_markup(&mut self) -> Result<String, Error>;

    /// Release the page. Callers must reach this on every exit path.
    async fn close(self: Box<Self>);
}

/// Factory for render sessions. Each crawl job owns exactly one session
/// for its lifetime.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn new_session(&self) -> Result<Box<dyn RenderSession>, Error>;
}

/// Headless Chromium over CDP.
pub struct ChromiumRenderer {
    browser: Browser,
}

impl ChromiumRenderer {
    pub async fn launch() -> anyhow::Result<Self> {
        let executable = find_chromium().context("locate chromium")?;
        tracing::debug!(executable = %executable.display(), "launching browser");

        let config = BrowserConfig::builder()
            .chrome_executable(executable)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg("--no-sandbox")
            .arg("--disable-gpu")
            .arg("--window-size=1920,1080")
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch browser")?;

        // CDP event pump; the connection dies without it.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self { browser })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_session(&self) -> Result<Box<dyn RenderSession>, Error> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("open browser page")?;

        let identity = SetUserAgentOverrideParams::builder()
            .user_agent(USER_AGENT)
            .accept_language(ACCEPT_LANGUAGE)
            .build()
            .map_err(|err| anyhow::anyhow!("build user agent override: {err}"))?;
        page.execute(identity)
            .await
            .context("apply request identity")?;

        Ok(Box::new(ChromiumSession { page }))
    }
}

struct ChromiumSession {
    page: Page,
}

#[async_trait]
impl RenderSession for ChromiumSession {
    async fn render(&mut self, url: &Url, timeout: Duration) -> Result<(), Error> {
        let navigate = async {
            self.page.goto(url.as_str()).await?;
            self.page.wait_for_navigation().await?;
            Ok::<_, chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, navigate).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(Error::Other(
                anyhow::Error::new(err).context(format!("navigate to {url}")),
            )),
            Err(_) => Err(Error::RenderTimeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }

    async fn current_markup(&mut self) -> Result<String, Error> {
        let markup = self.page.content().await.context("read page content")?;
        Ok(markup)
    }

    async fn close(self: Box<Self>) {
        if let Err(err) = self.page.close().await {
            tracing::debug!(?err, "close page");
        }
    }
}

/// Common Chromium install locations, then $PATH.
const CHROMIUM_PATHS: &[&str] = &[
    "/usr/bin/chromium",
    "/usr/bin/chromium-browser",
    "/usr/bin/google-chrome",
    "/usr/bin/google-chrome-stable",
    "/snap/bin/chromium",
    "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
    "/Applications/Chromium.app/Contents/MacOS/Chromium",
];

fn find_chromium() -> anyhow::Result<PathBuf> {
    for candidate in CHROMIUM_PATHS {
        let path = PathBuf::from(candidate);
        if path.exists() {
            return Ok(path);
        }
    }

    for name in &["chromium", "chromium-browser", "google-chrome", "google-chrome-stable"] {
        if let Ok(output) = std::process::Command::new("which").arg(name).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Ok(PathBuf::from(path));
                }
            }
        }
    }

    anyhow::bail!("chromium/chrome not found; install it or put it on PATH")
}
