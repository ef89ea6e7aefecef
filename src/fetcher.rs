use std::sync::Arc;

use url::Url;

use crate::challenge::is_challenged;
use crate::config::CrawlConfig;
use crate::error::Error;
use crate::extract::{fallback_extract, ContentExtractor};
use crate::next_link::resolve_next;
use crate::render::RenderSession;

/// One fetched-and-extracted page, plus the discovered next-link.
#[derive(Debug, Clone)]
pub struct FetchedChapter {
    pub title: String,
    pub content: String,
    pub excerpt: String,
    pub site_name: String,
    pub next_url: Option<Url>,
}

/// Fetches one chapter: render, wait out any challenge interstitial,
/// discover the next-link, extract the content.
pub struct ChapterFetcher {
    config: CrawlConfig,
    extractor: Arc<dyn ContentExtractor>,
}

impl ChapterFetcher {
    pub fn new(config: CrawlConfig, extractor: Arc<dyn ContentExtractor>) -> Self {
        Self { config, extractor }
    }

    pub async fn fetch(
        &self,
        session: &mut dyn RenderSession,
        url: &Url,
    ) -> Result<FetchedChapter, Error> {
        session.render(url, self.config.render_timeout).await?;

        // Challenge pages rewrite themselves in place once verification
        // passes, so poll the live markup instead of re-navigating.
        let mut markup = session.current_markup().await?;
        let mut polls = 0;
        while is_challenged(&markup) && polls < self.config.challenge_max_polls {
            polls += 1;
            tracing::debug!(%url, polls, max = self.config.challenge_max_polls, "challenge page, waiting");
            tokio::time::sleep(self.config.challenge_poll_interval).await;
            markup = session.current_markup().await?;
        }
        if is_challenged(&markup) {
            // Best effort: a degraded chapter beats a dead chain.
            tracing::warn!(%url, polls, "challenge never cleared, proceeding with last-seen markup");
        }

        // Late-firing client-side rendering can still mutate the page.
        tokio::time::sleep(self.config.settle_delay).await;

        // Next-link discovery runs against the live document, then the
        // final markup is read for extraction.
        let live = session.current_markup().await?;
        let next_url = resolve_next(&live, url);
        match &next_url {
            Some(next) => tracing::debug!(%url, %next, "next chapter link found"),
            None => tracing::debug!(%url, "no next chapter link"),
        }

        let markup = session.current_markup().await?;
        tracing::debug!(%url, bytes = markup.len(), "rendered markup read");

        let extracted = match self.extractor.extract(&markup, url)? {
            Some(content) => content,
            None => {
                tracing::info!(%url, "primary extraction found nothing, trying fallback containers");
                fallback_extract(&markup, url).ok_or_else(|| Error::ExtractionFailed {
                    url: url.to_string(),
                })?
            }
        };

        Ok(FetchedChapter {
            title: extracted.title,
            content: extracted.content,
            excerpt: extracted.excerpt,
            site_name: extracted.site_name,
            next_url,
        })
    }
}
