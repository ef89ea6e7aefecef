use std::time::Duration;

/// Timing and bound knobs for the crawl loop.
///
/// Defaults match the behavior of the sites this tool targets; tests
/// shrink the delays to near zero.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Overall timeout for one page render.
    pub render_timeout: Duration,

    /// Sleep between challenge-page polls.
    pub challenge_poll_interval: Duration,

    /// Maximum challenge polls before proceeding best-effort.
    pub challenge_max_polls: u32,

    /// Extra settle delay after the challenge wait, to absorb late
    /// client-side rendering.
    pub settle_delay: Duration,

    /// Pause between chapters so the source site is not hammered.
    pub inter_chapter_delay: Duration,

    /// How long a terminal job stays pollable before eviction.
    pub job_retention: Duration,

    /// Concurrent background jobs allowed.
    pub max_concurrent_jobs: usize,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            render_timeout: Duration::from_secs(120),
            challenge_poll_interval: Duration::from_secs(3),
            challenge_max_polls: 20,
            settle_delay: Duration::from_secs(2),
            inter_chapter_delay: Duration::from_secs(1),
            job_retention: Duration::from_secs(300),
            max_concurrent_jobs: 4,
        }
    }
}
