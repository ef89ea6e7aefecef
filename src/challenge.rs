/// Interstitial phrases shown by bot-verification pages while the real
/// content is withheld. Spans the locales seen in the wild for the
/// Cloudflare-style check.
const CHALLENGE_SIGNATURES: &[&str] = &[
    "Just a moment",
    "Checking your browser",
    "Please wait",
    "Verifying you are human",
];

/// Below this, the markup is a non-rendered shell rather than a page.
pub const MIN_RENDERED_BYTES: usize = 512;

/// Whether rendered markup still looks like a challenge interstitial
/// (or has not rendered at all) and is worth waiting on.
pub fn is_challenged(markup: &str) -> bool {
    if markup.trim().len() < MIN_RENDERED_BYTES {
        return true;
    }
    CHALLENGE_SIGNATURES.iter().any(|sig| markup.contains(sig))
}
