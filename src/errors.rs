// Error taxonomy for the provider pipeline

use thiserror::Error;

/// Errors surfaced by the provider.
///
/// Containment policy: failures are held at the smallest unit that can
/// meaningfully fail (one fan-out branch, one hoster candidate) and never
/// abort sibling units. Only a failure to fetch the root document of an
/// operation (listing page, series page, episode page) reaches the caller.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Name resolution exhausted every tier for this host.
    #[error("name resolution exhausted all tiers for {host}")]
    Resolution { host: String },

    /// Transport or HTTP failure for a single fetch.
    #[error("fetch failed for {url}: {cause}")]
    Fetch { url: String, cause: String },

    /// The external stream extractor reported failure for one candidate.
    #[error("extractor '{provider}' failed for {url}")]
    Delegate { provider: String, url: String },

    /// The transport client could not be constructed.
    #[error("transport setup failed: {0}")]
    Setup(#[from] reqwest::Error),
}

impl ProviderError {
    pub(crate) fn fetch(url: &str, cause: impl std::fmt::Display) -> Self {
        Self::Fetch {
            url: url.to_string(),
            cause: cause.to_string(),
        }
    }
}
