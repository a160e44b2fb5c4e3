// Transport seam - every pipeline stage fetches through this

pub mod client;
pub mod resolver;

pub use client::{SiteClient, SiteConfig};
pub use resolver::{DohLookup, HostResolver, NameLookup, SystemLookup};

use async_trait::async_trait;

use crate::errors::ProviderError;

/// The single chokepoint all pipeline stages use for page fetches.
///
/// Implemented by [`SiteClient`] in production and by canned-page fetchers in
/// tests. Implementations must be shareable across concurrent fan-out
/// branches without additional locking.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// GET a site path (or absolute URL) and return the body text.
    async fn get(&self, path: &str) -> Result<String, ProviderError>;

    /// POST an urlencoded form, optionally with a referer, and return the
    /// body text.
    async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<String, ProviderError>;
}
