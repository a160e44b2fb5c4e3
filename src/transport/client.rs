// Site transport: IP-pinned reqwest client with relaxed TLS verification

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::resolver::{DohLookup, HostResolver, NameLookup, SystemLookup};
use super::PageFetcher;
use crate::errors::ProviderError;

const SITE_HOST: &str = "burning-series.io";
/// Last observed address of the catalog site, used when every resolver tier
/// fails.
const SITE_FALLBACK: Ipv4Addr = Ipv4Addr::new(104, 21, 53, 108);

const DOH_HOST: &str = "cloudflare-dns.com";
/// Anycast address of the DoH provider, reachable without any DNS at all.
const DOH_BOOTSTRAP: Ipv4Addr = Ipv4Addr::new(1, 1, 1, 1);

/// Transport configuration. Immutable once the client is built.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    /// Catalog site hostname.
    pub host: String,
    /// Hardcoded last-known-good address for the site.
    pub fallback_addr: IpAddr,
    /// DNS-over-HTTPS endpoint hostname.
    pub doh_host: String,
    /// Hardcoded address the bootstrap client dials to reach the DoH host.
    pub doh_bootstrap_addr: SocketAddr,
    /// Per-fetch timeout. Timeouts surface as fetch errors; the pipeline has
    /// no timeout handling of its own.
    pub timeout: Duration,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            host: SITE_HOST.to_string(),
            fallback_addr: IpAddr::V4(SITE_FALLBACK),
            doh_host: DOH_HOST.to_string(),
            doh_bootstrap_addr: SocketAddr::new(IpAddr::V4(DOH_BOOTSTRAP), 443),
            timeout: Duration::from_secs(30),
        }
    }
}

impl SiteConfig {
    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn with_fallback_addr(mut self, addr: IpAddr) -> Self {
        self.fallback_addr = addr;
        self
    }

    pub fn with_doh(mut self, host: &str, bootstrap_addr: SocketAddr) -> Self {
        self.doh_host = host.to_string();
        self.doh_bootstrap_addr = bootstrap_addr;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// HTTP client for the catalog site.
///
/// # Security trade-off
///
/// Requests are pinned to the address the layered resolver produced and TLS
/// certificate validation is disabled for this client, so that IP-direct
/// connections still succeed when hostname-based routing is poisoned and the
/// served certificate cannot be validated for the dialed address. The
/// relaxation is scoped to this one transport and this one origin; do not
/// reuse the client for anything else.
pub struct SiteClient {
    client: reqwest::Client,
    base: String,
    host: String,
}

impl SiteClient {
    /// Resolve the site host through the layered resolver and build the
    /// pinned client. The client is immutable afterwards and safe to share
    /// across fan-out branches.
    pub async fn connect(config: SiteConfig) -> Result<Self, ProviderError> {
        let mut tiers: Vec<Box<dyn NameLookup>> = Vec::new();
        match DohLookup::new(&config.doh_host, config.doh_bootstrap_addr, config.timeout) {
            Ok(doh) => tiers.push(Box::new(doh)),
            Err(e) => warn!("DoH tier unavailable: {e}"),
        }
        tiers.push(Box::new(SystemLookup));

        let resolver = HostResolver::new(tiers, Some(config.fallback_addr));
        let addr = resolver.resolve(&config.host).await?;

        let client = reqwest::Client::builder()
            .resolve(&config.host, SocketAddr::new(addr, 443))
            .danger_accept_invalid_certs(true)
            .timeout(config.timeout)
            .build()?;
        debug!(host = %config.host, %addr, "site transport ready");

        Ok(Self {
            client,
            base: format!("https://{}", config.host),
            host: config.host,
        })
    }

    /// Base URL of the site, e.g. `https://burning-series.io`.
    pub fn base_url(&self) -> &str {
        &self.base
    }

    fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}/{}", self.base, path.trim_start_matches('/'))
        }
    }

    async fn read_body(url: String, response: reqwest::Response) -> Result<String, ProviderError> {
        if !response.status().is_success() {
            return Err(ProviderError::Fetch {
                cause: format!("status {}", response.status()),
                url,
            });
        }
        response
            .text()
            .await
            .map_err(|e| ProviderError::fetch(&url, e))
    }
}

#[async_trait]
impl PageFetcher for SiteClient {
    async fn get(&self, path: &str) -> Result<String, ProviderError> {
        let url = self.absolute(path);
        let response = self
            .client
            .get(&url)
            .header("host", self.host.clone())
            .send()
            .await
            .map_err(|e| ProviderError::fetch(&url, e))?;
        Self::read_body(url, response).await
    }

    async fn post_form(
        &self,
        path: &str,
        fields: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<String, ProviderError> {
        let url = self.absolute(path);
        let mut request = self
            .client
            .post(&url)
            .header("host", self.host.clone())
            .form(&fields);
        if let Some(referer) = referer {
            request = request.header("referer", referer);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::fetch(&url, e))?;
        Self::read_body(url, response).await
    }
}
