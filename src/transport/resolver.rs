// Layered name resolution: DoH, then system resolver, then last-known-good

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::ProviderError;

/// One tier of the address resolution chain.
#[async_trait]
pub trait NameLookup: Send + Sync {
    /// Name of the tier (for logging)
    fn name(&self) -> &'static str;

    async fn lookup(&self, host: &str) -> Result<IpAddr, ProviderError>;
}

/// DNS-over-HTTPS tier.
///
/// The DoH endpoint is itself reached through a bootstrap client pinned to a
/// hardcoded address, which breaks the "need DNS to reach the DNS server"
/// cycle when the platform resolver is poisoned or blocked.
pub struct DohLookup {
    client: reqwest::Client,
    endpoint: String,
}

impl DohLookup {
    pub fn new(
        doh_host: &str,
        bootstrap_addr: SocketAddr,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .resolve(doh_host, bootstrap_addr)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("https://{doh_host}/dns-query"),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[async_trait]
impl NameLookup for DohLookup {
    fn name(&self) -> &'static str {
        "doh"
    }

    async fn lookup(&self, host: &str) -> Result<IpAddr, ProviderError> {
        let url = format!("{}?name={}&type=A", self.endpoint, host);
        let response = self
            .client
            .get(&url)
            .header("accept", "application/dns-json")
            .send()
            .await
            .map_err(|e| ProviderError::fetch(&url, e))?;
        let parsed: DohResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::fetch(&url, e))?;

        // Type 1 is an A record; CNAME chains show up as other types.
        parsed
            .answer
            .iter()
            .filter(|a| a.record_type == 1)
            .find_map(|a| a.data.parse().ok())
            .ok_or_else(|| ProviderError::Resolution {
                host: host.to_string(),
            })
    }
}

/// Platform resolver tier.
pub struct SystemLookup;

#[async_trait]
impl NameLookup for SystemLookup {
    fn name(&self) -> &'static str {
        "system"
    }

    async fn lookup(&self, host: &str) -> Result<IpAddr, ProviderError> {
        let mut addrs = tokio::net::lookup_host((host, 443))
            .await
            .map_err(|e| ProviderError::fetch(host, e))?;
        addrs
            .next()
            .map(|a| a.ip())
            .ok_or_else(|| ProviderError::Resolution {
                host: host.to_string(),
            })
    }
}

/// Walks the tier list in order. A single tier failing must not fail the
/// resolution; when every tier misses, the hardcoded last-known-good address
/// is used.
pub struct HostResolver {
    tiers: Vec<Box<dyn NameLookup>>,
    fallback: Option<IpAddr>,
}

impl HostResolver {
    pub fn new(tiers: Vec<Box<dyn NameLookup>>, fallback: Option<IpAddr>) -> Self {
        Self { tiers, fallback }
    }

    pub async fn resolve(&self, host: &str) -> Result<IpAddr, ProviderError> {
        for tier in &self.tiers {
            match tier.lookup(host).await {
                Ok(addr) => {
                    debug!(tier = tier.name(), %addr, "resolved {host}");
                    return Ok(addr);
                }
                Err(e) => warn!(tier = tier.name(), "lookup for {host} failed: {e}"),
            }
        }
        match self.fallback {
            Some(addr) => {
                debug!(%addr, "using last-known-good address for {host}");
                Ok(addr)
            }
            None => Err(ProviderError::Resolution {
                host: host.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;

    struct ScriptedLookup {
        label: &'static str,
        answer: Option<IpAddr>,
        calls: Arc<AtomicUsize>,
    }

    impl ScriptedLookup {
        fn new(label: &'static str, answer: Option<IpAddr>) -> (Box<Self>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Box::new(Self {
                    label,
                    answer,
                    calls: Arc::clone(&calls),
                }),
                calls,
            )
        }
    }

    #[async_trait]
    impl NameLookup for ScriptedLookup {
        fn name(&self) -> &'static str {
            self.label
        }

        async fn lookup(&self, host: &str) -> Result<IpAddr, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.answer.ok_or_else(|| ProviderError::Resolution {
                host: host.to_string(),
            })
        }
    }

    fn addr(last: u8) -> IpAddr {
        IpAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, last))
    }

    #[tokio::test]
    async fn first_tier_answer_short_circuits() {
        let (doh, doh_calls) = ScriptedLookup::new("doh", Some(addr(1)));
        let (system, system_calls) = ScriptedLookup::new("system", Some(addr(2)));
        let tiers: Vec<Box<dyn NameLookup>> = vec![doh, system];
        let resolver = HostResolver::new(tiers, Some(addr(9)));

        let resolved = resolver.resolve("example.test").await.unwrap();
        assert_eq!(resolved, addr(1));
        assert_eq!(doh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(system_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn doh_failure_falls_through_to_system_exactly_once() {
        let (doh, doh_calls) = ScriptedLookup::new("doh", None);
        let (system, system_calls) = ScriptedLookup::new("system", Some(addr(2)));
        let tiers: Vec<Box<dyn NameLookup>> = vec![doh, system];
        let resolver = HostResolver::new(tiers, Some(addr(9)));

        let resolved = resolver.resolve("example.test").await.unwrap();
        assert_eq!(resolved, addr(2));
        assert_eq!(doh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(system_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_tiers_failing_uses_hardcoded_fallback() {
        let (doh, _) = ScriptedLookup::new("doh", None);
        let (system, _) = ScriptedLookup::new("system", None);
        let tiers: Vec<Box<dyn NameLookup>> = vec![doh, system];
        let resolver = HostResolver::new(tiers, Some(addr(9)));

        let resolved = resolver.resolve("example.test").await.unwrap();
        assert_eq!(resolved, addr(9));
    }

    #[tokio::test]
    async fn exhausted_tiers_without_fallback_is_an_error() {
        let (doh, _) = ScriptedLookup::new("doh", None);
        let tiers: Vec<Box<dyn NameLookup>> = vec![doh];
        let resolver = HostResolver::new(tiers, None);

        let err = resolver.resolve("example.test").await.unwrap_err();
        assert!(matches!(err, ProviderError::Resolution { host } if host == "example.test"));
    }
}
