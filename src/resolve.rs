// Stream resolution state machine - per-episode hoster walk

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::errors::ProviderError;
use crate::extract;
use crate::extractor::{ExtractorRegistry, StreamSink};
use crate::models::{HosterCandidate, ResolvedStream};
use crate::transport::PageFetcher;

/// AJAX endpoint answering the direct-resolve POST.
const EMBED_ENDPOINT: &str = "/ajax/embed.php";

/// Terminal state of one hoster candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CandidateOutcome {
    Delegated,
    Skipped,
}

/// Direct-resolve response shape. Anything without a non-empty link is
/// treated as malformed.
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    link: Option<String>,
    quality: Option<String>,
}

/// Walks an episode's hoster candidates strictly in discovery order.
///
/// Candidates are attempted sequentially, never concurrently: a later
/// attempt may depend on referer context established by an earlier fetch,
/// so left-to-right order is part of the contract.
pub struct StreamResolver {
    fetcher: Arc<dyn PageFetcher>,
    extractors: ExtractorRegistry,
}

impl StreamResolver {
    pub fn new(fetcher: Arc<dyn PageFetcher>, extractors: ExtractorRegistry) -> Self {
        Self {
            fetcher,
            extractors,
        }
    }

    /// Resolve an episode locator into zero or more playable streams,
    /// delivered incrementally through `sink`.
    ///
    /// Skipped candidates never fail the call; zero emitted streams is still
    /// success. Only a failure to fetch the episode page itself is an error.
    pub async fn resolve_episode(
        &self,
        locator: &str,
        sink: &dyn StreamSink,
    ) -> Result<(), ProviderError> {
        let page = self.fetcher.get(locator).await?;

        for track in extract::subtitle_tracks(&page) {
            sink.on_subtitle(track);
        }

        let candidates = extract::hoster_candidates(&page, locator);
        debug!("{} hoster candidates for {locator}", candidates.len());

        for candidate in &candidates {
            match self.attempt(candidate, sink).await {
                CandidateOutcome::Delegated => {
                    debug!("hoster '{}' delegated", candidate.provider)
                }
                CandidateOutcome::Skipped => debug!("hoster '{}' skipped", candidate.provider),
            }
        }
        Ok(())
    }

    /// Probe -> Direct-Resolve -> Fallback-Resolve -> Delegate for one
    /// candidate. Fallback-Resolve scans the probe page already in hand, so
    /// it costs no extra fetch.
    async fn attempt(
        &self,
        candidate: &HosterCandidate,
        sink: &dyn StreamSink,
    ) -> CandidateOutcome {
        let probe = match self.fetcher.get(&candidate.reference).await {
            Ok(page) => page,
            Err(e) => {
                warn!("probe of '{}' failed: {e}", candidate.provider);
                return CandidateOutcome::Skipped;
            }
        };

        for track in extract::subtitle_tracks(&probe) {
            sink.on_subtitle(track);
        }

        let Some(link_id) = extract::embed_link_id(&probe) else {
            warn!("no link id on embed page of '{}'", candidate.provider);
            return CandidateOutcome::Skipped;
        };

        let resolved = match self.direct_resolve(&link_id, &candidate.reference).await {
            Some(resolved) => Some(resolved),
            None => extract::inline_stream_url(&probe).map(|url| (url, None)),
        };
        let Some((url, quality)) = resolved else {
            return CandidateOutcome::Skipped;
        };

        self.delegate(candidate, url, quality, sink).await
    }

    async fn direct_resolve(
        &self,
        link_id: &str,
        referer: &str,
    ) -> Option<(String, Option<String>)> {
        let body = match self
            .fetcher
            .post_form(EMBED_ENDPOINT, &[("LID", link_id), ("ticket", "")], Some(referer))
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!("direct resolve for LID {link_id} failed: {e}");
                return None;
            }
        };
        match serde_json::from_str::<EmbedResponse>(&body) {
            Ok(EmbedResponse {
                link: Some(link),
                quality,
            }) if !link.is_empty() => Some((link, quality)),
            _ => {
                warn!("malformed direct-resolve response for LID {link_id}");
                None
            }
        }
    }

    async fn delegate(
        &self,
        candidate: &HosterCandidate,
        url: String,
        quality: Option<String>,
        sink: &dyn StreamSink,
    ) -> CandidateOutcome {
        match self.extractors.for_label(&candidate.provider) {
            Some(extractor) => {
                debug!("delegating {url} to extractor '{}'", extractor.name());
                if extractor.extract(&url, &candidate.referer, sink).await {
                    CandidateOutcome::Delegated
                } else {
                    warn!(
                        "{}",
                        ProviderError::Delegate {
                            provider: candidate.provider.clone(),
                            url,
                        }
                    );
                    CandidateOutcome::Skipped
                }
            }
            None => {
                // No extractor registered for this label; the discovered URL
                // is emitted as-is.
                sink.on_stream(ResolvedStream {
                    url,
                    referer: candidate.referer.clone(),
                    subtitle_tracks: Vec::new(),
                    quality,
                });
                CandidateOutcome::Delegated
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::extractor::{ChannelSink, StreamExtractor};
    use crate::transport::testing::MockFetcher;

    const EPISODE: &str = r#"
        <script>tracks: [{file: "/sub/de.vtt", label: "Deutsch"}]</script>
        <ul class="hoster-tabs">
        <li><a href="/out/111" title="VOE">VOE</a></li>
        <li><a href="/out/222" title="Streamtape">Streamtape</a></li>
        </ul>"#;

    const EMBED_WITH_ID: &str = r#"<div class="player" data-lid="a1b2c3"></div>"#;
    const EMBED_WITH_ID_AND_INLINE: &str = r#"
        <div class="player" data-lid="a1b2c3"></div>
        <script>player.load({file: "https://cdn.example/inline.m3u8"});</script>"#;
    const EMBED_WITHOUT_ID: &str = r#"<p>maintenance</p>"#;

    #[derive(Default)]
    struct RecordingExtractor {
        calls: Mutex<Vec<(String, String)>>,
        succeed: bool,
    }

    impl RecordingExtractor {
        fn new(succeed: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                succeed,
            }
        }
    }

    #[async_trait]
    impl StreamExtractor for RecordingExtractor {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn extract(&self, url: &str, referer: &str, sink: &dyn StreamSink) -> bool {
            self.calls
                .lock()
                .unwrap()
                .push((url.to_string(), referer.to_string()));
            if self.succeed {
                sink.on_stream(ResolvedStream {
                    url: format!("{url}#extracted"),
                    referer: referer.to_string(),
                    subtitle_tracks: Vec::new(),
                    quality: None,
                });
            }
            self.succeed
        }
    }

    fn resolver(fetcher: Arc<MockFetcher>, extractors: ExtractorRegistry) -> StreamResolver {
        StreamResolver::new(fetcher, extractors)
    }

    #[tokio::test]
    async fn direct_resolve_emits_stream_with_quality_hint() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .page("/out/111", EMBED_WITH_ID)
                .page("/out/222", EMBED_WITHOUT_ID)
                .page(
                    EMBED_ENDPOINT,
                    r#"{"link": "https://cdn.example/direct.m3u8", "quality": "720p"}"#,
                ),
        );
        let (sink, mut streams, mut subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        // Episode-page subtitle arrived on its own channel, before the stream.
        assert_eq!(subtitles.try_recv().unwrap().label, "Deutsch");
        let stream = streams.try_recv().unwrap();
        assert_eq!(stream.url, "https://cdn.example/direct.m3u8");
        assert_eq!(stream.quality.as_deref(), Some("720p"));
        assert_eq!(stream.referer, "/serie/foo-bar/1/1-Pilot");
        assert!(streams.try_recv().is_err()); // second candidate had no id

        // The POST carried the link id and an empty ticket field.
        assert!(fetcher
            .calls()
            .iter()
            .any(|c| c == "POST /ajax/embed.php LID=a1b2c3&ticket="));
    }

    #[tokio::test]
    async fn candidates_are_attempted_strictly_in_discovery_order() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .page("/out/111", EMBED_WITHOUT_ID)
                .page("/out/222", EMBED_WITHOUT_ID),
        );
        let (sink, _streams, _subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        let gets: Vec<String> = fetcher
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("GET /out/"))
            .collect();
        assert_eq!(gets, vec!["GET /out/111", "GET /out/222"]);
    }

    #[tokio::test]
    async fn direct_resolve_failure_falls_back_to_inline_scan_before_next_candidate() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .page("/out/111", EMBED_WITH_ID_AND_INLINE)
                .page("/out/222", EMBED_WITHOUT_ID)
                .failing(EMBED_ENDPOINT),
        );
        let (sink, mut streams, _subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        // The fallback stream of candidate one was emitted before candidate
        // two was even probed.
        assert_eq!(
            streams.try_recv().unwrap().url,
            "https://cdn.example/inline.m3u8"
        );
        let calls = fetcher.calls();
        let post_pos = calls
            .iter()
            .position(|c| c.starts_with("POST /ajax/embed.php"))
            .unwrap();
        let second_probe_pos = calls.iter().position(|c| c == "GET /out/222").unwrap();
        assert!(post_pos < second_probe_pos);
    }

    #[tokio::test]
    async fn malformed_direct_resolve_response_also_falls_back() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .page("/out/111", EMBED_WITH_ID_AND_INLINE)
                .page("/out/222", EMBED_WITHOUT_ID)
                .page(EMBED_ENDPOINT, r#"{"link": ""}"#),
        );
        let (sink, mut streams, _subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        assert_eq!(
            streams.try_recv().unwrap().url,
            "https://cdn.example/inline.m3u8"
        );
    }

    #[tokio::test]
    async fn registered_extractor_gets_the_delegate_and_its_failure_skips() {
        let voe = Arc::new(RecordingExtractor::new(true));
        let tape = Arc::new(RecordingExtractor::new(false));
        let mut registry = ExtractorRegistry::new();
        registry.register("voe", Arc::clone(&voe) as Arc<dyn StreamExtractor>);
        registry.register("streamtape", Arc::clone(&tape) as Arc<dyn StreamExtractor>);

        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .page("/out/111", EMBED_WITH_ID)
                .page("/out/222", EMBED_WITH_ID)
                .page(
                    EMBED_ENDPOINT,
                    r#"{"link": "https://hoster.example/e/xyz"}"#,
                ),
        );
        let (sink, mut streams, _subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), registry)
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        // Both extractors were invoked with the discovered URL and the
        // episode page as referer context.
        assert_eq!(
            voe.calls.lock().unwrap().as_slice(),
            &[(
                "https://hoster.example/e/xyz".to_string(),
                "/serie/foo-bar/1/1-Pilot".to_string()
            )]
        );
        assert_eq!(tape.calls.lock().unwrap().len(), 1);

        // Only the succeeding extractor emitted; the failing one was skipped
        // without being retried.
        assert_eq!(
            streams.try_recv().unwrap().url,
            "https://hoster.example/e/xyz#extracted"
        );
        assert!(streams.try_recv().is_err());
    }

    #[tokio::test]
    async fn all_candidates_skipped_is_still_success_with_zero_streams() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .page("/serie/foo-bar/1/1-Pilot", EPISODE)
                .failing("/out/111")
                .page("/out/222", EMBED_WITHOUT_ID),
        );
        let (sink, mut streams, _subtitles) = ChannelSink::new();

        resolver(Arc::clone(&fetcher), ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await
            .unwrap();

        assert!(streams.try_recv().is_err());
    }

    #[tokio::test]
    async fn episode_page_fetch_failure_is_the_only_call_level_error() {
        let fetcher = Arc::new(MockFetcher::new().failing("/serie/foo-bar/1/1-Pilot"));
        let (sink, _streams, _subtitles) = ChannelSink::new();

        let result = resolver(fetcher, ExtractorRegistry::new())
            .resolve_episode("/serie/foo-bar/1/1-Pilot", &sink)
            .await;
        assert!(result.is_err());
    }
}
