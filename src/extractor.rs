// Pluggable stream-extractor capability and the output channels it feeds

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::models::{ResolvedStream, SubtitleTrack};

/// Output channels of stream resolution.
///
/// Streams and subtitle tracks arrive independently and incrementally; a
/// subtitle track may arrive before the stream that owns it.
pub trait StreamSink: Send + Sync {
    fn on_stream(&self, stream: ResolvedStream);
    fn on_subtitle(&self, track: SubtitleTrack);
}

/// External stream-extractor capability, supplied by the host environment and
/// selected by provider label. Its internals are opaque to the state machine;
/// the returned flag is the whole contract, and a failed extraction is not
/// retried.
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    /// Name of the extractor (for logging)
    fn name(&self) -> &'static str;

    /// Turn a hoster URL plus referer context into emitted streams and
    /// subtitle tracks. Returns whether extraction succeeded.
    async fn extract(&self, url: &str, referer: &str, sink: &dyn StreamSink) -> bool;
}

/// Extractors keyed by provider label. Matching is case-insensitive
/// containment in either direction, so a registration for "voe" handles a
/// hoster labelled "VOE.sx".
#[derive(Default, Clone)]
pub struct ExtractorRegistry {
    entries: Vec<(String, Arc<dyn StreamExtractor>)>,
}

impl ExtractorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, label: &str, extractor: Arc<dyn StreamExtractor>) {
        self.entries.push((label.to_lowercase(), extractor));
    }

    pub fn for_label(&self, label: &str) -> Option<&Arc<dyn StreamExtractor>> {
        let needle = label.to_lowercase();
        self.entries
            .iter()
            .find(|(key, _)| needle.contains(key.as_str()) || key.contains(&needle))
            .map(|(_, extractor)| extractor)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// [`StreamSink`] backed by two unbounded channels, for callers that prefer
/// consuming streams and subtitles as independent receivers.
pub struct ChannelSink {
    streams: mpsc::UnboundedSender<ResolvedStream>,
    subtitles: mpsc::UnboundedSender<SubtitleTrack>,
}

impl ChannelSink {
    pub fn new() -> (
        Self,
        mpsc::UnboundedReceiver<ResolvedStream>,
        mpsc::UnboundedReceiver<SubtitleTrack>,
    ) {
        let (stream_tx, stream_rx) = mpsc::unbounded_channel();
        let (subtitle_tx, subtitle_rx) = mpsc::unbounded_channel();
        (
            Self {
                streams: stream_tx,
                subtitles: subtitle_tx,
            },
            stream_rx,
            subtitle_rx,
        )
    }
}

impl StreamSink for ChannelSink {
    fn on_stream(&self, stream: ResolvedStream) {
        let _ = self.streams.send(stream);
    }

    fn on_subtitle(&self, track: SubtitleTrack) {
        let _ = self.subtitles.send(track);
    }
}
