// Record types produced by the scraping pipeline

use serde::{Deserialize, Serialize};

/// Kind of content a catalog entry points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MediaKind {
    #[default]
    Series,
    Movie,
}

/// One hit from the listing page.
///
/// Ephemeral: reconstructed per query, never persisted. The poster is filled
/// in by the search fan-out when the entry's detail page yields one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub display_name: String,
    pub detail_page: String,
    pub poster: Option<String>,
    pub kind: MediaKind,
}

/// Series page plus every season's episode list.
///
/// Seasons keep the order their links appeared on the page, which is not
/// necessarily numeric order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesDetail {
    pub title: String,
    pub poster: Option<String>,
    pub synopsis: Option<String>,
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    /// Always >= 1; falls back to the link's 1-based position when the
    /// source page carries no parseable number.
    pub number: u32,
    pub episodes: Vec<EpisodeRef>,
}

/// A single episode row.
///
/// `locator` re-fetches the episode page later and is the sole input to
/// stream resolution; it stays resolvable after the owning [`SeriesDetail`]
/// is gone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpisodeRef {
    pub title: String,
    /// Always >= 1; falls back to the row's 1-based position.
    pub number: u32,
    pub locator: String,
}

/// A third-party hosting page discovered on an episode page.
///
/// Discovery order defines resolution attempt order; candidates are not
/// ranked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HosterCandidate {
    pub provider: String,
    pub reference: String,
    /// Episode page URL, carried explicitly so later requests and the
    /// external extractor can present a legitimate navigation.
    pub referer: String,
}

/// Terminal artifact emitted to the caller. Never persisted by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedStream {
    pub url: String,
    pub referer: String,
    pub subtitle_tracks: Vec<SubtitleTrack>,
    pub quality: Option<String>,
}

/// Subtitle track descriptor, delivered on its own channel since tracks may
/// arrive before the stream that owns them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleTrack {
    pub label: String,
    pub url: String,
}
