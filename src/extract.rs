// HTML extraction - pure functions over fetched documents
//
// Matching is markup-structural: tag/attribute patterns, not full semantic
// parsing. Nodes that do not fit the expected shape are skipped silently;
// the contract is best-effort extraction from a page whose layout may drift.

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::models::{CatalogEntry, EpisodeRef, HosterCandidate, MediaKind, SubtitleTrack};

lazy_static! {
    static ref ANCHOR_SEL: Selector = Selector::parse("a[href]").unwrap();
    static ref HEADING_SEL: Selector = Selector::parse("h2").unwrap();
    static ref TITLE_SEL: Selector = Selector::parse("title").unwrap();
    static ref OG_IMAGE_SEL: Selector =
        Selector::parse(r#"meta[property="og:image"]"#).unwrap();
    static ref SERIES_IMAGE_SEL: Selector = Selector::parse("div.serie img[src]").unwrap();
    static ref SYNOPSIS_SEL: Selector = Selector::parse("p.synopsis").unwrap();
    static ref DESCRIPTION_SEL: Selector =
        Selector::parse(r#"meta[name="description"]"#).unwrap();
    static ref SEASON_LINK_SEL: Selector = Selector::parse("#seasons a[href]").unwrap();
    static ref EPISODE_ROW_SEL: Selector = Selector::parse("table.episodes tr").unwrap();
    static ref CELL_SEL: Selector = Selector::parse("td").unwrap();
    static ref HOSTER_LINK_SEL: Selector =
        Selector::parse("ul.hoster-tabs li a[href]").unwrap();
    static ref SCRIPT_SEL: Selector = Selector::parse("script").unwrap();

    static ref SERIES_HREF_RE: Regex = Regex::new(r"^/?serie/[^/]+/?$").unwrap();
    static ref SEASON_HREF_RE: Regex = Regex::new(r"^/?serie/[^/]+/\d+/?$").unwrap();
    static ref LEADING_NUMBER_RE: Regex = Regex::new(r"^\s*(\d+)").unwrap();
    static ref LINK_ID_ATTR_RE: Regex = Regex::new(r#"data-lid="([A-Za-z0-9]+)""#).unwrap();
    static ref LINK_ID_SCRIPT_RE: Regex =
        Regex::new(r#"LID\s*[:=]\s*['"]([A-Za-z0-9]+)['"]"#).unwrap();
    static ref STREAM_URL_RE: Regex =
        Regex::new(r#"https?://[^"'\s\\]+\.(?:m3u8|mp4)[^"'\s\\]*"#).unwrap();
    static ref TRACK_OBJECT_RE: Regex = Regex::new(r"\{[^{}]*\.vtt[^{}]*\}").unwrap();
    static ref TRACK_FILE_RE: Regex =
        Regex::new(r#"["']?file["']?\s*:\s*["']([^"']+)["']"#).unwrap();
    static ref TRACK_LABEL_RE: Regex =
        Regex::new(r#"["']?label["']?\s*:\s*["']([^"']+)["']"#).unwrap();
}

/// Series page header: everything but the seasons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesHeader {
    pub title: String,
    pub poster: Option<String>,
    pub synopsis: Option<String>,
}

/// Normalize a site href to a rooted path; absolute URLs pass through.
pub fn site_path(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else {
        format!("/{}", href.trim_start_matches('/'))
    }
}

/// Parse the leading integer of a label, if any.
pub fn leading_number(text: &str) -> Option<u32> {
    LEADING_NUMBER_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

fn anchor_label(anchor: &ElementRef) -> String {
    anchor
        .value()
        .attr("title")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| collected_text(anchor))
}

fn collected_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}

/// Text directly inside the element, excluding nested tags.
fn own_text(element: &ElementRef) -> String {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Entries from the listing page whose visible label contains `query`
/// case-insensitively, in document order. An empty query matches everything.
pub fn catalog_entries(html: &str, query: &str) -> Vec<CatalogEntry> {
    let doc = Html::parse_document(html);
    let needle = query.to_lowercase();

    doc.select(&ANCHOR_SEL)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if !SERIES_HREF_RE.is_match(href) {
                return None;
            }
            let label = anchor_label(&anchor);
            if label.is_empty() || !label.to_lowercase().contains(&needle) {
                return None;
            }
            Some(CatalogEntry {
                display_name: label,
                detail_page: site_path(href),
                poster: None,
                kind: MediaKind::Series,
            })
        })
        .collect()
}

/// Title, poster and synopsis of a series page.
pub fn series_header(html: &str) -> SeriesHeader {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&HEADING_SEL)
        .next()
        .map(|h| {
            let direct = own_text(&h);
            if direct.is_empty() {
                collected_text(&h)
            } else {
                direct
            }
        })
        .filter(|t| !t.is_empty())
        .or_else(|| {
            doc.select(&TITLE_SEL)
                .next()
                .map(|t| collected_text(&t))
        })
        .unwrap_or_default();

    let poster = doc
        .select(&OG_IMAGE_SEL)
        .next()
        .and_then(|m| m.value().attr("content"))
        .or_else(|| {
            doc.select(&SERIES_IMAGE_SEL)
                .next()
                .and_then(|img| img.value().attr("src"))
        })
        .map(site_path);

    let synopsis = doc
        .select(&SYNOPSIS_SEL)
        .next()
        .map(|p| collected_text(&p))
        .filter(|s| !s.is_empty())
        .or_else(|| {
            doc.select(&DESCRIPTION_SEL)
                .next()
                .and_then(|m| m.value().attr("content"))
                .map(str::to_string)
        });

    SeriesHeader {
        title,
        poster,
        synopsis,
    }
}

/// Season links of a series page: `(label, rooted href)` in page order,
/// deduplicated. Falls back to scanning every anchor whose href matches the
/// season path shape when the seasons container is absent.
pub fn season_links(html: &str) -> Vec<(String, String)> {
    let doc = Html::parse_document(html);

    fn push_unique(links: &mut Vec<(String, String)>, label: String, href: String) {
        if !links.iter().any(|(_, existing)| *existing == href) {
            links.push((label, href));
        }
    }

    let mut links: Vec<(String, String)> = Vec::new();
    for anchor in doc.select(&SEASON_LINK_SEL) {
        if let Some(href) = anchor.value().attr("href") {
            push_unique(&mut links, anchor_label(&anchor), site_path(href));
        }
    }
    if links.is_empty() {
        for anchor in doc.select(&ANCHOR_SEL) {
            if let Some(href) = anchor.value().attr("href") {
                if SEASON_HREF_RE.is_match(href) {
                    push_unique(&mut links, anchor_label(&anchor), site_path(href));
                }
            }
        }
    }
    links
}

/// Episode rows of a season page, in table order. The episode number falls
/// back to the 1-based position of the row when nothing parseable is found.
pub fn episodes(html: &str) -> Vec<EpisodeRef> {
    let doc = Html::parse_document(html);

    let mut found = Vec::new();
    for row in doc.select(&EPISODE_ROW_SEL) {
        let Some(anchor) = row.select(&ANCHOR_SEL).next() else {
            continue;
        };
        let Some(href) = anchor.value().attr("href") else {
            continue;
        };
        let title = anchor_label(&anchor);
        if title.is_empty() {
            continue;
        }

        let from_cell = row
            .select(&CELL_SEL)
            .next()
            .and_then(|cell| leading_number(&collected_text(&cell)));
        let from_href = href
            .rsplit('/')
            .next()
            .and_then(leading_number);
        let number = from_cell
            .or(from_href)
            .unwrap_or(found.len() as u32 + 1)
            .max(1);

        found.push(EpisodeRef {
            title,
            number,
            locator: site_path(href),
        });
    }
    found
}

/// Hoster candidates of an episode page, in discovery order.
pub fn hoster_candidates(html: &str, referer: &str) -> Vec<HosterCandidate> {
    let doc = Html::parse_document(html);

    doc.select(&HOSTER_LINK_SEL)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            let provider = anchor_label(&anchor);
            if provider.is_empty() {
                return None;
            }
            Some(HosterCandidate {
                provider,
                reference: site_path(href),
                referer: referer.to_string(),
            })
        })
        .collect()
}

/// Internal link identifier of an embed page, from the player markup or the
/// inline player setup.
pub fn embed_link_id(html: &str) -> Option<String> {
    LINK_ID_ATTR_RE
        .captures(html)
        .or_else(|| LINK_ID_SCRIPT_RE.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First stream URL embedded in inline script content, if any.
pub fn inline_stream_url(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    for script in doc.select(&SCRIPT_SEL) {
        let body = script.text().collect::<String>();
        if let Some(hit) = STREAM_URL_RE.find(&body) {
            return Some(hit.as_str().to_string());
        }
    }
    None
}

/// Subtitle tracks declared in inline player setup blocks.
pub fn subtitle_tracks(html: &str) -> Vec<SubtitleTrack> {
    let doc = Html::parse_document(html);

    let mut tracks = Vec::new();
    for script in doc.select(&SCRIPT_SEL) {
        let body = script.text().collect::<String>();
        for object in TRACK_OBJECT_RE.find_iter(&body) {
            let text = object.as_str();
            let Some(file) = TRACK_FILE_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
            else {
                continue;
            };
            let label = TRACK_LABEL_RE
                .captures(text)
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
                .unwrap_or_else(|| "Untitled".to_string());
            tracks.push(SubtitleTrack { label, url: file });
        }
    }
    tracks
}
