// Scrape orchestration - query/catalog/detail fan-out with stable joins

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use crate::errors::ProviderError;
use crate::extract;
use crate::models::{CatalogEntry, Season, SeriesDetail};
use crate::transport::PageFetcher;

/// Listing page that enumerates every series on the site.
const LISTING_PATH: &str = "/andere-serien";

/// Drives query -> catalog -> detail -> season -> episode.
///
/// Every fan-out is a join-all with the result sequence reassembled in
/// request order, so repeated calls against an unchanged page are
/// deterministic. Dropping the returned future abandons all outstanding
/// branches.
pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
}

impl Orchestrator {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self { fetcher }
    }

    /// One listing fetch, filter, then one concurrent detail fetch per hit to
    /// pick up its poster. A branch that finds no poster degrades to `None`
    /// for that entry only; the listing fetch is the only call-level error.
    pub async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, ProviderError> {
        let listing = self.fetcher.get(LISTING_PATH).await?;
        let entries = extract::catalog_entries(&listing, query);
        debug!("{} catalog entries match '{query}'", entries.len());

        let enriched = join_all(entries.into_iter().map(|mut entry| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                match fetcher.get(&entry.detail_page).await {
                    Ok(page) => entry.poster = extract::series_header(&page).poster,
                    Err(e) => warn!("poster lookup for '{}' failed: {e}", entry.display_name),
                }
                entry
            }
        }))
        .await;
        Ok(enriched)
    }

    /// Series page fetch, then one concurrent fetch per season link with the
    /// episodes extracted inside each branch. Seasons keep link order; a
    /// failed season branch drops out without touching its siblings.
    pub async fn load_detail(&self, reference: &str) -> Result<SeriesDetail, ProviderError> {
        let page = self.fetcher.get(reference).await?;
        let header = extract::series_header(&page);
        let links = extract::season_links(&page);
        debug!("'{}' has {} season links", header.title, links.len());

        let seasons = join_all(links.into_iter().enumerate().map(|(index, (label, href))| {
            let fetcher = Arc::clone(&self.fetcher);
            async move {
                let number = extract::leading_number(&label)
                    .unwrap_or(index as u32 + 1)
                    .max(1);
                match fetcher.get(&href).await {
                    Ok(doc) => Some(Season {
                        number,
                        episodes: extract::episodes(&doc),
                    }),
                    Err(e) => {
                        warn!("season fetch {href} failed: {e}");
                        None
                    }
                }
            }
        }))
        .await;

        Ok(SeriesDetail {
            title: header.title,
            poster: header.poster,
            synopsis: header.synopsis,
            seasons: seasons.into_iter().flatten().collect(),
        })
    }
}
