//! Link lifecycle: creation, lookup, deactivation, and history queries.

use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::link::{LinkId, LocationSample, TrackingLink};
use crate::storage::{LinkStore, LocationStore};

/// Protocol and host of the request being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOrigin {
    /// `http` or `https`.
    pub scheme: String,
    /// `host[:port]`.
    pub host: String,
}

impl RequestOrigin {
    /// Build an origin from its parts.
    #[must_use]
    pub fn new(scheme: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
        }
    }

    /// `scheme://host`.
    #[must_use]
    pub fn base(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }
}

/// A freshly created link and the URLs that reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedLink {
    /// The stored link.
    pub link: TrackingLink,
    /// Viewer page for the link owner.
    pub shareable_link: String,
    /// Served sharing page.
    pub media_url: String,
    /// Downloadable sharing page.
    pub download_url: String,
}

/// A link with a digest of its history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSummary {
    /// The link itself.
    #[serde(flatten)]
    pub link: TrackingLink,
    /// Samples currently held.
    pub location_count: usize,
    /// Most recent sample, if any.
    pub latest_location: Option<LocationSample>,
}

/// The full history for one link.
#[derive(Debug, Clone, PartialEq)]
pub struct History {
    /// Samples, oldest first.
    pub locations: Vec<LocationSample>,
    /// Most recent sample, if any.
    pub latest: Option<LocationSample>,
}

impl History {
    /// Number of samples.
    #[must_use]
    pub fn count(&self) -> usize {
        self.locations.len()
    }
}

/// Creates, deactivates and queries links.
#[derive(Clone)]
pub struct LinkService {
    links: Arc<dyn LinkStore>,
    locations: Arc<dyn LocationStore>,
    viewer_url: String,
    backend_url: Option<String>,
}

impl std::fmt::Debug for LinkService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkService")
            .field("viewer_url", &self.viewer_url)
            .field("backend_url", &self.backend_url)
            .finish_non_exhaustive()
    }
}

impl LinkService {
    /// Create a service over the given stores.
    #[must_use]
    pub fn new(
        links: Arc<dyn LinkStore>,
        locations: Arc<dyn LocationStore>,
        config: &Config,
    ) -> Self {
        Self {
            links,
            locations,
            viewer_url: config.urls.viewer_url.clone(),
            backend_url: config.urls.backend_url.clone(),
        }
    }

    /// The origin reports should be posted to.
    ///
    /// A configured backend URL wins; otherwise the origin of the current
    /// request is used, so a downloaded page keeps pointing at the server that
    /// produced it.
    #[must_use]
    pub fn api_base(&self, origin: &RequestOrigin) -> String {
        self.backend_url
            .clone()
            .unwrap_or_else(|| origin.base())
    }

    /// Issue a new active link with an empty history.
    ///
    /// # Errors
    ///
    /// Returns an internal error if either store cannot be written.
    pub fn create(&self, owner_tag: Option<&str>, origin: &RequestOrigin) -> Result<CreatedLink> {
        let link = TrackingLink::new(owner_tag);
        let id = link.link_id;

        self.locations.create(&id)?;
        self.links.insert(link.clone())?;
        info!("Created link {id} for {}", link.owner_tag);

        let api_base = self.api_base(origin);
        Ok(CreatedLink {
            shareable_link: format!("{}/track/{id}", self.viewer_url),
            media_url: format!("{api_base}/api/media/{id}"),
            download_url: format!("{api_base}/api/download/{id}"),
            link,
        })
    }

    /// Look up a link.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub fn get(&self, id: &LinkId) -> Result<TrackingLink> {
        self.links.get(id)
    }

    /// Look up a link with its sample count and latest sample.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub fn summary(&self, id: &LinkId) -> Result<LinkSummary> {
        let link = self.links.get(id)?;
        self.summarize(link)
    }

    /// Turn a link off for good. Repeating the call is harmless.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    pub fn deactivate(&self, id: &LinkId) -> Result<()> {
        self.links.deactivate(id)?;
        info!("Deactivated link {id}");
        Ok(())
    }

    /// Every link owned by `owner_tag`, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the stores cannot be read.
    pub fn list_by_owner(&self, owner_tag: &str) -> Result<Vec<LinkSummary>> {
        self.links
            .list()?
            .into_iter()
            .filter(|link| link.owner_tag == owner_tag)
            .map(|link| self.summarize(link))
            .collect()
    }

    /// The history for `id`. Unknown ids have an empty history.
    ///
    /// # Errors
    ///
    /// Returns an internal error if the location store cannot be read.
    pub fn history(&self, id: Option<&LinkId>) -> Result<History> {
        let Some(id) = id else {
            return Ok(History {
                locations: Vec::new(),
                latest: None,
            });
        };
        let locations = match self.locations.get(id) {
            Ok(locations) => locations,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        let latest = locations.last().cloned();
        Ok(History { locations, latest })
    }

    fn summarize(&self, link: TrackingLink) -> Result<LinkSummary> {
        let (location_count, latest_location) = self.locations.digest(&link.link_id)?;
        Ok(LinkSummary {
            link,
            location_count,
            latest_location,
        })
    }
}
