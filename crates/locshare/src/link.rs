//! Core data types for locshare.
//!
//! A [`TrackingLink`] names one sharing session; each accepted location report
//! becomes a [`LocationSample`] in that link's history.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner recorded when a link is created without one.
pub const ANONYMOUS_OWNER: &str = "anonymous";

/// Device recorded when a report arrives without one.
pub const UNKNOWN_DEVICE: &str = "unknown";

/// Opaque 128-bit link identifier, rendered as a hyphenated lowercase UUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(Uuid);

impl LinkId {
    /// Draw a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an identifier from caller input.
    ///
    /// Returns `None` for anything that is not a UUID; callers treat that the
    /// same as an identifier nobody ever issued.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    /// The first eight characters of the canonical form.
    #[must_use]
    pub fn short(&self) -> String {
        let mut s = self.to_string();
        s.truncate(8);
        s
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl From<Uuid> for LinkId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// A sharing link and its activation state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackingLink {
    /// Identifier, fixed at creation.
    pub link_id: LinkId,
    /// Free-form owner tag, fixed at creation.
    pub owner_tag: String,
    /// When the link was created.
    pub created_at: DateTime<Utc>,
    /// Whether the link still accepts location reports. Once false, stays false.
    pub active: bool,
}

impl TrackingLink {
    /// Create a new active link owned by `owner_tag` (or [`ANONYMOUS_OWNER`]).
    #[must_use]
    pub fn new(owner_tag: Option<&str>) -> Self {
        let owner_tag = owner_tag
            .filter(|tag| !tag.is_empty())
            .unwrap_or(ANONYMOUS_OWNER)
            .to_string();
        Self {
            link_id: LinkId::generate(),
            owner_tag,
            created_at: Utc::now(),
            active: true,
        }
    }
}

/// One accepted location report.
///
/// Coordinates are stored exactly as coerced from the request, `NaN` included;
/// `NaN` serializes as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Server-assigned ingestion time.
    pub timestamp: DateTime<Utc>,
    /// Reporting device.
    pub device_id: String,
}

impl LocationSample {
    /// Build a sample stamped with the current time.
    #[must_use]
    pub fn new(latitude: f64, longitude: f64, device_id: Option<String>) -> Self {
        Self {
            latitude,
            longitude,
            timestamp: Utc::now(),
            device_id: device_id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| UNKNOWN_DEVICE.to_string()),
        }
    }
}
