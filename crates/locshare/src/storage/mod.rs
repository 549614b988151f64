//! Storage layer for locshare.
//!
//! Links and their location histories live behind two traits so the service
//! never depends on a particular backing store. [`MemoryStore`] is the only
//! implementation; everything it holds is lost on restart.

mod memory;

pub use memory::MemoryStore;

use crate::error::{Error, Result};
use crate::link::{LinkId, LocationSample, TrackingLink};

/// Default number of samples kept per link.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Keyed registry of tracking links.
pub trait LinkStore: Send + Sync {
    /// Insert a newly created link.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn insert(&self, link: TrackingLink) -> Result<()>;

    /// Look up a link. Absent ids are [`Error::NotFound`], never a default.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids, or an internal error if the store
    /// cannot be read.
    fn get(&self, id: &LinkId) -> Result<TrackingLink>;

    /// Check whether a link exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn has(&self, id: &LinkId) -> Result<bool>;

    /// Mark a link inactive. Deactivating an inactive link succeeds.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown ids.
    fn deactivate(&self, id: &LinkId) -> Result<()>;

    /// Snapshot of every link, in no particular order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn list(&self) -> Result<Vec<TrackingLink>>;
}

/// Keyed registry of bounded, insertion-ordered location histories.
pub trait LocationStore: Send + Sync {
    /// Start an empty history for `id`. An existing history is left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn create(&self, id: &LinkId) -> Result<()>;

    /// Append a sample, evicting the oldest once capacity is exceeded.
    ///
    /// Returns the history length after the append. A history that does not
    /// exist yet is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    fn append(&self, id: &LinkId, sample: LocationSample) -> Result<usize>;

    /// All samples for `id`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if no history exists for `id`.
    fn get(&self, id: &LinkId) -> Result<Vec<LocationSample>>;

    /// Check whether a history exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn has(&self, id: &LinkId) -> Result<bool>;

    /// Number of samples held for `id`; zero when there is no history.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn count(&self, id: &LinkId) -> Result<usize>;

    /// Most recent sample for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn latest(&self, id: &LinkId) -> Result<Option<LocationSample>>;

    /// Sample count and most recent sample for `id`, read as one snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn digest(&self, id: &LinkId) -> Result<(usize, Option<LocationSample>)>;
}

fn poisoned(what: &str) -> Error {
    Error::internal(format!("{what} lock poisoned"))
}

fn link_not_found() -> Error {
    Error::not_found("Link not found")
}
