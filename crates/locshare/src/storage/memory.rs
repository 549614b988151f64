//! In-process store backed by locked hash maps.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;

use tracing::debug;

use super::{link_not_found, poisoned, LinkStore, LocationStore, DEFAULT_HISTORY_CAPACITY};
use crate::error::{Error, Result};
use crate::link::{LinkId, LocationSample, TrackingLink};

/// Volatile store for links and location histories.
///
/// Each map has its own lock. An append and the eviction it triggers happen
/// under one write guard, so readers never see a history longer than
/// `capacity` or half of an append.
#[derive(Debug)]
pub struct MemoryStore {
    links: RwLock<HashMap<LinkId, TrackingLink>>,
    histories: RwLock<HashMap<LinkId, VecDeque<LocationSample>>>,
    capacity: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl MemoryStore {
    /// Create an empty store keeping at most `capacity` samples per link.
    ///
    /// A capacity of zero is raised to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            links: RwLock::new(HashMap::new()),
            histories: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Maximum samples kept per link.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl LinkStore for MemoryStore {
    fn insert(&self, link: TrackingLink) -> Result<()> {
        let mut links = self.links.write().map_err(|_| poisoned("link"))?;
        links.insert(link.link_id, link);
        Ok(())
    }

    fn get(&self, id: &LinkId) -> Result<TrackingLink> {
        let links = self.links.read().map_err(|_| poisoned("link"))?;
        links.get(id).cloned().ok_or_else(link_not_found)
    }

    fn has(&self, id: &LinkId) -> Result<bool> {
        let links = self.links.read().map_err(|_| poisoned("link"))?;
        Ok(links.contains_key(id))
    }

    fn deactivate(&self, id: &LinkId) -> Result<()> {
        let mut links = self.links.write().map_err(|_| poisoned("link"))?;
        let link = links.get_mut(id).ok_or_else(link_not_found)?;
        link.active = false;
        Ok(())
    }

    fn list(&self) -> Result<Vec<TrackingLink>> {
        let links = self.links.read().map_err(|_| poisoned("link"))?;
        Ok(links.values().cloned().collect())
    }
}

impl LocationStore for MemoryStore {
    fn create(&self, id: &LinkId) -> Result<()> {
        let mut histories = self.histories.write().map_err(|_| poisoned("history"))?;
        histories.entry(*id).or_default();
        Ok(())
    }

    fn append(&self, id: &LinkId, sample: LocationSample) -> Result<usize> {
        let mut histories = self.histories.write().map_err(|_| poisoned("history"))?;
        let history = histories.entry(*id).or_default();
        history.push_back(sample);
        while history.len() > self.capacity {
            history.pop_front();
            debug!("Evicted oldest sample for {id}");
        }
        Ok(history.len())
    }

    fn get(&self, id: &LinkId) -> Result<Vec<LocationSample>> {
        let histories = self.histories.read().map_err(|_| poisoned("history"))?;
        histories
            .get(id)
            .map(|history| history.iter().cloned().collect())
            .ok_or_else(|| Error::not_found("No history for link"))
    }

    fn has(&self, id: &LinkId) -> Result<bool> {
        let histories = self.histories.read().map_err(|_| poisoned("history"))?;
        Ok(histories.contains_key(id))
    }

    fn count(&self, id: &LinkId) -> Result<usize> {
        let histories = self.histories.read().map_err(|_| poisoned("history"))?;
        Ok(histories.get(id).map_or(0, VecDeque::len))
    }

    fn latest(&self, id: &LinkId) -> Result<Option<LocationSample>> {
        let histories = self.histories.read().map_err(|_| poisoned("history"))?;
        Ok(histories.get(id).and_then(|history| history.back().cloned()))
    }

    fn digest(&self, id: &LinkId) -> Result<(usize, Option<LocationSample>)> {
        let histories = self.histories.read().map_err(|_| poisoned("history"))?;
        Ok(histories
            .get(id)
            .map_or((0, None), |history| (history.len(), history.back().cloned())))
    }
}
