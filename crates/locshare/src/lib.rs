//! `locshare` - Location sharing links with bounded location history
//!
//! This library issues sharing links, renders the page that asks a visitor to
//! share their location, ingests the reports that page sends, and keeps a
//! capped, insertion-ordered history per link in memory.

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

pub mod artifact;
pub mod cli;
pub mod config;
pub mod error;
pub mod http;
pub mod ingest;
pub mod lifecycle;
pub mod link;
pub mod logging;
pub mod server;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
pub use lifecycle::LinkService;
pub use link::{LinkId, LocationSample, TrackingLink};
pub use logging::init_logging;
pub use storage::{LinkStore, LocationStore, MemoryStore};
