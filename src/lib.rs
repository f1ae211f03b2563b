//! Meridian - reverse geocoding over a persistent geohash index
//!
//! This library provides the index builder and reader plus the shared types
//! used by the ingest and query binaries.

pub mod config;
pub mod dataset;
pub mod error;
pub mod geodesy;
pub mod index;
pub mod models;
pub mod service;

pub use config::{CandidateWindow, EngineConfig};
pub use error::{BuildError, ConfigError, DatasetError, OpenError, QueryError};
pub use index::{build_index, open_index, BuildReport, IndexReader, ScoredPlace};
pub use models::PlaceRecord;
pub use service::ReverseGeocoder;
