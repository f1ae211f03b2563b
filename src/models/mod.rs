//! Core data models for the geocoding engine.

pub mod document;
pub mod place;

pub use document::{decode_stored, DocumentError, IndexedDocument};
pub use place::{PlaceRecord, UNKNOWN_POPULATION};
