//! Persisted form of a place.
//!
//! Stored fields are JSON framed with an xxh64 checksum:
//! `[checksum: u64 BE][json]`. The spatial terms are not part of the stored
//! value; they become postings in the terms tree.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xxhash_rust::xxh64::xxh64;

use super::PlaceRecord;
use crate::index::prefix_tree;

const CHECKSUM_SEED: u64 = 0;
const CHECKSUM_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("stored value is {0} bytes, shorter than its checksum")]
    Truncated(usize),

    #[error("checksum mismatch (stored {stored:016x}, computed {computed:016x})")]
    ChecksumMismatch { stored: u64, computed: u64 },

    #[error("stored fields do not decode: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("stored id {stored} does not match key {key}")]
    IdMismatch { stored: u64, key: u64 },

    #[error("stored place is invalid: {0}")]
    Invalid(String),
}

/// A place as written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedDocument {
    /// Dense 0-based sequence number assigned in build order
    pub id: u64,
    pub place: PlaceRecord,
    /// Geohash prefixes of the place's point, shortest first
    pub terms: Vec<String>,
}

#[derive(Serialize)]
struct StoredRef<'a> {
    id: u64,
    #[serde(flatten)]
    place: &'a PlaceRecord,
}

#[derive(Deserialize)]
struct Stored {
    id: u64,
    #[serde(flatten)]
    place: PlaceRecord,
}

impl IndexedDocument {
    /// Derive the document for `place` at the given prefix-tree precision.
    pub fn new(
        id: u64,
        place: PlaceRecord,
        precision: usize,
    ) -> Result<Self, geohash::GeohashError> {
        let terms = prefix_tree::point_terms(place.point(), precision)?;
        Ok(Self { id, place, terms })
    }

    /// Checksummed stored-field bytes.
    pub fn encode_stored(&self) -> Result<Vec<u8>, serde_json::Error> {
        let json = serde_json::to_vec(&StoredRef {
            id: self.id,
            place: &self.place,
        })?;
        let mut value = Vec::with_capacity(CHECKSUM_LEN + json.len());
        value.extend_from_slice(&xxh64(&json, CHECKSUM_SEED).to_be_bytes());
        value.extend_from_slice(&json);
        Ok(value)
    }
}

/// Decode a stored value read under key `key_id`.
pub fn decode_stored(key_id: u64, value: &[u8]) -> Result<PlaceRecord, DocumentError> {
    if value.len() < CHECKSUM_LEN {
        return Err(DocumentError::Truncated(value.len()));
    }
    let (checksum, json) = value.split_at(CHECKSUM_LEN);
    let mut stored_bytes = [0u8; CHECKSUM_LEN];
    stored_bytes.copy_from_slice(checksum);
    let stored = u64::from_be_bytes(stored_bytes);
    let computed = xxh64(json, CHECKSUM_SEED);
    if stored != computed {
        return Err(DocumentError::ChecksumMismatch { stored, computed });
    }

    let doc: Stored = serde_json::from_slice(json)?;
    if doc.id != key_id {
        return Err(DocumentError::IdMismatch {
            stored: doc.id,
            key: key_id,
        });
    }
    doc.place.validate().map_err(DocumentError::Invalid)?;
    Ok(doc.place)
}
