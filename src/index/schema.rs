//! On-disk layout of a spatial index.
//!
//! One directory holds one `sled` database with three trees:
//!
//! | tree    | key                         | value                     |
//! |---------|-----------------------------|---------------------------|
//! | `terms` | `geohash ++ ':' ++ id (BE)` | empty                     |
//! | `docs`  | `id (BE)`                   | checksummed stored fields |
//! | `meta`  | `"index"`                   | JSON [`IndexMeta`]        |
//!
//! `:` is outside the geohash alphabet, so scanning `cell ++ ':'` yields the
//! postings of exactly that cell.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const TERMS_TREE: &str = "terms";
pub const DOCS_TREE: &str = "docs";
pub const META_TREE: &str = "meta";
pub const META_KEY: &[u8] = b"index";

/// Bumped whenever the layout above changes.
pub const SCHEMA_VERSION: u32 = 1;

const TERM_SEPARATOR: u8 = b':';
const ID_LEN: usize = 8;

/// Written once, after every document, when a build completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexMeta {
    pub schema_version: u32,
    /// Geohash levels indexed per point
    pub precision: usize,
    pub earth_radius_km: f64,
    pub doc_count: u64,
    pub built_at: DateTime<Utc>,
}

pub fn doc_key(id: u64) -> [u8; ID_LEN] {
    id.to_be_bytes()
}

/// Scan prefix selecting every posting of `term`.
pub fn term_prefix(term: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(term.len() + 1);
    prefix.extend_from_slice(term.as_bytes());
    prefix.push(TERM_SEPARATOR);
    prefix
}

pub fn posting_key(term: &str, id: u64) -> Vec<u8> {
    let mut key = term_prefix(term);
    key.extend_from_slice(&id.to_be_bytes());
    key
}

/// Document id of a posting key found under a prefix of `prefix_len` bytes.
pub fn posting_id(key: &[u8], prefix_len: usize) -> Option<u64> {
    let id_bytes: [u8; ID_LEN] = key.get(prefix_len..)?.try_into().ok()?;
    Some(u64::from_be_bytes(id_bytes))
}
