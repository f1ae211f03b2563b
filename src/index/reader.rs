//! Read-only access to a built index and the radius queries on top of it.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::path::Path;

use hashbrown::HashSet;
use sled::{Db, Tree};
use tracing::{debug, info};

use super::prefix_tree::{covering_cells, detail_level};
use super::schema::{self, IndexMeta, DOCS_TREE, META_KEY, META_TREE, SCHEMA_VERSION, TERMS_TREE};
use crate::config::{CandidateWindow, EngineConfig};
use crate::error::{OpenError, QueryError};
use crate::geodesy::{degrees_for_radius_km, distance_km, is_valid_lat_lon, point_from_lat_lon, Circle};
use crate::models::{decode_stored, PlaceRecord};

/// A place returned by a query together with its rank keys.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPlace {
    pub id: u64,
    pub distance_km: f64,
    pub place: PlaceRecord,
}

/// Open handle on a built index.
///
/// Cloning is cheap and every clone shares the same storage handle. Queries
/// never mutate anything, so a reader can be used from many threads at once.
#[derive(Clone)]
pub struct IndexReader {
    _db: Db,
    terms: Tree,
    docs: Tree,
    meta: IndexMeta,
    dist_err_pct: f64,
    candidate_window: CandidateWindow,
}

impl std::fmt::Debug for IndexReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexReader")
            .field("meta", &self.meta)
            .field("candidate_window", &self.candidate_window)
            .finish()
    }
}

/// Files sled keeps at the root of a database directory.
const SLED_CONF_FILE: &str = "conf";
const SLED_DB_FILE: &str = "db";

/// Open the index stored at `source`.
///
/// Precision and earth radius are taken from the index metadata so the
/// index is always queried the way it was built; the query-time knobs come
/// from `config`.
///
/// sled initialises a database in any directory it is pointed at, so the
/// directory must already hold sled's files before it is handed over.
pub fn open_index(source: &Path, config: &EngineConfig) -> Result<IndexReader, OpenError> {
    if !source.is_dir() {
        return Err(OpenError::Missing(source.to_path_buf()));
    }
    if !source.join(SLED_CONF_FILE).is_file() {
        return Err(OpenError::NotAnIndex(source.to_path_buf()));
    }
    let db_file = source.join(SLED_DB_FILE);
    let db_len = fs::metadata(&db_file)
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => OpenError::NotAnIndex(source.to_path_buf()),
            _ => OpenError::Io {
                path: db_file.clone(),
                source: e,
            },
        })?
        .len();

    let db = sled::Config::new()
        .path(source)
        .open()
        .map_err(open_storage_error)?;

    let meta_bytes = match db.open_tree(META_TREE)?.get(META_KEY)? {
        Some(bytes) => bytes,
        None => return Err(missing_meta(&db, source, db_len)?),
    };
    let meta: IndexMeta =
        serde_json::from_slice(&meta_bytes).map_err(|e| OpenError::Corrupt(e.to_string()))?;

    if meta.schema_version != SCHEMA_VERSION {
        return Err(OpenError::SchemaMismatch {
            found: meta.schema_version,
            expected: SCHEMA_VERSION,
        });
    }
    if meta.precision == 0 || !(meta.earth_radius_km > 0.0) {
        return Err(OpenError::Corrupt(format!(
            "precision {} / earth radius {} out of range",
            meta.precision, meta.earth_radius_km
        )));
    }

    let terms = db.open_tree(TERMS_TREE)?;
    let docs = db.open_tree(DOCS_TREE)?;

    info!(
        "Opened index {} with {} documents (precision {}, built {})",
        source.display(),
        meta.doc_count,
        meta.precision,
        meta.built_at
    );

    Ok(IndexReader {
        _db: db,
        terms,
        docs,
        meta,
        dist_err_pct: config.dist_err_pct,
        candidate_window: config.candidate_window,
    })
}

fn open_storage_error(e: sled::Error) -> OpenError {
    match e {
        sled::Error::Corruption { .. } => OpenError::Corrupt(e.to_string()),
        _ => OpenError::Storage(e),
    }
}

/// Classify an index without a metadata record. Builds publish the
/// directory only after the record is written, so any stored data, or a
/// database file that sled could not recover anything from, means damage.
fn missing_meta(db: &Db, source: &Path, db_len: u64) -> Result<OpenError, OpenError> {
    let has_data =
        !db.open_tree(DOCS_TREE)?.is_empty() || !db.open_tree(TERMS_TREE)?.is_empty();
    if has_data {
        return Ok(OpenError::Corrupt(format!(
            "{} holds documents but no metadata record",
            source.display()
        )));
    }
    if db_len > 0 {
        return Ok(OpenError::Corrupt(format!(
            "{} has a {} byte database file with no recoverable index",
            source.display(),
            db_len
        )));
    }
    Ok(OpenError::Incomplete(source.to_path_buf()))
}

impl IndexReader {
    pub fn meta(&self) -> &IndexMeta {
        &self.meta
    }

    /// Number of documents in the index.
    pub fn len(&self) -> u64 {
        self.meta.doc_count
    }

    pub fn is_empty(&self) -> bool {
        self.meta.doc_count == 0
    }

    /// Fetch one stored place by id.
    pub fn get(&self, id: u64) -> Result<Option<PlaceRecord>, QueryError> {
        match self.docs.get(schema::doc_key(id))? {
            Some(value) => decode_stored(id, &value)
                .map(Some)
                .map_err(|e| QueryError::Corrupt {
                    id,
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    /// Places within `radius_km` of the point, nearest first, at most `limit`.
    ///
    /// With [`CandidateWindow::Limit`] only the `limit` lowest-id places in
    /// the covering cells are ranked. A larger radius can then bring in a
    /// far place with a lower id and push out a nearer one, so results are
    /// not monotonic in the radius. [`CandidateWindow::Unbounded`] ranks
    /// every place in the radius.
    pub fn nearest_places(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<PlaceRecord>, QueryError> {
        Ok(self
            .nearest_places_scored(lat, lon, radius_km, limit)?
            .into_iter()
            .map(|scored| scored.place)
            .collect())
    }

    /// Distinct countries of [`nearest_places`](Self::nearest_places), in
    /// order of first (nearest) occurrence.
    ///
    /// `limit` bounds the places looked at, not the countries returned: a
    /// dense border area can yield fewer than `limit` countries even when
    /// more exist inside the radius.
    pub fn nearest_countries(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<String>, QueryError> {
        let places = self.nearest_places(lat, lon, radius_km, limit)?;
        Ok(distinct_countries(places))
    }

    /// Same as [`nearest_places`](Self::nearest_places) but keeps the id and
    /// exact distance of every result.
    pub fn nearest_places_scored(
        &self,
        lat: f64,
        lon: f64,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<ScoredPlace>, QueryError> {
        validate_query(lat, lon, radius_km, limit)?;

        let center = point_from_lat_lon(lat, lon);
        let degrees = degrees_for_radius_km(radius_km, self.meta.earth_radius_km);
        let circle = Circle::new(center, degrees);
        let detail = detail_level(degrees, self.dist_err_pct, self.meta.precision);
        let cells = covering_cells(&circle, detail)?;

        let ids = match self.candidate_window {
            CandidateWindow::Limit => self.lowest_candidate_ids(&cells, limit)?,
            CandidateWindow::Unbounded => {
                let mut ids = self.candidate_ids(&cells)?;
                ids.sort_unstable();
                ids.dedup();
                ids
            }
        };
        let candidate_count = ids.len();

        let mut scored = Vec::with_capacity(ids.len());
        for id in ids {
            let place = self.get(id)?.ok_or_else(|| QueryError::Corrupt {
                id,
                reason: "posting refers to a missing document".to_string(),
            })?;
            let distance = distance_km(center, place.point(), self.meta.earth_radius_km);
            if self.candidate_window == CandidateWindow::Unbounded && distance > radius_km {
                continue;
            }
            scored.push(ScoredPlace {
                id,
                distance_km: distance,
                place,
            });
        }

        scored.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(limit);

        debug!(
            "Query ({}, {}) r={}km: {} cells at level <= {}, {} candidates, {} results",
            lat,
            lon,
            radius_km,
            cells.len(),
            detail,
            candidate_count,
            scored.len()
        );

        Ok(scored)
    }

    /// The `limit` lowest distinct ids posted under any of `cells`.
    ///
    /// Posting keys end in the big-endian id, so each cell scan yields ids in
    /// ascending order and a k-way merge can stop after `limit` of them.
    fn lowest_candidate_ids(
        &self,
        cells: &[String],
        limit: usize,
    ) -> Result<Vec<u64>, QueryError> {
        let mut scans = Vec::with_capacity(cells.len());
        let mut heads = BinaryHeap::with_capacity(cells.len());
        for cell in cells {
            let prefix = schema::term_prefix(cell);
            let prefix_len = prefix.len();
            let mut scan = self.terms.scan_prefix(prefix);
            if let Some(id) = next_posting(&mut scan, prefix_len)? {
                heads.push(Reverse((id, scans.len())));
            }
            scans.push((scan, prefix_len));
        }

        let mut ids: Vec<u64> = Vec::with_capacity(limit.min(1024));
        while let Some(Reverse((id, source))) = heads.pop() {
            if ids.last() != Some(&id) {
                ids.push(id);
                if ids.len() == limit {
                    break;
                }
            }
            let (scan, prefix_len) = &mut scans[source];
            if let Some(next) = next_posting(scan, *prefix_len)? {
                heads.push(Reverse((next, source)));
            }
        }
        Ok(ids)
    }

    /// Ids posted under any of `cells`.
    fn candidate_ids(&self, cells: &[String]) -> Result<Vec<u64>, QueryError> {
        let mut ids = Vec::new();
        for cell in cells {
            let prefix = schema::term_prefix(cell);
            for entry in self.terms.scan_prefix(&prefix) {
                let (key, _) = entry?;
                let id = schema::posting_id(&key, prefix.len())
                    .ok_or_else(|| QueryError::CorruptPosting(key.to_vec()))?;
                ids.push(id);
            }
        }
        Ok(ids)
    }
}

fn next_posting(scan: &mut sled::Iter, prefix_len: usize) -> Result<Option<u64>, QueryError> {
    match scan.next() {
        Some(entry) => {
            let (key, _) = entry?;
            schema::posting_id(&key, prefix_len)
                .map(Some)
                .ok_or_else(|| QueryError::CorruptPosting(key.to_vec()))
        }
        None => Ok(None),
    }
}

fn validate_query(lat: f64, lon: f64, radius_km: f64, limit: usize) -> Result<(), QueryError> {
    if !is_valid_lat_lon(lat, lon) {
        return Err(QueryError::InvalidArgument(format!(
            "coordinates ({}, {}) are out of range",
            lat, lon
        )));
    }
    if !radius_km.is_finite() || radius_km < 0.0 {
        return Err(QueryError::InvalidArgument(format!(
            "radius must be a non-negative number of kilometres, got {}",
            radius_km
        )));
    }
    if limit == 0 {
        return Err(QueryError::InvalidArgument(
            "limit must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// Project places to countries, keeping the first occurrence of each.
pub fn distinct_countries(places: Vec<PlaceRecord>) -> Vec<String> {
    let mut seen = HashSet::new();
    places
        .into_iter()
        .filter_map(|place| {
            if seen.contains(place.country.as_str()) {
                None
            } else {
                seen.insert(place.country.clone());
                Some(place.country)
            }
        })
        .collect()
}
