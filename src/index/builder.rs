//! Index construction.
//!
//! Documents are written into a staging directory beside the destination.
//! Only after the metadata record is written and flushed is the staging
//! directory renamed over the destination, so a failed build never leaves a
//! readable index behind.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use sled::{Batch, Db};
use tempfile::Builder;
use tracing::{debug, info, warn};

use super::schema::{self, IndexMeta, DOCS_TREE, META_KEY, META_TREE, SCHEMA_VERSION, TERMS_TREE};
use crate::config::EngineConfig;
use crate::error::BuildError;
use crate::models::{IndexedDocument, PlaceRecord};

/// Outcome of a successful build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildReport {
    pub doc_count: u64,
    pub elapsed_ms: u128,
}

/// A document ready to be written: posting keys plus stored value.
struct EncodedDocument {
    id: u64,
    postings: Vec<Vec<u8>>,
    stored: Vec<u8>,
}

/// Build a fresh index at `destination` from `records`, ids assigned in
/// iteration order starting at 0.
///
/// Anything already at `destination` is replaced once the build succeeds.
/// Readers opened on the old index keep answering from it. The swap takes
/// two renames, and an `open_index` that lands between them sees
/// `OpenError::Missing`. Concurrent builds to the same destination are not
/// guarded against.
pub fn build_index<I>(
    records: I,
    destination: &Path,
    config: &EngineConfig,
) -> Result<BuildReport, BuildError>
where
    I: IntoIterator<Item = PlaceRecord>,
{
    config.validate()?;
    let start = Instant::now();

    let parent = match destination.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(|e| BuildError::io(&parent, e))?;

    let staging = Builder::new()
        .prefix(".meridian-build-")
        .tempdir_in(&parent)
        .map_err(|e| BuildError::io(&parent, e))?;

    info!(
        "Building index for {} (staging in {})",
        destination.display(),
        staging.path().display()
    );

    let db = sled::Config::new().path(staging.path()).open()?;
    let doc_count = write_documents(&db, records, config)?;

    let meta = IndexMeta {
        schema_version: SCHEMA_VERSION,
        precision: config.precision,
        earth_radius_km: config.earth_radius_km,
        doc_count,
        built_at: Utc::now(),
    };
    let meta_json = serde_json::to_vec(&meta).map_err(|e| BuildError::Encode {
        id: doc_count,
        reason: format!("index metadata: {}", e),
    })?;
    db.open_tree(META_TREE)?.insert(META_KEY, meta_json)?;
    db.flush()?;
    drop(db);

    // On error the guard removes the staging directory. On success it has
    // been renamed away and dropping the guard finds nothing to remove.
    replace_destination(staging.path(), destination)?;
    drop(staging);

    let elapsed = start.elapsed();
    let per_sec = doc_count as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    info!(
        "Indexed {} places into {} in {} ms ({:.0} places/s)",
        doc_count,
        destination.display(),
        elapsed.as_millis(),
        per_sec
    );

    Ok(BuildReport {
        doc_count,
        elapsed_ms: elapsed.as_millis(),
    })
}

fn write_documents<I>(db: &Db, records: I, config: &EngineConfig) -> Result<u64, BuildError>
where
    I: IntoIterator<Item = PlaceRecord>,
{
    let terms = db.open_tree(TERMS_TREE)?;
    let docs = db.open_tree(DOCS_TREE)?;

    let mut next_id = 0u64;
    let mut chunk: Vec<(u64, PlaceRecord)> = Vec::with_capacity(config.build_batch_size);
    let mut records = records.into_iter();

    loop {
        chunk.clear();
        for place in records.by_ref().take(config.build_batch_size) {
            chunk.push((next_id, place));
            next_id += 1;
        }
        if chunk.is_empty() {
            break;
        }

        let encoded = chunk
            .par_iter()
            .map(|(id, place)| encode_document(*id, place, config.precision))
            .collect::<Result<Vec<_>, _>>()?;

        let mut term_batch = Batch::default();
        let mut doc_batch = Batch::default();
        for doc in encoded {
            for key in doc.postings {
                term_batch.insert(key, &[] as &[u8]);
            }
            doc_batch.insert(schema::doc_key(doc.id).to_vec(), doc.stored);
        }
        terms.apply_batch(term_batch)?;
        docs.apply_batch(doc_batch)?;

        debug!("Wrote {} documents", next_id);
    }

    Ok(next_id)
}

fn encode_document(
    id: u64,
    place: &PlaceRecord,
    precision: usize,
) -> Result<EncodedDocument, BuildError> {
    place
        .validate()
        .map_err(|reason| BuildError::InvalidRecord { id, reason })?;

    let doc = IndexedDocument::new(id, place.clone(), precision).map_err(|e| {
        BuildError::InvalidRecord {
            id,
            reason: e.to_string(),
        }
    })?;
    let stored = doc.encode_stored().map_err(|e| BuildError::Encode {
        id,
        reason: e.to_string(),
    })?;
    let postings = doc
        .terms
        .iter()
        .map(|term| schema::posting_key(term, id))
        .collect();

    Ok(EncodedDocument {
        id,
        postings,
        stored,
    })
}

/// Move the finished staging directory to `destination`, replacing whatever
/// was there. Readers holding the old index keep their open files.
fn replace_destination(staging: &Path, destination: &Path) -> Result<(), BuildError> {
    if !destination.exists() {
        return fs::rename(staging, destination).map_err(|e| BuildError::io(destination, e));
    }

    let retired = retired_path(destination);
    fs::rename(destination, &retired).map_err(|e| BuildError::io(destination, e))?;

    if let Err(e) = fs::rename(staging, destination) {
        if let Err(restore) = fs::rename(&retired, destination) {
            warn!(
                "Could not restore previous index from {}: {}",
                retired.display(),
                restore
            );
        }
        return Err(BuildError::io(destination, e));
    }

    if let Err(e) = fs::remove_dir_all(&retired) {
        warn!(
            "Failed to remove previous index at {}: {}",
            retired.display(),
            e
        );
    }
    Ok(())
}

fn retired_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "index".to_string());
    let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    destination.with_file_name(format!(".{}.retired-{}-{}", name, std::process::id(), stamp))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn places() -> Vec<PlaceRecord> {
        vec![
            PlaceRecord::new("us", "new york", "NY", 40.7128, -74.0060),
            PlaceRecord::new("us", "newark", "NJ", 40.7357, -74.1724),
            PlaceRecord::new("fr", "paris", "A8", 48.8566, 2.3522),
        ]
    }

    fn open_tree_count(path: &Path, tree: &str) -> usize {
        let db = sled::open(path).unwrap();
        db.open_tree(tree).unwrap().len()
    }

    #[test]
    fn test_build_writes_documents_postings_and_meta() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        let config = EngineConfig::default();

        let report = build_index(places(), &path, &config).unwrap();
        assert_eq!(report.doc_count, 3);

        let db = sled::open(&path).unwrap();
        assert_eq!(db.open_tree(DOCS_TREE).unwrap().len(), 3);
        assert_eq!(db.open_tree(TERMS_TREE).unwrap().len(), 3 * config.precision);

        let meta_bytes = db.open_tree(META_TREE).unwrap().get(META_KEY).unwrap().unwrap();
        let meta: IndexMeta = serde_json::from_slice(&meta_bytes).unwrap();
        assert_eq!(meta.doc_count, 3);
        assert_eq!(meta.precision, 11);
        assert_eq!(meta.schema_version, SCHEMA_VERSION);
    }

    #[test]
    fn test_ids_follow_input_order_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        let config = EngineConfig {
            build_batch_size: 2,
            ..EngineConfig::default()
        };
        build_index(places(), &path, &config).unwrap();

        let db = sled::open(&path).unwrap();
        let docs = db.open_tree(DOCS_TREE).unwrap();
        for (id, expected) in places().iter().enumerate() {
            let value = docs.get(schema::doc_key(id as u64)).unwrap().unwrap();
            let place = crate::models::decode_stored(id as u64, &value).unwrap();
            assert_eq!(&place, expected);
        }
    }

    #[test]
    fn test_rebuild_replaces_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        let config = EngineConfig::default();

        build_index(places(), &path, &config).unwrap();
        build_index(places().into_iter().take(1), &path, &config).unwrap();

        assert_eq!(open_tree_count(&path, DOCS_TREE), 1);
        // Only the index itself is left; staging and retired dirs are gone.
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_open_reader_survives_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        let config = EngineConfig::default();
        build_index(places(), &path, &config).unwrap();

        let old = crate::index::open_index(&path, &config).unwrap();
        build_index(places().into_iter().skip(2), &path, &config).unwrap();

        let before = old.nearest_places(40.7128, -74.0060, 50.0, 5).unwrap();
        assert_eq!(before.len(), 2);
        assert_eq!(before[0].city, "new york");
        assert_eq!(old.len(), 3);

        let new = crate::index::open_index(&path, &config).unwrap();
        assert_eq!(new.len(), 1);
        assert!(new.nearest_places(40.7128, -74.0060, 50.0, 5).unwrap().is_empty());
        let paris = new.nearest_places(48.8566, 2.3522, 10.0, 5).unwrap();
        assert_eq!(paris[0].city, "paris");
    }

    #[test]
    fn test_invalid_record_aborts_without_leaving_an_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        let mut records = places();
        records.push(PlaceRecord::new("xx", "nowhere", "00", 123.0, 0.0));

        let err = build_index(records, &path, &EngineConfig::default()).unwrap_err();
        assert!(matches!(err, BuildError::InvalidRecord { id: 3, .. }));
        assert!(!path.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failed_rebuild_keeps_previous_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities");
        build_index(places(), &path, &EngineConfig::default()).unwrap();

        let bad = vec![PlaceRecord::new("xx", "nowhere", "00", 0.0, 200.0)];
        assert!(build_index(bad, &path, &EngineConfig::default()).is_err());
        assert_eq!(open_tree_count(&path, DOCS_TREE), 3);
    }

    #[test]
    fn test_empty_input_builds_empty_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        let report = build_index(Vec::new(), &path, &EngineConfig::default()).unwrap();
        assert_eq!(report.doc_count, 0);
        assert!(path.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig {
            precision: 0,
            ..EngineConfig::default()
        };
        let err = build_index(places(), &dir.path().join("x"), &config).unwrap_err();
        assert!(matches!(err, BuildError::Config(_)));
    }
}
