//! World-cities CSV loader.
//!
//! Rows are `country, city, accentCity, region, population, latitude,
//! longitude` with a header line. Text columns are decoded lossily since the
//! published files are not consistently UTF-8.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder};
use flate2::read::GzDecoder;
use tracing::info;

use crate::error::DatasetError;
use crate::models::{PlaceRecord, UNKNOWN_POPULATION};

const COLUMNS: usize = 7;

/// Streaming iterator of places from a CSV source.
pub struct DatasetReader<R: Read> {
    inner: csv::Reader<R>,
    record: ByteRecord,
}

impl<R: Read> DatasetReader<R> {
    pub fn new(source: R) -> Self {
        let inner = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(source);
        Self {
            inner,
            record: ByteRecord::new(),
        }
    }

    fn next_place(&mut self) -> Result<Option<PlaceRecord>, DatasetError> {
        if !self.inner.read_byte_record(&mut self.record)? {
            return Ok(None);
        }
        let line = self.record.position().map_or(0, |p| p.line());
        parse_row(&self.record, line).map(Some)
    }
}

impl<R: Read> Iterator for DatasetReader<R> {
    type Item = Result<PlaceRecord, DatasetError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_place().transpose()
    }
}

/// Open a dataset file, decompressing it when the name ends in `.gz`.
pub fn open_dataset(path: &Path) -> Result<DatasetReader<Box<dyn Read>>, DatasetError> {
    let file = File::open(path).map_err(|e| DatasetError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let reader: Box<dyn Read> = if path.extension().map_or(false, |e| e == "gz") {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(DatasetReader::new(reader))
}

/// Load every place in the file. Stops at the first bad row.
pub fn read_places(path: &Path) -> Result<Vec<PlaceRecord>, DatasetError> {
    info!("Loading places from {}", path.display());
    let places = open_dataset(path)?.collect::<Result<Vec<_>, _>>()?;
    info!("Loaded {} places", places.len());
    Ok(places)
}

fn parse_row(record: &ByteRecord, line: u64) -> Result<PlaceRecord, DatasetError> {
    if record.len() != COLUMNS {
        return Err(DatasetError::ColumnCount {
            line,
            found: record.len(),
        });
    }
    let text = |i: usize| String::from_utf8_lossy(&record[i]);

    let population = parse_population(text(4).trim(), line)?;
    let latitude = parse_coordinate(text(5).trim(), "latitude", line)?;
    let longitude = parse_coordinate(text(6).trim(), "longitude", line)?;

    Ok(
        PlaceRecord::new(text(0), text(1), text(3), latitude, longitude)
            .with_display_name(text(2))
            .with_population(population),
    )
}

fn parse_population(value: &str, line: u64) -> Result<i64, DatasetError> {
    if value.is_empty() {
        return Ok(UNKNOWN_POPULATION);
    }
    if let Ok(n) = value.parse::<i64>() {
        return Ok(n);
    }
    // Some exports write populations as floats ("12345.0").
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() && f.fract() == 0.0 => Ok(f as i64),
        _ => Err(DatasetError::Parse {
            line,
            field: "population",
            value: value.to_string(),
        }),
    }
}

fn parse_coordinate(value: &str, field: &'static str, line: u64) -> Result<f64, DatasetError> {
    value.parse::<f64>().map_err(|_| DatasetError::Parse {
        line,
        field,
        value: value.to_string(),
    })
}
