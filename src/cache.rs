use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::loader::{AggregateTables, BoroughRow, CityRow};

/// Persistence seam for the two aggregate tables.
///
/// The freshness model is existence-only: `exists` looks for the files and
/// nothing else, a newer raw file is never detected. Swapping in an
/// invalidating store only requires implementing this trait.
pub trait CacheStore {
    fn exists(&self) -> bool;
    fn load(&self) -> Result<AggregateTables>;
    fn save(&self, tables: &AggregateTables) -> Result<()>;
}

const BOROUGH_CACHE_FILE: &str = "london_aggregated_cache.csv";
const CITY_CACHE_FILE: &str = "yearly_london_aggregated_cache.csv";

const BOROUGH_HEADER: [&str; 7] = [
    "year",
    "month",
    "borough",
    "price_gbp_mean",
    "price_gbp_median",
    "price_gbp_count",
    "date_time",
];
const CITY_HEADER: [&str; 6] = [
    "year",
    "month",
    "price_gbp_mean",
    "price_gbp_median",
    "price_gbp_count",
    "date_time",
];

/// CSV-backed cache: one headered file per table, rows in key order.
pub struct CsvCacheStore {
    borough_path: PathBuf,
    city_path: PathBuf,
}

impl CsvCacheStore {
    pub fn in_dir(dir: &Path) -> Self {
        CsvCacheStore {
            borough_path: dir.join(BOROUGH_CACHE_FILE),
            city_path: dir.join(CITY_CACHE_FILE),
        }
    }

    pub fn borough_path(&self) -> &Path {
        &self.borough_path
    }

    pub fn city_path(&self) -> &Path {
        &self.city_path
    }

    fn check_header(path: &Path, got: &csv::StringRecord, want: &[&str]) -> Result<()> {
        if got.iter().ne(want.iter().copied()) {
            return Err(Error::cache_mismatch(
                path,
                format!("expected columns {:?}, got {:?}", want, got),
            ));
        }
        Ok(())
    }

    fn load_table<T: serde::de::DeserializeOwned>(path: &Path, header: &[&str]) -> Result<Vec<T>> {
        let mut reader = csv::Reader::from_path(path).map_err(|e| match e.into_kind() {
            csv::ErrorKind::Io(io) => Error::Io(io),
            other => Error::cache_mismatch(path, format!("{:?}", other)),
        })?;
        let got = reader
            .headers()
            .map_err(|e| Error::cache_mismatch(path, e.to_string()))?
            .clone();
        Self::check_header(path, &got, header)?;

        let mut rows = Vec::new();
        for result in reader.deserialize::<T>() {
            let row = result.map_err(|e| Error::cache_mismatch(path, e.to_string()))?;
            rows.push(row);
        }
        Ok(rows)
    }

    fn save_table<T: serde::Serialize>(path: &Path, rows: &[T], header: &[&str]) -> Result<()> {
        // header written by hand so an empty table still round-trips
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(path)
            .map_err(|e| match e.into_kind() {
                csv::ErrorKind::Io(io) => Error::Io(io),
                other => Error::cache_mismatch(path, format!("{:?}", other)),
            })?;
        writer
            .write_record(header)
            .map_err(|e| Error::cache_mismatch(path, e.to_string()))?;
        for row in rows {
            writer
                .serialize(row)
                .map_err(|e| Error::cache_mismatch(path, e.to_string()))?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl CacheStore for CsvCacheStore {
    fn exists(&self) -> bool {
        self.borough_path.exists() && self.city_path.exists()
    }

    fn load(&self) -> Result<AggregateTables> {
        debug!("loading cache from {:?}", self.borough_path.parent());
        let borough = Self::load_table::<BoroughRow>(&self.borough_path, &BOROUGH_HEADER)?;
        let city = Self::load_table::<CityRow>(&self.city_path, &CITY_HEADER)?;
        Ok(AggregateTables { borough, city })
    }

    fn save(&self, tables: &AggregateTables) -> Result<()> {
        debug!("saving cache to {:?}", self.borough_path.parent());
        Self::save_table(&self.borough_path, &tables.borough, &BOROUGH_HEADER)?;
        Self::save_table(&self.city_path, &tables.city, &CITY_HEADER)?;
        Ok(())
    }
}
