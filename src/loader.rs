use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use flate2::read::GzDecoder;
use log::{debug, info};

use crate::boroughs::is_london_borough;
use crate::cache::CacheStore;
use crate::error::{Error, Result};

/// Records above this price are excluded entirely, not clamped.
pub const MAX_PRICE_GBP: u64 = 100_000_000;

/// Column count of the raw price paid file. No header row; positional schema.
const RAW_COLUMNS: usize = 16;

/// One transaction from the raw price paid file. Only 8 of the 16 source
/// columns are carried; the address columns other than county are never read.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub transaction_id: String,
    pub price_gbp: u64,
    pub date_time: NaiveDateTime,
    pub postcode: String,
    pub property_type: String,
    pub is_new_build: String,
    pub estate_type: String,
    pub county: String,
}

/// A raw transaction confirmed to be in a London borough, with the date
/// decomposed for grouping.
#[derive(Debug, Clone)]
pub struct LondonTransaction {
    pub transaction_id: String,
    pub price_gbp: u64,
    pub date_time: NaiveDateTime,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub epoch_seconds: i64,
    pub borough: String,
}

/// One row of the borough-level aggregate table, keyed (year, month, borough).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BoroughRow {
    pub year: i32,
    pub month: u32,
    pub borough: String,
    pub price_gbp_mean: f64,
    pub price_gbp_median: f64,
    pub price_gbp_count: u64,
    pub date_time: NaiveDate,
}

/// One row of the city-level aggregate table, keyed (year, month). Its own
/// reduction over the filtered records, not a roll-up of the borough table.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CityRow {
    pub year: i32,
    pub month: u32,
    pub price_gbp_mean: f64,
    pub price_gbp_median: f64,
    pub price_gbp_count: u64,
    pub date_time: NaiveDate,
}

/// The two aggregate tables, rows ordered by their key columns ascending.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AggregateTables {
    pub borough: Vec<BoroughRow>,
    pub city: Vec<CityRow>,
}

/// Per-group accumulator. Prices are materialised because the median is
/// exact, not streamed.
struct GroupAccum {
    prices: Vec<u64>,
    first_date: NaiveDateTime,
}

impl GroupAccum {
    fn new(price: u64, date: NaiveDateTime) -> Self {
        GroupAccum {
            prices: vec![price],
            first_date: date,
        }
    }

    fn push(&mut self, price: u64, date: NaiveDateTime) {
        self.prices.push(price);
        if date < self.first_date {
            self.first_date = date;
        }
    }

    fn mean(&self) -> f64 {
        let sum: u64 = self.prices.iter().sum();
        sum as f64 / self.prices.len() as f64
    }

    fn median(&mut self) -> f64 {
        self.prices.sort_unstable();
        let n = self.prices.len();
        if n % 2 == 1 {
            self.prices[n / 2] as f64
        } else {
            (self.prices[n / 2 - 1] as f64 + self.prices[n / 2] as f64) / 2.0
        }
    }

    /// First transaction date in the bucket, truncated to month start.
    fn month_start(&self) -> NaiveDate {
        let d = self.first_date.date();
        NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
    }
}

fn record_line(record: &csv::StringRecord) -> u64 {
    record.position().map(|p| p.line()).unwrap_or(0)
}

/// Parses the raw gzipped price paid CSV. Fails on the first structurally
/// bad row: wrong column count, non-numeric price, unparsable date.
pub fn read_raw_records(path: &Path) -> Result<Vec<RawTransaction>> {
    let file = File::open(path)?;
    let decoder = GzDecoder::new(BufReader::new(file));
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_reader(decoder);

    let mut records = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| {
            let line = e.position().map(|p| p.line()).unwrap_or(0);
            match e.into_kind() {
                // a truncated/corrupt gzip stream shows up here as an
                // underlying read failure, not a schema problem
                csv::ErrorKind::Io(io) => Error::Io(io),
                other => Error::malformed(line, format!("{:?}", other)),
            }
        })?;
        let line = record_line(&record);
        if record.len() != RAW_COLUMNS {
            return Err(Error::malformed(
                line,
                format!("expected {} columns, got {}", RAW_COLUMNS, record.len()),
            ));
        }

        let price_field = &record[1];
        let price_gbp: u64 = price_field
            .trim()
            .parse()
            .map_err(|_| Error::malformed(line, format!("non-numeric price {:?}", price_field)))?;
        let date_time = parse_date_time(&record[2])
            .ok_or_else(|| Error::malformed(line, format!("unparsable date {:?}", &record[2])))?;

        records.push(RawTransaction {
            transaction_id: record[0].to_owned(),
            price_gbp,
            date_time,
            postcode: record[3].to_owned(),
            property_type: record[4].to_owned(),
            is_new_build: record[5].to_owned(),
            estate_type: record[6].to_owned(),
            county: record[12].to_owned(),
        });
    }
    debug!("completed reading raw data, {} rows", records.len());
    Ok(records)
}

/// The raw file writes dates as "1995-01-31 00:00"; tolerate seconds and
/// bare dates too.
fn parse_date_time(field: &str) -> Option<NaiveDateTime> {
    let field = field.trim();
    NaiveDateTime::parse_from_str(field, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(field, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(field, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::default()))
        })
}

/// Keeps only transactions in a London borough at or below the price ceiling,
/// decomposing the date for grouping. Pure; input order is preserved.
pub fn filter_to_london(records: Vec<RawTransaction>) -> Vec<LondonTransaction> {
    let filtered: Vec<LondonTransaction> = records
        .into_iter()
        .filter(|r| r.price_gbp <= MAX_PRICE_GBP)
        .filter(|r| is_london_borough(&r.county))
        .map(|r| {
            let date = r.date_time.date();
            LondonTransaction {
                year: date.year(),
                month: date.month(),
                day: date.day(),
                epoch_seconds: r.date_time.and_utc().timestamp(),
                borough: r.county.to_uppercase(),
                transaction_id: r.transaction_id,
                price_gbp: r.price_gbp,
                date_time: r.date_time,
            }
        })
        .collect();
    debug!("filtered to london only, {} rows", filtered.len());
    filtered
}

/// Groups by (year, month, borough) and separately by (year, month),
/// producing mean/median/count and the month-start representative date per
/// group. BTreeMap keys give the key-ascending row order the cache relies on.
pub fn aggregate(records: &[LondonTransaction]) -> AggregateTables {
    let mut by_borough: BTreeMap<(i32, u32, String), GroupAccum> = BTreeMap::new();
    let mut by_month: BTreeMap<(i32, u32), GroupAccum> = BTreeMap::new();

    for r in records {
        by_borough
            .entry((r.year, r.month, r.borough.clone()))
            .and_modify(|g| g.push(r.price_gbp, r.date_time))
            .or_insert_with(|| GroupAccum::new(r.price_gbp, r.date_time));
        by_month
            .entry((r.year, r.month))
            .and_modify(|g| g.push(r.price_gbp, r.date_time))
            .or_insert_with(|| GroupAccum::new(r.price_gbp, r.date_time));
    }

    let borough = by_borough
        .into_iter()
        .map(|((year, month, borough), mut g)| BoroughRow {
            year,
            month,
            borough,
            price_gbp_mean: g.mean(),
            price_gbp_median: g.median(),
            price_gbp_count: g.prices.len() as u64,
            date_time: g.month_start(),
        })
        .collect();

    let city = by_month
        .into_iter()
        .map(|((year, month), mut g)| CityRow {
            year,
            month,
            price_gbp_mean: g.mean(),
            price_gbp_median: g.median(),
            price_gbp_count: g.prices.len() as u64,
            date_time: g.month_start(),
        })
        .collect();

    AggregateTables { borough, city }
}

/// Loads, filters and aggregates the price paid data, caching the two
/// aggregate tables as side files so later runs skip the raw scan entirely.
///
/// Call `load_and_aggregate` once after construction, then query. The cache
/// check is existence-only: a newer raw file is never detected, delete the
/// cache files to refresh.
pub struct DataLoader<S: CacheStore> {
    price_paid_path: PathBuf,
    cache: S,
    tables: Option<AggregateTables>,
}

impl<S: CacheStore> DataLoader<S> {
    pub fn new(price_paid_path: impl Into<PathBuf>, cache: S) -> Self {
        DataLoader {
            price_paid_path: price_paid_path.into(),
            cache,
            tables: None,
        }
    }

    /// Populates both aggregate tables. Fast path: both cache files exist and
    /// are loaded directly, the raw file is never opened. Slow path: full
    /// read → filter → aggregate → persist.
    pub fn load_and_aggregate(&mut self) -> Result<()> {
        if self.tables.is_some() {
            return Ok(());
        }
        if self.cache.exists() {
            info!("reading cached aggregated data");
            self.tables = Some(self.cache.load()?);
        } else {
            info!("no cached aggregated data, reading raw data");
            let raw = read_raw_records(&self.price_paid_path)?;
            let london = filter_to_london(raw);
            let tables = aggregate(&london);
            info!(
                "aggregated {} borough rows, {} city rows",
                tables.borough.len(),
                tables.city.len()
            );
            self.cache.save(&tables)?;
            self.tables = Some(tables);
        }
        Ok(())
    }

    /// Queries before `load_and_aggregate` see empty tables: lookups report
    /// `PeriodNotFound` and the time series is empty, nothing panics.
    fn tables(&self) -> &AggregateTables {
        static EMPTY: AggregateTables = AggregateTables {
            borough: Vec::new(),
            city: Vec::new(),
        };
        self.tables.as_ref().unwrap_or(&EMPTY)
    }

    fn borough_stat(
        &self,
        year: i32,
        month: u32,
        stat: fn(&BoroughRow) -> f64,
    ) -> Result<BTreeMap<String, f64>> {
        let out: BTreeMap<String, f64> = self
            .tables()
            .borough
            .iter()
            .filter(|row| row.year == year && row.month == month)
            .map(|row| (row.borough.clone(), stat(row)))
            .collect();
        if out.is_empty() {
            return Err(Error::PeriodNotFound { year, month });
        }
        Ok(out)
    }

    /// Mean sale price per borough for one (year, month), borough-ordered.
    pub fn get_mean_prices(&self, year: i32, month: u32) -> Result<BTreeMap<String, f64>> {
        debug!("getting mean prices for ({}, {})", year, month);
        self.borough_stat(year, month, |row| row.price_gbp_mean)
    }

    /// Median sale price per borough for one (year, month), borough-ordered.
    pub fn get_median_prices(&self, year: i32, month: u32) -> Result<BTreeMap<String, f64>> {
        debug!("getting median prices for ({}, {})", year, month);
        self.borough_stat(year, month, |row| row.price_gbp_median)
    }

    /// City-level trend data: parallel date-ordered sequences of month start
    /// and median price, for the line plot under the map.
    pub fn get_time_series(&self) -> (Vec<NaiveDate>, Vec<f64>) {
        let city = &self.tables().city;
        let dates = city.iter().map(|row| row.date_time).collect();
        let medians = city.iter().map(|row| row.price_gbp_median).collect();
        (dates, medians)
    }
}
