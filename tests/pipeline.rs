use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use flate2::write::GzEncoder;
use flate2::Compression;
use tempfile::TempDir;

use borough_map::boroughs::LONDON_BOROUGHS;
use borough_map::cache::{CacheStore, CsvCacheStore};
use borough_map::error::Error;
use borough_map::loader::{aggregate, filter_to_london, read_raw_records, DataLoader};

/// One raw price paid row: 16 positional columns, county at index 12.
fn row(id: &str, price: &str, date: &str, county: &str) -> String {
    format!(
        "{id},{price},{date},N1 1AA,T,N,F,12,HIGH STREET,LOCALITY,LONDON,DISTRICT,{county},GREATER LONDON,A,A"
    )
}

fn write_gz(path: &Path, rows: &[String]) {
    let file = File::create(path).unwrap();
    let mut encoder = GzEncoder::new(file, Compression::default());
    for r in rows {
        writeln!(encoder, "{}", r).unwrap();
    }
    encoder.finish().unwrap();
}

/// 12 months of 1995, one transaction per borough per month.
fn full_year_rows() -> Vec<String> {
    let mut rows = Vec::new();
    for month in 1..=12u32 {
        for (i, borough) in LONDON_BOROUGHS.iter().enumerate() {
            rows.push(row(
                &format!("{{id-{}-{}}}", month, i),
                &format!("{}", 100_000 + i * 10_000),
                &format!("1995-{:02}-10 00:00", month),
                borough,
            ));
        }
    }
    rows
}

#[test]
fn load_creates_cache_then_survives_raw_deletion() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp-complete.csv.gz");
    write_gz(&raw_path, &full_year_rows());

    let cache = CsvCacheStore::in_dir(dir.path());
    let mut loader = DataLoader::new(&raw_path, cache);
    loader.load_and_aggregate().unwrap();

    let cache = CsvCacheStore::in_dir(dir.path());
    assert!(cache.exists());

    let means = loader.get_mean_prices(1995, 6).unwrap();
    assert_eq!(means.len(), 33);

    // removing the raw file must not matter: the cache is the fast path
    fs::remove_file(&raw_path).unwrap();
    let cache = CsvCacheStore::in_dir(dir.path());
    let mut reloaded = DataLoader::new(&raw_path, cache);
    reloaded.load_and_aggregate().unwrap();

    let reloaded_means = reloaded.get_mean_prices(1995, 6).unwrap();
    assert_eq!(reloaded_means, means);
    let (dates, medians) = reloaded.get_time_series();
    assert_eq!(dates.len(), 12);
    assert_eq!(medians.len(), 12);
}

#[test]
fn pipeline_is_idempotent_byte_for_byte() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp-complete.csv.gz");
    write_gz(&raw_path, &full_year_rows());

    let run = |cache_dir: &Path| -> (Vec<u8>, Vec<u8>) {
        let tables = aggregate(&filter_to_london(read_raw_records(&raw_path).unwrap()));
        let store = CsvCacheStore::in_dir(cache_dir);
        store.save(&tables).unwrap();
        (
            fs::read(store.borough_path()).unwrap(),
            fs::read(store.city_path()).unwrap(),
        )
    };

    let first_dir = TempDir::new().unwrap();
    let second_dir = TempDir::new().unwrap();
    let (borough_a, city_a) = run(first_dir.path());
    let (borough_b, city_b) = run(second_dir.path());
    assert_eq!(borough_a, borough_b);
    assert_eq!(city_a, city_b);
}

#[test]
fn price_ceiling_boundary_through_the_raw_file() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &[
            row("a", "100000000", "1995-01-05 00:00", "CAMDEN"),
            row("b", "100000001", "1995-01-06 00:00", "CAMDEN"),
        ],
    );

    let filtered = filter_to_london(read_raw_records(&raw_path).unwrap());
    assert_eq!(filtered.len(), 1);
    assert_eq!(filtered[0].price_gbp, 100_000_000);
}

#[test]
fn truncated_gzip_is_io_error_not_malformed_data() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(&raw_path, &full_year_rows());

    // chop the gzip stream mid-way: a corrupt raw file, not a schema problem
    let bytes = fs::read(&raw_path).unwrap();
    fs::write(&raw_path, &bytes[..bytes.len() / 2]).unwrap();

    match read_raw_records(&raw_path) {
        Err(Error::Io(_)) => {}
        other => panic!("expected Io, got {:?}", other.err()),
    }
}

#[test]
fn non_numeric_price_is_malformed_data() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &[row("a", "not-a-price", "1995-01-05 00:00", "CAMDEN")],
    );
    match read_raw_records(&raw_path) {
        Err(Error::MalformedData { line: 1, .. }) => {}
        other => panic!("expected MalformedData, got {:?}", other.err()),
    }
}

#[test]
fn unparsable_date_is_malformed_data() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(&raw_path, &[row("a", "100000", "05/01/1995", "CAMDEN")]);
    match read_raw_records(&raw_path) {
        Err(Error::MalformedData { .. }) => {}
        other => panic!("expected MalformedData, got {:?}", other.err()),
    }
}

#[test]
fn wrong_column_count_is_malformed_data() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &["a,100000,1995-01-05 00:00,N1 1AA,T,N,F,CAMDEN".to_owned()],
    );
    match read_raw_records(&raw_path) {
        Err(Error::MalformedData { line: 1, .. }) => {}
        other => panic!("expected MalformedData, got {:?}", other.err()),
    }
}

#[test]
fn out_of_range_period_is_period_not_found_not_fatal() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &[row("a", "250000", "1996-06-14 00:00", "CAMDEN")],
    );

    let cache = CsvCacheStore::in_dir(dir.path());
    let mut loader = DataLoader::new(&raw_path, cache);
    loader.load_and_aggregate().unwrap();

    match loader.get_mean_prices(1995, 1) {
        Err(Error::PeriodNotFound { year: 1995, month: 1 }) => {}
        other => panic!("expected PeriodNotFound, got {:?}", other.err()),
    }
    // the same loader still answers for periods that exist
    assert_eq!(loader.get_mean_prices(1996, 6).unwrap()["CAMDEN"], 250_000.0);
}

#[test]
fn grouping_across_boroughs_within_one_month() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &[
            row("a", "100000", "1996-06-03 00:00", "CAMDEN"),
            row("b", "200000", "1996-06-12 00:00", "CAMDEN"),
            row("c", "300000", "1996-06-20 00:00", "BARNET"),
        ],
    );

    let tables = aggregate(&filter_to_london(read_raw_records(&raw_path).unwrap()));
    assert_eq!(tables.borough.len(), 2);
    assert_eq!(tables.borough[0].borough, "BARNET");
    assert_eq!(tables.borough[0].price_gbp_count, 1);
    assert_eq!(tables.borough[1].borough, "CAMDEN");
    assert_eq!(tables.borough[1].price_gbp_count, 2);
    assert_eq!(tables.city.len(), 1);
    assert_eq!(tables.city[0].price_gbp_count, 3);
}

#[test]
fn camden_synthetic_aggregate_round_trips_through_cache() {
    let dir = TempDir::new().unwrap();
    let raw_path = dir.path().join("pp.csv.gz");
    write_gz(
        &raw_path,
        &[
            row("a", "100000", "1995-01-03 00:00", "CAMDEN"),
            row("b", "200000", "1995-01-12 00:00", "CAMDEN"),
            row("c", "300000", "1995-01-20 00:00", "CAMDEN"),
        ],
    );

    let tables = aggregate(&filter_to_london(read_raw_records(&raw_path).unwrap()));
    assert_eq!(tables.borough[0].price_gbp_mean, 200_000.0);
    assert_eq!(tables.borough[0].price_gbp_median, 200_000.0);
    assert_eq!(tables.borough[0].price_gbp_count, 3);

    let store = CsvCacheStore::in_dir(dir.path());
    store.save(&tables).unwrap();
    assert_eq!(store.load().unwrap(), tables);
}
