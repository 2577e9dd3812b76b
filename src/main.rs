use std::path::PathBuf;
use std::process;

use clap::Parser;
use log::error;

use borough_map::cache::CsvCacheStore;
use borough_map::controller::Controller;
use borough_map::loader::DataLoader;
use borough_map::map_view::MapView;

#[derive(Parser, Debug)]
#[command(name = "borough-map")]
#[command(about = "Animated choropleth of London property prices")]
struct Args {
    /// Directory holding the raw data and the cache files
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Raw price paid file (gzipped CSV) inside the data directory
    #[arg(long, default_value = "pp-complete.csv.gz")]
    price_paid_file: String,

    /// Borough boundary file (GeoJSON) inside the data directory
    #[arg(long, default_value = "london_boroughs.geojson")]
    boundary_file: String,

    /// First year to render
    #[arg(long, default_value = "1995")]
    start_year: i32,

    /// Last year to render (inclusive)
    #[arg(long, default_value = "2019")]
    end_year: i32,

    /// Directory the numbered frame PNGs are written to
    #[arg(long, default_value = "frames")]
    frames_dir: PathBuf,

    /// Output video path
    #[arg(long, default_value = "mean_prices.mp4")]
    output: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        error!("{}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> borough_map::Result<()> {
    let cache = CsvCacheStore::in_dir(&args.data_dir);
    let loader = DataLoader::new(args.data_dir.join(&args.price_paid_file), cache);
    let view = MapView::from_geojson(&args.data_dir.join(&args.boundary_file))?;

    let mut controller = Controller::new(loader, view);
    controller.run(
        args.start_year,
        args.end_year,
        &args.frames_dir,
        &args.output,
    )
}
