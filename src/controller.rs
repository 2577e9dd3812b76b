use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Datelike;
use itertools::iproduct;
use log::{info, warn};

use crate::cache::CacheStore;
use crate::error::{Error, Result};
use crate::loader::DataLoader;
use crate::map_view::MapView;

const FRAMES_PER_SECOND: u32 = 15;

/// Drives the animation: one frame per (year, month) in range, data pulled
/// from the loader per frame.
pub struct Controller<S: CacheStore> {
    loader: DataLoader<S>,
    view: MapView,
}

impl<S: CacheStore> Controller<S> {
    pub fn new(loader: DataLoader<S>, view: MapView) -> Self {
        Controller { loader, view }
    }

    /// Renders every month from January `start_year` through December
    /// `end_year` as numbered PNGs in `frames_dir`, then encodes the video.
    ///
    /// Months with no qualifying transactions are logged and skipped; any
    /// other failure aborts.
    pub fn run(
        &mut self,
        start_year: i32,
        end_year: i32,
        frames_dir: &Path,
        output: &Path,
    ) -> Result<()> {
        self.loader.load_and_aggregate()?;
        fs::create_dir_all(frames_dir)?;

        let (trend_dates, trend_medians) = self.loader.get_time_series();

        let mut frame = 0u32;
        for (year, month) in period_range(start_year, end_year) {
            let means = match self.loader.get_mean_prices(year, month) {
                Ok(means) => means,
                Err(Error::PeriodNotFound { .. }) => {
                    warn!("no data for {}-{}, skipping frame", year, month);
                    continue;
                }
                Err(e) => return Err(e),
            };

            // trend line only up to the period being shown
            let upto = trend_dates.partition_point(|d| (d.year(), d.month()) <= (year, month));
            let img = self.view.render_frame(
                year,
                month,
                &means,
                &trend_dates[..upto],
                &trend_medians[..upto],
            );

            save_frame(&img, &frame_path(frames_dir, frame))?;
            frame += 1;
        }
        info!("wrote {} frames to {}", frame, frames_dir.display());

        encode_video(frames_dir, output)?;
        info!("wrote {}", output.display());
        Ok(())
    }
}

fn frame_path(frames_dir: &Path, frame: u32) -> PathBuf {
    frames_dir.join(format!("frame_{:04}.png", frame))
}

fn save_frame(img: &image::RgbImage, path: &Path) -> Result<()> {
    img.save(path)
        .map_err(|e| Error::Io(io::Error::other(e)))
}

/// Stitches the numbered frames into an mp4 with ffmpeg. A missing ffmpeg
/// binary surfaces as an IO error after the frames are already on disk.
fn encode_video(frames_dir: &Path, output: &Path) -> Result<()> {
    let pattern = frames_dir.join("frame_%04d.png");
    let status = Command::new("ffmpeg")
        .arg("-y")
        .args(["-framerate", &FRAMES_PER_SECOND.to_string()])
        .arg("-i")
        .arg(&pattern)
        .args(["-pix_fmt", "yuv420p"])
        .arg(output)
        .status()?;
    if !status.success() {
        return Err(Error::Io(io::Error::other(format!(
            "ffmpeg exited with {}",
            status
        ))));
    }
    Ok(())
}

/// Year/month pairs covered by the run, in frame order.
pub fn period_range(start_year: i32, end_year: i32) -> Vec<(i32, u32)> {
    iproduct!(start_year..=end_year, 1..=12u32).collect()
}
