use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::NaiveDate;
use geo::{BoundingRect, Contains, Coord, LineString, Point, Polygon, Rect};
use image::{ImageBuffer, Rgb, RgbImage};
use log::debug;
use serde::Deserialize;

use crate::boroughs::resolve_boundary_alias;
use crate::error::{Error, Result};

pub const FRAME_WIDTH: u32 = 600;
pub const FRAME_HEIGHT: u32 = 900;

// Viewport over the boundary data, OS National Grid eastings/northings.
const VIEW_X_MIN: f64 = 5.025e5;
const VIEW_X_MAX: f64 = 5.625e5;
const VIEW_Y_MIN: f64 = 1.55e5;
const VIEW_Y_MAX: f64 = 2.025e5;

// Colour scale for the choropleth and axis range for the trend strip.
const COLOR_SCALE_MAX_GBP: f64 = 1.0e6;
const TREND_Y_MAX_GBP: f64 = 7.5e5;
const TREND_X_MIN: (i32, u32) = (1995, 1);
const TREND_X_MAX: (i32, u32) = (2020, 1);

const MAP_TOP: u32 = 10;
const MAP_LEFT: u32 = 10;
const MAP_WIDTH: u32 = 520;
const MAP_HEIGHT: u32 = 580;
const BAR_LEFT: u32 = 550;
const BAR_WIDTH: u32 = 25;
const PLOT_TOP: u32 = 640;
const PLOT_LEFT: u32 = 50;
const PLOT_WIDTH: u32 = 520;
const PLOT_HEIGHT: u32 = 220;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const NO_DATA: Rgb<u8> = Rgb([210, 210, 210]);
const INK: Rgb<u8> = Rgb([40, 40, 40]);

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: Geometry,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
}

struct BoroughShape {
    name: String,
    polygons: Vec<Polygon<f64>>,
    bbox: Rect<f64>,
}

/// Renders choropleth frames from the borough boundary file.
///
/// Boundary names are upper-cased and passed through the alias table so they
/// line up with the price dataset's borough names, then sorted alphabetically
/// to match the engine's row order.
pub struct MapView {
    shapes: Vec<BoroughShape>,
}

impl MapView {
    /// Loads one shape per borough feature from a GeoJSON boundary file.
    pub fn from_geojson(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::malformed(0, format!("boundary file: {}", e)))?;

        let mut shapes = Vec::new();
        for feature in collection.features {
            let raw_name = feature
                .properties
                .get("NAME")
                .or_else(|| feature.properties.get("name"))
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::malformed(0, "boundary feature without a NAME property"))?;
            let name = resolve_boundary_alias(raw_name);

            let polygons = match feature.geometry {
                Geometry::Polygon { coordinates } => vec![ring_to_polygon(&coordinates)?],
                Geometry::MultiPolygon { coordinates } => coordinates
                    .iter()
                    .map(|rings| ring_to_polygon(rings))
                    .collect::<Result<Vec<_>>>()?,
            };
            let bbox = polygons
                .iter()
                .filter_map(|p| p.bounding_rect())
                .reduce(|a, b| {
                    Rect::new(
                        Coord {
                            x: a.min().x.min(b.min().x),
                            y: a.min().y.min(b.min().y),
                        },
                        Coord {
                            x: a.max().x.max(b.max().x),
                            y: a.max().y.max(b.max().y),
                        },
                    )
                })
                .ok_or_else(|| Error::malformed(0, format!("empty geometry for {}", name)))?;

            shapes.push(BoroughShape {
                name,
                polygons,
                bbox,
            });
        }
        shapes.sort_by(|a, b| a.name.cmp(&b.name));
        debug!("loaded {} borough shapes", shapes.len());
        Ok(MapView { shapes })
    }

    pub fn borough_names(&self) -> Vec<&str> {
        self.shapes.iter().map(|s| s.name.as_str()).collect()
    }

    /// Draws one animation frame: the colour-mapped borough map with a
    /// colour bar and period label on top, the city median trend line below.
    /// Boroughs absent from `values` are drawn in grey.
    pub fn render_frame(
        &self,
        year: i32,
        month: u32,
        values: &BTreeMap<String, f64>,
        trend_dates: &[NaiveDate],
        trend_medians: &[f64],
    ) -> RgbImage {
        let mut img = ImageBuffer::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, BACKGROUND);

        self.draw_map(&mut img, values);
        draw_color_bar(&mut img);
        draw_period_label(&mut img, year, month);
        draw_trend_strip(&mut img, trend_dates, trend_medians);

        img
    }

    fn draw_map(&self, img: &mut RgbImage, values: &BTreeMap<String, f64>) {
        // uniform scale so eastings and northings stay in proportion
        let scale = (MAP_WIDTH as f64 / (VIEW_X_MAX - VIEW_X_MIN))
            .min(MAP_HEIGHT as f64 / (VIEW_Y_MAX - VIEW_Y_MIN));

        let colors: Vec<Rgb<u8>> = self
            .shapes
            .iter()
            .map(|s| match values.get(&s.name) {
                Some(v) => plasma((v / COLOR_SCALE_MAX_GBP).clamp(0.0, 1.0)),
                None => NO_DATA,
            })
            .collect();

        for py in 0..MAP_HEIGHT {
            for px in 0..MAP_WIDTH {
                let x = VIEW_X_MIN + (px as f64 + 0.5) / scale;
                let y = VIEW_Y_MAX - (py as f64 + 0.5) / scale;
                if x > VIEW_X_MAX || y < VIEW_Y_MIN {
                    continue;
                }
                let point = Point::new(x, y);
                for (shape, color) in self.shapes.iter().zip(&colors) {
                    if !shape.bbox.contains(&point) {
                        continue;
                    }
                    if shape.polygons.iter().any(|p| p.contains(&point)) {
                        img.put_pixel(MAP_LEFT + px, MAP_TOP + py, *color);
                        break;
                    }
                }
            }
        }
    }
}

fn ring_to_polygon(rings: &[Vec<Vec<f64>>]) -> Result<Polygon<f64>> {
    let exterior = rings
        .first()
        .ok_or_else(|| Error::malformed(0, "polygon without an exterior ring"))?;
    let coords: Vec<Coord<f64>> = exterior
        .iter()
        .filter(|pos| pos.len() >= 2)
        .map(|pos| Coord {
            x: pos[0],
            y: pos[1],
        })
        .collect();
    if coords.len() < 3 {
        return Err(Error::malformed(0, "degenerate polygon ring"));
    }
    Ok(Polygon::new(LineString::from(coords), vec![]))
}

/// Piecewise-linear approximation of the plasma colour map.
fn plasma(t: f64) -> Rgb<u8> {
    const ANCHORS: [[f64; 3]; 5] = [
        [13.0, 8.0, 135.0],
        [126.0, 3.0, 168.0],
        [204.0, 71.0, 120.0],
        [248.0, 149.0, 64.0],
        [240.0, 249.0, 33.0],
    ];
    let t = t.clamp(0.0, 1.0) * (ANCHORS.len() - 1) as f64;
    let i = (t.floor() as usize).min(ANCHORS.len() - 2);
    let f = t - i as f64;
    let lerp = |a: f64, b: f64| (a + (b - a) * f).round() as u8;
    Rgb([
        lerp(ANCHORS[i][0], ANCHORS[i + 1][0]),
        lerp(ANCHORS[i][1], ANCHORS[i + 1][1]),
        lerp(ANCHORS[i][2], ANCHORS[i + 1][2]),
    ])
}

fn draw_color_bar(img: &mut RgbImage) {
    for py in 0..MAP_HEIGHT {
        let t = 1.0 - py as f64 / (MAP_HEIGHT - 1) as f64;
        let color = plasma(t);
        for px in 0..BAR_WIDTH {
            img.put_pixel(BAR_LEFT + px, MAP_TOP + py, color);
        }
    }
    // tick marks every 100k up to 1M
    for tick in 0..=10u32 {
        let py = MAP_TOP + MAP_HEIGHT - 1 - (tick * (MAP_HEIGHT - 1) / 10);
        for px in 0..6 {
            img.put_pixel(BAR_LEFT + BAR_WIDTH + px, py, INK);
        }
    }
}

fn month_index(year: i32, month: u32) -> i64 {
    year as i64 * 12 + (month as i64 - 1)
}

fn draw_trend_strip(img: &mut RgbImage, dates: &[NaiveDate], medians: &[f64]) {
    use chrono::Datelike;

    // axes
    for px in 0..PLOT_WIDTH {
        img.put_pixel(PLOT_LEFT + px, PLOT_TOP + PLOT_HEIGHT, INK);
    }
    for py in 0..=PLOT_HEIGHT {
        img.put_pixel(PLOT_LEFT, PLOT_TOP + py, INK);
    }

    let x_min = month_index(TREND_X_MIN.0, TREND_X_MIN.1) as f64;
    let x_max = month_index(TREND_X_MAX.0, TREND_X_MAX.1) as f64;

    let project = |date: NaiveDate, value: f64| -> (f64, f64) {
        let mx = month_index(date.year(), date.month()) as f64;
        let fx = ((mx - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
        let fy = (value / TREND_Y_MAX_GBP).clamp(0.0, 1.0);
        (
            PLOT_LEFT as f64 + fx * PLOT_WIDTH as f64,
            (PLOT_TOP + PLOT_HEIGHT) as f64 - fy * PLOT_HEIGHT as f64,
        )
    };

    for window in dates.iter().zip(medians).collect::<Vec<_>>().windows(2) {
        let (x0, y0) = project(*window[0].0, *window[0].1);
        let (x1, y1) = project(*window[1].0, *window[1].1);
        draw_segment(img, x0, y0, x1, y1, INK);
    }
}

fn draw_segment(img: &mut RgbImage, x0: f64, y0: f64, x1: f64, y1: f64, color: Rgb<u8>) {
    let steps = ((x1 - x0).abs().max((y1 - y0).abs()).ceil() as u32).max(1);
    for s in 0..=steps {
        let f = s as f64 / steps as f64;
        let x = (x0 + (x1 - x0) * f).round() as i64;
        let y = (y0 + (y1 - y0) * f).round() as i64;
        if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
            img.put_pixel(x as u32, y as u32, color);
        }
    }
}

// 3x5 glyphs for the period label, row-major bits.
const GLYPHS: [(char, [u8; 5]); 11] = [
    ('0', [0b111, 0b101, 0b101, 0b101, 0b111]),
    ('1', [0b010, 0b110, 0b010, 0b010, 0b111]),
    ('2', [0b111, 0b001, 0b111, 0b100, 0b111]),
    ('3', [0b111, 0b001, 0b111, 0b001, 0b111]),
    ('4', [0b101, 0b101, 0b111, 0b001, 0b001]),
    ('5', [0b111, 0b100, 0b111, 0b001, 0b111]),
    ('6', [0b111, 0b100, 0b111, 0b101, 0b111]),
    ('7', [0b111, 0b001, 0b010, 0b010, 0b010]),
    ('8', [0b111, 0b101, 0b111, 0b101, 0b111]),
    ('9', [0b111, 0b101, 0b111, 0b001, 0b111]),
    ('-', [0b000, 0b000, 0b111, 0b000, 0b000]),
];

fn draw_period_label(img: &mut RgbImage, year: i32, month: u32) {
    let label = format!("{}-{}", year, month);
    const SCALE: u32 = 5;
    let mut cursor = MAP_LEFT;
    for ch in label.chars() {
        let Some((_, rows)) = GLYPHS.iter().find(|(g, _)| *g == ch) else {
            continue;
        };
        for (ry, row) in rows.iter().enumerate() {
            for rx in 0..3u32 {
                if row >> (2 - rx) & 1 == 1 {
                    for sy in 0..SCALE {
                        for sx in 0..SCALE {
                            img.put_pixel(
                                cursor + rx * SCALE + sx,
                                MAP_TOP + ry as u32 * SCALE + sy,
                                INK,
                            );
                        }
                    }
                }
            }
        }
        cursor += 4 * SCALE;
    }
}
