//! London property price choropleth pipeline.
//!
//! Aggregates UK price paid transaction data down to per-borough and
//! city-wide monthly statistics (cached as CSV side files), and renders the
//! borough means as an animated choropleth with a median trend line.

pub mod boroughs;
pub mod cache;
pub mod controller;
pub mod error;
pub mod loader;
pub mod map_view;

pub use error::{Error, Result};
