//! LED characterization pipeline.
//!
//! This crate provides tools for:
//! - Normalizing raw instrument file names and converting IV workbooks to CSV
//! - Loading IV tables and spectrometer exports
//! - Locating the turn-on voltage with a piecewise-linear least-squares fit
//! - Locating the emission peak and its width with a Gaussian fit
//! - Pairing IV and spectrum files and writing one result row per LED
//!
//! # Example
//!
//! ```no_run
//! use ledchar::{core::loaders::load_spectrum, processors::peak::find_peak, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let spectrum = load_spectrum("led1-a1-espectro.txt", Some(&config.spectrum)).unwrap();
//! let (x_peak, variance) = find_peak(&spectrum, &config.fitting).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{BreakpointGuess, FitConfig, PeakLocation, PipelineConfig};
pub use core::loaders::SampleSeries;
pub use processors::breakpoint::find_breakpoint;
pub use processors::peak::find_peak;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
