//! Core data types and I/O operations.

pub mod loaders;
pub mod transforms;
pub mod writers;

pub use loaders::{load_iv_csv, load_spectrum, LoaderError, SampleSeries};
pub use writers::{write_records_csv, write_rows_csv, WriteError};
