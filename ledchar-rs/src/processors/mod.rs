//! Data processing modules.

pub mod breakpoint;
pub mod conversion;
pub mod curve_fit;
pub mod pairing;
pub mod peak;
pub mod renaming;

// Re-export key types for convenience
pub use breakpoint::{find_breakpoint, fit_breakpoint, BreakpointFit, PiecewiseLinear};
pub use conversion::{
    convert_directory, convert_to_sibling_csv, convert_workbook, find_workbooks, ConversionError,
    ConversionOutcome,
};
pub use curve_fit::{fit, FitError, FitReport, Model};
pub use pairing::{
    characterize_pair, find_pairs, process_candidate, process_pairs, run_characterization,
    write_results, BatchReport, CharacterizationRecord, PairCandidate, PairError, PairOutcome,
    PairStatus, SkipReason,
};
pub use peak::{find_peak, fit_peak, Gaussian, PeakFit};
pub use renaming::{rename_files, RenameError, RenameOutcome, Renamer};
