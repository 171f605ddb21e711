//! Configuration types for the characterization pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Layout of the IV (current-voltage) tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IvConfig {
    /// Header of the voltage column (x axis of the breakpoint fit)
    #[serde(default = "default_voltage_column")]
    pub voltage_column: String,

    /// Header of the current column (y axis of the breakpoint fit)
    #[serde(default = "default_current_column")]
    pub current_column: String,

    /// File name suffixes that mark an IV file, matched case-insensitively
    #[serde(default = "default_iv_suffixes")]
    pub suffixes: Vec<String>,

    /// Field separator
    #[serde(default = "default_iv_delimiter")]
    pub delimiter: char,
}

fn default_voltage_column() -> String {
    "tensao (V) (0,001)".to_string()
}

fn default_current_column() -> String {
    "corrente (mA) (0,0001)".to_string()
}

fn default_iv_suffixes() -> Vec<String> {
    vec!["-iv.txt".to_string(), "-iv.csv".to_string()]
}

fn default_iv_delimiter() -> char {
    ','
}

impl Default for IvConfig {
    fn default() -> Self {
        Self {
            voltage_column: default_voltage_column(),
            current_column: default_current_column(),
            suffixes: default_iv_suffixes(),
            delimiter: default_iv_delimiter(),
        }
    }
}

/// Layout of the spectrometer exports.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpectrumConfig {
    /// Suffix appended to an IV base name to find its spectrum
    #[serde(default = "default_spectrum_suffix")]
    pub suffix: String,

    /// Field separator
    #[serde(default = "default_spectrum_delimiter")]
    pub delimiter: char,

    /// Decimal separator used in the numeric cells
    #[serde(default = "default_spectrum_decimal")]
    pub decimal: char,
}

fn default_spectrum_suffix() -> String {
    "-espectro.txt".to_string()
}

fn default_spectrum_delimiter() -> char {
    '\t'
}

fn default_spectrum_decimal() -> char {
    ','
}

impl Default for SpectrumConfig {
    fn default() -> Self {
        Self {
            suffix: default_spectrum_suffix(),
            delimiter: default_spectrum_delimiter(),
            decimal: default_spectrum_decimal(),
        }
    }
}

/// How the breakpoint fit chooses its starting point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointGuess {
    /// Medians of x and y with slopes 0.1 and 1.0
    #[default]
    Fixed,
    /// Medians for the breakpoint, slopes from a line fit on each half
    Regression,
}

/// Which peak position is reported next to the fitted variance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PeakLocation {
    /// Sample position of the highest intensity
    #[default]
    Observed,
    /// Center of the fitted Gaussian
    Fitted,
}

/// Configuration for the least-squares fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitConfig {
    /// Maximum number of Levenberg-Marquardt iterations
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Relative reduction of the residual sum of squares
    #[serde(default = "default_tolerance")]
    pub ftol: f64,

    /// Relative size of the parameter step
    #[serde(default = "default_tolerance")]
    pub xtol: f64,

    /// Max-norm of the gradient
    #[serde(default)]
    pub gtol: f64,

    /// Decimals kept on x before the breakpoint fit
    #[serde(default = "default_x_decimals")]
    pub x_decimals: i32,

    /// Decimals kept on y before the breakpoint fit
    #[serde(default = "default_y_decimals")]
    pub y_decimals: i32,

    #[serde(default)]
    pub initial_guess: BreakpointGuess,

    #[serde(default)]
    pub peak_location: PeakLocation,
}

fn default_max_iterations() -> usize {
    1000
}

fn default_tolerance() -> f64 {
    1.49012e-8
}

fn default_x_decimals() -> i32 {
    2
}

fn default_y_decimals() -> i32 {
    3
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            ftol: default_tolerance(),
            xtol: default_tolerance(),
            gtol: 0.0,
            x_decimals: default_x_decimals(),
            y_decimals: default_y_decimals(),
            initial_guess: BreakpointGuess::default(),
            peak_location: PeakLocation::default(),
        }
    }
}

/// A file renaming rule.
///
/// `pattern` is matched case-insensitively from the start of the file name and
/// `template` is expanded with its captures (`${1}`, `${2}`, ...). The expanded
/// name is lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    pub pattern: String,
    pub template: String,
    /// Only files with this extension are considered
    pub extension: String,
}

/// Renaming rules for raw IV and spectrum file names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenamingConfig {
    #[serde(default = "default_iv_rule")]
    pub iv: RenameRule,

    #[serde(default = "default_spectrum_rule")]
    pub spectrum: RenameRule,
}

fn default_iv_rule() -> RenameRule {
    RenameRule {
        pattern: r"LED\s*(\d+).*alta intensidade\s*(\d+).*\.xlsx".to_string(),
        template: "led${1}-a${2}-iv.xlsx".to_string(),
        extension: "xlsx".to_string(),
    }
}

fn default_spectrum_rule() -> RenameRule {
    RenameRule {
        pattern: r"led\s*(\d+)\s*\(.*?\)\s*([a-z])(\d+)\.txt".to_string(),
        template: "led${1}-${2}${3}-espectro.txt".to_string(),
        extension: "txt".to_string(),
    }
}

impl Default for RenamingConfig {
    fn default() -> Self {
        Self {
            iv: default_iv_rule(),
            spectrum: default_spectrum_rule(),
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub iv: IvConfig,

    #[serde(default)]
    pub spectrum: SpectrumConfig,

    #[serde(default)]
    pub fitting: FitConfig,

    #[serde(default)]
    pub renaming: RenamingConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
