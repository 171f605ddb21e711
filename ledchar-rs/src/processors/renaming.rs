//! Normalization of raw instrument file names.
//!
//! The IV tracer and the spectrometer save files under free-form names such as
//! `LED 1 (azul) alta intensidade 2 - 11_09_Página1.xlsx`. A [`RenameRule`]
//! maps them to the short lowercase names the pairing step expects
//! (`led1-a2-iv.xlsx`).

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::config::RenameRule;

/// Errors that stop a renaming pass before any file is touched.
#[derive(Debug, Error)]
pub enum RenameError {
    #[error("Directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    #[error("Failed to read directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid rename pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, RenameError>;

/// What happened to one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    /// Renamed (or would be, in a dry run).
    Renamed { from: PathBuf, to: PathBuf },
    /// The name does not match the rule.
    Unmatched(PathBuf),
    /// The name already has its normalized form.
    Unchanged(PathBuf),
    /// The destination exists; the file was left alone.
    Conflict { from: PathBuf, to: PathBuf },
    /// The filesystem refused the rename.
    Failed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

/// A compiled [`RenameRule`].
#[derive(Debug, Clone)]
pub struct Renamer {
    regex: Regex,
    template: String,
    extension: String,
}

impl Renamer {
    /// Compile a rule. The pattern is case-insensitive and must match at the
    /// start of the file name.
    pub fn new(rule: &RenameRule) -> Result<Self> {
        let regex = RegexBuilder::new(&format!("^(?:{})", rule.pattern))
            .case_insensitive(true)
            .build()
            .map_err(|source| RenameError::InvalidPattern {
                pattern: rule.pattern.clone(),
                source,
            })?;

        Ok(Self {
            regex,
            template: rule.template.clone(),
            extension: rule.extension.trim_start_matches('.').to_string(),
        })
    }

    /// Whether `path` has the rule's extension.
    pub fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }

    /// The normalized name for `file_name`, or `None` if it does not match.
    pub fn target_name(&self, file_name: &str) -> Option<String> {
        let caps = self.regex.captures(file_name)?;
        let mut expanded = String::with_capacity(self.template.len());
        caps.expand(&self.template, &mut expanded);
        Some(expanded.to_lowercase())
    }
}

/// Rename every matching file in `dir` according to `rule`.
///
/// # Arguments
///
/// * `dir` - Directory holding the raw files (not searched recursively)
/// * `rule` - Pattern, template and extension filter
/// * `dry_run` - If true, only report what would be renamed
///
/// # Returns
///
/// One outcome per file with the rule's extension, in file name order.
pub fn rename_files(dir: &Path, rule: &RenameRule, dry_run: bool) -> Result<Vec<RenameOutcome>> {
    if !dir.is_dir() {
        return Err(RenameError::DirectoryNotFound(dir.to_path_buf()));
    }
    let renamer = Renamer::new(rule)?;

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|source| RenameError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && renamer.accepts(path))
        .collect();

    files.sort();

    // Destinations claimed earlier in this pass, so a dry run reports the same
    // conflicts a real run would hit
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    let mut outcomes = Vec::with_capacity(files.len());

    for path in files {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!("Skipping non UTF-8 file name: {}", path.display());
            outcomes.push(RenameOutcome::Unmatched(path));
            continue;
        };

        let Some(new_name) = renamer.target_name(file_name) else {
            warn!("Name does not match the rename pattern: {}", file_name);
            outcomes.push(RenameOutcome::Unmatched(path));
            continue;
        };

        if new_name == file_name {
            outcomes.push(RenameOutcome::Unchanged(path));
            continue;
        }

        let dest = dir.join(&new_name);
        if dest.exists() || claimed.contains(&dest) {
            warn!("{} already exists, not renaming {}", new_name, file_name);
            outcomes.push(RenameOutcome::Conflict { from: path, to: dest });
            continue;
        }

        if dry_run {
            info!("Would rename: {} -> {}", file_name, new_name);
        } else if let Err(e) = fs::rename(&path, &dest) {
            warn!("Failed to rename {}: {}", file_name, e);
            outcomes.push(RenameOutcome::Failed {
                from: path,
                to: dest,
                reason: e.to_string(),
            });
            continue;
        } else {
            info!("Renamed: {} -> {}", file_name, new_name);
        }

        claimed.insert(dest.clone());
        outcomes.push(RenameOutcome::Renamed { from: path, to: dest });
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RenamingConfig;
    use std::fs::File;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        File::create(&path).unwrap();
        path
    }

    fn names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_default_iv_rule() {
        let renamer = Renamer::new(&RenamingConfig::default().iv).unwrap();
        assert_eq!(
            renamer
                .target_name("LED 1 (azul) alta intensidade 2 - 11_09_Página1.xlsx")
                .as_deref(),
            Some("led1-a2-iv.xlsx")
        );
        assert_eq!(
            renamer.target_name("led12 verde ALTA INTENSIDADE 3.xlsx").as_deref(),
            Some("led12-a3-iv.xlsx")
        );
        assert_eq!(renamer.target_name("LED 1 baixa intensidade 2.xlsx"), None);
    }

    #[test]
    fn test_default_spectrum_rule() {
        let renamer = Renamer::new(&RenamingConfig::default().spectrum).unwrap();
        assert_eq!(
            renamer.target_name("led1 (azul) a1.txt").as_deref(),
            Some("led1-a1-espectro.txt")
        );
        assert_eq!(
            renamer.target_name("LED 3 (Vermelho) B2.txt").as_deref(),
            Some("led3-b2-espectro.txt")
        );
        assert_eq!(renamer.target_name("led1-a1-espectro.txt"), None);
    }

    #[test]
    fn test_pattern_is_anchored_at_start() {
        let renamer = Renamer::new(&RenamingConfig::default().spectrum).unwrap();
        assert_eq!(renamer.target_name("copy of led1 (azul) a1.txt"), None);
    }

    #[test]
    fn test_rename_files() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "led1 (azul) a1.txt");
        touch(temp_dir.path(), "LED 2 (verde) a3.txt");
        touch(temp_dir.path(), "notas.txt");
        touch(temp_dir.path(), "led1 (azul) a2.csv");

        let outcomes =
            rename_files(temp_dir.path(), &RenamingConfig::default().spectrum, false).unwrap();

        assert_eq!(outcomes.len(), 3);
        assert_eq!(
            outcomes[0],
            RenameOutcome::Renamed {
                from: temp_dir.path().join("LED 2 (verde) a3.txt"),
                to: temp_dir.path().join("led2-a3-espectro.txt"),
            }
        );
        assert!(matches!(outcomes[1], RenameOutcome::Renamed { .. }));
        assert_eq!(
            outcomes[2],
            RenameOutcome::Unmatched(temp_dir.path().join("notas.txt"))
        );
        assert_eq!(
            names(temp_dir.path()),
            vec![
                "led1 (azul) a2.csv",
                "led1-a1-espectro.txt",
                "led2-a3-espectro.txt",
                "notas.txt"
            ]
        );
    }

    #[test]
    fn test_dry_run_leaves_files() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "LED 1 (azul) alta intensidade 2 - 11_09_Página1.xlsx");

        let outcomes =
            rename_files(temp_dir.path(), &RenamingConfig::default().iv, true).unwrap();

        assert_eq!(outcomes.len(), 1);
        assert!(matches!(
            &outcomes[0],
            RenameOutcome::Renamed { to, .. } if to.ends_with("led1-a2-iv.xlsx")
        ));
        assert_eq!(
            names(temp_dir.path()),
            vec!["LED 1 (azul) alta intensidade 2 - 11_09_Página1.xlsx"]
        );
    }

    #[test]
    fn test_existing_destination_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let existing = temp_dir.path().join("led1-a1-espectro.txt");
        fs::write(&existing, "keep me").unwrap();
        let source = touch(temp_dir.path(), "led1 (azul) a1.txt");

        let outcomes =
            rename_files(temp_dir.path(), &RenamingConfig::default().spectrum, false).unwrap();

        let conflict = RenameOutcome::Conflict {
            from: source.clone(),
            to: existing.clone(),
        };
        assert!(outcomes.contains(&conflict));
        assert!(source.exists());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "keep me");
    }

    #[test]
    fn test_dry_run_reports_collisions() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "led1 (azul) a1.txt");
        touch(temp_dir.path(), "led1 (blue) a1.txt");

        let outcomes =
            rename_files(temp_dir.path(), &RenamingConfig::default().spectrum, true).unwrap();

        assert!(matches!(outcomes[0], RenameOutcome::Renamed { .. }));
        assert!(matches!(outcomes[1], RenameOutcome::Conflict { .. }));
    }

    #[test]
    fn test_already_normalized_name_is_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let normalized = touch(temp_dir.path(), "led1-a2-iv.xlsx");
        touch(temp_dir.path(), "LED3-A1-IV.xlsx");

        let rule = RenameRule {
            pattern: r"led(\d+)-a(\d+)-iv\.xlsx".to_string(),
            template: "led${1}-a${2}-iv.xlsx".to_string(),
            extension: "xlsx".to_string(),
        };
        let outcomes = rename_files(temp_dir.path(), &rule, false).unwrap();

        assert_eq!(
            outcomes,
            vec![
                RenameOutcome::Renamed {
                    from: temp_dir.path().join("LED3-A1-IV.xlsx"),
                    to: temp_dir.path().join("led3-a1-iv.xlsx"),
                },
                RenameOutcome::Unchanged(normalized),
            ]
        );
        assert_eq!(
            names(temp_dir.path()),
            vec!["led1-a2-iv.xlsx", "led3-a1-iv.xlsx"]
        );
    }

    #[test]
    fn test_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("nope");
        let err = rename_files(&missing, &RenamingConfig::default().iv, false).unwrap_err();
        assert!(matches!(err, RenameError::DirectoryNotFound(p) if p == missing));
    }

    #[test]
    fn test_invalid_pattern() {
        let rule = RenameRule {
            pattern: "led(".to_string(),
            template: "x".to_string(),
            extension: "txt".to_string(),
        };
        assert!(matches!(
            Renamer::new(&rule),
            Err(RenameError::InvalidPattern { .. })
        ));
    }
}
