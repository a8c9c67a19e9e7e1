//! On-disk dataset layout.
//!
//! Every name the sequencer writes and the analysis reads is produced here:
//!
//! ```text
//! <run-root>/
//!   Controls.txt
//!   Copol_Sampler_<angle>/  background.<ext>  <wavelength>.<ext> ...
//!   Depol_Sampler_<angle>/  background.<ext>  <wavelength>.<ext> ...
//! ```
//!
//! `<angle>` is the shortest decimal that round-trips the angle, always with a
//! fractional digit (`0.0`, `22.5`).

use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::StorageConfig;
use crate::error::{AppResult, HyperPiError};

/// Stem of the background frame in every angle folder.
pub const BACKGROUND_STEM: &str = "background";

const SAMPLER_TAG: &str = "Sampler_";

/// Polarization state of a capture, set by the polarizer angle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Polarization {
    /// Polarizer at 0°.
    Copolarized,
    /// Polarizer at 90°.
    Depolarized,
}

impl Polarization {
    /// Capture order within one position.
    pub const ALL: [Polarization; 2] = [Polarization::Copolarized, Polarization::Depolarized];

    /// Folder prefix.
    pub fn prefix(self) -> &'static str {
        match self {
            Polarization::Copolarized => "Copol",
            Polarization::Depolarized => "Depol",
        }
    }

    /// Polarizer angle that produces this state.
    pub fn polarizer_angle(self) -> f64 {
        match self {
            Polarization::Copolarized => 0.0,
            Polarization::Depolarized => 90.0,
        }
    }

    /// Index along the polarization axis of a reflectance cube.
    pub fn index(self) -> usize {
        match self {
            Polarization::Copolarized => 0,
            Polarization::Depolarized => 1,
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Text used for an angle in folder names.
pub fn format_angle(angle: f64) -> String {
    format!("{angle:?}")
}

/// Folder name for one polarization at one sampler angle.
pub fn angle_folder_name(polarization: Polarization, angle: f64) -> String {
    format!("{}_{SAMPLER_TAG}{}", polarization.prefix(), format_angle(angle))
}

/// Name of the folder created for one measurement started at `timestamp`.
pub fn run_folder_name<Tz: TimeZone>(timestamp: &DateTime<Tz>) -> String
where
    Tz::Offset: fmt::Display,
{
    format!("Measurement_{}", timestamp.format("%Y%m%d_%H%M%S"))
}

/// One `Copol_*` / `Depol_*` folder pair of an existing dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct AngleFolders {
    /// Folder name without the polarization prefix, e.g. `Sampler_22.5`.
    pub suffix: String,
    /// Sampler angle parsed from the suffix, when it is numeric.
    pub angle: Option<f64>,
    /// `Copol_<suffix>` folder.
    pub copol: PathBuf,
    /// `Depol_<suffix>` folder.
    pub depol: PathBuf,
}

impl AngleFolders {
    /// Folder holding frames of `polarization`.
    pub fn folder(&self, polarization: Polarization) -> &Path {
        match polarization {
            Polarization::Copolarized => &self.copol,
            Polarization::Depolarized => &self.depol,
        }
    }

    /// Name of the Copol folder, used to label the angle axis of a cube.
    pub fn copol_name(&self) -> String {
        format!("{}_{}", Polarization::Copolarized.prefix(), self.suffix)
    }
}

/// Paths of one dataset rooted at a run folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLayout {
    root: PathBuf,
    extension: String,
    metadata_file: String,
}

impl DatasetLayout {
    /// Layout of the run rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, storage: &StorageConfig) -> Self {
        Self {
            root: root.into(),
            extension: storage.frame_extension.clone(),
            metadata_file: storage.metadata_file.clone(),
        }
    }

    /// Run root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Frame file extension, without the dot.
    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Path of the control record.
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_file)
    }

    /// Folder of one polarization at one sampler angle.
    pub fn angle_folder(&self, polarization: Polarization, angle: f64) -> PathBuf {
        self.root.join(angle_folder_name(polarization, angle))
    }

    /// Background frame inside any angle folder.
    pub fn background_in(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{BACKGROUND_STEM}.{}", self.extension))
    }

    /// Wavelength frame inside any angle folder.
    pub fn frame_in(&self, folder: &Path, wavelength_nm: u32) -> PathBuf {
        folder.join(format!("{wavelength_nm}.{}", self.extension))
    }

    /// Background frame of one polarization at one sampler angle.
    pub fn background_path(&self, polarization: Polarization, angle: f64) -> PathBuf {
        self.background_in(&self.angle_folder(polarization, angle))
    }

    /// LED frame of one polarization at one sampler angle.
    pub fn frame_path(&self, polarization: Polarization, angle: f64, wavelength_nm: u32) -> PathBuf {
        self.frame_in(&self.angle_folder(polarization, angle), wavelength_nm)
    }

    /// Create the Copol and Depol folders for `angle`. Existing folders are kept.
    pub fn create_angle_folders(&self, angle: f64) -> io::Result<()> {
        for polarization in Polarization::ALL {
            fs::create_dir_all(self.angle_folder(polarization, angle))?;
        }
        Ok(())
    }

    /// Folders of one polarization as `(suffix, path)`, in directory order.
    pub fn list_folders(&self, polarization: Polarization) -> AppResult<Vec<(String, PathBuf)>> {
        let prefix = format!("{}_", polarization.prefix());
        let mut found = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(suffix) = name.strip_prefix(&prefix) {
                found.push((suffix.to_string(), entry.path()));
            }
        }
        Ok(found)
    }

    /// Pair Copol and Depol folders by suffix, ordered by sampler angle.
    ///
    /// Folders whose suffix carries no numeric angle sort last, by name.
    pub fn angle_folders(&self) -> AppResult<Vec<AngleFolders>> {
        let copol = self.list_folders(Polarization::Copolarized)?;
        let depol: BTreeMap<String, PathBuf> =
            self.list_folders(Polarization::Depolarized)?.into_iter().collect();

        if copol.len() != depol.len() {
            return Err(HyperPiError::IncompleteDataset {
                path: self.root.clone(),
                reason: format!(
                    "{} Copol folders, {} Depol folders",
                    copol.len(),
                    depol.len()
                ),
            });
        }

        let mut pairs = Vec::with_capacity(copol.len());
        for (suffix, copol_path) in copol {
            let depol_path = depol.get(&suffix).cloned().ok_or_else(|| {
                HyperPiError::IncompleteDataset {
                    path: self.root.clone(),
                    reason: format!("Copol_{suffix} has no Depol_{suffix} partner"),
                }
            })?;
            pairs.push(AngleFolders {
                angle: parse_sampler_angle(&suffix),
                suffix,
                copol: copol_path,
                depol: depol_path,
            });
        }

        pairs.sort_by(|a, b| match (a.angle, b.angle) {
            (Some(x), Some(y)) => x.total_cmp(&y).then_with(|| a.suffix.cmp(&b.suffix)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.suffix.cmp(&b.suffix),
        });
        Ok(pairs)
    }
}

fn parse_sampler_angle(suffix: &str) -> Option<f64> {
    suffix
        .strip_prefix(SAMPLER_TAG)
        .unwrap_or(suffix)
        .parse::<f64>()
        .ok()
        .filter(|a| a.is_finite())
}
