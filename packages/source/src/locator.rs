//! Input dataset resolution.
//!
//! Acquiring the datasets (downloading, unpacking) is someone else's job.
//! The pipeline only asks a [`DatasetLocator`] where the three CSV files
//! are and expects them to exist.

use std::ffi::OsString;
use std::path::PathBuf;

use crate::SourceError;

/// Environment variable overriding the crime CSV path.
pub const CRIME_CSV_ENV: &str = "SCHOOL_CRIME_CRIME_CSV";
/// Environment variable overriding the public schools CSV path.
pub const PUBLIC_SCHOOLS_CSV_ENV: &str = "SCHOOL_CRIME_PUBLIC_SCHOOLS_CSV";
/// Environment variable overriding the private schools CSV path.
pub const PRIVATE_SCHOOLS_CSV_ENV: &str = "SCHOOL_CRIME_PRIVATE_SCHOOLS_CSV";

/// Paths to the three input datasets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    pub crime: PathBuf,
    pub public_schools: PathBuf,
    pub private_schools: PathBuf,
}

impl Default for DatasetPaths {
    fn default() -> Self {
        Self {
            crime: PathBuf::from("data/Crime_Data.csv"),
            public_schools: PathBuf::from("data/Public_Schools.csv"),
            private_schools: PathBuf::from("data/Private_Schools.csv"),
        }
    }
}

/// Resolves where the input datasets live.
pub trait DatasetLocator: Send + Sync {
    /// Returns paths to all three datasets.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if any dataset cannot be located.
    fn locate(&self) -> Result<DatasetPaths, SourceError>;
}

/// Locator backed by fixed paths, optionally overridden from the
/// environment.
#[derive(Debug, Clone)]
pub struct ConfiguredLocator {
    paths: DatasetPaths,
}

impl ConfiguredLocator {
    #[must_use]
    pub const fn new(paths: DatasetPaths) -> Self {
        Self { paths }
    }

    /// Applies [`CRIME_CSV_ENV`], [`PUBLIC_SCHOOLS_CSV_ENV`], and
    /// [`PRIVATE_SCHOOLS_CSV_ENV`] on top of the configured paths.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var_os(key))
    }

    /// Applies overrides from an arbitrary key lookup.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<OsString>) -> Self {
        for (key, slot) in [
            (CRIME_CSV_ENV, &mut self.paths.crime),
            (PUBLIC_SCHOOLS_CSV_ENV, &mut self.paths.public_schools),
            (PRIVATE_SCHOOLS_CSV_ENV, &mut self.paths.private_schools),
        ] {
            if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
                *slot = PathBuf::from(value);
                log::debug!("{key} overrides input path: {}", slot.display());
            }
        }
        self
    }

    #[must_use]
    pub const fn paths(&self) -> &DatasetPaths {
        &self.paths
    }
}

impl DatasetLocator for ConfiguredLocator {
    fn locate(&self) -> Result<DatasetPaths, SourceError> {
        for (dataset, path) in [
            ("crime dataset", &self.paths.crime),
            ("public schools dataset", &self.paths.public_schools),
            ("private schools dataset", &self.paths.private_schools),
        ] {
            if !path.is_file() {
                return Err(SourceError::MissingInput {
                    dataset,
                    path: path.clone(),
                });
            }
        }
        Ok(self.paths.clone())
    }
}
