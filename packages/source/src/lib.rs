#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Input datasets and per-row normalization.
//!
//! Raw CSV files are located through a [`locator::DatasetLocator`], loaded
//! into [`table::CsvTable`]s, and normalized row by row:
//!
//! * crime rows by [`crime::CrimeTransformer`]
//! * public and private school rows by [`school::SchemaNormalizer`], which
//!   also unions the two into one schema
//!
//! Row-level problems (bad timestamps, unparseable numbers, out-of-range
//! coordinates) never fail a load. They null the affected field or land in
//! a fallback bucket. Only structural problems (unreadable file, missing
//! required column) surface as [`SourceError`].

pub mod crime;
pub mod level;
pub mod locator;
pub mod parsing;
pub mod progress;
pub mod school;
pub mod table;

use std::path::PathBuf;

/// Errors that can occur while locating or loading a dataset.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// I/O error (file open/read).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV decoding failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// The file has no header row.
    #[error("{dataset} has no header row")]
    EmptyHeader {
        /// Dataset label.
        dataset: String,
    },

    /// A column the pipeline cannot run without is absent.
    #[error("{dataset} is missing required column '{column}'")]
    MissingColumn {
        /// Dataset label.
        dataset: String,
        /// Header name that was expected.
        column: String,
    },

    /// An input file could not be found.
    #[error("{dataset} not found at {}", path.display())]
    MissingInput {
        /// Dataset label.
        dataset: &'static str,
        /// Path that was checked.
        path: PathBuf,
    },
}
