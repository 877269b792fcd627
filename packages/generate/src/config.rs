//! Pipeline configuration.
//!
//! Every knob has a default, so a config file is optional. When one is
//! given it is TOML, e.g.:
//!
//! ```toml
//! resolution = 11
//! ring_radius = 1
//! region = "CA"
//! shuffle_partitions = 8
//! max_records_per_file = 100000
//!
//! [inputs]
//! crime = "data/Crime_Data.csv"
//! public_schools = "data/Public_Schools.csv"
//! private_schools = "data/Private_Schools.csv"
//! ```

use std::path::{Path, PathBuf};

use school_crime_join::ExecutionOptions;
use school_crime_source::locator::DatasetPaths;
use school_crime_source::school::DEFAULT_REGION;
use school_crime_spatial::{DEFAULT_RESOLUTION, DEFAULT_RING_RADIUS, SpatialIndexer};
use serde::Deserialize;

/// Errors from loading or validating a [`PipelineConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema.
    #[error("invalid config TOML: {0}")]
    Toml(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Input dataset locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputsConfig {
    pub crime: PathBuf,
    pub public_schools: PathBuf,
    pub private_schools: PathBuf,
}

impl Default for InputsConfig {
    fn default() -> Self {
        let paths = DatasetPaths::default();
        Self {
            crime: paths.crime,
            public_schools: paths.public_schools,
            private_schools: paths.private_schools,
        }
    }
}

/// All tunables of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// H3 resolution both crimes and schools are indexed at.
    pub resolution: u8,
    /// Grid-disk radius of a school's neighborhood.
    pub ring_radius: u32,
    /// `STATE` value schools must carry.
    pub region: String,
    /// Worker threads; unset uses available parallelism.
    pub num_threads: Option<usize>,
    /// Rows per map partition.
    pub chunk_size: usize,
    /// Hash partitions for the join shuffle.
    pub shuffle_partitions: usize,
    /// Fail the run if a shuffle partition exceeds this many rows.
    pub max_partition_rows: Option<usize>,
    /// Rows per output part file.
    pub max_records_per_file: usize,
    pub inputs: InputsConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let execution = ExecutionOptions::default();
        Self {
            resolution: DEFAULT_RESOLUTION,
            ring_radius: DEFAULT_RING_RADIUS,
            region: DEFAULT_REGION.to_owned(),
            num_threads: execution.num_threads,
            chunk_size: execution.chunk_size,
            shuffle_partitions: execution.shuffle_partitions,
            max_partition_rows: execution.max_partition_rows,
            max_records_per_file: 100_000,
            inputs: InputsConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Loads and validates a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or fails validation.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document does not parse or fails
    /// validation.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::de::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        SpatialIndexer::new(self.resolution).map_err(|e| ConfigError::Invalid(e.to_string()))?;

        let checks = [
            (self.region.trim().is_empty(), "region must not be empty"),
            (self.chunk_size == 0, "chunk_size must be > 0"),
            (self.shuffle_partitions == 0, "shuffle_partitions must be > 0"),
            (self.num_threads == Some(0), "num_threads must be > 0 when set"),
            (
                self.max_partition_rows == Some(0),
                "max_partition_rows must be > 0 when set",
            ),
            (self.max_records_per_file == 0, "max_records_per_file must be > 0"),
        ];
        if let Some((_, msg)) = checks.iter().find(|(bad, _)| *bad) {
            return Err(ConfigError::Invalid((*msg).to_owned()));
        }
        Ok(())
    }

    #[must_use]
    pub fn execution_options(&self) -> ExecutionOptions {
        ExecutionOptions {
            num_threads: self.num_threads,
            chunk_size: self.chunk_size,
            shuffle_partitions: self.shuffle_partitions,
            max_partition_rows: self.max_partition_rows,
        }
    }

    #[must_use]
    pub fn dataset_paths(&self) -> DatasetPaths {
        DatasetPaths {
            crime: self.inputs.crime.clone(),
            public_schools: self.inputs.public_schools.clone(),
            private_schools: self.inputs.private_schools.clone(),
        }
    }
}
