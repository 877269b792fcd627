#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Crime-near-school pipeline.
//!
//! Loads the crime and school datasets, normalizes both into spatially
//! indexed records, joins every school against the crimes inside its
//! grid-disk neighborhood, and writes the joined rows as a directory of
//! CSV part files.
//!
//! The run is four stages (load, normalize, join, write). Crime
//! normalization and school normalization are independent and run
//! concurrently; everything row-level runs partitioned on the
//! [`ExecutionContext`] worker pool.

pub mod config;
pub mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use school_crime_crime_models::CrimeRecord;
use school_crime_join::{ExecutionContext, JoinEngine, JoinError};
use school_crime_school_models::{SchoolTable, SchoolType};
use school_crime_source::SourceError;
use school_crime_source::crime::{CrimeQuality, CrimeTransformer};
use school_crime_source::locator::DatasetLocator;
use school_crime_source::progress::ProgressCallback;
use school_crime_source::school::{SchemaNormalizer, union_by_name};
use school_crime_source::table::CsvTable;
use school_crime_spatial::{NeighborExpander, SpatialError, SpatialIndexer};

pub use config::{ConfigError, PipelineConfig};
pub use output::{CsvDirectorySink, OutputSink, WriteSummary};

/// Number of progress steps reported by [`run`].
pub const STAGES: u64 = 4;

/// Errors that can abort a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Spatial(#[from] SpatialError),

    #[error(transparent)]
    Join(#[from] JoinError),

    /// I/O error while writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding failed.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// The output path can't name a directory.
    #[error("invalid output path: {}", .0.display())]
    InvalidOutputPath(PathBuf),
}

/// Row counts of one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub crimes_read: usize,
    pub crimes_indexed: usize,
    pub crimes_unindexable: usize,
    pub public_schools_kept: usize,
    pub private_schools_kept: usize,
    pub exploded_rows: usize,
    pub joined_rows: usize,
    pub files_written: usize,
}

impl RunSummary {
    pub fn log(&self) {
        log::info!(
            "Run complete: {} crimes read ({} indexed, {} unindexable), \
             {} public + {} private schools, {} neighborhood rows, \
             {} joined rows in {} files",
            self.crimes_read,
            self.crimes_indexed,
            self.crimes_unindexable,
            self.public_schools_kept,
            self.private_schools_kept,
            self.exploded_rows,
            self.joined_rows,
            self.files_written,
        );
    }
}

/// Runs the full pipeline and writes its output to `output_dir`,
/// replacing whatever was there.
///
/// # Errors
///
/// Returns [`GenerateError`] if the config is invalid, an input can't be
/// located or read, a shuffle partition exceeds its ceiling, or the
/// output can't be written. Row-level data problems never fail the run.
pub fn run(
    config: &PipelineConfig,
    locator: &dyn DatasetLocator,
    output_dir: &Path,
    progress: &Arc<dyn ProgressCallback>,
) -> Result<RunSummary, GenerateError> {
    config.validate()?;
    let indexer = SpatialIndexer::new(config.resolution)?;
    let ctx = ExecutionContext::new(config.execution_options())?;
    log::info!(
        "Starting run: resolution {}, ring radius {}, region {}, {} threads, {} shuffle partitions",
        config.resolution,
        config.ring_radius,
        config.region,
        ctx.num_threads(),
        config.shuffle_partitions
    );

    progress.set_total(STAGES);

    progress.set_message("Loading datasets".to_owned());
    let paths = locator.locate()?;
    let crime_table = CsvTable::read(&paths.crime, "crime")?;
    let public_table = CsvTable::read(&paths.public_schools, "public schools")?;
    let private_table = CsvTable::read(&paths.private_schools, "private schools")?;
    progress.inc(1);

    progress.set_message("Normalizing".to_owned());
    let normalizer = SchemaNormalizer::new(config.region.clone(), indexer);
    let (crimes, schools) = ctx.run_concurrently(
        || transform_crimes(&ctx, indexer, &crime_table),
        || normalize_schools(&ctx, &normalizer, &public_table, &private_table),
    );
    let (crimes, schools) = (crimes?, schools?);
    let quality = CrimeQuality::measure(&crimes);
    quality.log();
    progress.inc(1);

    progress.set_message("Joining".to_owned());
    let engine = JoinEngine::new(NeighborExpander::new(config.ring_radius));
    let joined = engine.join(&ctx, &schools.records, &crimes)?;
    progress.inc(1);

    progress.set_message("Writing output".to_owned());
    let written =
        CsvDirectorySink::new(output_dir, config.max_records_per_file).write(&joined.records)?;
    progress.inc(1);

    let public_schools_kept = schools
        .records
        .iter()
        .filter(|s| s.school_type == SchoolType::Public)
        .count();
    let summary = RunSummary {
        crimes_read: quality.total,
        crimes_indexed: joined.stats.indexed_crimes,
        crimes_unindexable: quality.without_cell,
        public_schools_kept,
        private_schools_kept: schools.len() - public_schools_kept,
        exploded_rows: joined.stats.exploded_rows,
        joined_rows: joined.stats.joined_rows,
        files_written: written.files,
    };
    summary.log();
    progress.finish(format!("Wrote {} joined rows", summary.joined_rows));

    Ok(summary)
}

/// Normalizes every crime row, partitioned across the pool.
///
/// # Errors
///
/// Returns [`SourceError::MissingColumn`] if `LAT` or `LON` is absent.
pub fn transform_crimes(
    ctx: &ExecutionContext,
    indexer: SpatialIndexer,
    table: &CsvTable,
) -> Result<Vec<CrimeRecord>, SourceError> {
    let transformer = CrimeTransformer::for_table(indexer, table)?;
    Ok(ctx.map_partitions(table.rows(), |row| transformer.transform_row(row)))
}

/// Normalizes both school datasets, partitioned across the pool, and
/// returns `private ∪ public`.
///
/// # Errors
///
/// Returns [`SourceError::MissingColumn`] if either table lacks `STATE`,
/// `LATITUDE`, or `LONGITUDE`.
pub fn normalize_schools(
    ctx: &ExecutionContext,
    normalizer: &SchemaNormalizer,
    public: &CsvTable,
    private: &CsvTable,
) -> Result<SchoolTable, SourceError> {
    let private = normalizer.private_source(private)?;
    let public = normalizer.public_source(public)?;

    let private_records = ctx.filter_map_partitions(private.table_rows(), |row| {
        private.normalize_row(row)
    });
    let public_records =
        ctx.filter_map_partitions(public.table_rows(), |row| public.normalize_row(row));

    Ok(union_by_name(
        private.into_table(private_records),
        public.into_table(public_records),
    ))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use school_crime_source::locator::{ConfiguredLocator, DatasetPaths};
    use school_crime_source::progress::null_progress;
    use school_crime_spatial::{SpatialCell, grid_distance};

    use super::*;

    const CRIME_HEADER: &str = "DR_NO,DATE OCC,LAT,LON,Vict Sex,Vict Age,Part 1-2,Crm Cd Desc";
    const PUBLIC_HEADER: &str =
        "NAME,ADDRESS,CITY,STATE,ZIP,LATITUDE,LONGITUDE,LEVEL_,POPULATION,ENROLLMENT,DISTRICT";
    const PRIVATE_HEADER: &str =
        "NAME,ADDRESS,CITY,STATE,ZIP,LATITUDE,LONGITUDE,END_GRADE,POPULATION,ENROLLMENT";

    struct Fixture {
        _dir: tempfile::TempDir,
        paths: DatasetPaths,
        output: PathBuf,
    }

    fn school_cell() -> SpatialCell {
        SpatialIndexer::default().index(34.0522, -118.2437).unwrap()
    }

    fn cell_at_distance(origin: SpatialCell, k: u32) -> SpatialCell {
        NeighborExpander::new(k)
            .neighbors(origin)
            .into_iter()
            .find(|c| grid_distance(origin, *c) == Some(i32::try_from(k).unwrap()))
            .unwrap()
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let origin = school_cell();
        let (lat0, lng0) = origin.center();
        let (lat1, lng1) = cell_at_distance(origin, 1).center();
        let (lat2, lng2) = cell_at_distance(origin, 2).center();

        let crimes = format!(
            "{CRIME_HEADER}\n\
             1,03/01/2020 12:00:00 AM,{lat0},{lng0},M,36,1,BATTERY - SIMPLE ASSAULT\n\
             2,03/02/2020 12:00:00 AM,{lat1},{lng1},F,25,2,VANDALISM\n\
             3,03/03/2020 12:00:00 AM,{lat2},{lng2},X,0,1,BURGLARY\n\
             4,not a date,,,M,40,1,ROBBERY\n"
        );
        let public = format!(
            "{PUBLIC_HEADER}\n\
             Lincoln High,1 Main St,Los Angeles,CA,90001,{lat0},{lng0},HIGH,550,500,LAUSD\n\
             Reno Elementary,2 Elm St,Reno,NV,89501,39.5296,-119.8138,ELEMENTARY,300,280,WCSD\n"
        );
        let private = format!(
            "{PRIVATE_HEADER}\n\
             St. Mary,3 Oak St,Los Angeles,CA,90002,{lat0},{lng0},8,120,100\n"
        );

        let paths = DatasetPaths {
            crime: dir.path().join("Crime_Data.csv"),
            public_schools: dir.path().join("Public_Schools.csv"),
            private_schools: dir.path().join("Private_Schools.csv"),
        };
        fs::write(&paths.crime, crimes).unwrap();
        fs::write(&paths.public_schools, public).unwrap();
        fs::write(&paths.private_schools, private).unwrap();

        let output = dir.path().join("out");
        Fixture {
            _dir: dir,
            paths,
            output,
        }
    }

    fn output_rows(dir: &Path) -> Vec<csv::StringRecord> {
        let mut reader = csv::Reader::from_path(dir.join("part-00000.csv")).unwrap();
        reader.records().map(Result::unwrap).collect()
    }

    #[test]
    fn end_to_end_joins_own_cell_and_ring_one_only() {
        let f = fixture();
        let locator = ConfiguredLocator::new(f.paths.clone());
        let summary = run(
            &PipelineConfig::default(),
            &locator,
            &f.output,
            &null_progress(),
        )
        .unwrap();

        assert_eq!(
            summary,
            RunSummary {
                crimes_read: 4,
                crimes_indexed: 3,
                crimes_unindexable: 1,
                public_schools_kept: 1,
                private_schools_kept: 1,
                exploded_rows: 14,
                joined_rows: 4,
                files_written: 1,
            }
        );

        let rows = output_rows(&f.output);
        assert_eq!(rows.len(), 4);
        let crime_types: Vec<&str> = rows.iter().map(|r| &r[21]).collect();
        assert!(!crime_types.contains(&"BURGLARY"));
        assert!(!crime_types.contains(&"ROBBERY"));
        assert_eq!(crime_types.iter().filter(|t| **t == "VANDALISM").count(), 2);

        // Private schools come first in the union.
        assert_eq!(&rows[0][9], "Private");
        assert_eq!(&rows[0][12], "MIDDLE");
        assert_eq!(&rows[0][13], "20");
        assert!(f.output.join(output::SUCCESS_MARKER).exists());
    }

    #[test]
    fn wider_ring_reaches_distance_two() {
        let f = fixture();
        let config = PipelineConfig {
            ring_radius: 2,
            ..PipelineConfig::default()
        };
        let summary = run(
            &config,
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        )
        .unwrap();
        assert_eq!(summary.exploded_rows, 38);
        assert_eq!(summary.joined_rows, 6);
    }

    #[test]
    fn shuffle_partitions_do_not_change_output() {
        let f = fixture();
        let config = PipelineConfig {
            shuffle_partitions: 7,
            chunk_size: 1,
            max_records_per_file: 3,
            ..PipelineConfig::default()
        };
        let summary = run(
            &config,
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        )
        .unwrap();
        assert_eq!(summary.joined_rows, 4);
        assert_eq!(summary.files_written, 2);
    }

    #[test]
    fn missing_input_fails_before_output() {
        let f = fixture();
        fs::remove_file(&f.paths.private_schools).unwrap();
        let result = run(
            &PipelineConfig::default(),
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        );
        assert!(matches!(
            result,
            Err(GenerateError::Source(SourceError::MissingInput { .. }))
        ));
        assert!(!f.output.exists());
    }

    #[test]
    fn missing_required_column_is_fatal() {
        let f = fixture();
        fs::write(&f.paths.crime, "DR_NO,DATE OCC,LON\n1,03/01/2020 12:00:00 AM,-118.2\n")
            .unwrap();
        let result = run(
            &PipelineConfig::default(),
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        );
        assert!(matches!(
            result,
            Err(GenerateError::Source(SourceError::MissingColumn { .. }))
        ));
    }

    #[test]
    fn partition_ceiling_aborts_run() {
        let f = fixture();
        let config = PipelineConfig {
            shuffle_partitions: 1,
            max_partition_rows: Some(5),
            ..PipelineConfig::default()
        };
        let result = run(
            &config,
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        );
        assert!(matches!(
            result,
            Err(GenerateError::Join(JoinError::PartitionSkew { .. }))
        ));
        assert!(!f.output.exists());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let f = fixture();
        let config = PipelineConfig {
            resolution: 16,
            ..PipelineConfig::default()
        };
        let result = run(
            &config,
            &ConfiguredLocator::new(f.paths.clone()),
            &f.output,
            &null_progress(),
        );
        assert!(matches!(result, Err(GenerateError::Config(_))));
    }
}
