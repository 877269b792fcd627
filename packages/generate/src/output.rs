//! CSV directory sink for joined records.
//!
//! Output is a directory of `part-NNNNN.csv` files, each with a header row
//! and at most `max_records_per_file` data rows, plus an empty `_SUCCESS`
//! marker. The directory is assembled under a hidden staging name next to
//! the destination and swapped in only once every file is written, so a
//! failed run leaves the previous output untouched.

use std::fs;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use school_crime_crime_models::{CrimeSeverity, VictimSex};
use school_crime_join::JoinedRecord;
use school_crime_school_models::{SchoolLevel, SchoolType};
use school_crime_spatial::SpatialCell;
use serde::Serialize;

use crate::GenerateError;

/// Header of every part file. Field order of [`OutputRow`] must match.
pub const OUTPUT_COLUMNS: &[&str] = &[
    "NAME",
    "ADDRESS",
    "CITY",
    "STATE",
    "ZIP",
    "LATITUDE",
    "LONGITUDE",
    "h3_index",
    "h3_join",
    "school_type",
    "POPULATION",
    "ENROLLMENT",
    "level",
    "faculty",
    "DATE OCC",
    "LAT",
    "LON",
    "crime_h3_index",
    "Vict Sex",
    "Vict Age",
    "Crime Severity",
    "Crime Type",
];

/// Name of the marker written after all part files.
pub const SUCCESS_MARKER: &str = "_SUCCESS";

#[derive(Debug, Serialize)]
struct OutputRow<'a> {
    name: Option<&'a str>,
    address: Option<&'a str>,
    city: Option<&'a str>,
    state: &'a str,
    zip: Option<&'a str>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    h3_index: Option<SpatialCell>,
    h3_join: SpatialCell,
    school_type: SchoolType,
    population: Option<i64>,
    enrollment: Option<i64>,
    level: SchoolLevel,
    faculty: Option<i64>,
    date_occ: Option<NaiveDate>,
    lat: Option<f64>,
    lon: Option<f64>,
    crime_h3_index: Option<SpatialCell>,
    vict_sex: VictimSex,
    vict_age: Option<i64>,
    crime_severity: Option<CrimeSeverity>,
    crime_type: Option<&'a str>,
}

impl<'a> From<&JoinedRecord<'a>> for OutputRow<'a> {
    fn from(r: &JoinedRecord<'a>) -> Self {
        let (s, c) = (r.school, r.crime);
        Self {
            name: s.name.as_deref(),
            address: s.address.as_deref(),
            city: s.city.as_deref(),
            state: &s.state,
            zip: s.zip.as_deref(),
            latitude: s.latitude,
            longitude: s.longitude,
            h3_index: s.cell,
            h3_join: r.join_cell,
            school_type: s.school_type,
            population: s.population,
            enrollment: s.enrollment,
            level: s.level,
            faculty: s.faculty,
            date_occ: c.occurred_on,
            lat: c.latitude,
            lon: c.longitude,
            crime_h3_index: c.cell,
            vict_sex: c.victim_sex,
            vict_age: c.victim_age,
            crime_severity: c.severity,
            crime_type: c.crime_type.as_deref(),
        }
    }
}

/// Destination for joined records.
pub trait OutputSink {
    /// Writes every record, replacing any previous output.
    ///
    /// # Errors
    ///
    /// Returns [`GenerateError`] if the output can't be written.
    fn write(&self, records: &[JoinedRecord<'_>]) -> Result<WriteSummary, GenerateError>;
}

/// What a sink wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub files: usize,
    pub rows: usize,
}

/// Writes joined records into a directory of CSV part files, replacing
/// whatever was at the destination.
#[derive(Debug, Clone)]
pub struct CsvDirectorySink {
    destination: PathBuf,
    max_records_per_file: usize,
}

impl CsvDirectorySink {
    #[must_use]
    pub fn new(destination: &Path, max_records_per_file: usize) -> Self {
        Self {
            destination: destination.to_path_buf(),
            max_records_per_file: max_records_per_file.max(1),
        }
    }

    fn write_parts(
        &self,
        dir: &Path,
        records: &[JoinedRecord<'_>],
    ) -> Result<WriteSummary, GenerateError> {
        let mut summary = WriteSummary::default();

        // An empty result still gets one header-only part file.
        let chunks: Vec<&[JoinedRecord<'_>]> = if records.is_empty() {
            vec![records]
        } else {
            records.chunks(self.max_records_per_file).collect()
        };

        for (i, chunk) in chunks.into_iter().enumerate() {
            let path = dir.join(format!("part-{i:05}.csv"));
            let mut writer = csv::WriterBuilder::new()
                .has_headers(false)
                .from_path(&path)?;
            writer.write_record(OUTPUT_COLUMNS)?;
            for record in chunk {
                writer.serialize(OutputRow::from(record))?;
            }
            writer.flush()?;

            log::debug!("Wrote {} rows to {}", chunk.len(), path.display());
            summary.files += 1;
            summary.rows += chunk.len();
        }

        fs::File::create(dir.join(SUCCESS_MARKER))?;
        Ok(summary)
    }
}

impl OutputSink for CsvDirectorySink {
    /// Writes all part files into a staging directory, then swaps it into
    /// place. On error the destination is left as it was.
    fn write(&self, records: &[JoinedRecord<'_>]) -> Result<WriteSummary, GenerateError> {
        let destination = normalize_destination(&self.destination)?;
        let (Some(name), Some(parent)) = (destination.file_name(), destination.parent()) else {
            return Err(GenerateError::InvalidOutputPath(self.destination.clone()));
        };
        fs::create_dir_all(parent)?;

        let staging = parent.join(format!(
            ".{}.staging-{}",
            name.to_string_lossy(),
            std::process::id()
        ));
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir(&staging)?;

        let summary = match self.write_parts(&staging, records) {
            Ok(summary) => summary,
            Err(e) => {
                if let Err(cleanup) = fs::remove_dir_all(&staging) {
                    log::warn!("Failed to remove staging dir {}: {cleanup}", staging.display());
                }
                return Err(e);
            }
        };

        replace_dir(&staging, &destination)?;
        log::info!(
            "Wrote {} rows in {} files to {}",
            summary.rows,
            summary.files,
            destination.display()
        );
        Ok(summary)
    }
}

/// Makes `path` absolute and resolves `.` and `..` lexically, so that
/// its last component names the directory actually written.
fn normalize_destination(path: &Path) -> std::io::Result<PathBuf> {
    let mut out = PathBuf::new();
    for component in std::path::absolute(path)?.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    Ok(out)
}

/// Replaces `destination` with `staging`. Overwrite semantics: whatever
/// was at the destination (directory or file) is removed first.
fn replace_dir(staging: &Path, destination: &Path) -> Result<(), GenerateError> {
    if destination.is_dir() {
        fs::remove_dir_all(destination)?;
    } else if destination.exists() {
        fs::remove_file(destination)?;
    }
    fs::rename(staging, destination)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use school_crime_crime_models::CrimeRecord;
    use school_crime_school_models::SchoolRecord;
    use school_crime_spatial::SpatialIndexer;

    use super::*;

    fn cell() -> SpatialCell {
        SpatialIndexer::default().index(34.0522, -118.2437).unwrap()
    }

    fn school() -> SchoolRecord {
        SchoolRecord {
            name: Some("Lincoln High".to_owned()),
            address: Some("1 Main St, Unit 2".to_owned()),
            city: Some("Los Angeles".to_owned()),
            state: "CA".to_owned(),
            zip: Some("90001".to_owned()),
            latitude: Some(34.0522),
            longitude: Some(-118.2437),
            cell: Some(cell()),
            school_type: SchoolType::Public,
            level: SchoolLevel::High,
            level_code: Some("HIGH".to_owned()),
            end_grade: None,
            population: Some(500),
            enrollment: None,
            faculty: None,
            extra: BTreeMap::new(),
        }
    }

    fn crime() -> CrimeRecord {
        CrimeRecord {
            occurred_on: NaiveDate::from_ymd_opt(2020, 3, 1),
            latitude: Some(34.0522),
            longitude: Some(-118.2437),
            cell: Some(cell()),
            victim_sex: VictimSex::Male,
            victim_age: Some(36),
            severity: Some(CrimeSeverity::Serious),
            crime_type: Some("BATTERY - SIMPLE ASSAULT".to_owned()),
        }
    }

    fn read_lines(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_owned)
            .collect()
    }

    #[test]
    fn writes_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (s, c) = (school(), crime());
        let records = vec![JoinedRecord {
            school: &s,
            join_cell: cell(),
            crime: &c,
        }];

        let summary = CsvDirectorySink::new(&out, 10).write(&records).unwrap();
        assert_eq!(summary, WriteSummary { files: 1, rows: 1 });

        let lines = read_lines(&out.join("part-00000.csv"));
        assert_eq!(lines[0], OUTPUT_COLUMNS.join(","));
        let h3 = cell().to_string();
        assert_eq!(
            lines[1],
            format!(
                "Lincoln High,\"1 Main St, Unit 2\",Los Angeles,CA,90001,34.0522,-118.2437,\
                 {h3},{h3},Public,500,,HIGH,,2020-03-01,34.0522,-118.2437,{h3},M,36,\
                 Serious Crime,BATTERY - SIMPLE ASSAULT"
            )
        );
        assert!(out.join(SUCCESS_MARKER).exists());
    }

    #[test]
    fn row_has_one_field_per_column() {
        let (s, c) = (school(), crime());
        let record = JoinedRecord {
            school: &s,
            join_cell: cell(),
            crime: &c,
        };
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(Vec::new());
        writer.serialize(OutputRow::from(&record)).unwrap();
        let bytes = writer.into_inner().unwrap();
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(bytes.as_slice());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(row.len(), OUTPUT_COLUMNS.len());
    }

    #[test]
    fn splits_into_part_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let (s, c) = (school(), crime());
        let records: Vec<_> = (0..5)
            .map(|_| JoinedRecord {
                school: &s,
                join_cell: cell(),
                crime: &c,
            })
            .collect();

        let summary = CsvDirectorySink::new(&out, 2).write(&records).unwrap();
        assert_eq!(summary, WriteSummary { files: 3, rows: 5 });
        assert_eq!(read_lines(&out.join("part-00000.csv")).len(), 3);
        assert_eq!(read_lines(&out.join("part-00002.csv")).len(), 2);
    }

    #[test]
    fn empty_result_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        let summary = CsvDirectorySink::new(&out, 10).write(&[]).unwrap();
        assert_eq!(summary, WriteSummary { files: 1, rows: 0 });
        assert_eq!(read_lines(&out.join("part-00000.csv")).len(), 1);
    }

    #[test]
    fn overwrites_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("stale.csv"), "old").unwrap();

        CsvDirectorySink::new(&out, 10).write(&[]).unwrap();
        assert!(!out.join("stale.csv").exists());
        assert!(out.join("part-00000.csv").exists());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().contains("staging"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("nested/deeper/out");
        CsvDirectorySink::new(&out, 10).write(&[]).unwrap();
        assert!(out.join(SUCCESS_MARKER).exists());
    }

    #[test]
    fn trailing_dot_writes_the_named_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out").join(".");
        CsvDirectorySink::new(&out, 10).write(&[]).unwrap();
        assert!(dir.path().join("out").join(SUCCESS_MARKER).exists());
    }

    #[test]
    fn parent_components_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out").join("sub").join("..");
        CsvDirectorySink::new(&out, 10).write(&[]).unwrap();
        assert!(dir.path().join("out").join("part-00000.csv").exists());
        assert!(!dir.path().join("out").join("sub").exists());
    }

    #[test]
    fn normalizes_relative_destinations() {
        let cwd = std::env::current_dir().unwrap();
        assert_eq!(normalize_destination(Path::new(".")).unwrap(), cwd);
        assert_eq!(normalize_destination(Path::new("./")).unwrap(), cwd);
        assert_eq!(
            normalize_destination(Path::new("out/.")).unwrap(),
            cwd.join("out")
        );
    }

    #[test]
    fn rejects_destination_without_name() {
        let result = CsvDirectorySink::new(Path::new("/"), 10).write(&[]);
        assert!(matches!(result, Err(GenerateError::InvalidOutputPath(_))));
    }
}
