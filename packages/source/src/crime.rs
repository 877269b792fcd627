//! Crime dataset normalization.
//!
//! Maps raw crime rows onto [`CrimeRecord`]: the occurrence timestamp is
//! reduced to a date, victim sex is bucketed, the part code becomes a
//! severity class, and the point is indexed onto the grid.

use school_crime_crime_models::{CrimeRecord, CrimeSeverity, VictimSex};
use school_crime_spatial::{SpatialCell, SpatialIndexer};

use crate::SourceError;
use crate::parsing::{parse_f64, parse_i64, parse_occurrence_date};
use crate::table::{CsvTable, Row, value};

pub const DATE_OCC: &str = "DATE OCC";
pub const LAT: &str = "LAT";
pub const LON: &str = "LON";
pub const VICT_SEX: &str = "Vict Sex";
pub const VICT_AGE: &str = "Vict Age";
pub const PART_1_2: &str = "Part 1-2";
pub const CRM_CD_DESC: &str = "Crm Cd Desc";

/// Column positions resolved once per table.
#[derive(Debug, Clone, Copy)]
struct CrimeColumns {
    date: Option<usize>,
    lat: usize,
    lon: usize,
    sex: Option<usize>,
    age: Option<usize>,
    part: Option<usize>,
    description: Option<usize>,
}

/// Normalizes rows of one crime table.
///
/// Construction validates the header; [`Self::transform_row`] itself never
/// fails, so a malformed row only nulls its own derived fields.
#[derive(Debug, Clone, Copy)]
pub struct CrimeTransformer {
    indexer: SpatialIndexer,
    columns: CrimeColumns,
}

impl CrimeTransformer {
    /// Binds a transformer to a crime table's header.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingColumn`] if `LAT` or `LON` is absent.
    /// Every other column is optional and reads as null when missing.
    pub fn for_table(indexer: SpatialIndexer, table: &CsvTable) -> Result<Self, SourceError> {
        let columns = CrimeColumns {
            lat: table.require_column(LAT)?,
            lon: table.require_column(LON)?,
            date: table.optional_column(DATE_OCC),
            sex: table.optional_column(VICT_SEX),
            age: table.optional_column(VICT_AGE),
            part: table.optional_column(PART_1_2),
            description: table.optional_column(CRM_CD_DESC),
        };
        Ok(Self { indexer, columns })
    }

    /// Normalizes a single row.
    #[must_use]
    pub fn transform_row(&self, row: &Row) -> CrimeRecord {
        let c = &self.columns;

        let raw_date = value(row, c.date);
        let occurred_on = raw_date.and_then(parse_occurrence_date);
        if occurred_on.is_none()
            && let Some(raw) = raw_date
        {
            log::trace!("Unparseable {DATE_OCC} '{raw}'");
        }

        let latitude = parse_f64(value(row, Some(c.lat)));
        let longitude = parse_f64(value(row, Some(c.lon)));

        CrimeRecord {
            occurred_on,
            latitude,
            longitude,
            cell: self.index(latitude, longitude),
            victim_sex: VictimSex::from_code(value(row, c.sex)),
            victim_age: parse_i64(value(row, c.age)),
            severity: parse_i64(value(row, c.part)).and_then(CrimeSeverity::from_code),
            crime_type: value(row, c.description).map(str::to_owned),
        }
    }

    /// Normalizes every row of a table sequentially.
    #[must_use]
    pub fn transform_table(&self, table: &CsvTable) -> Vec<CrimeRecord> {
        table.rows().iter().map(|row| self.transform_row(row)).collect()
    }

    fn index(&self, lat: Option<f64>, lng: Option<f64>) -> Option<SpatialCell> {
        let (lat, lng) = (lat?, lng?);
        match self.indexer.index(lat, lng) {
            Ok(cell) => Some(cell),
            Err(e) => {
                log::trace!("Crime not indexed: {e}");
                None
            }
        }
    }
}

/// Counts of rows whose derived fields were nulled, for run summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrimeQuality {
    pub total: usize,
    pub without_date: usize,
    pub without_cell: usize,
    pub without_severity: usize,
}

impl CrimeQuality {
    #[must_use]
    pub fn measure(records: &[CrimeRecord]) -> Self {
        records.iter().fold(
            Self {
                total: records.len(),
                ..Self::default()
            },
            |mut q, r| {
                q.without_date += usize::from(r.occurred_on.is_none());
                q.without_cell += usize::from(r.cell.is_none());
                q.without_severity += usize::from(r.severity.is_none());
                q
            },
        )
    }

    /// Logs a one-line summary, at `warn` if any row lost its cell.
    pub fn log(&self) {
        let msg = format!(
            "Normalized {} crimes ({} without date, {} without cell, {} without severity)",
            self.total, self.without_date, self.without_cell, self.without_severity
        );
        if self.without_cell > 0 {
            log::warn!("{msg}");
        } else {
            log::info!("{msg}");
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    const HEADER: &str = "DR_NO,DATE OCC,LAT,LON,Vict Sex,Vict Age,Part 1-2,Crm Cd Desc";

    fn transform(rows: &[&str]) -> Vec<CrimeRecord> {
        let data = format!("{HEADER}\n{}\n", rows.join("\n"));
        let table = CsvTable::from_reader(data.as_bytes(), "crime").unwrap();
        CrimeTransformer::for_table(SpatialIndexer::default(), &table)
            .unwrap()
            .transform_table(&table)
    }

    #[test]
    fn normalizes_complete_row() {
        let records = transform(&[
            "1,03/01/2020 12:00:00 AM,34.0375,-118.3506,M,36,1,VEHICLE - STOLEN",
        ]);
        let r = &records[0];
        assert_eq!(r.occurred_on, NaiveDate::from_ymd_opt(2020, 3, 1));
        assert_eq!(r.victim_sex, VictimSex::Male);
        assert_eq!(r.victim_age, Some(36));
        assert_eq!(r.severity, Some(CrimeSeverity::Serious));
        assert_eq!(r.crime_type.as_deref(), Some("VEHICLE - STOLEN"));
        assert_eq!(
            r.cell,
            Some(SpatialIndexer::default().index(34.0375, -118.3506).unwrap())
        );
    }

    #[test]
    fn severity_codes() {
        let records = transform(&[
            "1,03/01/2020 12:00:00 AM,34.0,-118.0,F,20,1,A",
            "2,03/01/2020 12:00:00 AM,34.0,-118.0,F,20,2,B",
            "3,03/01/2020 12:00:00 AM,34.0,-118.0,F,20,3,C",
            "4,03/01/2020 12:00:00 AM,34.0,-118.0,F,20,,D",
        ]);
        assert_eq!(records[0].severity, Some(CrimeSeverity::Serious));
        assert_eq!(records[1].severity, Some(CrimeSeverity::NonSerious));
        assert_eq!(records[2].severity, None);
        assert_eq!(records[3].severity, None);
    }

    #[test]
    fn victim_sex_collapses_to_other() {
        let records = transform(&[
            "1,03/01/2020 12:00:00 AM,34.0,-118.0,X,0,2,A",
            "2,03/01/2020 12:00:00 AM,34.0,-118.0,,0,2,A",
            "3,03/01/2020 12:00:00 AM,34.0,-118.0,F,0,2,A",
        ]);
        assert_eq!(records[0].victim_sex, VictimSex::Other);
        assert_eq!(records[1].victim_sex, VictimSex::Other);
        assert_eq!(records[2].victim_sex, VictimSex::Female);
    }

    #[test]
    fn malformed_timestamp_nulls_only_the_date() {
        let records = transform(&["1,2020-03-01,34.0,-118.0,M,30,1,BATTERY"]);
        let r = &records[0];
        assert_eq!(r.occurred_on, None);
        assert!(r.cell.is_some());
        assert_eq!(r.severity, Some(CrimeSeverity::Serious));
    }

    #[test]
    fn out_of_range_coordinates_have_no_cell() {
        let records = transform(&[
            "1,03/01/2020 12:00:00 AM,134.0,-118.0,M,30,1,A",
            "2,03/01/2020 12:00:00 AM,,-118.0,M,30,1,A",
            "3,03/01/2020 12:00:00 AM,abc,-118.0,M,30,1,A",
        ]);
        assert!(records.iter().all(|r| r.cell.is_none()));
        assert_eq!(records[0].latitude, Some(134.0));
    }

    #[test]
    fn victim_age_passes_through_unvalidated() {
        let records = transform(&["1,03/01/2020 12:00:00 AM,34.0,-118.0,M,-2,1,A"]);
        assert_eq!(records[0].victim_age, Some(-2));
    }

    #[test]
    fn requires_coordinate_columns() {
        let table = CsvTable::from_reader("DATE OCC,LAT\n".as_bytes(), "crime").unwrap();
        let err = CrimeTransformer::for_table(SpatialIndexer::default(), &table).unwrap_err();
        assert!(matches!(err, SourceError::MissingColumn { ref column, .. } if column == LON));
    }

    #[test]
    fn optional_columns_may_be_absent() {
        let table = CsvTable::from_reader("LAT,LON\n34.0,-118.0\n".as_bytes(), "crime").unwrap();
        let records = CrimeTransformer::for_table(SpatialIndexer::default(), &table)
            .unwrap()
            .transform_table(&table);
        assert_eq!(records[0].victim_sex, VictimSex::Other);
        assert_eq!(records[0].occurred_on, None);
        assert!(records[0].cell.is_some());
    }

    #[test]
    fn quality_counts_nulled_fields() {
        let records = transform(&[
            "1,bad,34.0,-118.0,M,30,1,A",
            "2,03/01/2020 12:00:00 AM,95.0,-118.0,M,30,3,A",
            "3,03/01/2020 12:00:00 AM,34.0,-118.0,M,30,2,A",
        ]);
        let q = CrimeQuality::measure(&records);
        assert_eq!(
            q,
            CrimeQuality {
                total: 3,
                without_date: 1,
                without_cell: 1,
                without_severity: 1,
            }
        );
    }
}
