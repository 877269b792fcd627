//! Public/private school schema unification.
//!
//! The two school datasets share their geographic and administrative
//! columns but differ elsewhere: public schools carry a controlled `LEVEL_`
//! value while private schools carry a free-form `END_GRADE`, and each has
//! columns the other lacks. [`SchemaNormalizer`] filters both to one
//! region, derives the shared columns (`school_type`, `level`, `faculty`,
//! `h3_index`), and [`union_by_name`] merges them, null-filling whatever
//! either side is missing.

use std::collections::BTreeMap;

use school_crime_school_models::{SchoolRecord, SchoolTable, SchoolType, derive_faculty};
use school_crime_spatial::{SpatialCell, SpatialIndexer};

use crate::SourceError;
use crate::level::{classify_end_grade, classify_level_code};
use crate::parsing::{parse_f64, parse_i64};
use crate::table::{CsvTable, Row, value};

pub const NAME: &str = "NAME";
pub const ADDRESS: &str = "ADDRESS";
pub const CITY: &str = "CITY";
pub const STATE: &str = "STATE";
pub const ZIP: &str = "ZIP";
pub const LATITUDE: &str = "LATITUDE";
pub const LONGITUDE: &str = "LONGITUDE";
pub const LEVEL: &str = "LEVEL_";
pub const END_GRADE: &str = "END_GRADE";
pub const POPULATION: &str = "POPULATION";
pub const ENROLLMENT: &str = "ENROLLMENT";

/// Columns every normalized school gains, in the order they are appended.
pub const DERIVED_COLUMNS: &[&str] = &["school_type", "level", "faculty", "h3_index"];

/// Region filter applied when none is configured.
pub const DEFAULT_REGION: &str = "CA";

const TYPED_COLUMNS: &[&str] = &[
    NAME, ADDRESS, CITY, STATE, ZIP, LATITUDE, LONGITUDE, LEVEL, END_GRADE, POPULATION, ENROLLMENT,
];

/// Whether a column is stored in a typed [`SchoolRecord`] field rather
/// than in [`SchoolRecord::extra`].
fn is_typed_column(column: &str) -> bool {
    TYPED_COLUMNS.contains(&column) || DERIVED_COLUMNS.contains(&column)
}

#[derive(Debug, Clone, Copy)]
struct SchoolColumns {
    name: Option<usize>,
    address: Option<usize>,
    city: Option<usize>,
    state: usize,
    zip: Option<usize>,
    latitude: usize,
    longitude: usize,
    level: Option<usize>,
    end_grade: Option<usize>,
    population: Option<usize>,
    enrollment: Option<usize>,
}

/// Normalizes school datasets into one schema, restricted to one region.
#[derive(Debug, Clone)]
pub struct SchemaNormalizer {
    region: String,
    indexer: SpatialIndexer,
}

impl SchemaNormalizer {
    #[must_use]
    pub fn new(region: impl Into<String>, indexer: SpatialIndexer) -> Self {
        Self {
            region: region.into(),
            indexer,
        }
    }

    /// The `STATE` value a school must carry to be kept.
    #[must_use]
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Binds to the public dataset (level from `LEVEL_`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingColumn`] if `STATE`, `LATITUDE`, or
    /// `LONGITUDE` is absent.
    pub fn public_source<'a>(
        &'a self,
        table: &'a CsvTable,
    ) -> Result<SourceNormalizer<'a>, SourceError> {
        SourceNormalizer::bind(self, SchoolType::Public, table)
    }

    /// Binds to the private dataset (level from `END_GRADE`).
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::MissingColumn`] if `STATE`, `LATITUDE`, or
    /// `LONGITUDE` is absent.
    pub fn private_source<'a>(
        &'a self,
        table: &'a CsvTable,
    ) -> Result<SourceNormalizer<'a>, SourceError> {
        SourceNormalizer::bind(self, SchoolType::Private, table)
    }

    /// Normalizes both datasets sequentially and returns `private ∪ public`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if either table lacks a required column.
    pub fn normalize(
        &self,
        public: &CsvTable,
        private: &CsvTable,
    ) -> Result<SchoolTable, SourceError> {
        let private = self.private_source(private)?;
        let public = self.public_source(public)?;
        let private_records = private.normalize_rows(private.table_rows());
        let public_records = public.normalize_rows(public.table_rows());
        Ok(union_by_name(
            private.into_table(private_records),
            public.into_table(public_records),
        ))
    }
}

/// A [`SchemaNormalizer`] bound to one source table's header.
#[derive(Debug, Clone)]
pub struct SourceNormalizer<'a> {
    normalizer: &'a SchemaNormalizer,
    school_type: SchoolType,
    label: String,
    columns: SchoolColumns,
    /// Pass-through columns: `(position, header)`.
    extra_columns: Vec<(usize, String)>,
    /// Output column list: source headers followed by derived columns.
    output_columns: Vec<String>,
    rows: &'a [Vec<Option<String>>],
}

impl<'a> SourceNormalizer<'a> {
    fn bind(
        normalizer: &'a SchemaNormalizer,
        school_type: SchoolType,
        table: &'a CsvTable,
    ) -> Result<Self, SourceError> {
        let is_public = school_type == SchoolType::Public;

        let columns = SchoolColumns {
            state: table.require_column(STATE)?,
            latitude: table.require_column(LATITUDE)?,
            longitude: table.require_column(LONGITUDE)?,
            name: table.optional_column(NAME),
            address: table.optional_column(ADDRESS),
            city: table.optional_column(CITY),
            zip: table.optional_column(ZIP),
            population: table.optional_column(POPULATION),
            enrollment: table.optional_column(ENROLLMENT),
            level: if is_public {
                table.optional_column(LEVEL)
            } else {
                table.column(LEVEL)
            },
            end_grade: if is_public {
                table.column(END_GRADE)
            } else {
                table.optional_column(END_GRADE)
            },
        };

        let extra_columns = table
            .headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| !h.is_empty() && !is_typed_column(h))
            .map(|(i, h)| (i, h.clone()))
            .collect();

        let mut output_columns: Vec<String> = table
            .headers()
            .iter()
            .filter(|h| !h.is_empty() && !DERIVED_COLUMNS.contains(&h.as_str()))
            .cloned()
            .collect();
        output_columns.extend(DERIVED_COLUMNS.iter().map(|c| (*c).to_owned()));

        Ok(Self {
            normalizer,
            school_type,
            label: table.label().to_owned(),
            columns,
            extra_columns,
            output_columns,
            rows: table.rows(),
        })
    }

    #[must_use]
    pub const fn school_type(&self) -> SchoolType {
        self.school_type
    }

    /// Column list this source contributes to a union.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.output_columns
    }

    /// Rows of the bound table, for callers that partition them.
    #[must_use]
    pub const fn table_rows(&self) -> &'a [Vec<Option<String>>] {
        self.rows
    }

    /// Normalizes one row. Returns `None` when the row is outside the
    /// region; every other problem only nulls a field.
    #[must_use]
    pub fn normalize_row(&self, row: &Row) -> Option<SchoolRecord> {
        let c = &self.columns;

        let state = value(row, Some(c.state))?;
        if state != self.normalizer.region {
            return None;
        }

        let latitude = parse_f64(value(row, Some(c.latitude)));
        let longitude = parse_f64(value(row, Some(c.longitude)));
        let level_code = value(row, c.level).map(str::to_owned);
        let end_grade = value(row, c.end_grade).map(str::to_owned);
        let population = parse_i64(value(row, c.population));
        let enrollment = parse_i64(value(row, c.enrollment));

        let classification = match self.school_type {
            SchoolType::Public => classify_level_code(level_code.as_deref()),
            SchoolType::Private => classify_end_grade(end_grade.as_deref()),
        };
        if classification.is_fallback() {
            log::trace!(
                "[{}] Level fallback for {:?} (LEVEL_={level_code:?}, END_GRADE={end_grade:?})",
                self.label,
                value(row, c.name),
            );
        }

        let extra = self
            .extra_columns
            .iter()
            .map(|(i, h)| (h.clone(), value(row, Some(*i)).map(str::to_owned)))
            .collect();

        Some(SchoolRecord {
            name: value(row, c.name).map(str::to_owned),
            address: value(row, c.address).map(str::to_owned),
            city: value(row, c.city).map(str::to_owned),
            state: state.to_owned(),
            zip: value(row, c.zip).map(str::to_owned),
            latitude,
            longitude,
            cell: self.index(latitude, longitude),
            school_type: self.school_type,
            level: classification.level(),
            level_code,
            end_grade,
            population,
            enrollment,
            faculty: derive_faculty(population, enrollment),
            extra,
        })
    }

    /// Normalizes rows sequentially, dropping those outside the region.
    #[must_use]
    pub fn normalize_rows(&self, rows: &[Vec<Option<String>>]) -> Vec<SchoolRecord> {
        rows.iter().filter_map(|row| self.normalize_row(row)).collect()
    }

    /// Wraps normalized records with this source's column list.
    #[must_use]
    pub fn into_table(self, records: Vec<SchoolRecord>) -> SchoolTable {
        log::info!(
            "[{}] Kept {} of {} {} schools in region {}",
            self.label,
            records.len(),
            self.rows.len(),
            self.school_type,
            self.normalizer.region
        );
        SchoolTable {
            columns: self.output_columns,
            records,
        }
    }

    fn index(&self, lat: Option<f64>, lng: Option<f64>) -> Option<SpatialCell> {
        let (lat, lng) = (lat?, lng?);
        self.normalizer
            .indexer
            .index(lat, lng)
            .inspect_err(|e| log::debug!("[{}] School not indexed: {e}", self.label))
            .ok()
    }
}

/// Unions two school tables by column name.
///
/// The column list is `first`'s columns followed by any of `second`'s not
/// already present. Pass-through columns a record's own source lacked are
/// added to its [`SchoolRecord::extra`] as null, so every record carries
/// the full union schema.
#[must_use]
pub fn union_by_name(first: SchoolTable, second: SchoolTable) -> SchoolTable {
    let mut columns = first.columns;
    for column in second.columns {
        if !columns.contains(&column) {
            columns.push(column);
        }
    }

    let extra_columns: Vec<&String> = columns.iter().filter(|c| !is_typed_column(c)).collect();

    let mut records = first.records;
    records.extend(second.records);
    for record in &mut records {
        fill_missing(&mut record.extra, &extra_columns);
    }

    SchoolTable { columns, records }
}

fn fill_missing(extra: &mut BTreeMap<String, Option<String>>, columns: &[&String]) {
    for column in columns {
        if !extra.contains_key(column.as_str()) {
            extra.insert((*column).clone(), None);
        }
    }
}
