#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Explode-then-join of school neighborhoods against crime cells.
//!
//! Each school is exploded into one row per cell of its grid disk, both
//! sides are hash-partitioned by cell, and each partition runs an inner
//! hash join. A crime joins a school iff the crime's cell is in the
//! school's disk. There is no deduplication: a crime near two schools
//! yields two rows.

pub mod context;

use std::collections::HashMap;

use school_crime_crime_models::CrimeRecord;
use school_crime_school_models::SchoolRecord;
use school_crime_spatial::{NeighborExpander, SpatialCell};

pub use context::{ExecutionContext, ExecutionOptions};

/// Errors that can occur while executing the join.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// Execution options are unusable.
    #[error("invalid execution options: {0}")]
    InvalidOptions(&'static str),

    /// The worker pool could not be built.
    #[error("failed to start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// One shuffle partition exceeded the configured row ceiling.
    #[error(
        "shuffle partition {partition} holds {rows} rows, over the limit of {limit}; \
         raise shuffle_partitions or max_partition_rows"
    )]
    PartitionSkew {
        /// Partition index.
        partition: usize,
        /// School-side plus crime-side rows in the partition.
        rows: usize,
        /// Configured ceiling.
        limit: usize,
    },
}

/// One school paired with one cell of its neighborhood.
#[derive(Debug, Clone, Copy)]
pub struct ExplodedSchool<'a> {
    pub school: &'a SchoolRecord,
    pub join_cell: SpatialCell,
}

/// A school/crime pair whose cells matched.
#[derive(Debug, Clone, Copy)]
pub struct JoinedRecord<'a> {
    pub school: &'a SchoolRecord,
    /// The neighborhood cell the match happened on (equal to the crime's
    /// own cell).
    pub join_cell: SpatialCell,
    pub crime: &'a CrimeRecord,
}

/// Row counts observed during a join.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinStats {
    /// Exploded school rows (one per school per neighborhood cell).
    pub exploded_rows: usize,
    /// Crimes that had a cell and entered the shuffle.
    pub indexed_crimes: usize,
    /// Rows per shuffle partition (both sides).
    pub partition_rows: Vec<usize>,
    pub joined_rows: usize,
}

/// Join output: matched pairs plus statistics.
#[derive(Debug, Clone)]
pub struct Joined<'a> {
    pub records: Vec<JoinedRecord<'a>>,
    pub stats: JoinStats,
}

/// Links schools to the crimes inside their grid-disk neighborhood.
#[derive(Debug, Clone, Copy, Default)]
pub struct JoinEngine {
    expander: NeighborExpander,
}

impl JoinEngine {
    #[must_use]
    pub const fn new(expander: NeighborExpander) -> Self {
        Self { expander }
    }

    #[must_use]
    pub const fn expander(&self) -> &NeighborExpander {
        &self.expander
    }

    /// Explodes each school into one row per cell of its neighborhood.
    /// Schools without a cell produce no rows.
    #[must_use]
    pub fn explode<'a>(
        &self,
        ctx: &ExecutionContext,
        schools: &'a [SchoolRecord],
    ) -> Vec<ExplodedSchool<'a>> {
        ctx.flat_map_partitions(schools, |school| {
            school
                .cell
                .map(|cell| self.expander.neighbors(cell))
                .into_iter()
                .flatten()
                .map(move |join_cell| ExplodedSchool { school, join_cell })
        })
    }

    /// Runs the full explode, shuffle, and join.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::PartitionSkew`] if a shuffle partition exceeds
    /// the context's `max_partition_rows`.
    pub fn join<'a>(
        &self,
        ctx: &ExecutionContext,
        schools: &'a [SchoolRecord],
        crimes: &'a [CrimeRecord],
    ) -> Result<Joined<'a>, JoinError> {
        let exploded = self.explode(ctx, schools);
        let exploded_rows = exploded.len();
        log::info!(
            "Exploded {} schools into {exploded_rows} neighborhood rows (radius {})",
            schools.len(),
            self.expander.radius()
        );

        let keyed_crimes: Vec<(SpatialCell, &CrimeRecord)> =
            ctx.filter_map_partitions(crimes, |crime| crime.cell.map(|cell| (cell, crime)));
        let indexed_crimes = keyed_crimes.len();

        let school_parts = ctx.hash_partition(exploded, |row| row.join_cell);
        let crime_parts = ctx.hash_partition(keyed_crimes, |(cell, _)| *cell);

        let partition_rows = check_partitions(ctx, &school_parts, &crime_parts)?;

        let per_partition =
            ctx.for_each_partition(|i| join_partition(&school_parts[i], &crime_parts[i]));
        let records: Vec<JoinedRecord<'a>> = per_partition.into_iter().flatten().collect();

        log::info!(
            "Joined {} school/crime pairs from {indexed_crimes} indexed crimes",
            records.len()
        );

        Ok(Joined {
            stats: JoinStats {
                exploded_rows,
                indexed_crimes,
                partition_rows,
                joined_rows: records.len(),
            },
            records,
        })
    }
}

fn check_partitions(
    ctx: &ExecutionContext,
    school_parts: &[Vec<ExplodedSchool<'_>>],
    crime_parts: &[Vec<(SpatialCell, &CrimeRecord)>],
) -> Result<Vec<usize>, JoinError> {
    let rows: Vec<usize> = school_parts
        .iter()
        .zip(crime_parts)
        .map(|(s, c)| s.len() + c.len())
        .collect();

    for (i, n) in rows.iter().enumerate() {
        log::debug!("Shuffle partition {i}: {n} rows");
    }
    if let Some((i, max)) = rows.iter().enumerate().max_by_key(|(_, n)| **n) {
        log::info!("Largest shuffle partition: #{i} with {max} rows");
    }

    if let Some(limit) = ctx.options().max_partition_rows
        && let Some((partition, &count)) = rows.iter().enumerate().find(|(_, n)| **n > limit)
    {
        return Err(JoinError::PartitionSkew {
            partition,
            rows: count,
            limit,
        });
    }

    Ok(rows)
}

/// Inner hash join of one partition: build on crimes, probe with schools.
fn join_partition<'a>(
    schools: &[ExplodedSchool<'a>],
    crimes: &[(SpatialCell, &'a CrimeRecord)],
) -> Vec<JoinedRecord<'a>> {
    let mut by_cell: HashMap<SpatialCell, Vec<&'a CrimeRecord>> = HashMap::new();
    for (cell, crime) in crimes {
        by_cell.entry(*cell).or_default().push(*crime);
    }

    let mut out = Vec::new();
    for row in schools {
        if let Some(matches) = by_cell.get(&row.join_cell) {
            out.extend(matches.iter().map(|&crime| JoinedRecord {
                school: row.school,
                join_cell: row.join_cell,
                crime,
            }));
        }
    }
    out
}
