//! School level classification.
//!
//! Public schools carry a controlled-vocabulary `LEVEL_` field; private
//! schools only carry a free-form `END_GRADE`. Both classify into
//! [`SchoolLevel`], and neither ever fails.

use school_crime_school_models::{LevelClassification, SchoolLevel};

/// Classifies a controlled-vocabulary level value.
///
/// Only an exact `ELEMENTARY`, `MIDDLE`, or `HIGH` is kept; anything else
/// (`VOCATIONAL`, `ADULT EDUCATION`, `NOT APPLICABLE`, missing) falls back.
#[must_use]
pub fn classify_level_code(code: Option<&str>) -> LevelClassification {
    code.and_then(|c| c.parse::<SchoolLevel>().ok())
        .filter(|level| SchoolLevel::NAMED.contains(level))
        .map_or(LevelClassification::Fallback, LevelClassification::Classified)
}

/// Classifies a free-form end grade.
///
/// Whole numbers map by range (`<= 5` elementary, `6-8` middle, `>= 9`
/// high). Non-numeric grades such as `K`, `PK`, or `UG` fall back.
#[must_use]
pub fn classify_end_grade(end_grade: Option<&str>) -> LevelClassification {
    let Some(grade) = end_grade.and_then(|g| g.trim().parse::<i64>().ok()) else {
        return LevelClassification::Fallback;
    };

    let level = match grade {
        ..=5 => SchoolLevel::Elementary,
        6..=8 => SchoolLevel::Middle,
        _ => SchoolLevel::High,
    };
    LevelClassification::Classified(level)
}
