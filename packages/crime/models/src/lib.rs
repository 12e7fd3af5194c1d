#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Crime category breakdown and per-year crime record types.
//!
//! Police statistics are published as recognised-offence counts per area
//! (町丁目) or per municipality, split into five mutually exclusive
//! categories. A [`CrimeRecord`] is only constructible from counts that pass
//! validation, so every record in the system satisfies
//! `total == violent + assault + theft + intellectual + other`.

use std::iter::Sum;
use std::ops::{Add, AddAssign};

use safety_map_geography_models::Municipality;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// The five mutually exclusive offence categories.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CrimeCategory {
    /// Heinous offences (凶悪犯): murder, robbery, arson, rape.
    Violent,
    /// Rough offences (粗暴犯): assault, injury, intimidation, extortion.
    Assault,
    /// Theft (窃盗犯): burglary and larceny.
    Theft,
    /// Intellectual offences (知能犯): fraud, embezzlement, forgery.
    Intellectual,
    /// Everything else (その他).
    Other,
}

impl CrimeCategory {
    /// Japanese label used in the published statistics.
    #[must_use]
    pub const fn label_ja(self) -> &'static str {
        match self {
            Self::Violent => "凶悪犯",
            Self::Assault => "粗暴犯",
            Self::Theft => "窃盗犯",
            Self::Intellectual => "知能犯",
            Self::Other => "その他",
        }
    }

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Violent,
            Self::Assault,
            Self::Theft,
            Self::Intellectual,
            Self::Other,
        ]
    }
}

/// Validated, non-negative per-category counts.
///
/// The total is always derived from the categories and never stored
/// separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCounts {
    /// 凶悪犯
    pub violent: u64,
    /// 粗暴犯
    pub assault: u64,
    /// 窃盗犯
    pub theft: u64,
    /// 知能犯
    pub intellectual: u64,
    /// その他
    pub other: u64,
}

impl CategoryCounts {
    /// Sum of all five categories, saturating at `u64::MAX`.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.violent
            .saturating_add(self.assault)
            .saturating_add(self.theft)
            .saturating_add(self.intellectual)
            .saturating_add(self.other)
    }

    /// Sum of all five categories, or `None` on overflow.
    #[must_use]
    pub fn checked_total(&self) -> Option<u64> {
        self.violent
            .checked_add(self.assault)?
            .checked_add(self.theft)?
            .checked_add(self.intellectual)?
            .checked_add(self.other)
    }

    /// Count for a single category.
    #[must_use]
    pub const fn get(&self, category: CrimeCategory) -> u64 {
        match category {
            CrimeCategory::Violent => self.violent,
            CrimeCategory::Assault => self.assault,
            CrimeCategory::Theft => self.theft,
            CrimeCategory::Intellectual => self.intellectual,
            CrimeCategory::Other => self.other,
        }
    }
}

impl Add for CategoryCounts {
    type Output = Self;

    /// Component-wise, saturating.
    fn add(self, rhs: Self) -> Self {
        Self {
            violent: self.violent.saturating_add(rhs.violent),
            assault: self.assault.saturating_add(rhs.assault),
            theft: self.theft.saturating_add(rhs.theft),
            intellectual: self.intellectual.saturating_add(rhs.intellectual),
            other: self.other.saturating_add(rhs.other),
        }
    }
}

impl AddAssign for CategoryCounts {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for CategoryCounts {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl<'a> Sum<&'a Self> for CategoryCounts {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Counts exactly as supplied by a data source, before validation.
///
/// Signed so that negative values can be detected and rejected instead of
/// wrapping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawCrimeCounts {
    /// Reported total.
    pub total: i64,
    /// 凶悪犯
    pub violent: i64,
    /// 粗暴犯
    pub assault: i64,
    /// 窃盗犯
    pub theft: i64,
    /// 知能犯
    pub intellectual: i64,
    /// その他
    pub other: i64,
}

impl RawCrimeCounts {
    /// Checks that every count is non-negative and that the categories add
    /// up to the reported total.
    ///
    /// # Errors
    ///
    /// Returns [`CrimeRecordError::NegativeCount`] for the first negative
    /// field, [`CrimeRecordError::CountOverflow`] if the categories cannot be
    /// summed, or [`CrimeRecordError::SumMismatch`] if they do not sum to
    /// the total.
    pub fn validate(&self) -> Result<CategoryCounts, CrimeRecordError> {
        let fields = [
            ("total", self.total),
            ("violent", self.violent),
            ("assault", self.assault),
            ("theft", self.theft),
            ("intellectual", self.intellectual),
            ("other", self.other),
        ];
        for (field, value) in fields {
            if value < 0 {
                return Err(CrimeRecordError::NegativeCount { field, value });
            }
        }

        #[allow(clippy::cast_sign_loss)]
        let counts = CategoryCounts {
            violent: self.violent as u64,
            assault: self.assault as u64,
            theft: self.theft as u64,
            intellectual: self.intellectual as u64,
            other: self.other as u64,
        };

        #[allow(clippy::cast_sign_loss)]
        let total = self.total as u64;
        let sum = counts
            .checked_total()
            .ok_or(CrimeRecordError::CountOverflow { total })?;
        if sum != total {
            return Err(CrimeRecordError::SumMismatch { total, sum });
        }

        Ok(counts)
    }
}

/// The geographic granularity a crime record was published at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum RecordSubject {
    /// Area-level (町丁目) record, keyed by area ID.
    Area(i64),
    /// Municipality-wide record for municipalities that do not publish
    /// area-level figures.
    Municipality(Municipality),
}

/// One year of validated crime counts for one subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrimeRecord {
    subject: RecordSubject,
    year: i32,
    counts: CategoryCounts,
}

impl CrimeRecord {
    /// Validates raw counts and builds a record.
    ///
    /// # Errors
    ///
    /// Returns [`CrimeRecordError`] if the year is not positive, a count is
    /// negative, or the categories do not sum to the total.
    pub fn new(
        subject: RecordSubject,
        year: i32,
        raw: &RawCrimeCounts,
    ) -> Result<Self, CrimeRecordError> {
        if year <= 0 {
            return Err(CrimeRecordError::InvalidYear { year });
        }
        let counts = raw.validate()?;
        Ok(Self {
            subject,
            year,
            counts,
        })
    }

    /// Builds a record from counts that are already validated.
    #[must_use]
    pub const fn from_counts(subject: RecordSubject, year: i32, counts: CategoryCounts) -> Self {
        Self {
            subject,
            year,
            counts,
        }
    }

    /// The subject this record describes.
    #[must_use]
    pub const fn subject(&self) -> RecordSubject {
        self.subject
    }

    /// Reporting year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Per-category counts.
    #[must_use]
    pub const fn counts(&self) -> CategoryCounts {
        self.counts
    }

    /// Total recognised offences.
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.counts.total()
    }
}

/// Marks a reporting year as incomplete.
///
/// The in-progress year is published before the final months are in.
/// Consumers use this to avoid misleading year-over-year comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialYear {
    year: i32,
    cutoff_month: u8,
}

impl PartialYear {
    /// Declares `year` as covering January through `cutoff_month` only.
    ///
    /// # Errors
    ///
    /// Returns [`CrimeRecordError::InvalidCutoffMonth`] unless the cutoff is
    /// in `1..=11` (a December cutoff is a complete year).
    pub const fn new(year: i32, cutoff_month: u8) -> Result<Self, CrimeRecordError> {
        if cutoff_month == 0 || cutoff_month > 11 {
            return Err(CrimeRecordError::InvalidCutoffMonth {
                month: cutoff_month,
            });
        }
        Ok(Self { year, cutoff_month })
    }

    /// The partial year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Last month included in the year's figures.
    #[must_use]
    pub const fn cutoff_month(&self) -> u8 {
        self.cutoff_month
    }
}

/// Errors raised when validating crime data at the ingestion boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CrimeRecordError {
    /// A count was negative.
    #[error("negative count for {field}: {value}")]
    NegativeCount {
        /// Field name.
        field: &'static str,
        /// Offending value.
        value: i64,
    },

    /// The categories do not add up to the reported total.
    #[error("category counts sum to {sum} but total is {total}")]
    SumMismatch {
        /// Reported total.
        total: u64,
        /// Sum of the five categories.
        sum: u64,
    },

    /// The categories add up to more than a count can hold.
    #[error("category counts overflow (reported total {total})")]
    CountOverflow {
        /// Reported total.
        total: u64,
    },

    /// The year was zero or negative.
    #[error("invalid year {year}")]
    InvalidYear {
        /// Offending year.
        year: i32,
    },

    /// A partial-year cutoff outside `1..=11`.
    #[error("invalid cutoff month {month}: expected 1-11")]
    InvalidCutoffMonth {
        /// Offending month.
        month: u8,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(total: i64, parts: [i64; 5]) -> RawCrimeCounts {
        RawCrimeCounts {
            total,
            violent: parts[0],
            assault: parts[1],
            theft: parts[2],
            intellectual: parts[3],
            other: parts[4],
        }
    }

    #[test]
    fn valid_record_keeps_total_equal_to_sum() {
        let record =
            CrimeRecord::new(RecordSubject::Area(7), 2024, &raw(21, [1, 2, 10, 3, 5])).unwrap();
        assert_eq!(record.total(), 21);
        assert_eq!(record.counts().get(CrimeCategory::Theft), 10);
        assert_eq!(record.subject(), RecordSubject::Area(7));
    }

    #[test]
    fn sum_mismatch_is_rejected() {
        let err = CrimeRecord::new(RecordSubject::Area(1), 2024, &raw(20, [1, 2, 10, 3, 5]))
            .unwrap_err();
        assert_eq!(err, CrimeRecordError::SumMismatch { total: 20, sum: 21 });
    }

    #[test]
    fn negative_count_is_rejected() {
        let err = CrimeRecord::new(RecordSubject::Area(1), 2024, &raw(0, [0, 0, 0, 1, -1]))
            .unwrap_err();
        assert_eq!(
            err,
            CrimeRecordError::NegativeCount {
                field: "other",
                value: -1
            }
        );
    }

    #[test]
    fn overflowing_categories_are_rejected() {
        let err = CrimeRecord::new(
            RecordSubject::Area(1),
            2024,
            &raw(0, [i64::MAX, i64::MAX, 2, 0, 0]),
        )
        .unwrap_err();
        assert_eq!(err, CrimeRecordError::CountOverflow { total: 0 });
    }

    #[test]
    fn largest_summable_counts_are_accepted() {
        let record = CrimeRecord::new(
            RecordSubject::Area(1),
            2024,
            &raw(i64::MAX, [i64::MAX - 3, 1, 1, 1, 0]),
        )
        .unwrap();
        assert_eq!(record.total(), 9_223_372_036_854_775_807);
    }

    #[test]
    fn adding_huge_counts_saturates() {
        let huge = CategoryCounts {
            theft: u64::MAX - 1,
            other: u64::MAX,
            ..CategoryCounts::default()
        };
        let sum = huge + huge;
        assert_eq!(sum.theft, u64::MAX);
        assert_eq!(sum.total(), u64::MAX);
        assert_eq!(huge.checked_total(), None);
    }

    #[test]
    fn invalid_year_is_rejected() {
        let err = CrimeRecord::new(
            RecordSubject::Municipality(Municipality::Oshima),
            0,
            &raw(0, [0; 5]),
        )
        .unwrap_err();
        assert_eq!(err, CrimeRecordError::InvalidYear { year: 0 });
    }

    #[test]
    fn counts_sum_componentwise() {
        let a = CategoryCounts {
            violent: 1,
            assault: 2,
            theft: 3,
            intellectual: 4,
            other: 5,
        };
        let total: CategoryCounts = [a, a, a].iter().sum();
        assert_eq!(total.theft, 9);
        assert_eq!(total.total(), 45);
    }

    #[test]
    fn partial_year_cutoff_bounds() {
        assert!(PartialYear::new(2025, 9).is_ok());
        assert!(PartialYear::new(2025, 0).is_err());
        assert!(PartialYear::new(2025, 12).is_err());
    }

    #[test]
    fn category_string_form() {
        assert_eq!(CrimeCategory::Intellectual.to_string(), "INTELLECTUAL");
        assert_eq!(CrimeCategory::all().len(), 5);
    }
}
