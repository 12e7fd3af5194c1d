//! Year-over-year comparison for a single unit's series.
//!
//! The previous-year total always means the calendar year immediately
//! before. When that year is missing from the series the comparison is
//! absent instead of reaching further back.

use safety_map_crime_models::PartialYear;
use safety_map_scoring_models::{SafetyScore, TrendPoint};

/// One year of a unit's series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct YearTotal {
    /// Reporting year.
    pub year: i32,
    /// Total crimes that year.
    pub total: Option<u64>,
    /// Whether the year was incomplete.
    pub partial_year: Option<PartialYear>,
}

impl From<&SafetyScore> for YearTotal {
    fn from(score: &SafetyScore) -> Self {
        Self {
            year: score.year,
            total: score.total_crimes,
            partial_year: score.partial_year,
        }
    }
}

/// Resolves a trend point per year, newest first.
#[must_use]
pub fn resolve(series: &[YearTotal]) -> Vec<TrendPoint> {
    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| b.year.cmp(&a.year));

    sorted
        .iter()
        .enumerate()
        .map(|(i, current)| {
            let previous_year_total = sorted
                .get(i + 1)
                .filter(|older| older.year == current.year - 1)
                .and_then(|older| older.total);
            let delta = current
                .total
                .zip(previous_year_total)
                .and_then(|(now, before)| {
                    i64::try_from(i128::from(now) - i128::from(before)).ok()
                });
            TrendPoint {
                year: current.year,
                total_crimes: current.total,
                previous_year_total,
                delta,
                percent_change: percent_change(delta, previous_year_total),
                partial_year: current.partial_year,
            }
        })
        .collect()
}

#[allow(clippy::cast_precision_loss)]
fn percent_change(delta: Option<i64>, previous: Option<u64>) -> Option<f64> {
    match (delta, previous) {
        (Some(delta), Some(previous)) if previous > 0 => {
            Some(delta as f64 / previous as f64 * 100.0)
        }
        _ => None,
    }
}

/// Sets `previous_year_total` on each score from the same series. The
/// slice is left sorted newest first.
pub fn link_previous_year(series: &mut [SafetyScore]) {
    series.sort_by(|a, b| b.year.cmp(&a.year));
    let totals: Vec<YearTotal> = series.iter().map(YearTotal::from).collect();
    for (score, point) in series.iter_mut().zip(resolve(&totals)) {
        score.previous_year_total = point.previous_year_total;
    }
}

#[cfg(test)]
mod tests {
    use safety_map_geography_models::UnitRef;
    use safety_map_scoring_models::Granularity;

    use super::*;

    fn year(year: i32, total: Option<u64>) -> YearTotal {
        YearTotal {
            year,
            total,
            partial_year: None,
        }
    }

    #[test]
    fn consecutive_years_link() {
        let points = resolve(&[year(2022, Some(80)), year(2024, Some(120)), year(2023, Some(100))]);
        let years: Vec<i32> = points.iter().map(|p| p.year).collect();
        assert_eq!(years, vec![2024, 2023, 2022]);

        assert_eq!(points[0].previous_year_total, Some(100));
        assert_eq!(points[0].delta, Some(20));
        assert!((points[0].percent_change.unwrap() - 20.0).abs() < 1e-9);

        assert_eq!(points[1].delta, Some(20));
        assert!((points[1].percent_change.unwrap() - 25.0).abs() < 1e-9);

        assert_eq!(points[2].previous_year_total, None);
        assert_eq!(points[2].delta, None);
    }

    #[test]
    fn gap_year_gives_no_comparison() {
        let points = resolve(&[year(2024, Some(50)), year(2022, Some(40))]);
        assert_eq!(points[0].previous_year_total, None);
        assert_eq!(points[0].delta, None);
        assert_eq!(points[0].percent_change, None);
    }

    #[test]
    fn zero_previous_has_delta_but_no_percent() {
        let points = resolve(&[year(2024, Some(5)), year(2023, Some(0))]);
        assert_eq!(points[0].delta, Some(5));
        assert_eq!(points[0].percent_change, None);
    }

    #[test]
    fn decrease_is_negative() {
        let points = resolve(&[year(2024, Some(30)), year(2023, Some(40))]);
        assert_eq!(points[0].delta, Some(-10));
        assert!((points[0].percent_change.unwrap() + 25.0).abs() < 1e-9);
    }

    #[test]
    fn missing_totals_propagate() {
        let points = resolve(&[year(2024, None), year(2023, Some(40))]);
        assert_eq!(points[0].previous_year_total, Some(40));
        assert_eq!(points[0].delta, None);
    }

    #[test]
    fn partial_year_passes_through() {
        let partial = PartialYear::new(2025, 6).unwrap();
        let points = resolve(&[
            YearTotal {
                year: 2025,
                total: Some(30),
                partial_year: Some(partial),
            },
            year(2024, Some(70)),
        ]);
        assert_eq!(points[0].partial_year, Some(partial));
        assert_eq!(points[0].delta, Some(-40));
        assert_eq!(points[1].partial_year, None);
    }

    #[test]
    fn links_scores_in_place() {
        let score = |year: i32, total: u64| SafetyScore {
            unit: UnitRef::area(1),
            year,
            score: Some(50.0),
            rank: Some(1),
            total_crimes: Some(total),
            counts: None,
            previous_year_total: None,
            data_granularity: Granularity::Area,
            partial_year: None,
        };
        let mut series = vec![score(2022, 9), score(2024, 11), score(2023, 10)];
        link_previous_year(&mut series);
        let linked: Vec<(i32, Option<u64>)> = series
            .iter()
            .map(|s| (s.year, s.previous_year_total))
            .collect();
        assert_eq!(linked, vec![(2024, Some(10)), (2023, Some(9)), (2022, None)]);
    }
}
