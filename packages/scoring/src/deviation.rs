//! Deviation score (偏差値) computation.
//!
//! Crime totals are inverted against the population maximum so that fewer
//! crimes map to a higher score, then standardised as `50 + 10 * z` using
//! the population standard deviation and clamped to `[0, 100]`.
//!
//! The mean and variance are computed in exact integer arithmetic from the
//! inverted totals, so the result depends only on the multiset of totals
//! and never on input order. Only the final division and square root touch
//! floating point.

/// Score assigned to every unit when all totals are equal, and the mean of
/// any non-degenerate population.
pub const MEAN_SCORE: f64 = 50.0;

/// Points per standard deviation.
pub const SCORE_SCALE: f64 = 10.0;

/// Lower clamp bound.
pub const MIN_SCORE: f64 = 0.0;

/// Upper clamp bound.
pub const MAX_SCORE: f64 = 100.0;

/// Smallest population with a meaningful spread.
pub const MIN_POPULATION: usize = 2;

/// Fewer than [`MIN_POPULATION`] units had a total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("insufficient population: {reporting} unit(s) reporting, need at least {MIN_POPULATION}")]
pub struct InsufficientPopulation {
    /// Number of units with a non-null total.
    pub reporting: usize,
}

/// Scores aligned with the input totals.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationScores {
    /// `None` exactly where the input total was `None`.
    pub scores: Vec<Option<f64>>,
    /// Every reporting unit had the same total.
    pub degenerate: bool,
    /// Number of units with a score.
    pub size: usize,
}

/// Computes a deviation score for each total. Null totals are excluded
/// from the population and get a null score.
///
/// # Errors
///
/// Returns [`InsufficientPopulation`] if fewer than two totals are present.
pub fn deviation_scores(totals: &[Option<u64>]) -> Result<DeviationScores, InsufficientPopulation> {
    let present: Vec<u64> = totals.iter().flatten().copied().collect();
    if present.len() < MIN_POPULATION {
        return Err(InsufficientPopulation {
            reporting: present.len(),
        });
    }

    // Inversion: the unit with the most crimes sits at zero.
    let max = present.iter().copied().max().unwrap_or_default();
    let inverted: Vec<u64> = present.iter().map(|&c| max - c).collect();

    let Some(z) = standard_scores(&inverted) else {
        return Ok(DeviationScores {
            scores: totals.iter().map(|t| t.map(|_| MEAN_SCORE)).collect(),
            degenerate: true,
            size: present.len(),
        });
    };

    let mut z = z.into_iter();
    let scores = totals
        .iter()
        .map(|t| {
            t.and_then(|_| z.next())
                .map(|z| SCORE_SCALE.mul_add(z, MEAN_SCORE).clamp(MIN_SCORE, MAX_SCORE))
        })
        .collect();

    Ok(DeviationScores {
        scores,
        degenerate: false,
        size: present.len(),
    })
}

/// Standard scores `(x - mean) / std` for each value, or `None` when the
/// spread is zero.
fn standard_scores(xs: &[u64]) -> Option<Vec<f64>> {
    exact_standard_scores(xs).unwrap_or_else(|| float_standard_scores(xs))
}

/// Integer moments: with `S1 = sum(x)`, `S2 = sum(x^2)` and
/// `D = n*S2 - S1^2`, the standard score is `(n*x - S1) / sqrt(D)`.
///
/// The outer `None` signals overflow, in which case the caller falls back to
/// floating point. That only happens for totals far beyond any real count.
#[allow(clippy::cast_precision_loss, clippy::option_option)]
fn exact_standard_scores(xs: &[u64]) -> Option<Option<Vec<f64>>> {
    let n = u128::try_from(xs.len()).ok()?;
    let mut s1: u128 = 0;
    let mut s2: u128 = 0;
    for &x in xs {
        let x = u128::from(x);
        s1 = s1.checked_add(x)?;
        s2 = s2.checked_add(x.checked_mul(x)?)?;
    }
    let d = n.checked_mul(s2)?.checked_sub(s1.checked_mul(s1)?)?;
    if d == 0 {
        return Some(None);
    }

    let root = (d as f64).sqrt();
    let s1 = i128::try_from(s1).ok()?;
    let mut out = Vec::with_capacity(xs.len());
    for &x in xs {
        let nx = i128::try_from(n.checked_mul(u128::from(x))?).ok()?;
        out.push((nx - s1) as f64 / root);
    }
    Some(Some(out))
}

#[allow(clippy::cast_precision_loss)]
fn float_standard_scores(xs: &[u64]) -> Option<Vec<f64>> {
    let n = xs.len() as f64;
    let mean = xs.iter().map(|&x| x as f64).sum::<f64>() / n;
    let variance = xs
        .iter()
        .map(|&x| {
            let d = x as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n;
    let std = variance.sqrt();
    if std == 0.0 || !std.is_finite() {
        return None;
    }
    Some(xs.iter().map(|&x| (x as f64 - mean) / std).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(totals: &[Option<u64>]) -> Vec<Option<f64>> {
        deviation_scores(totals).unwrap().scores
    }

    #[test]
    fn three_unit_example() {
        let scores = scored(&[Some(0), Some(10), Some(20)]);
        let spread = 10.0 * 1.5_f64.sqrt();
        assert!((scores[0].unwrap() - (50.0 + spread)).abs() < 1e-9);
        assert!((scores[1].unwrap() - 50.0).abs() < 1e-9);
        assert!((scores[2].unwrap() - (50.0 - spread)).abs() < 1e-9);
    }

    #[test]
    fn equal_totals_score_exactly_fifty() {
        let result = deviation_scores(&[Some(5), Some(5), Some(5)]).unwrap();
        assert!(result.degenerate);
        assert_eq!(result.scores, vec![Some(50.0); 3]);
    }

    #[test]
    fn fewer_than_two_is_insufficient() {
        assert_eq!(
            deviation_scores(&[Some(7)]),
            Err(InsufficientPopulation { reporting: 1 })
        );
        assert_eq!(
            deviation_scores(&[None, Some(3), None]),
            Err(InsufficientPopulation { reporting: 1 })
        );
        assert_eq!(deviation_scores(&[]), Err(InsufficientPopulation { reporting: 0 }));
    }

    #[test]
    fn null_totals_are_excluded() {
        let with_gaps = scored(&[Some(0), None, Some(10), Some(20), None]);
        let without = scored(&[Some(0), Some(10), Some(20)]);
        assert_eq!(with_gaps[1], None);
        assert_eq!(with_gaps[4], None);
        assert_eq!(with_gaps[0], without[0]);
        assert_eq!(with_gaps[2], without[1]);
        assert_eq!(with_gaps[3], without[2]);
    }

    #[test]
    fn extreme_outlier_is_clamped() {
        let mut totals = vec![Some(1_000_u64); 99];
        totals.push(Some(0));
        let scores = scored(&totals);
        assert!((scores[99].unwrap() - MAX_SCORE).abs() < f64::EPSILON);

        let mut totals = vec![Some(0_u64); 99];
        totals.push(Some(1_000));
        let scores = scored(&totals);
        assert!(scores[99].unwrap().abs() < f64::EPSILON);
    }

    #[test]
    fn fewer_crimes_never_score_lower() {
        let totals = [Some(3), Some(17), Some(8), Some(8), Some(40), Some(0)];
        let scores = scored(&totals);
        let mut pairs: Vec<(u64, f64)> = totals
            .iter()
            .zip(&scores)
            .map(|(t, s)| (t.unwrap(), s.unwrap()))
            .collect();
        pairs.sort_by_key(|(t, _)| *t);
        for w in pairs.windows(2) {
            assert!(w[0].1 >= w[1].1, "{w:?}");
        }
        assert_eq!(scores[2], scores[3]);
        for s in scores.iter().flatten() {
            assert!((MIN_SCORE..=MAX_SCORE).contains(s));
        }
    }

    #[test]
    fn input_order_does_not_change_scores() {
        let forward = [Some(12_u64), Some(0), Some(7), Some(31), Some(7), Some(2)];
        let mut reversed = forward;
        reversed.reverse();

        let a = scored(&forward);
        let mut b = scored(&reversed);
        b.reverse();
        let bits = |v: &[Option<f64>]| v.iter().map(|s| s.map(f64::to_bits)).collect::<Vec<_>>();
        assert_eq!(bits(&a), bits(&b));
    }

    #[test]
    fn float_fallback_agrees_with_exact_path() {
        let xs = [20_u64, 10, 0, 13];
        let exact = exact_standard_scores(&xs).unwrap().unwrap();
        let float = float_standard_scores(&xs).unwrap();
        for (e, f) in exact.iter().zip(&float) {
            assert!((e - f).abs() < 1e-9);
        }
        assert_eq!(float_standard_scores(&[4, 4]), None);
    }

    #[test]
    fn huge_totals_fall_back_to_float() {
        let result = deviation_scores(&[Some(u64::MAX), Some(0), Some(u64::MAX / 2)]).unwrap();
        assert!(!result.degenerate);
        assert!(result.scores[1].unwrap() > result.scores[2].unwrap());
        assert!(result.scores[2].unwrap() > result.scores[0].unwrap());
    }
}
