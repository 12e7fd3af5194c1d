//! Dense ranking of deviation scores.

/// Ranks scores in descending order. Equal scores share a rank and the
/// next distinct score takes the following integer, so ranks run `1..=k`
/// with no gaps. `None` scores get no rank.
#[must_use]
pub fn dense_ranks(scores: &[Option<f64>]) -> Vec<Option<u32>> {
    let mut order: Vec<(usize, f64)> = scores
        .iter()
        .enumerate()
        .filter_map(|(i, s)| s.map(|s| (i, s)))
        .collect();
    order.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut ranks = vec![None; scores.len()];
    let mut rank = 0_u32;
    let mut previous: Option<f64> = None;
    for (i, score) in order {
        if previous.is_none_or(|p| p.total_cmp(&score).is_ne()) {
            rank += 1;
            previous = Some(score);
        }
        ranks[i] = Some(rank);
    }
    ranks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_scores_rank_descending() {
        assert_eq!(
            dense_ranks(&[Some(62.2), Some(50.0), Some(37.8)]),
            vec![Some(1), Some(2), Some(3)]
        );
    }

    #[test]
    fn ties_share_rank_without_gaps() {
        assert_eq!(
            dense_ranks(&[Some(80.0), Some(50.0), Some(80.0), None, Some(20.0)]),
            vec![Some(1), Some(2), Some(1), None, Some(3)]
        );
        assert_eq!(dense_ranks(&[Some(50.0); 4]), vec![Some(1); 4]);
    }

    #[test]
    fn unscored_units_are_unranked() {
        assert_eq!(dense_ranks(&[None, None]), vec![None, None]);
        assert!(dense_ranks(&[]).is_empty());
    }

    #[test]
    fn ranks_are_contiguous() {
        let scores = [Some(10.0), Some(90.0), Some(55.5), Some(90.0), Some(55.5), Some(0.0)];
        let mut ranks: Vec<u32> = dense_ranks(&scores).into_iter().flatten().collect();
        ranks.sort_unstable();
        ranks.dedup();
        assert_eq!(ranks, vec![1, 2, 3, 4]);
    }
}
