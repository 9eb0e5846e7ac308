//! Weighted unions and intersections over many score maps.

use crate::{Score, Scores};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// `result[d] = wx * x[d] + wy * y[d]` over the union of keys.
pub fn weighted_union(x: &Scores, wx: Score, y: &Scores, wy: Score) -> Scores {
    let mut result = Scores::with_capacity(x.len().max(y.len()));
    for (&doc, &s) in x {
        *result.entry(doc).or_insert(0) += s * wx;
    }
    for (&doc, &s) in y {
        *result.entry(doc).or_insert(0) += s * wy;
    }
    result
}

/// Same as [`weighted_union`] restricted to keys present in both maps.
pub fn weighted_intersection(x: &Scores, wx: Score, y: &Scores, wy: Score) -> Scores {
    let (small, ws, large, wl) = if x.len() <= y.len() { (x, wx, y, wy) } else { (y, wy, x, wx) };
    small
        .iter()
        .filter_map(|(doc, &s)| large.get(doc).map(|&t| (*doc, s * ws + t * wl)))
        .collect()
}

fn trivial(mut inputs: Vec<(Scores, Score)>) -> Scores {
    debug_assert!(inputs.len() <= 1);
    match inputs.pop() {
        None => Scores::new(),
        Some((result, 1)) => result,
        Some((result, weight)) => result.into_iter().map(|(doc, s)| (doc, s * weight)).collect(),
    }
}

/// Union of many weighted maps, always merging the two smallest first.
pub fn mass_weighted_union(inputs: Vec<(Scores, Score)>) -> Scores {
    if inputs.len() < 2 {
        return trivial(inputs);
    }
    let mut slots: Vec<Option<(Scores, Score)>> = Vec::with_capacity(inputs.len() * 2);
    let mut queue = BinaryHeap::new();
    for input in inputs {
        queue.push(Reverse((input.0.len(), slots.len())));
        slots.push(Some(input));
    }
    while queue.len() > 1 {
        let (Some(Reverse((_, a))), Some(Reverse((_, b)))) = (queue.pop(), queue.pop()) else {
            break;
        };
        let (Some((x, wx)), Some((y, wy))) = (slots[a].take(), slots[b].take()) else {
            break;
        };
        let merged = weighted_union(&x, wx, &y, wy);
        queue.push(Reverse((merged.len(), slots.len())));
        slots.push(Some((merged, 1)));
    }
    let last = queue.pop().and_then(|Reverse((_, i))| slots[i].take());
    trivial(last.into_iter().collect())
}

/// Intersection of many weighted maps, starting from the smallest.
pub fn mass_weighted_intersection(mut inputs: Vec<(Scores, Score)>) -> Scores {
    if inputs.len() < 2 {
        return trivial(inputs);
    }
    inputs.sort_by_key(|(scores, _)| scores.len());
    let mut rest = inputs.into_iter();
    let (Some((x, wx)), Some((y, wy))) = (rest.next(), rest.next()) else {
        return Scores::new();
    };
    let mut result = weighted_intersection(&x, wx, &y, wy);
    for (z, wz) in rest {
        if result.is_empty() {
            break;
        }
        result = weighted_intersection(&result, 1, &z, wz);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scores(pairs: &[(u32, Score)]) -> Scores {
        pairs.iter().copied().collect()
    }

    #[test]
    fn empty_and_single_inputs() {
        assert!(mass_weighted_union(vec![]).is_empty());
        assert!(mass_weighted_intersection(vec![]).is_empty());
        let one = scores(&[(1, 3), (2, 5)]);
        assert_eq!(mass_weighted_union(vec![(one.clone(), 1)]), one);
        assert_eq!(mass_weighted_intersection(vec![(one, 2)]), scores(&[(1, 6), (2, 10)]));
    }

    #[test]
    fn union_sums_weighted_scores() {
        let a = scores(&[(1, 10), (2, 20)]);
        let b = scores(&[(2, 1), (3, 7)]);
        let c = scores(&[(3, 100)]);
        let got = mass_weighted_union(vec![(a, 1), (b, 2), (c, 1)]);
        assert_eq!(got, scores(&[(1, 10), (2, 22), (3, 114)]));
    }

    #[test]
    fn intersection_keeps_common_documents() {
        let a = scores(&[(1, 10), (2, 20), (4, 1)]);
        let b = scores(&[(2, 1), (4, 2), (5, 3)]);
        let c = scores(&[(2, 5), (4, 5), (9, 9)]);
        let got = mass_weighted_intersection(vec![(a, 1), (b, 1), (c, 1)]);
        assert_eq!(got, scores(&[(2, 26), (4, 8)]));
    }

    #[test]
    fn disjoint_intersection_is_empty() {
        let a = scores(&[(1, 1)]);
        let b = scores(&[(2, 1)]);
        assert!(mass_weighted_intersection(vec![(a, 1), (b, 1)]).is_empty());
    }
}
