//! Okapi BM25 term scoring.
//!
//! Scores are kept as integers: every contribution is the BM25 value
//! multiplied by [`SCALE`] and rounded half up.

use crate::{DocId, Score, Scores};
use std::collections::HashMap;

/// Term-frequency saturation.
pub const K1: f64 = 1.2;
/// Document-length normalization strength.
pub const B: f64 = 0.75;
/// Fixed-point factor applied to idf before rounding.
pub const SCALE: f64 = 1024.0;

const B_FROM1: f64 = 1.0 - B;
const K1_PLUS1: f64 = K1 + 1.0;

/// Round `f * SCALE` to the nearest integer, halves rounding up.
#[inline]
pub fn scaled_int(f: f64) -> Score {
    (f * SCALE + 0.5) as Score
}

/// `ln(1 + N / n)` where `n` is the number of documents containing the term.
#[inline]
pub fn inverse_doc_frequency(term_count: usize, num_items: usize) -> f64 {
    (1.0 + num_items as f64 / term_count as f64).ln()
}

/// Add one term's BM25 contribution for every document in `postings` to `results`.
///
/// `postings` yields `(doc_id, frequency)` pairs. Every doc id must be present in
/// `doc_lengths` and `mean_doc_len` must be positive; both are the caller's to guarantee.
/// Entries in `results` are incremented, never replaced, so calling this once per query
/// term accumulates a multi-term score.
pub fn score_term<I>(
    results: &mut Scores,
    postings: I,
    doc_lengths: &HashMap<DocId, u32>,
    idf: f64,
    mean_doc_len: f64,
) where
    I: IntoIterator<Item = (DocId, u32)>,
{
    let scaled_idf = idf * SCALE;
    for (doc_id, freq) in postings {
        let Some(&doc_len) = doc_lengths.get(&doc_id) else {
            debug_assert!(false, "doc {doc_id} missing from length table");
            continue;
        };
        let len_weight = B_FROM1 + B * (doc_len as f64 / mean_doc_len);
        let f = freq as f64;
        let tf = f * K1_PLUS1 / (f + K1 * len_weight);
        let contribution = (tf * scaled_idf + 0.5) as Score;
        *results.entry(doc_id).or_insert(0) += contribution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn lengths(pairs: &[(DocId, u32)]) -> HashMap<DocId, u32> {
        pairs.iter().copied().collect()
    }

    fn single(freq: u32, doc_len: u32, idf: f64, mean: f64) -> Score {
        let mut results = Scores::new();
        score_term(&mut results, [(7, freq)], &lengths(&[(7, doc_len)]), idf, mean);
        results[&7]
    }

    #[test]
    fn unit_frequency_at_mean_length_scores_1024() {
        assert_eq!(single(1, 100, 1.0, 100.0), 1024);
    }

    #[test]
    fn mean_length_reduces_to_plain_saturation() {
        for f in 1..20u32 {
            let fv = f as f64;
            let expected = (fv * (K1 + 1.0) / (fv + K1) * 1024.0 * 0.5 + 0.5) as Score;
            assert_eq!(single(f, 40, 0.5, 40.0), expected, "freq {f}");
        }
    }

    #[test]
    fn zero_frequency_contributes_nothing() {
        let mut results = Scores::new();
        score_term(&mut results, [(1, 0)], &lengths(&[(1, 12)]), 3.0, 10.0);
        assert_eq!(results.get(&1), Some(&0));
    }

    #[test]
    fn longer_documents_score_lower() {
        let short = single(3, 10, 1.0, 50.0);
        let long = single(3, 200, 1.0, 50.0);
        assert!(short > long, "{short} vs {long}");
    }

    #[test]
    fn accumulates_instead_of_overwriting() {
        let lens = lengths(&[(1, 10), (2, 20)]);
        let mut results = Scores::new();
        results.insert(1, 5);
        score_term(&mut results, [(1, 1)], &lens, 1.0, 10.0);
        assert_eq!(results[&1], 5 + 1024);
        assert!(!results.contains_key(&2));
    }

    #[test]
    fn two_terms_sum_independent_calls() {
        let lens = lengths(&[(1, 10), (2, 25), (3, 7)]);
        let first = [(1, 2), (2, 1)];
        let second = [(2, 4), (3, 1)];

        let mut a = Scores::new();
        score_term(&mut a, first, &lens, 0.9, 14.0);
        let mut b = Scores::new();
        score_term(&mut b, second, &lens, 2.1, 14.0);

        let mut both = Scores::new();
        score_term(&mut both, first, &lens, 0.9, 14.0);
        score_term(&mut both, second, &lens, 2.1, 14.0);

        for doc in [1, 2, 3] {
            let expected = a.get(&doc).copied().unwrap_or(0) + b.get(&doc).copied().unwrap_or(0);
            assert_eq!(both[&doc], expected, "doc {doc}");
        }
    }

    #[test]
    fn scaled_int_rounds_half_up() {
        assert_eq!(scaled_int(1.0), 1024);
        assert_eq!(scaled_int(0.5 / SCALE), 1);
        assert_eq!(scaled_int(0.49 / SCALE), 0);
    }

    #[test]
    fn idf_is_higher_for_rarer_terms() {
        let rare = inverse_doc_frequency(1, 100);
        let common = inverse_doc_frequency(90, 100);
        assert!(rare > common);
        assert!((inverse_doc_frequency(1, 1) - 2f64.ln()).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn increasing_in_frequency(f in 1u32..10, len in 1u32..500, mean in 1u32..500) {
            let lo = single(f, len, 4.0, mean as f64);
            let hi = single(f + 1, len, 4.0, mean as f64);
            prop_assert!(hi > lo, "f={} lo={} hi={}", f, lo, hi);
        }

        #[test]
        fn increasing_in_idf(f in 1u32..50, len in 1u32..500, idf in 0.1f64..10.0) {
            let lo = single(f, len, idf, 100.0);
            let hi = single(f, len, idf + 0.1, 100.0);
            prop_assert!(hi > lo, "idf={} lo={} hi={}", idf, lo, hi);
        }
    }
}
