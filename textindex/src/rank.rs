use crate::{DocId, Score, Scores};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Best `n` documents by descending score; equal scores order by ascending doc id.
pub fn top_n(scores: Scores, n: usize) -> Vec<(DocId, Score)> {
    if n == 0 {
        return Vec::new();
    }
    // Min-heap of size n keyed so that "larger" means "ranks higher".
    let mut heap: BinaryHeap<Reverse<(Score, Reverse<DocId>)>> = BinaryHeap::with_capacity(n + 1);
    for (doc_id, score) in scores {
        heap.push(Reverse((score, Reverse(doc_id))));
        if heap.len() > n {
            heap.pop();
        }
    }
    let mut ranked: Vec<(Score, Reverse<DocId>)> = heap.into_iter().map(|Reverse(k)| k).collect();
    ranked.sort_unstable_by(|a, b| b.cmp(a));
    ranked.into_iter().map(|(score, Reverse(doc_id))| (doc_id, score)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_best_in_order() {
        let scores: Scores = [(1, 10), (2, 50), (3, 30), (4, 50), (5, 1)].into_iter().collect();
        assert_eq!(top_n(scores.clone(), 3), vec![(2, 50), (4, 50), (3, 30)]);
        assert_eq!(top_n(scores.clone(), 10).len(), 5);
        assert!(top_n(scores, 0).is_empty());
    }
}
