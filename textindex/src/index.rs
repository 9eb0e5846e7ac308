//! Okapi BM25 full-text index.
//!
//! Postings map each word id to the documents containing it along with the
//! in-document frequency. Each document's word sequence is kept too, for
//! phrase matching and for unindexing.

use crate::lexicon::{Lexicon, QueryError, OOV};
use crate::scorer::{inverse_doc_frequency, score_term, scaled_int, K1};
use crate::setops::{mass_weighted_intersection, mass_weighted_union};
use crate::{DocId, Score, Scores, WordId};
use std::collections::{HashMap, HashSet};

pub struct OkapiIndex {
    lexicon: Lexicon,
    word_info: HashMap<WordId, HashMap<DocId, u32>>,
    doc_words: HashMap<DocId, Vec<WordId>>,
    doc_lengths: HashMap<DocId, u32>,
    total_doc_len: u64,
}

impl OkapiIndex {
    pub fn new(lexicon: Lexicon) -> Self {
        Self {
            lexicon,
            word_info: HashMap::new(),
            doc_words: HashMap::new(),
            doc_lengths: HashMap::new(),
            total_doc_len: 0,
        }
    }

    /// Reassemble an index from persisted postings and word sequences.
    pub fn from_parts(
        lexicon: Lexicon,
        word_info: HashMap<WordId, HashMap<DocId, u32>>,
        doc_words: HashMap<DocId, Vec<WordId>>,
    ) -> Self {
        let doc_lengths: HashMap<DocId, u32> = doc_words.iter().map(|(&d, w)| (d, w.len() as u32)).collect();
        let total_doc_len = doc_lengths.values().map(|&l| l as u64).sum();
        Self { lexicon, word_info, doc_words, doc_lengths, total_doc_len }
    }

    pub fn lexicon(&self) -> &Lexicon {
        &self.lexicon
    }

    /// Index `text` under `doc_id`, replacing any previous version. Returns the word count.
    pub fn index_doc(&mut self, doc_id: DocId, text: &str) -> usize {
        if self.doc_words.contains_key(&doc_id) {
            tracing::debug!(doc_id, "reindexing document");
            self.unindex_doc(doc_id);
        }
        let wids = self.lexicon.source_to_word_ids(text);
        let mut counts: HashMap<WordId, u32> = HashMap::new();
        for &wid in &wids {
            *counts.entry(wid).or_insert(0) += 1;
        }
        for (wid, freq) in counts {
            self.word_info.entry(wid).or_default().insert(doc_id, freq);
        }
        let len = wids.len();
        self.doc_lengths.insert(doc_id, len as u32);
        self.total_doc_len += len as u64;
        self.doc_words.insert(doc_id, wids);
        len
    }

    /// Remove a document. Returns false if it was not indexed.
    pub fn unindex_doc(&mut self, doc_id: DocId) -> bool {
        let Some(wids) = self.doc_words.remove(&doc_id) else {
            return false;
        };
        let unique: HashSet<WordId> = wids.into_iter().collect();
        for wid in unique {
            if let Some(docs) = self.word_info.get_mut(&wid) {
                docs.remove(&doc_id);
                if docs.is_empty() {
                    self.word_info.remove(&wid);
                }
            }
        }
        if let Some(len) = self.doc_lengths.remove(&doc_id) {
            self.total_doc_len -= len as u64;
        }
        true
    }

    pub fn has_doc(&self, doc_id: DocId) -> bool {
        self.doc_words.contains_key(&doc_id)
    }

    pub fn document_count(&self) -> usize {
        self.doc_words.len()
    }

    /// Number of distinct words that currently have postings.
    pub fn word_count(&self) -> usize {
        self.word_info.len()
    }

    pub fn doc_words(&self) -> &HashMap<DocId, Vec<WordId>> {
        &self.doc_words
    }

    pub fn get_words(&self, doc_id: DocId) -> Option<&[WordId]> {
        self.doc_words.get(&doc_id).map(Vec::as_slice)
    }

    pub fn doc_length(&self, doc_id: DocId) -> Option<u32> {
        self.doc_lengths.get(&doc_id).copied()
    }

    pub fn total_doc_len(&self) -> u64 {
        self.total_doc_len
    }

    pub fn mean_doc_length(&self) -> f64 {
        if self.doc_words.is_empty() {
            return 0.0;
        }
        self.total_doc_len as f64 / self.doc_words.len() as f64
    }

    pub fn postings(&self, wid: WordId) -> Option<&HashMap<DocId, u32>> {
        self.word_info.get(&wid)
    }

    pub fn word_ids_with_postings(&self) -> impl Iterator<Item = WordId> + '_ {
        self.word_info.keys().copied()
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = DocId> + '_ {
        self.doc_words.keys().copied()
    }

    /// Scores for a single query term. `None` if the term reduces to no words.
    pub fn search(&self, term: &str) -> Option<Scores> {
        let wids = self.lexicon.term_to_word_ids(term);
        if wids.is_empty() {
            return None;
        }
        let wids = self.remove_oov(wids);
        Some(mass_weighted_union(self.search_wids(&wids)))
    }

    pub fn search_glob(&self, pattern: &str) -> Result<Scores, QueryError> {
        let wids = self.lexicon.glob_to_word_ids(pattern)?;
        let wids = self.remove_oov(wids);
        Ok(mass_weighted_union(self.search_wids(&wids)))
    }

    /// Documents containing the exact word sequence of `phrase`.
    pub fn search_phrase(&self, phrase: &str) -> Option<Scores> {
        let wids = self.lexicon.term_to_word_ids(phrase);
        if wids.is_empty() {
            return None;
        }
        let known = self.remove_oov(wids.clone());
        if known.len() != wids.len() {
            return Some(Scores::new());
        }
        let mut hits = mass_weighted_intersection(self.search_wids(&wids));
        hits.retain(|doc, _| {
            self.doc_words
                .get(doc)
                .is_some_and(|words| words.windows(wids.len()).any(|w| w == wids.as_slice()))
        });
        Some(hits)
    }

    /// Upper bound on the score any document can reach for `terms`.
    pub fn query_weight<S: AsRef<str>>(&self, terms: &[S]) -> Score {
        let wids: Vec<WordId> = terms
            .iter()
            .flat_map(|t| self.lexicon.term_to_word_ids(t.as_ref()))
            .collect();
        self.remove_oov(wids).into_iter().filter_map(|wid| self.word_bound(wid)).sum()
    }

    /// Best score a single document can get from one expansion of `pattern`.
    pub fn glob_weight(&self, pattern: &str) -> Result<Score, QueryError> {
        let wids = self.lexicon.glob_to_word_ids(pattern)?;
        Ok(self.remove_oov(wids).into_iter().filter_map(|wid| self.word_bound(wid)).max().unwrap_or(0))
    }

    fn word_bound(&self, wid: WordId) -> Option<Score> {
        let docs = self.word_info.get(&wid)?;
        Some(scaled_int(inverse_doc_frequency(docs.len(), self.document_count()) * (1.0 + K1)))
    }

    fn remove_oov(&self, wids: Vec<WordId>) -> Vec<WordId> {
        wids.into_iter().filter(|w| *w != OOV && self.word_info.contains_key(w)).collect()
    }

    fn search_wids(&self, wids: &[WordId]) -> Vec<(Scores, Score)> {
        if wids.is_empty() || self.doc_words.is_empty() {
            return Vec::new();
        }
        let n = self.document_count();
        let mean = self.mean_doc_length();
        wids.iter()
            .filter_map(|wid| self.word_info.get(wid))
            .map(|docs| {
                let idf = inverse_doc_frequency(docs.len(), n);
                let mut result = Scores::with_capacity(docs.len());
                score_term(&mut result, docs.iter().map(|(&d, &f)| (d, f)), &self.doc_lengths, idf, mean);
                (result, 1)
            })
            .collect()
    }
}
