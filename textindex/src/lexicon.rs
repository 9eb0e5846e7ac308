//! Word <-> word-id mapping driven by a text pipeline.

use crate::pipeline::Pipeline;
use crate::WordId;
use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use thiserror::Error;

/// Reserved id for words the lexicon has never seen.
pub const OOV: WordId = 0;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueryError {
    #[error("pattern {0:?} shouldn't start with a glob character")]
    LeadingGlob(String),
    #[error("invalid glob pattern {0:?}")]
    BadPattern(String),
}

pub struct Lexicon {
    pipeline: Pipeline,
    wids: BTreeMap<String, WordId>,
    words: HashMap<WordId, String>,
    next_id: WordId,
}

impl Lexicon {
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline, wids: BTreeMap::new(), words: HashMap::new(), next_id: OOV + 1 }
    }

    /// Rebuild a lexicon from a persisted vocabulary.
    pub fn from_vocabulary(pipeline: Pipeline, wids: BTreeMap<String, WordId>) -> Self {
        let words = wids.iter().map(|(w, &id)| (id, w.clone())).collect();
        let next_id = wids.values().copied().max().unwrap_or(OOV) + 1;
        Self { pipeline, wids, words, next_id }
    }

    pub fn vocabulary(&self) -> &BTreeMap<String, WordId> {
        &self.wids
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.wids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wids.is_empty()
    }

    pub fn clear(&mut self) {
        self.wids.clear();
        self.words.clear();
        self.next_id = OOV + 1;
    }

    pub fn words(&self) -> impl Iterator<Item = &str> {
        self.wids.keys().map(String::as_str)
    }

    pub fn wids(&self) -> impl Iterator<Item = WordId> + '_ {
        self.wids.values().copied()
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, WordId)> {
        self.wids.iter().map(|(w, &id)| (w.as_str(), id))
    }

    /// Ids for every word of indexed text, assigning new ids to unseen words.
    pub fn source_to_word_ids(&mut self, text: &str) -> Vec<WordId> {
        let words = self.pipeline.process(text);
        words.into_iter().map(|w| self.word_id_create(w)).collect()
    }

    /// Ids for the words of a query term; unknown words map to [`OOV`].
    pub fn term_to_word_ids(&self, text: &str) -> Vec<WordId> {
        self.pipeline.process_post_glob(text).iter().map(|w| self.get_wid(w)).collect()
    }

    /// Query words with glob characters preserved.
    pub fn parse_terms(&self, text: &str) -> Vec<String> {
        self.pipeline.process_glob(text)
    }

    pub fn is_glob(word: &str) -> bool {
        word.contains(['*', '?'])
    }

    pub fn get_word(&self, wid: WordId) -> Option<&str> {
        self.words.get(&wid).map(String::as_str)
    }

    pub fn get_wid(&self, word: &str) -> WordId {
        self.wids.get(word).copied().unwrap_or(OOV)
    }

    /// Expand a shell-style pattern (`*` any run, `?` one char) to known word ids.
    ///
    /// The pattern must start with a literal prefix; the scan walks the sorted
    /// vocabulary from that prefix only.
    pub fn glob_to_word_ids(&self, pattern: &str) -> Result<Vec<WordId>, QueryError> {
        let split = pattern.find(['*', '?']).unwrap_or(pattern.len());
        let (prefix, rest) = pattern.split_at(split);
        if rest.is_empty() {
            return Ok(self.wids.get(prefix).map(|&id| vec![id]).unwrap_or_default());
        }
        if prefix.is_empty() {
            return Err(QueryError::LeadingGlob(pattern.to_owned()));
        }

        let mut pat = format!("^{}", regex::escape(prefix));
        for c in rest.chars() {
            match c {
                '*' => pat.push_str(".*"),
                '?' => pat.push('.'),
                c => pat.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        pat.push('$');
        let prog = Regex::new(&pat).map_err(|_| QueryError::BadPattern(pattern.to_owned()))?;

        Ok(self
            .wids
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(|(w, _)| w.starts_with(prefix))
            .filter(|(w, _)| prog.is_match(w))
            .map(|(_, &id)| id)
            .collect())
    }

    fn word_id_create(&mut self, word: String) -> WordId {
        if let Some(&wid) = self.wids.get(&word) {
            return wid;
        }
        let wid = self.next_id;
        self.next_id += 1;
        self.words.insert(wid, word.clone());
        self.wids.insert(word, wid);
        wid
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CaseNormalizer, PipelineElement, Splitter};

    struct Replace(&'static str, &'static str);
    impl PipelineElement for Replace {
        fn process(&self, words: Vec<String>) -> Vec<String> {
            words.into_iter().map(|w| if w == self.0 { self.1.to_owned() } else { w }).collect()
        }
    }

    struct Reverse(&'static str);
    impl PipelineElement for Reverse {
        fn process(&self, words: Vec<String>) -> Vec<String> {
            words.into_iter().map(|w| if w == self.0 { w.chars().rev().collect() } else { w }).collect()
        }
    }

    struct StopList(&'static [&'static str]);
    impl PipelineElement for StopList {
        fn process(&self, words: Vec<String>) -> Vec<String> {
            words.into_iter().filter(|w| !self.0.contains(&w.as_str())).collect()
        }
    }

    fn lexicon(elements: Vec<Box<dyn PipelineElement>>) -> Lexicon {
        Lexicon::new(Pipeline::new(elements))
    }

    #[test]
    fn clear_empties_vocabulary() {
        let mut lex = lexicon(vec![]);
        lex.source_to_word_ids("foo");
        assert_eq!(lex.len(), 1);
        lex.clear();
        assert_eq!(lex.len(), 0);
        assert_eq!(lex.get_wid("foo"), OOV);
    }

    #[test]
    fn new_words_get_consecutive_ids() {
        let mut lex = lexicon(vec![Box::new(Splitter)]);
        let wids = lex.source_to_word_ids("cats and dogs");
        assert_eq!(wids.len(), 3);
        let first = wids[0];
        assert_eq!(wids, vec![first, first + 1, first + 2]);
        assert_eq!(lex.source_to_word_ids("dogs cats"), vec![first + 2, first]);
    }

    #[test]
    fn term_lookup_and_missing_term() {
        let mut lex = lexicon(vec![Box::new(Splitter)]);
        lex.source_to_word_ids("cats and dogs");
        let wids = lex.term_to_word_ids("dogs");
        assert_eq!(wids.len(), 1);
        assert!(wids[0] > OOV);
        assert_eq!(lex.term_to_word_ids("boxes"), vec![OOV]);
        assert_eq!(lex.get_word(wids[0]), Some("dogs"));
    }

    #[test]
    fn post_glob_hook_is_used_for_terms() {
        struct Renaming;
        impl PipelineElement for Renaming {
            fn process(&self, words: Vec<String>) -> Vec<String> { Splitter.process(words) }
            fn process_post_glob(&self, _words: Vec<String>) -> Vec<String> { vec!["fox".into()] }
        }
        let mut lex = lexicon(vec![Box::new(Renaming)]);
        lex.source_to_word_ids("cats and dogs");
        assert_eq!(lex.term_to_word_ids("dogs"), vec![OOV]);
    }

    #[test]
    fn case_folding_depends_on_pipeline() {
        let mut folded = lexicon(vec![Box::new(Splitter), Box::new(CaseNormalizer)]);
        folded.source_to_word_ids("CATS and dogs");
        let wids = folded.term_to_word_ids("cats and dogs");
        assert!(wids.iter().all(|&w| w != OOV));

        let mut raw = lexicon(vec![Box::new(Splitter)]);
        raw.source_to_word_ids("CATS and dogs");
        let wids = raw.term_to_word_ids("cats and dogs");
        assert_eq!(wids[0], OOV);
        assert_eq!(wids[2], wids[1] + 1);
    }

    #[test]
    fn multi_element_pipeline() {
        let mut lex = lexicon(vec![
            Box::new(Splitter),
            Box::new(StopList(&["and"])),
            Box::new(Replace("dogs", "fish")),
            Box::new(Reverse("fish")),
        ]);
        assert_eq!(lex.source_to_word_ids("cats and dogs").len(), 2);
        assert_ne!(lex.get_wid("hsif"), OOV);
        assert_eq!(lex.get_wid("and"), OOV);
    }

    #[test]
    fn glob_expansion() {
        let mut lex = lexicon(vec![Box::new(Splitter)]);
        lex.source_to_word_ids("cat cart catalog dog cot c.t");
        let names = |ids: Vec<WordId>| -> Vec<String> {
            let mut v: Vec<String> = ids.iter().map(|&i| lex.get_word(i).unwrap().to_owned()).collect();
            v.sort();
            v
        };
        assert_eq!(names(lex.glob_to_word_ids("ca*").unwrap()), vec!["cart", "cat", "catalog"]);
        assert_eq!(names(lex.glob_to_word_ids("c?t").unwrap()), vec!["cat", "cot"]);
        assert_eq!(names(lex.glob_to_word_ids("cat").unwrap()), vec!["cat"]);
        assert!(lex.glob_to_word_ids("zebra").unwrap().is_empty());
        assert_eq!(lex.glob_to_word_ids("*at"), Err(QueryError::LeadingGlob("*at".into())));
    }

    #[test]
    fn vocabulary_round_trip_keeps_ids() {
        let mut lex = lexicon(vec![Box::new(Splitter)]);
        let before = lex.source_to_word_ids("alpha beta");
        let mut restored = Lexicon::from_vocabulary(Pipeline::new(vec![Box::new(Splitter)]), lex.vocabulary().clone());
        assert_eq!(restored.term_to_word_ids("beta alpha"), vec![before[1], before[0]]);
        let gamma = restored.source_to_word_ids("gamma")[0];
        assert!(gamma > before[1]);
    }
}
