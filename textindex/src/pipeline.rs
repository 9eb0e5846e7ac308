//! Text-processing pipeline elements and the registry that builds them by name.
//!
//! A pipeline turns raw text into the list of words a [`crate::Lexicon`] assigns ids to.
//! Elements are chosen per index through a [`PipelineSpec`] of `(group, name)` pairs,
//! resolved against an explicit [`PipelineElementFactory`].

use crate::stopwords::is_stopword;
use lazy_static::lazy_static;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

lazy_static! {
    static ref WORD: Regex = Regex::new(r"\w+").expect("valid regex");
    static ref GLOB_WORD: Regex = Regex::new(r"\w+[\w*?]*").expect("valid regex");
    static ref TAG: Regex = Regex::new(r"<[^<>]*>").expect("valid regex");
    static ref ENTITY: Regex = Regex::new(r"&[A-Za-z]+;").expect("valid regex");
}

/// One stage of a lexicon pipeline.
///
/// `process_glob` runs when parsing query terms that may carry `*`/`?`;
/// `process_post_glob` runs when mapping a finished query term to word ids.
pub trait PipelineElement: Send + Sync {
    fn process(&self, words: Vec<String>) -> Vec<String>;

    fn process_glob(&self, words: Vec<String>) -> Vec<String> {
        self.process(words)
    }

    fn process_post_glob(&self, words: Vec<String>) -> Vec<String> {
        self.process(words)
    }
}

fn split_with(words: &[String], re: &Regex) -> Vec<String> {
    words
        .iter()
        .flat_map(|s| re.find_iter(s).map(|m| m.as_str().to_owned()))
        .collect()
}

fn is_glob_word(word: &str) -> bool {
    word.contains(['*', '?'])
}

/// Splits on anything that is not a Unicode word character.
pub struct Splitter;

impl PipelineElement for Splitter {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        split_with(&words, &WORD)
    }

    fn process_glob(&self, words: Vec<String>) -> Vec<String> {
        split_with(&words, &GLOB_WORD)
    }
}

/// Lowercases and drops markup tags and named entities before splitting.
pub struct HtmlWordSplitter;

impl HtmlWordSplitter {
    fn strip(words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .map(|w| {
                let lowered = w.to_lowercase();
                let no_tags = TAG.replace_all(&lowered, " ");
                ENTITY.replace_all(&no_tags, " ").into_owned()
            })
            .collect()
    }
}

impl PipelineElement for HtmlWordSplitter {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        split_with(&Self::strip(words), &WORD)
    }

    fn process_glob(&self, words: Vec<String>) -> Vec<String> {
        split_with(&Self::strip(words), &GLOB_WORD)
    }
}

pub struct CaseNormalizer;

impl PipelineElement for CaseNormalizer {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        words.into_iter().map(|w| w.to_lowercase()).collect()
    }
}

/// NFKD-decomposes each word and drops combining marks, so `café` indexes as `cafe`.
pub struct AccentFolder;

impl PipelineElement for AccentFolder {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .map(|w| w.nfkd().filter(|c| !is_combining_mark(*c)).collect())
            .collect()
    }
}

pub struct StopWordRemover;

impl PipelineElement for StopWordRemover {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        words.into_iter().filter(|w| !is_stopword(w)).collect()
    }
}

/// Stop words plus any single character below U+00FF.
pub struct StopWordAndSingleCharRemover;

impl PipelineElement for StopWordAndSingleCharRemover {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .filter(|w| {
                let mut chars = w.chars();
                let single = matches!((chars.next(), chars.next()), (Some(c), None) if (c as u32) < 255);
                !single && !is_stopword(w)
            })
            .collect()
    }
}

/// Snowball English stemmer. Glob patterns pass through unstemmed.
pub struct EnglishStemmer {
    stemmer: Stemmer,
}

impl Default for EnglishStemmer {
    fn default() -> Self {
        Self { stemmer: Stemmer::create(Algorithm::English) }
    }
}

impl PipelineElement for EnglishStemmer {
    fn process(&self, words: Vec<String>) -> Vec<String> {
        words.into_iter().map(|w| self.stemmer.stem(&w).into_owned()).collect()
    }

    fn process_glob(&self, words: Vec<String>) -> Vec<String> {
        words
            .into_iter()
            .map(|w| if is_glob_word(&w) { w } else { self.stemmer.stem(&w).into_owned() })
            .collect()
    }
}

/// An ordered chain of elements.
#[derive(Default)]
pub struct Pipeline {
    elements: Vec<Box<dyn PipelineElement>>,
}

impl Pipeline {
    pub fn new(elements: Vec<Box<dyn PipelineElement>>) -> Self {
        Self { elements }
    }

    pub fn push(&mut self, element: Box<dyn PipelineElement>) {
        self.elements.push(element);
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn process(&self, text: &str) -> Vec<String> {
        self.elements.iter().fold(vec![text.to_owned()], |words, e| e.process(words))
    }

    pub fn process_glob(&self, text: &str) -> Vec<String> {
        self.elements.iter().fold(vec![text.to_owned()], |words, e| e.process_glob(words))
    }

    pub fn process_post_glob(&self, text: &str) -> Vec<String> {
        self.elements.iter().fold(vec![text.to_owned()], |words, e| e.process_post_glob(words))
    }

    /// Instantiate every choice in `spec`; null choices are skipped.
    pub fn from_spec(registry: &PipelineElementFactory, spec: &PipelineSpec) -> Result<Self, RegistryError> {
        let mut pipeline = Self::default();
        for choice in &spec.elements {
            if let Some(element) = registry.instantiate(&choice.group, &choice.name)? {
                pipeline.push(element);
            }
        }
        Ok(pipeline)
    }
}

pub mod groups {
    pub const WORD_SPLITTER: &str = "Word Splitter";
    pub const CASE_NORMALIZER: &str = "Case Normalizer";
    pub const UNICODE_NORMALIZER: &str = "Unicode Normalizer";
    pub const STOP_WORDS: &str = "Stop Words";
    pub const STEMMER: &str = "Stemmer";
}

pub mod names {
    pub const WHITESPACE_SPLITTER: &str = "Whitespace splitter";
    pub const HTML_SPLITTER: &str = "HTML aware splitter";
    pub const CASE_NORMALIZER: &str = "Case Normalizer";
    pub const FOLD_ACCENTS: &str = "Fold accents";
    pub const KEEP_STOP_WORDS: &str = "Don't remove stop words";
    pub const REMOVE_STOP_WORDS: &str = "Remove listed stop words only";
    pub const REMOVE_STOP_AND_SINGLE: &str = "Remove listed and single char words";
    pub const ENGLISH_STEMMER: &str = "English (Snowball)";
    pub const NO_STEMMING: &str = "No stemming";
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("lexicon element \"{name}\" already registered in group \"{group}\"")]
    Duplicate { group: String, name: String },
    #[error("unknown pipeline group \"{0}\"")]
    UnknownGroup(String),
    #[error("no element \"{name}\" in pipeline group \"{group}\"")]
    UnknownElement { group: String, name: String },
}

pub type ElementFactory = fn() -> Box<dyn PipelineElement>;

/// Named constructors for pipeline elements, grouped by the role they play.
///
/// A `None` factory is a legitimate choice meaning "no element for this group".
#[derive(Default)]
pub struct PipelineElementFactory {
    groups: BTreeMap<String, BTreeMap<String, Option<ElementFactory>>>,
}

fn splitter() -> Box<dyn PipelineElement> { Box::new(Splitter) }
fn html_splitter() -> Box<dyn PipelineElement> { Box::new(HtmlWordSplitter) }
fn case_normalizer() -> Box<dyn PipelineElement> { Box::new(CaseNormalizer) }
fn accent_folder() -> Box<dyn PipelineElement> { Box::new(AccentFolder) }
fn stop_words() -> Box<dyn PipelineElement> { Box::new(StopWordRemover) }
fn stop_words_and_single() -> Box<dyn PipelineElement> { Box::new(StopWordAndSingleCharRemover) }
fn english_stemmer() -> Box<dyn PipelineElement> { Box::new(EnglishStemmer::default()) }

impl PipelineElementFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in element.
    pub fn with_defaults() -> Self {
        let builtin: [(&str, &str, Option<ElementFactory>); 9] = [
            (groups::WORD_SPLITTER, names::WHITESPACE_SPLITTER, Some(splitter)),
            (groups::WORD_SPLITTER, names::HTML_SPLITTER, Some(html_splitter)),
            (groups::CASE_NORMALIZER, names::CASE_NORMALIZER, Some(case_normalizer)),
            (groups::UNICODE_NORMALIZER, names::FOLD_ACCENTS, Some(accent_folder)),
            (groups::STOP_WORDS, names::KEEP_STOP_WORDS, None),
            (groups::STOP_WORDS, names::REMOVE_STOP_WORDS, Some(stop_words)),
            (groups::STOP_WORDS, names::REMOVE_STOP_AND_SINGLE, Some(stop_words_and_single)),
            (groups::STEMMER, names::ENGLISH_STEMMER, Some(english_stemmer)),
            (groups::STEMMER, names::NO_STEMMING, None),
        ];
        let mut registry = Self::default();
        for (group, name, factory) in builtin {
            registry.groups.entry(group.to_owned()).or_default().insert(name.to_owned(), factory);
        }
        registry
    }

    pub fn register_factory(&mut self, group: &str, name: &str, factory: Option<ElementFactory>) -> Result<(), RegistryError> {
        let elements = self.groups.entry(group.to_owned()).or_default();
        if elements.contains_key(name) {
            return Err(RegistryError::Duplicate { group: group.to_owned(), name: name.to_owned() });
        }
        elements.insert(name.to_owned(), factory);
        Ok(())
    }

    pub fn factory_groups(&self) -> Vec<&str> {
        self.groups.keys().map(String::as_str).collect()
    }

    pub fn factory_names(&self, group: &str) -> Result<Vec<&str>, RegistryError> {
        let elements = self.groups.get(group).ok_or_else(|| RegistryError::UnknownGroup(group.to_owned()))?;
        Ok(elements.keys().map(String::as_str).collect())
    }

    pub fn instantiate(&self, group: &str, name: &str) -> Result<Option<Box<dyn PipelineElement>>, RegistryError> {
        let elements = self.groups.get(group).ok_or_else(|| RegistryError::UnknownGroup(group.to_owned()))?;
        let factory = elements
            .get(name)
            .ok_or_else(|| RegistryError::UnknownElement { group: group.to_owned(), name: name.to_owned() })?;
        Ok(factory.map(|make| make()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementChoice {
    pub group: String,
    pub name: String,
}

/// Persistable description of a pipeline, stored alongside an index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub elements: Vec<ElementChoice>,
}

impl PipelineSpec {
    pub fn with(mut self, group: &str, name: &str) -> Self {
        self.elements.push(ElementChoice { group: group.to_owned(), name: name.to_owned() });
        self
    }

    /// Split, lowercase, fold accents, drop stop words, stem.
    pub fn english() -> Self {
        Self::default()
            .with(groups::WORD_SPLITTER, names::WHITESPACE_SPLITTER)
            .with(groups::CASE_NORMALIZER, names::CASE_NORMALIZER)
            .with(groups::UNICODE_NORMALIZER, names::FOLD_ACCENTS)
            .with(groups::STOP_WORDS, names::REMOVE_STOP_WORDS)
            .with(groups::STEMMER, names::ENGLISH_STEMMER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    struct Null;
    impl PipelineElement for Null {
        fn process(&self, words: Vec<String>) -> Vec<String> { words }
    }
    fn null() -> Box<dyn PipelineElement> { Box::new(Null) }

    #[test]
    fn registry_groups_and_names_are_sorted() {
        let mut pf = PipelineElementFactory::new();
        pf.register_factory("donald", "huey", Some(null)).unwrap();
        pf.register_factory("donald", "dooey", Some(null)).unwrap();
        pf.register_factory("donald", "louie", Some(null)).unwrap();
        pf.register_factory("looney", "daffy", Some(null)).unwrap();
        assert_eq!(
            pf.register_factory("donald", "huey", Some(null)),
            Err(RegistryError::Duplicate { group: "donald".into(), name: "huey".into() })
        );
        assert_eq!(pf.factory_groups(), vec!["donald", "looney"]);
        assert_eq!(pf.factory_names("donald").unwrap(), vec!["dooey", "huey", "louie"]);
        assert!(matches!(pf.factory_names("goofy"), Err(RegistryError::UnknownGroup(_))));
    }

    #[test]
    fn null_choice_instantiates_nothing() {
        let pf = PipelineElementFactory::with_defaults();
        assert!(pf.instantiate(groups::STOP_WORDS, names::KEEP_STOP_WORDS).unwrap().is_none());
        assert!(pf.instantiate(groups::STOP_WORDS, names::REMOVE_STOP_WORDS).unwrap().is_some());
        assert!(matches!(
            pf.instantiate(groups::STOP_WORDS, "nope"),
            Err(RegistryError::UnknownElement { .. })
        ));
    }

    #[test]
    fn splitter_keeps_glob_chars_only_in_glob_mode() {
        assert_eq!(Splitter.process(words(&["foo* ba?r baz"])), words(&["foo", "ba", "r", "baz"]));
        assert_eq!(Splitter.process_glob(words(&["foo* ba?r baz"])), words(&["foo*", "ba?r", "baz"]));
    }

    #[test]
    fn html_splitter_drops_markup() {
        let out = HtmlWordSplitter.process(words(&["<p>Fish&amp;Chips</p> <b>TODAY</b>"]));
        assert_eq!(out, words(&["fish", "chips", "today"]));
    }

    #[test]
    fn single_char_remover() {
        let out = StopWordAndSingleCharRemover.process(words(&["a", "x", "the", "ox", "日", "é", "ÿ"]));
        assert_eq!(out, words(&["ox", "日", "ÿ"]));
        let out = StopWordRemover.process(words(&["a", "x", "the", "ox"]));
        assert_eq!(out, words(&["x", "ox"]));
    }

    #[test]
    fn stemmer_leaves_glob_patterns() {
        let s = EnglishStemmer::default();
        assert_eq!(s.process(words(&["running"])), words(&["run"]));
        assert_eq!(s.process_glob(words(&["running*", "jumping"])), words(&["running*", "jump"]));
    }

    #[test]
    fn english_spec_builds_full_chain() {
        let pf = PipelineElementFactory::with_defaults();
        let pipeline = Pipeline::from_spec(&pf, &PipelineSpec::english()).unwrap();
        assert_eq!(pipeline.len(), 5);
        let out = pipeline.process("The Runners were RUNNING to the Café");
        assert_eq!(out, words(&["runner", "run", "cafe"]));
    }

    #[test]
    fn empty_pipeline_passes_text_through() {
        assert_eq!(Pipeline::default().process("foo bar"), words(&["foo bar"]));
    }
}
