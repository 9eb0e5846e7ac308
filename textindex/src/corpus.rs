//! An Okapi index together with the document metadata needed to present hits,
//! and the load/save plumbing for an index directory.

use crate::index::OkapiIndex;
use crate::lexicon::{Lexicon, QueryError};
use crate::persist::{
    load_doc_id_map, load_doc_words, load_docs, load_lexicon, load_meta, load_postings_for_word, reset_postings,
    save_doc_id_map, save_doc_words, save_docs, save_lexicon, save_meta, save_postings_for_word, IndexPaths, MetaFile,
    FORMAT_VERSION,
};
use crate::pipeline::{Pipeline, PipelineElementFactory, PipelineSpec};
use crate::query::{evaluate, Mode, Query, Term};
use crate::rank::top_n;
use crate::{DocId, DocMeta, InputDoc, Score};
use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use time::format_description::well_known::Rfc3339;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedHit {
    pub doc_id: DocId,
    pub score: Score,
    /// Score as a percentage of the best score the query could reach.
    pub relevance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub total_hits: usize,
    pub hits: Vec<RankedHit>,
    /// Query words as typed, for highlighting.
    pub words: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CorpusStats {
    pub documents: usize,
    pub words_with_postings: usize,
    pub vocabulary: usize,
    pub total_doc_len: u64,
    pub mean_doc_length: f64,
}

pub struct Corpus {
    index: OkapiIndex,
    docs: HashMap<DocId, DocMeta>,
    doc_id_map: HashMap<String, DocId>,
    next_doc_id: DocId,
    pipeline: PipelineSpec,
}

impl Corpus {
    pub fn new(registry: &PipelineElementFactory, pipeline: PipelineSpec) -> Result<Self> {
        let lexicon = Lexicon::new(Pipeline::from_spec(registry, &pipeline)?);
        Ok(Self {
            index: OkapiIndex::new(lexicon),
            docs: HashMap::new(),
            doc_id_map: HashMap::new(),
            next_doc_id: 0,
            pipeline,
        })
    }

    pub fn index(&self) -> &OkapiIndex {
        &self.index
    }

    pub fn pipeline(&self) -> &PipelineSpec {
        &self.pipeline
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn doc(&self, doc_id: DocId) -> Option<&DocMeta> {
        self.docs.get(&doc_id)
    }

    pub fn doc_id(&self, external_id: &str) -> Option<DocId> {
        self.doc_id_map.get(external_id).copied()
    }

    /// Index a document and store its text under `paths`. Re-adding a known
    /// external id replaces that document in place, keeping its doc id.
    ///
    /// The text is written before anything in memory changes, so a failed
    /// write leaves the corpus as it was.
    pub fn add(&mut self, doc: InputDoc, paths: &IndexPaths) -> Result<DocId> {
        let known = self.doc_id_map.get(&doc.id).copied();
        let doc_id = known.unwrap_or(self.next_doc_id);

        let text_rel = format!("texts/{}.txt", doc_id);
        fs::create_dir_all(paths.texts_dir())?;
        fs::write(paths.root.join(&text_rel), &doc.body)?;

        if known.is_none() {
            self.next_doc_id += 1;
            self.doc_id_map.insert(doc.id.clone(), doc_id);
        }
        let words = self.index.index_doc(doc_id, &doc.body);
        tracing::debug!(doc_id, external_id = %doc.id, words, "indexed document");

        self.docs.insert(doc_id, DocMeta { external_id: doc.id, title: doc.title, url: doc.url, text_path: Some(text_rel) });
        Ok(doc_id)
    }

    /// Drop a document by external id. Returns false if it was unknown.
    pub fn remove(&mut self, external_id: &str, paths: &IndexPaths) -> Result<bool> {
        let Some(doc_id) = self.doc_id_map.remove(external_id) else {
            return Ok(false);
        };
        self.index.unindex_doc(doc_id);
        if let Some(rel) = self.docs.remove(&doc_id).and_then(|m| m.text_path) {
            let path = paths.root.join(rel);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        tracing::debug!(doc_id, external_id, "removed document");
        Ok(true)
    }

    pub fn search(&self, q: &str, mode: Mode, k: usize) -> Result<SearchOutcome, QueryError> {
        let query = Query::parse(q, self.index.lexicon());
        let scores = evaluate(&self.index, &query, mode)?;
        let total_hits = scores.len();
        let words: Vec<String> = query.words().into_iter().map(str::to_owned).collect();
        let weight = self.best_score(&query)?;
        let hits = top_n(scores, k)
            .into_iter()
            .map(|(doc_id, score)| {
                let relevance = if weight > 0 { (score as f64 * 100.0 / weight as f64).min(100.0) } else { 0.0 };
                RankedHit { doc_id, score, relevance }
            })
            .collect();
        Ok(SearchOutcome { total_hits, hits, words })
    }

    /// Upper bound on a document's score for `query`. A glob counts as its
    /// best-weighted expansion.
    fn best_score(&self, query: &Query) -> Result<Score, QueryError> {
        let mut weight = 0;
        for term in &query.terms {
            weight += match term {
                Term::Word(text) | Term::Phrase(text) => self.index.query_weight(&[text]),
                Term::Glob(pattern) => self.index.glob_weight(pattern)?,
            };
        }
        Ok(weight)
    }

    pub fn stats(&self) -> CorpusStats {
        CorpusStats {
            documents: self.index.document_count(),
            words_with_postings: self.index.word_count(),
            vocabulary: self.index.lexicon().len(),
            total_doc_len: self.index.total_doc_len(),
            mean_doc_length: self.index.mean_doc_length(),
        }
    }

    pub fn save(&self, paths: &IndexPaths) -> Result<()> {
        fs::create_dir_all(&paths.root)?;
        save_lexicon(paths, self.index.lexicon().vocabulary())?;
        reset_postings(paths)?;
        for wid in self.index.word_ids_with_postings() {
            if let Some(postings) = self.index.postings(wid) {
                save_postings_for_word(paths, wid, postings)?;
            }
        }
        save_doc_words(paths, self.index.doc_words())?;
        save_docs(paths, &self.docs)?;
        save_doc_id_map(paths, &self.doc_id_map)?;
        let meta = MetaFile {
            num_docs: self.index.document_count() as u32,
            next_doc_id: self.next_doc_id,
            total_doc_len: self.index.total_doc_len(),
            created_at: time::OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
            version: FORMAT_VERSION,
            pipeline: self.pipeline.clone(),
        };
        save_meta(paths, &meta)?;
        tracing::info!(root = %paths.root.display(), num_docs = meta.num_docs, "index saved");
        Ok(())
    }

    pub fn load(paths: &IndexPaths, registry: &PipelineElementFactory) -> Result<Self> {
        let meta = load_meta(paths)?;
        if meta.version != FORMAT_VERSION {
            anyhow::bail!("index format version {} is not supported (expected {})", meta.version, FORMAT_VERSION);
        }
        let pipeline = Pipeline::from_spec(registry, &meta.pipeline)?;
        let vocabulary = load_lexicon(paths)?;

        let mut word_info = HashMap::new();
        for &wid in vocabulary.values() {
            if let Some(postings) = load_postings_for_word(paths, wid)? {
                word_info.insert(wid, postings);
            }
        }
        let doc_words = load_doc_words(paths)?;
        let index = OkapiIndex::from_parts(Lexicon::from_vocabulary(pipeline, vocabulary), word_info, doc_words);
        if index.document_count() != meta.num_docs as usize || index.total_doc_len() != meta.total_doc_len {
            tracing::warn!(
                expected_docs = meta.num_docs,
                found_docs = index.document_count(),
                "index files disagree with meta.json"
            );
        }

        let docs = load_docs(paths)?;
        let doc_id_map = load_doc_id_map(paths)?;
        let next_doc_id = docs.keys().copied().max().map_or(0, |id| id + 1).max(meta.next_doc_id);
        tracing::info!(root = %paths.root.display(), num_docs = docs.len(), "index loaded");
        Ok(Self { index, docs, doc_id_map, next_doc_id, pipeline: meta.pipeline })
    }
}
