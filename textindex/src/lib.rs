use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod cache;
pub mod codec;
pub mod corpus;
pub mod index;
pub mod lexicon;
pub mod persist;
pub mod pipeline;
pub mod query;
pub mod rank;
pub mod scorer;
pub mod setops;
mod stopwords;

pub use index::OkapiIndex;
pub use lexicon::Lexicon;

pub type DocId = u32;
pub type WordId = u32;
/// Integer relevance score; BM25 contributions are scaled by 1024 before rounding.
pub type Score = i64;
/// Result accumulator: doc id -> summed score.
pub type Scores = HashMap<DocId, Score>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocMeta {
    pub external_id: String,
    pub title: String,
    pub url: Option<String>,
    /// Relative path to the stored full text for snippet extraction, e.g., texts/{doc_id}.txt
    pub text_path: Option<String>,
}

/// A document as accepted by the indexer and the admin batch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct InputDoc {
    pub id: String,
    pub title: String,
    pub body: String,
    pub url: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub meta: Option<serde_json::Value>,
}
