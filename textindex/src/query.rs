//! Query strings: bare words, `"quoted phrases"` and `glob*` words,
//! combined with AND (intersection) or OR (union).

use crate::cache::RequestCache;
use crate::index::OkapiIndex;
use crate::lexicon::{Lexicon, QueryError};
use crate::setops::{mass_weighted_intersection, mass_weighted_union};
use crate::Scores;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    Word(String),
    Phrase(String),
    Glob(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub terms: Vec<Term>,
}

impl Query {
    /// Split `text` into terms. Glob chunks are normalized through the lexicon
    /// pipeline here since they bypass it at search time.
    pub fn parse(text: &str, lexicon: &Lexicon) -> Self {
        let mut terms = Vec::new();
        let mut rest = text;
        while !rest.is_empty() {
            rest = rest.trim_start();
            if let Some(quoted) = rest.strip_prefix('"') {
                let (phrase, after) = quoted.split_once('"').unwrap_or((quoted, ""));
                if !phrase.trim().is_empty() {
                    terms.push(Term::Phrase(phrase.trim().to_owned()));
                }
                rest = after;
                continue;
            }
            let end = rest.find(|c: char| c.is_whitespace() || c == '"').unwrap_or(rest.len());
            let (chunk, after) = rest.split_at(end);
            rest = after;
            if chunk.is_empty() {
                continue;
            }
            if Lexicon::is_glob(chunk) {
                for word in lexicon.parse_terms(chunk) {
                    if Lexicon::is_glob(&word) {
                        terms.push(Term::Glob(word));
                    } else {
                        terms.push(Term::Word(word));
                    }
                }
            } else {
                terms.push(Term::Word(chunk.to_owned()));
            }
        }
        Self { terms }
    }

    /// Raw words of the query, for snippet highlighting and relevance weighting.
    pub fn words(&self) -> Vec<&str> {
        self.terms
            .iter()
            .flat_map(|t| match t {
                Term::Word(w) | Term::Glob(w) => vec![w.as_str()],
                Term::Phrase(p) => p.split_whitespace().collect(),
            })
            .collect()
    }
}

fn run_term(index: &OkapiIndex, term: &Term) -> Result<Option<Scores>, QueryError> {
    Ok(match term {
        Term::Word(w) => index.search(w),
        Term::Phrase(p) => index.search_phrase(p),
        Term::Glob(g) => Some(index.search_glob(g)?),
    })
}

/// Evaluate `query` against `index`. Terms that reduce to nothing (stop words,
/// punctuation) are ignored; a query made only of such terms matches nothing.
pub fn evaluate(index: &OkapiIndex, query: &Query, mode: Mode) -> Result<Scores, QueryError> {
    let mut cache: RequestCache<Term, Option<Scores>> = RequestCache::new();
    let mut parts = Vec::with_capacity(query.terms.len());
    for term in &query.terms {
        let scores = match cache.get(term) {
            Some(hit) => hit.clone(),
            None => {
                let computed = run_term(index, term)?;
                cache.insert(term.clone(), computed.clone());
                computed
            }
        };
        if let Some(scores) = scores {
            parts.push((scores, 1));
        }
    }
    tracing::debug!(terms = query.terms.len(), %cache, "evaluated query");
    Ok(match mode {
        Mode::And => mass_weighted_intersection(parts),
        Mode::Or => mass_weighted_union(parts),
    })
}
