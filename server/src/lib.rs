use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{delete, get, post}, Json, Router};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use textindex::corpus::{Corpus, CorpusStats};
use textindex::persist::IndexPaths;
use textindex::pipeline::{PipelineElementFactory, PipelineSpec};
use textindex::query::Mode;
use textindex::{DocId, InputDoc};
use tower_http::cors::{Any, CorsLayer, AllowOrigin};
use tower_http::trace::TraceLayer;

const SNIPPET_BEFORE: usize = 100;
const SNIPPET_AFTER: usize = 200;

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub mode: Mode,
}
fn default_k() -> usize { 10 }

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_ms: u128, // deprecated, kept for backward compatibility
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<SearchHit>,
}

#[derive(Serialize)]
pub struct SearchHit {
    pub doc_id: DocId,
    pub score: i64,
    pub relevance: f64,
    pub title: String,
    pub url: Option<String>,
    pub snippet: Option<String>,
}

/// Startup settings; `from_env` reads them the way the binary does.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub index_dir: PathBuf,
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset or unparsable.
    pub cors_allow_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env(index_dir: impl Into<PathBuf>) -> Self {
        Self {
            index_dir: index_dir.into(),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN").ok(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub paths: Arc<IndexPaths>,
    pub corpus: Arc<RwLock<Corpus>>,
    pub admin_token: Option<String>,
}

pub fn build_app(config: AppConfig) -> Result<Router> {
    let paths = IndexPaths::new(&config.index_dir);
    let registry = PipelineElementFactory::with_defaults();
    let corpus = if paths.root.join("meta.json").exists() {
        Corpus::load(&paths, &registry)?
    } else {
        tracing::warn!(root = %paths.root.display(), "no index found, starting empty");
        Corpus::new(&registry, PipelineSpec::english())?
    };
    let app_state = AppState {
        paths: Arc::new(paths),
        corpus: Arc::new(RwLock::new(corpus)),
        admin_token: config.admin_token,
    };

    let cors = match config.cors_allow_origin {
        Some(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/doc/:doc_id", get(doc_handler))
        .route("/stats", get(stats_handler))
        .route("/index/batch", post(index_batch))
        .route("/index/commit", post(index_commit))
        .route("/index/:external_id", delete(index_delete))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let k = params.k.clamp(1, 100);
    let corpus = state.corpus.read();
    let outcome = corpus
        .search(&params.q, params.mode, k)
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let highlighter = Highlighter::new(&outcome.words);
    let results: Vec<SearchHit> = outcome
        .hits
        .into_iter()
        .filter_map(|hit| {
            let meta = corpus.doc(hit.doc_id)?;
            let snippet = meta
                .text_path
                .as_ref()
                .and_then(|rel| snippet_from_file(&state.paths.root.join(rel), highlighter.as_ref()));
            Some(SearchHit {
                doc_id: hit.doc_id,
                score: hit.score,
                relevance: hit.relevance,
                title: meta.title.clone(),
                url: meta.url.clone(),
                snippet,
            })
        })
        .collect();

    let elapsed = start.elapsed();
    tracing::debug!(query = %params.q, total_hits = outcome.total_hits, took_s = elapsed.as_secs_f64(), "search");
    Ok(Json(SearchResponse {
        query: params.q,
        took_ms: elapsed.as_millis(),
        took_s: elapsed.as_secs_f64(),
        total_hits: outcome.total_hits,
        results,
    }))
}

pub async fn doc_handler(
    State(state): State<AppState>,
    Path(doc_id): Path<DocId>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    let corpus = state.corpus.read();
    let Some(meta) = corpus.doc(doc_id) else {
        return Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found" }))));
    };
    let mut obj = serde_json::json!({
        "doc_id": doc_id,
        "external_id": meta.external_id,
        "title": meta.title,
        "url": meta.url,
        "length": corpus.index().doc_length(doc_id),
    });
    if let Some(rel) = &meta.text_path {
        if let Ok(text) = std::fs::read_to_string(state.paths.root.join(rel)) {
            obj["text"] = serde_json::Value::String(text);
        }
    }
    Ok(Json(obj))
}

pub async fn stats_handler(State(state): State<AppState>) -> Json<CorpusStats> {
    Json(state.corpus.read().stats())
}

/// Case-insensitive matcher for the query words; `*` and `?` in glob words
/// match word characters.
struct Highlighter {
    pattern: regex::Regex,
}

impl Highlighter {
    fn new(words: &[String]) -> Option<Self> {
        let mut alternatives: Vec<String> = words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .map(glob_to_pattern)
            .collect();
        if alternatives.is_empty() {
            return None;
        }
        alternatives.sort_by_key(|a| std::cmp::Reverse(a.len()));
        let pattern = regex::RegexBuilder::new(&alternatives.join("|"))
            .case_insensitive(true)
            .build()
            .map_err(|e| tracing::warn!(error = %e, "cannot build highlight pattern"))
            .ok()?;
        Some(Self { pattern })
    }

    fn first_match(&self, text: &str) -> Option<usize> {
        self.pattern.find(text).map(|m| m.start())
    }

    fn highlight(&self, snippet: &str) -> String {
        self.pattern
            .replace_all(snippet, |caps: &regex::Captures| format!("<em>{}</em>", &caps[0]))
            .into_owned()
    }
}

fn glob_to_pattern(word: &str) -> String {
    let mut out = String::new();
    for c in word.chars() {
        match c {
            '*' => out.push_str(r"\w*"),
            '?' => out.push_str(r"\w"),
            c => out.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    out
}

fn snippet_from_file(path: &std::path::Path, highlighter: Option<&Highlighter>) -> Option<String> {
    let text = std::fs::read_to_string(path).ok()?;
    if text.is_empty() { return None; }
    let Some(highlighter) = highlighter else {
        return Some(text.chars().take(SNIPPET_AFTER).collect());
    };
    let snippet = match highlighter.first_match(&text) {
        Some(idx) => {
            let start = floor_char_boundary(&text, idx.saturating_sub(SNIPPET_BEFORE));
            let end = ceil_char_boundary(&text, idx + SNIPPET_AFTER);
            &text[start..end]
        }
        None => {
            let end = ceil_char_boundary(&text, SNIPPET_AFTER);
            &text[..end]
        }
    };
    Some(highlighter.highlight(snippet))
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, i: usize) -> usize {
    let mut i = i.min(s.len());
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

// --- Admin endpoints ---
// Batch and commit write files under the corpus lock, so they run on the
// blocking pool rather than on an async worker.
async fn index_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(docs): Json<Vec<InputDoc>>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let doc_ids = blocking(move || {
        let mut corpus = state.corpus.write();
        let ids = docs.into_iter().map(|doc| corpus.add(doc, &state.paths)).collect::<Result<Vec<DocId>>>();
        ids
    })
    .await?;
    tracing::info!(indexed = doc_ids.len(), "batch indexed");
    Ok(Json(serde_json::json!({ "indexed": doc_ids.len(), "doc_ids": doc_ids })))
}

async fn index_commit(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let num_docs = blocking(move || {
        let corpus = state.corpus.read();
        corpus.save(&state.paths)?;
        Ok(corpus.len())
    })
    .await?;
    Ok(Json(serde_json::json!({ "committed": true, "num_docs": num_docs })))
}

async fn blocking<T, F>(f: F) -> Result<T, (StatusCode, String)>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| internal(e.into()))?
        .map_err(internal)
}

async fn index_delete(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(external_id): Path<String>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let removed = state.corpus.write().remove(&external_id, &state.paths).map_err(internal)?;
    if !removed {
        return Err((StatusCode::NOT_FOUND, format!("unknown document {external_id}")));
    }
    Ok(Json(serde_json::json!({ "removed": external_id })))
}

fn internal(e: anyhow::Error) -> (StatusCode, String) {
    tracing::error!(error = %e, "admin operation failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlights_words_and_globs() {
        let h = Highlighter::new(&["Rust".into(), "prog*".into()]).unwrap();
        assert_eq!(h.highlight("rust programs"), "<em>rust</em> <em>programs</em>");
        assert!(Highlighter::new(&[" ".into()]).is_none());
    }

    #[test]
    fn snippet_respects_char_boundaries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.txt");
        let text = format!("{}needle{}", "é".repeat(80), "ü".repeat(150));
        std::fs::write(&path, &text).unwrap();
        let h = Highlighter::new(&["needle".into()]).unwrap();
        let snippet = snippet_from_file(&path, Some(&h)).unwrap();
        assert!(snippet.contains("<em>needle</em>"));
        assert!(snippet.len() < text.len() + 9);
    }
}
