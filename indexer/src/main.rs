use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use textindex::corpus::Corpus;
use textindex::persist::IndexPaths;
use textindex::pipeline::{groups, names, PipelineElementFactory, PipelineSpec};
use textindex::query::Mode;
use textindex::InputDoc;
use tracing_subscriber::{EnvFilter, fmt};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Build and inspect an Okapi BM25 full-text index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Splitter {
    Whitespace,
    Html,
}

#[derive(Clone, Copy, ValueEnum)]
enum StopWords {
    Keep,
    Listed,
    ListedAndSingle,
}

#[derive(Clone, Copy, ValueEnum)]
enum QueryMode {
    And,
    Or,
}

impl From<QueryMode> for Mode {
    fn from(m: QueryMode) -> Self {
        match m {
            QueryMode::And => Mode::And,
            QueryMode::Or => Mode::Or,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Build the index from input JSON/JSONL files or a directory
    Build {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
        /// Output index directory
        #[arg(long)]
        output: String,
        /// Add to an existing index in `output` instead of starting over
        #[arg(long, default_value_t = false)]
        append: bool,
        #[arg(long, value_enum, default_value_t = Splitter::Whitespace)]
        splitter: Splitter,
        #[arg(long, value_enum, default_value_t = StopWords::Listed)]
        stop_words: StopWords,
        /// Keep accents instead of folding them to ASCII
        #[arg(long, default_value_t = false)]
        keep_accents: bool,
        /// Disable the English stemmer
        #[arg(long, default_value_t = false)]
        no_stem: bool,
    },
    /// Print document and vocabulary counts for an index
    Stats {
        #[arg(long)]
        index: String,
    },
    /// Run a query against an index and print the top hits
    Query {
        #[arg(long)]
        index: String,
        #[arg(long)]
        q: String,
        #[arg(long, default_value_t = 10)]
        k: usize,
        #[arg(long, value_enum, default_value_t = QueryMode::And)]
        mode: QueryMode,
    },
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Build { input, output, append, splitter, stop_words, keep_accents, no_stem } => {
            let spec = pipeline_spec(splitter, stop_words, keep_accents, no_stem);
            build_index(&input, &output, append, spec)
        }
        Commands::Stats { index } => {
            let corpus = Corpus::load(&IndexPaths::new(&index), &PipelineElementFactory::with_defaults())?;
            println!("{}", serde_json::to_string_pretty(&corpus.stats())?);
            Ok(())
        }
        Commands::Query { index, q, k, mode } => run_query(&index, &q, k, mode.into()),
    }
}

fn pipeline_spec(splitter: Splitter, stop_words: StopWords, keep_accents: bool, no_stem: bool) -> PipelineSpec {
    let splitter = match splitter {
        Splitter::Whitespace => names::WHITESPACE_SPLITTER,
        Splitter::Html => names::HTML_SPLITTER,
    };
    let stop_words = match stop_words {
        StopWords::Keep => names::KEEP_STOP_WORDS,
        StopWords::Listed => names::REMOVE_STOP_WORDS,
        StopWords::ListedAndSingle => names::REMOVE_STOP_AND_SINGLE,
    };
    let mut spec = PipelineSpec::default()
        .with(groups::WORD_SPLITTER, splitter)
        .with(groups::CASE_NORMALIZER, names::CASE_NORMALIZER);
    if !keep_accents {
        spec = spec.with(groups::UNICODE_NORMALIZER, names::FOLD_ACCENTS);
    }
    spec.with(groups::STOP_WORDS, stop_words)
        .with(groups::STEMMER, if no_stem { names::NO_STEMMING } else { names::ENGLISH_STEMMER })
}

fn build_index(input: &str, output: &str, append: bool, spec: PipelineSpec) -> Result<()> {
    let registry = PipelineElementFactory::with_defaults();
    let out_paths = IndexPaths::new(output);
    let mut corpus = if append && out_paths.root.join("meta.json").exists() {
        let corpus = Corpus::load(&out_paths, &registry)?;
        if corpus.pipeline() != &spec {
            tracing::warn!("appending with the pipeline stored in the existing index; pipeline flags ignored");
        }
        corpus
    } else {
        Corpus::new(&registry, spec)?
    };

    let mut ingested = 0usize;
    for file in input_files(Path::new(input)) {
        let is_jsonl = file.extension().and_then(|s| s.to_str()) == Some("jsonl");
        let docs = if is_jsonl { read_jsonl(&file)? } else { read_json(&file)? };
        for doc in docs {
            corpus.add(doc, &out_paths)?;
            ingested += 1;
        }
    }

    let stats = corpus.stats();
    tracing::info!(ingested, num_docs = stats.documents, vocabulary = stats.vocabulary, "ingested documents");
    corpus.save(&out_paths)?;
    tracing::info!(output, "index build complete");
    Ok(())
}

fn run_query(index: &str, q: &str, k: usize, mode: Mode) -> Result<()> {
    let corpus = Corpus::load(&IndexPaths::new(index), &PipelineElementFactory::with_defaults())?;
    let outcome = corpus.search(q, mode, k)?;
    println!("{} hit(s)", outcome.total_hits);
    for hit in outcome.hits {
        let title = corpus.doc(hit.doc_id).map(|m| m.title.as_str()).unwrap_or("");
        println!("{:>8} {:>6.1}%  [{}] {}", hit.score, hit.relevance, hit.doc_id, title);
    }
    Ok(())
}

fn input_files(input_path: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input_path.is_dir() {
        for entry in WalkDir::new(input_path).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() {
                if let Some(ext) = p.extension().and_then(|s| s.to_str()) {
                    if matches!(ext, "json" | "jsonl") {
                        files.push(p.to_path_buf());
                    }
                }
            }
        }
    } else if input_path.is_file() {
        files.push(input_path.to_path_buf());
    } else {
        tracing::warn!(input = %input_path.display(), "input path does not exist");
    }
    files
}

fn read_jsonl(file: &Path) -> Result<Vec<InputDoc>> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let mut docs = Vec::new();
    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() { continue; }
        let doc: InputDoc = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}", file.display(), n + 1))?;
        docs.push(doc);
    }
    Ok(docs)
}

fn read_json(file: &Path) -> Result<Vec<InputDoc>> {
    let f = File::open(file)?;
    let reader = BufReader::new(f);
    let json: serde_json::Value = serde_json::from_reader(reader)?;
    let docs = match json {
        serde_json::Value::Array(arr) => arr
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<InputDoc>, _>>()?,
        serde_json::Value::Object(_) => vec![serde_json::from_value(json)?],
        _ => {
            tracing::warn!(file = %file.display(), "skipping JSON that is neither an object nor an array");
            Vec::new()
        }
    };
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn json_and_jsonl_inputs() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        fs::create_dir_all(input.join("nested")).unwrap();
        fs::write(
            input.join("a.json"),
            r#"[{"id":"a","title":"A","body":"rust search engines"},{"id":"b","title":"B","body":"okapi weighting"}]"#,
        )
        .unwrap();
        fs::write(
            input.join("nested/c.jsonl"),
            "{\"id\":\"c\",\"title\":\"C\",\"body\":\"rust borrow checker\"}\n\n",
        )
        .unwrap();
        fs::write(input.join("notes.txt"), "ignored").unwrap();

        let out = dir.path().join("idx");
        let spec = pipeline_spec(Splitter::Whitespace, StopWords::Listed, false, false);
        build_index(input.to_str().unwrap(), out.to_str().unwrap(), false, spec.clone()).unwrap();

        let corpus = Corpus::load(&IndexPaths::new(&out), &PipelineElementFactory::with_defaults()).unwrap();
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.pipeline(), &spec);
        assert_eq!(corpus.search("rust", Mode::And, 10).unwrap().total_hits, 2);
    }

    #[test]
    fn append_keeps_existing_documents() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("one.json");
        let second = dir.path().join("two.json");
        fs::write(&first, r#"{"id":"a","title":"A","body":"alpha"}"#).unwrap();
        fs::write(&second, r#"{"id":"b","title":"B","body":"beta"}"#).unwrap();
        let out = dir.path().join("idx");
        let out = out.to_str().unwrap();
        let spec = pipeline_spec(Splitter::Whitespace, StopWords::Keep, true, true);

        build_index(first.to_str().unwrap(), out, false, spec.clone()).unwrap();
        build_index(second.to_str().unwrap(), out, true, spec).unwrap();

        let corpus = Corpus::load(&IndexPaths::new(out), &PipelineElementFactory::with_defaults()).unwrap();
        assert_eq!(corpus.len(), 2);
        assert!(corpus.doc_id("a").is_some());
        assert!(corpus.doc_id("b").is_some());
    }

    #[test]
    fn pipeline_flags_map_to_registry_names() {
        let spec = pipeline_spec(Splitter::Html, StopWords::ListedAndSingle, true, true);
        let chosen: Vec<&str> = spec.elements.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(
            chosen,
            vec![names::HTML_SPLITTER, names::CASE_NORMALIZER, names::REMOVE_STOP_AND_SINGLE, names::NO_STEMMING]
        );
    }
}
