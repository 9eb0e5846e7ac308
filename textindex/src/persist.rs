use crate::codec::{decode_deltas, encode_deltas, RiceCode};
use crate::pipeline::PipelineSpec;
use crate::{DocId, DocMeta, WordId};
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::{create_dir_all, remove_dir_all, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 2;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub next_doc_id: DocId,
    pub total_doc_len: u64,
    pub created_at: String,
    pub version: u32,
    pub pipeline: PipelineSpec,
}

/// One word's postings: ascending doc ids as a first id plus rice-coded gaps,
/// with frequencies in the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPostings {
    pub first: DocId,
    pub deltas: RiceCode,
    pub freqs: Vec<u32>,
}

impl StoredPostings {
    pub fn encode(postings: &HashMap<DocId, u32>) -> Result<Self> {
        let mut sorted: Vec<(DocId, u32)> = postings.iter().map(|(&d, &f)| (d, f)).collect();
        sorted.sort_unstable_by_key(|&(d, _)| d);
        let ids: Vec<DocId> = sorted.iter().map(|&(d, _)| d).collect();
        let (first, deltas) = encode_deltas(&ids)?;
        Ok(Self { first, deltas, freqs: sorted.into_iter().map(|(_, f)| f).collect() })
    }

    pub fn decode(&self) -> Result<HashMap<DocId, u32>> {
        let ids = decode_deltas(self.first, &self.deltas)?;
        if ids.len() != self.freqs.len() {
            bail!("postings hold {} doc ids but {} frequencies", ids.len(), self.freqs.len());
        }
        Ok(ids.into_iter().zip(self.freqs.iter().copied()).collect())
    }
}

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn lexicon(&self) -> PathBuf { self.root.join("lexicon.bin") }
    fn doc_words(&self) -> PathBuf { self.root.join("docwords.bin") }
    fn docs(&self) -> PathBuf { self.root.join("docs.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
    fn postings_dir(&self) -> PathBuf { self.root.join("postings") }
    fn doc_id_map(&self) -> PathBuf { self.root.join("doc_id_map.bin") }
    pub fn texts_dir(&self) -> PathBuf { self.root.join("texts") }
    fn postings_file(&self, wid: WordId) -> PathBuf {
        self.postings_dir().join(format!("{wid:08}.postings.bin"))
    }
}

fn write_bin<T: Serialize>(path: PathBuf, value: &T) -> Result<()> {
    let mut f = File::create(path)?;
    let bytes = bincode::serialize(value)?;
    f.write_all(&bytes)?;
    Ok(())
}

fn read_bin<T: for<'de> Deserialize<'de>>(path: PathBuf) -> Result<T> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    Ok(bincode::deserialize(&buf)?)
}

pub fn save_lexicon(paths: &IndexPaths, vocabulary: &BTreeMap<String, WordId>) -> Result<()> {
    create_dir_all(&paths.root)?;
    write_bin(paths.lexicon(), vocabulary)
}

pub fn load_lexicon(paths: &IndexPaths) -> Result<BTreeMap<String, WordId>> {
    read_bin(paths.lexicon())
}

pub fn save_doc_words(paths: &IndexPaths, doc_words: &HashMap<DocId, Vec<WordId>>) -> Result<()> {
    write_bin(paths.doc_words(), doc_words)
}

pub fn load_doc_words(paths: &IndexPaths) -> Result<HashMap<DocId, Vec<WordId>>> {
    read_bin(paths.doc_words())
}

pub fn save_docs(paths: &IndexPaths, docs: &HashMap<DocId, DocMeta>) -> Result<()> {
    write_bin(paths.docs(), docs)
}

pub fn load_docs(paths: &IndexPaths) -> Result<HashMap<DocId, DocMeta>> {
    read_bin(paths.docs())
}

/// Drop every stored postings file, so a full save leaves no stale words behind.
pub fn reset_postings(paths: &IndexPaths) -> Result<()> {
    let dir = paths.postings_dir();
    if dir.exists() {
        remove_dir_all(&dir)?;
    }
    create_dir_all(&dir)?;
    Ok(())
}

pub fn save_postings_for_word(paths: &IndexPaths, wid: WordId, postings: &HashMap<DocId, u32>) -> Result<()> {
    create_dir_all(paths.postings_dir())?;
    write_bin(paths.postings_file(wid), &StoredPostings::encode(postings)?)
}

/// `None` when the word has no postings file.
pub fn load_postings_for_word(paths: &IndexPaths, wid: WordId) -> Result<Option<HashMap<DocId, u32>>> {
    let file = paths.postings_file(wid);
    if !file.exists() {
        return Ok(None);
    }
    let stored: StoredPostings = read_bin(file)?;
    Ok(Some(stored.decode()?))
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let mut f = File::create(paths.meta())?;
    let json = serde_json::to_string_pretty(meta)?;
    f.write_all(json.as_bytes())?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}

pub fn save_doc_id_map(paths: &IndexPaths, map: &HashMap<String, DocId>) -> Result<()> {
    write_bin(paths.doc_id_map(), map)
}

pub fn load_doc_id_map(paths: &IndexPaths) -> Result<HashMap<String, DocId>> {
    read_bin(paths.doc_id_map())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_postings_round_trip() {
        let postings: HashMap<DocId, u32> = [(9, 1), (2, 4), (300, 2)].into_iter().collect();
        let stored = StoredPostings::encode(&postings).unwrap();
        assert_eq!(stored.first, 2);
        assert_eq!(stored.freqs, vec![4, 1, 2]);
        assert_eq!(stored.decode().unwrap(), postings);
    }

    #[test]
    fn missing_postings_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let paths = IndexPaths::new(dir.path());
        assert!(load_postings_for_word(&paths, 7).unwrap().is_none());
        let postings: HashMap<DocId, u32> = [(1, 1)].into_iter().collect();
        save_postings_for_word(&paths, 7, &postings).unwrap();
        assert_eq!(load_postings_for_word(&paths, 7).unwrap(), Some(postings));
        reset_postings(&paths).unwrap();
        assert!(load_postings_for_word(&paths, 7).unwrap().is_none());
    }
}
