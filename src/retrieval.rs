//! Paragraph-level lexical retrieval over the policy document corpus.
//!
//! Every document is split on blank lines into chunks whose ids are
//! `<stem>::chunk<i>`. Ranking is Okapi BM25 over a tokenizer shared by
//! indexing and querying.
use crate::error::{CopilotError, CopilotResult};
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of chunks returned by a search.
pub const DEFAULT_TOP_K: usize = 3;

const BM25_K1: f64 = 1.5;
const BM25_B: f64 = 0.75;
const DOCUMENT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// A paragraph of a source document, as indexed or as returned by a search.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentChunk {
    pub id: String,
    pub content: String,
    /// BM25 score; zero for chunks that have not been ranked.
    pub score: f64,
}

struct IndexedChunk {
    chunk: DocumentChunk,
    term_freqs: HashMap<String, u32>,
    len: usize,
}

/// Immutable BM25 index built once per corpus.
pub struct RetrievalIndex {
    root: Option<PathBuf>,
    chunks: Vec<IndexedChunk>,
    doc_freqs: HashMap<String, usize>,
    avg_len: f64,
}

impl RetrievalIndex {
    /// Build the index from every document file under `corpus_dir`.
    pub fn build(corpus_dir: &Path) -> CopilotResult<Self> {
        if !corpus_dir.is_dir() {
            return Err(CopilotError::CorpusNotFound {
                path: corpus_dir.to_path_buf(),
            });
        }
        let entries = fs::read_dir(corpus_dir).map_err(|_| CopilotError::CorpusNotFound {
            path: corpus_dir.to_path_buf(),
        })?;
        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && is_document(path))
            .collect();
        files.sort();

        let mut chunks = Vec::new();
        for path in &files {
            let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => stem.to_string(),
                None => continue,
            };
            let text = match fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(path = %path.display(), error = %err, "skipping unreadable document");
                    continue;
                }
            };
            for (idx, paragraph) in split_paragraphs(&text).into_iter().enumerate() {
                chunks.push(DocumentChunk {
                    id: format!("{stem}::chunk{idx}"),
                    content: paragraph,
                    score: 0.0,
                });
            }
        }

        let index = Self::from_chunks(Some(corpus_dir.to_path_buf()), chunks);
        if index.is_empty() {
            tracing::warn!(path = %corpus_dir.display(), "no documents were loaded");
        } else {
            tracing::info!(
                chunks = index.len(),
                documents = files.len(),
                path = %corpus_dir.display(),
                "retrieval index built"
            );
        }
        Ok(index)
    }

    /// Build the index, degrading to an empty one when the corpus is missing.
    pub fn build_or_empty(corpus_dir: &Path) -> Self {
        match Self::build(corpus_dir) {
            Ok(index) => index,
            Err(err) => {
                tracing::error!(error = %err, "retrieval disabled");
                Self::empty()
            }
        }
    }

    /// An index with no chunks; every search returns nothing.
    pub fn empty() -> Self {
        Self::from_chunks(None, Vec::new())
    }

    fn from_chunks(root: Option<PathBuf>, chunks: Vec<DocumentChunk>) -> Self {
        let mut doc_freqs: HashMap<String, usize> = HashMap::new();
        let mut total_len = 0usize;
        let indexed: Vec<IndexedChunk> = chunks
            .into_iter()
            .map(|chunk| {
                let tokens = tokenize(&chunk.content);
                let mut term_freqs: HashMap<String, u32> = HashMap::new();
                for token in &tokens {
                    *term_freqs.entry(token.clone()).or_insert(0) += 1;
                }
                for term in term_freqs.keys() {
                    *doc_freqs.entry(term.clone()).or_insert(0) += 1;
                }
                total_len += tokens.len();
                IndexedChunk {
                    chunk,
                    term_freqs,
                    len: tokens.len(),
                }
            })
            .collect();
        let avg_len = if indexed.is_empty() {
            0.0
        } else {
            total_len as f64 / indexed.len() as f64
        };
        Self {
            root,
            chunks: indexed,
            doc_freqs,
            avg_len,
        }
    }

    /// Corpus directory this index was built from, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Indexed chunks in build order.
    pub fn chunks(&self) -> impl Iterator<Item = &DocumentChunk> {
        self.chunks.iter().map(|indexed| &indexed.chunk)
    }

    /// Rank every chunk against `query` and return at most `top_k` hits with
    /// a positive score, best first. Equal scores keep build order.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<DocumentChunk> {
        if self.chunks.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(idx, indexed)| (idx, self.score(indexed, &terms)))
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(idx, score)| DocumentChunk {
                score,
                ..self.chunks[idx].chunk.clone()
            })
            .collect()
    }

    fn score(&self, indexed: &IndexedChunk, terms: &[String]) -> f64 {
        let n = self.chunks.len() as f64;
        let norm = if self.avg_len > 0.0 {
            indexed.len as f64 / self.avg_len
        } else {
            0.0
        };
        terms
            .iter()
            .filter_map(|term| {
                let tf = f64::from(*indexed.term_freqs.get(term)?);
                let df = *self.doc_freqs.get(term).unwrap_or(&0) as f64;
                let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
                Some(idf * tf * (BM25_K1 + 1.0) / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * norm)))
            })
            .sum()
    }
}

/// Lowercase, drop everything that is not alphanumeric or whitespace, and
/// split on whitespace.
pub fn tokenize(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Split a document into trimmed, non-empty paragraphs separated by blank lines.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            flush_paragraph(&mut current, &mut paragraphs);
        } else {
            current.push(line);
        }
    }
    flush_paragraph(&mut current, &mut paragraphs);
    paragraphs
}

fn flush_paragraph(current: &mut Vec<&str>, paragraphs: &mut Vec<String>) {
    if current.is_empty() {
        return;
    }
    let paragraph = current.join("\n").trim().to_string();
    current.clear();
    if !paragraph.is_empty() {
        paragraphs.push(paragraph);
    }
}

fn is_document(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with('.'));
    !hidden
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| DOCUMENT_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
