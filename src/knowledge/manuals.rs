use super::{KnowledgeBase, KnowledgeFuture};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Chunks returned per query.
const DEFAULT_TOP_K: usize = 3;
/// Query words shorter than this are ignored when scoring.
const MIN_TERM_CHARS: usize = 3;
const CHUNK_SEPARATOR: &str = "\n\n---\n\n";

/// One paragraph of a manual file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualChunk {
    pub source: String,
    pub text: String,
}

/// In-memory keyword index over the `.md` / `.txt` files of one directory.
#[derive(Debug, Default)]
pub struct ManualsIndex {
    chunks: Vec<ManualChunk>,
    top_k: usize,
}

impl ManualsIndex {
    pub fn from_chunks(chunks: Vec<ManualChunk>) -> Self {
        Self {
            chunks,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Read every manual in `dir`. A missing directory yields an empty index.
    pub async fn load(dir: &Path) -> anyhow::Result<Self> {
        if !dir.exists() {
            tracing::debug!(dir = %dir.display(), "manuals directory missing, knowledge base empty");
            return Ok(Self::from_chunks(Vec::new()));
        }

        let mut files: Vec<PathBuf> = Vec::new();
        let mut entries = fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_manual = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("md" | "txt")
            );
            if is_manual && path.is_file() {
                files.push(path);
            }
        }
        files.sort();

        let mut chunks = Vec::new();
        for path in &files {
            let content = fs::read_to_string(path).await?;
            let source = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("unknown")
                .to_string();
            chunks.extend(split_paragraphs(&source, &content));
        }

        tracing::info!(files = files.len(), chunks = chunks.len(), "manuals indexed");
        Ok(Self::from_chunks(chunks))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Best chunks for `query`, highest score first, ties in file order.
    pub fn search(&self, query: &str) -> Vec<&ManualChunk> {
        let query_lower = query.to_lowercase();
        let terms: Vec<&str> = query_lower
            .split(|c: char| !c.is_alphanumeric() && c != '-' && c != '_')
            .filter(|t| t.chars().count() >= MIN_TERM_CHARS)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, usize, &ManualChunk)> = self
            .chunks
            .iter()
            .enumerate()
            .filter_map(|(position, chunk)| {
                let text_lower = chunk.text.to_lowercase();
                let matched = terms.iter().filter(|t| text_lower.contains(**t)).count();
                (matched > 0).then_some((matched, position, chunk))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
        scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, _, chunk)| chunk)
            .collect()
    }

    /// Top chunks joined by separators, followed by a list of their sources.
    pub fn render(&self, query: &str) -> String {
        let hits = self.search(query);
        if hits.is_empty() {
            return String::new();
        }

        let body = hits
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join(CHUNK_SEPARATOR);

        let mut sources: Vec<&str> = Vec::new();
        for hit in &hits {
            if !sources.contains(&hit.source.as_str()) {
                sources.push(&hit.source);
            }
        }

        format!("{body}\n\nSources:\n- {}", sources.join("\n- "))
    }
}

impl KnowledgeBase for ManualsIndex {
    fn query<'a>(&'a self, text: &'a str) -> KnowledgeFuture<'a> {
        Box::pin(async move { Ok(self.render(text)) })
    }
}

fn split_paragraphs(source: &str, content: &str) -> Vec<ManualChunk> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    let mut flush = |current: &mut Vec<&str>| {
        if !current.is_empty() {
            chunks.push(ManualChunk {
                source: source.to_string(),
                text: current.join("\n"),
            });
            current.clear();
        }
    };

    for line in content.lines() {
        if line.trim().is_empty() {
            flush(&mut current);
        } else {
            current.push(line.trim_end());
        }
    }
    flush(&mut current);
    chunks
}
