use super::episode::{Episode, keywords, overlap};
use crate::error::MemoryError;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

pub const EPISODES_FILE: &str = "episodes.json";

/// Minimum shared error words before a past episode is offered as a known fix.
pub const SIMILAR_MIN_OVERLAP: usize = 2;
/// Minimum shared error words before a failed command is excluded from planning.
pub const FAILED_MIN_OVERLAP: usize = 1;

/// Aggregate counts over the whole episode log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemorySummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

impl std::fmt::Display for MemorySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total: {} episodes, {} successful, {} failed",
            self.total, self.successes, self.failures
        )
    }
}

/// Append-only episode log persisted as a JSON array.
///
/// Every append rewrites the whole file through a synced temp file and a
/// rename, so the file on disk is always either the previous or the new
/// collection.
pub struct EpisodeStore {
    path: PathBuf,
    episodes: RwLock<Vec<Episode>>,
}

impl EpisodeStore {
    /// Open (or create) the store under `dir`.
    pub fn open(dir: &Path) -> Result<Self, MemoryError> {
        let path = dir.join(EPISODES_FILE);
        fs::create_dir_all(dir).map_err(|e| MemoryError::Load {
            path: dir.display().to_string(),
            message: e.to_string(),
        })?;

        let episodes = if path.exists() {
            let raw = fs::read_to_string(&path).map_err(|e| MemoryError::Load {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| MemoryError::Load {
                    path: path.display().to_string(),
                    message: e.to_string(),
                })?
            }
        } else {
            Vec::new()
        };

        tracing::debug!(
            path = %path.display(),
            count = episodes.len(),
            "episode store opened"
        );

        Ok(Self {
            path,
            episodes: RwLock::new(episodes),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one episode and persist the full collection.
    ///
    /// The episode stays in the in-process log even when persisting fails;
    /// the error is returned so the caller can log it.
    pub fn save_episode(
        &self,
        error: &str,
        diagnosis: &str,
        command: &str,
        result: &str,
        success: bool,
    ) -> Result<(), MemoryError> {
        self.append(Episode::new(error, diagnosis, command, result, success))
    }

    pub fn append(&self, episode: Episode) -> Result<(), MemoryError> {
        let mut episodes = self
            .episodes
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let success = episode.success;
        episodes.push(episode);

        let serialized =
            serde_json::to_string_pretty(&*episodes).map_err(|e| MemoryError::Persist {
                path: self.path.display().to_string(),
                message: e.to_string(),
            })?;
        write_atomic(&self.path, &serialized).map_err(|e| MemoryError::Persist {
            path: self.path.display().to_string(),
            message: e.to_string(),
        })?;

        tracing::info!(
            success,
            total = episodes.len(),
            "episode recorded"
        );
        Ok(())
    }

    /// Best past episode by error-word overlap, if it shares at least
    /// [`SIMILAR_MIN_OVERLAP`] words with `error`.
    ///
    /// Traversal is most-recent-first with a strict comparison, so ties go to
    /// the most recent episode. Success is not filtered here.
    pub fn find_similar(&self, error: &str) -> Option<Episode> {
        let query = keywords(error);
        let episodes = self.episodes.read().unwrap_or_else(PoisonError::into_inner);

        let mut best: Option<&Episode> = None;
        let mut best_score = 0;
        for episode in episodes.iter().rev() {
            let score = overlap(&query, &episode.error_keywords());
            if score > best_score {
                best_score = score;
                best = Some(episode);
            }
        }

        best.filter(|_| best_score >= SIMILAR_MIN_OVERLAP).cloned()
    }

    /// Distinct plans that failed under errors sharing at least
    /// [`FAILED_MIN_OVERLAP`] words with `error`.
    pub fn failed_commands(&self, error: &str) -> BTreeSet<String> {
        let query = keywords(error);
        let episodes = self.episodes.read().unwrap_or_else(PoisonError::into_inner);

        episodes
            .iter()
            .filter(|episode| !episode.success)
            .filter(|episode| overlap(&query, &episode.error_keywords()) >= FAILED_MIN_OVERLAP)
            .map(|episode| episode.command.trim().to_string())
            .filter(|command| !command.is_empty())
            .collect()
    }

    pub fn episodes(&self) -> Vec<Episode> {
        self.episodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.episodes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn summary(&self) -> MemorySummary {
        let episodes = self.episodes.read().unwrap_or_else(PoisonError::into_inner);
        let successes = episodes.iter().filter(|episode| episode.success).count();
        MemorySummary {
            total: episodes.len(),
            successes,
            failures: episodes.len() - successes,
        }
    }
}

/// Write `content` to `path` via a synced sibling temp file and a rename.
pub(crate) fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("tmp");
    let written = (|| {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()
    })();
    if let Err(write_error) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(write_error);
    }

    if let Err(rename_error) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(rename_error);
    }

    Ok(())
}
