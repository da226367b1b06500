//! Episodic memory: a durable log of past remediation attempts.
//!
//! Two read queries steer later runs: [`EpisodeStore::find_similar`] surfaces
//! a previous fix for a similar error (two shared words), and
//! [`EpisodeStore::failed_commands`] lists plans that already failed under a
//! related error (one shared word) so they are not proposed again.

pub mod episode;
pub mod store;

pub use episode::{Episode, keywords};
pub use store::{
    EPISODES_FILE, EpisodeStore, FAILED_MIN_OVERLAP, MemorySummary, SIMILAR_MIN_OVERLAP,
};

pub(crate) use store::write_atomic;
