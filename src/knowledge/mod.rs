//! Knowledge base consulted while diagnosing.

mod manuals;

pub use manuals::{ManualChunk, ManualsIndex};

use std::future::Future;
use std::pin::Pin;

pub type KnowledgeFuture<'a> = Pin<Box<dyn Future<Output = anyhow::Result<String>> + Send + 'a>>;

/// Free-text lookup returning context for a prompt. An empty string means
/// nothing relevant was found.
pub trait KnowledgeBase: Send + Sync {
    fn query<'a>(&'a self, text: &'a str) -> KnowledgeFuture<'a>;
}

/// Answer when the knowledge base has nothing on a question.
pub const NO_MATCH_ANSWER: &str = "No relevant documentation found.";

/// Message when no manuals are loaded.
pub const UNAVAILABLE_MESSAGE: &str =
    "Knowledge base is not available. Add .md or .txt manuals to the manuals directory.";

/// Answer an operator question from `knowledge`.
pub async fn answer(knowledge: &dyn KnowledgeBase, question: &str) -> anyhow::Result<String> {
    let context = knowledge.query(question.trim()).await?;
    if context.trim().is_empty() {
        Ok(NO_MATCH_ANSWER.to_string())
    } else {
        Ok(context)
    }
}
