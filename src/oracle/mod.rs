//! Reasoning oracle: turns an error description into a diagnosis or a plan.

mod openai;

pub use openai::OpenAiOracle;

use crate::config::OracleConfig;
use crate::error::OracleError;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleRole {
    System,
    User,
    Assistant,
}

impl OracleRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleMessage {
    pub role: OracleRole,
    pub content: String,
}

impl OracleMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: OracleRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: OracleRole::User,
            content: content.into(),
        }
    }
}

pub type OracleFuture<'a> = Pin<Box<dyn Future<Output = Result<String, OracleError>> + Send + 'a>>;

/// One request, one text answer.
pub trait Oracle: Send + Sync {
    fn complete<'a>(&'a self, messages: &'a [OracleMessage]) -> OracleFuture<'a>;
}

pub fn create_oracle(config: &OracleConfig) -> Arc<dyn Oracle> {
    Arc::new(OpenAiOracle::from_config(config))
}
