use crate::agent::Agent;
use crate::context::ContextVariables;
use crate::error::Error;
use crate::traits::{ChatMessage, Role};
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Done,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    TurnLimit { max_turns: usize },
    Model(String),
}

/// Terminal snapshot of a run. Returned on success and on abort alike.
#[derive(Debug, Clone)]
pub struct Response {
    pub messages: Vec<ChatMessage>,
    pub agent: Arc<Agent>,
    pub context_variables: ContextVariables,
    pub status: RunStatus,
    pub abort_reason: Option<AbortReason>,
    pub turns: usize,
}

impl Response {
    pub fn is_done(&self) -> bool {
        self.status == RunStatus::Done
    }

    pub fn error(&self) -> Option<Error> {
        self.abort_reason.as_ref().map(|reason| match reason {
            AbortReason::TurnLimit { max_turns } => Error::LoopBoundExceeded {
                max_turns: *max_turns,
            },
            AbortReason::Model(message) => Error::Model(message.clone()),
        })
    }

    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Content of the final message, whatever its role.
    pub fn output(&self) -> &str {
        self.last_message().map(|m| m.content.as_str()).unwrap_or("")
    }

    pub fn transcript(&self) -> Transcript {
        Transcript::new(&self.messages)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    pub role: Role,
    pub content: String,
    pub sender: Option<String>,
}

/// The persisted form of a run's message sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub run_id: String,
    pub created_at: DateTime<Utc>,
    pub records: Vec<TranscriptRecord>,
}

impl Transcript {
    pub fn new(messages: &[ChatMessage]) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            records: messages
                .iter()
                .map(|m| TranscriptRecord {
                    role: m.role,
                    content: m.content.clone(),
                    sender: m.sender.clone(),
                })
                .collect(),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write transcript to {}", path.display()))
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read transcript from {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse transcript {}", path.display()))
    }
}
