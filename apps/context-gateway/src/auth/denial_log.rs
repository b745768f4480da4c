//! Bounded audit log of rejected connection attempts.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use utoipa::ToSchema;

/// Maximum retained entries; the oldest is evicted first.
const MAX_ENTRIES: usize = 1000;

/// A single rejected connection attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DenialEntry {
    pub timestamp: DateTime<Utc>,
    pub connection_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Redacted token; never the full credential.
    pub token_fragment: String,
    pub reason: String,
    pub source_addr: String,
}

/// Ring buffer of recent denials, shared by the gate and the admin routes.
pub struct DenialLog {
    entries: Mutex<VecDeque<DenialEntry>>,
}

impl DenialLog {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record(
        &self,
        connection_id: &str,
        project_id: Option<&str>,
        token: Option<&str>,
        reason: &str,
        source_addr: &str,
    ) {
        let entry = DenialEntry {
            timestamp: Utc::now(),
            connection_id: connection_id.to_string(),
            project_id: project_id.map(str::to_string),
            token_fragment: truncate_token(token.unwrap_or("")),
            reason: reason.to_string(),
            source_addr: source_addr.to_string(),
        };

        tracing::warn!(
            connection_id,
            reason,
            source_addr,
            token = %entry.token_fragment,
            "connection denied"
        );

        let mut entries = self.entries.lock();
        if entries.len() == MAX_ENTRIES {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<DenialEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Redact a token for logging: the first 10 and last 5 characters. Tokens of
/// 15 characters or fewer cannot be safely truncated and log as `***`.
pub fn truncate_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 15 {
        return "***".to_string();
    }
    let head: String = chars[..10].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}
