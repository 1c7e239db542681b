//! Dead-letter store - terminal failures kept for the admin view.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};

/// An envelope that exhausted its retry budget or failed permanently.
#[derive(Clone, Debug, Serialize)]
pub struct DeadLetter {
    #[serde(rename = "dedupeId")]
    pub dedupe_id: String,
    /// Flat-map wire form of the envelope as last delivered
    pub envelope: Map<String, Value>,
    /// Total attempts made before dead-lettering
    pub attempts: u32,
    pub reason: String,
    #[serde(rename = "failedAt")]
    pub failed_at: DateTime<Utc>,
}

/// In-memory dead-letter view, keyed by dedupe id.
#[derive(Default)]
pub struct DeadLetterStore {
    letters: DashMap<String, DeadLetter>,
}

impl DeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, letter: DeadLetter) {
        self.letters.insert(letter.dedupe_id.clone(), letter);
    }

    pub fn get(&self, dedupe_id: &str) -> Option<DeadLetter> {
        self.letters.get(dedupe_id).map(|l| l.clone())
    }

    /// All dead letters, oldest first.
    pub fn list(&self) -> Vec<DeadLetter> {
        let mut letters: Vec<DeadLetter> =
            self.letters.iter().map(|l| l.value().clone()).collect();
        letters.sort_by_key(|l| l.failed_at);
        letters
    }

    pub fn len(&self) -> usize {
        self.letters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.letters.is_empty()
    }
}
