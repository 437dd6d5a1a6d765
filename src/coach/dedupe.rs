//! Coach narration deduplication
//!
//! Messages are compared by a semantic signature: setup id, type, priority,
//! structured reason and the content with numbers masked. Two messages with
//! the same signature inside [`DEDUPE_WINDOW_MS`] collapse to the newer one.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::debug;

use super::types::CoachMessage;

/// Contract value: identical narration is collapsed inside 8 minutes
pub const DEDUPE_WINDOW_MS: i64 = 8 * 60 * 1000;

const REASON_KEYS: [&str; 3] = ["reasonCode", "reason", "trigger"];

/// Lowercase, collapse whitespace and mask numeric tokens
pub fn normalize_content(content: &str) -> String {
    let mut out = String::with_capacity(content.len());
    let mut in_number = false;
    let mut pending_space = false;

    for ch in content.chars() {
        let numeric = ch.is_ascii_digit() || (in_number && (ch == '.' || ch == ','));
        if numeric {
            if !in_number {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                out.push('#');
                in_number = true;
            }
            continue;
        }
        in_number = false;
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space && !out.is_empty() {
            out.push(' ');
        }
        pending_space = false;
        out.extend(ch.to_lowercase());
    }
    out
}

/// Semantic identity of a message
pub fn message_signature(message: &CoachMessage) -> String {
    let reason = REASON_KEYS
        .iter()
        .find_map(|key| message.structured_str(key))
        .unwrap_or("");
    format!(
        "{}|{}|{}|{}|{}",
        message.setup_id.as_deref().unwrap_or("-"),
        message.message_type.as_str(),
        message.priority.as_str(),
        reason.to_lowercase(),
        normalize_content(&message.content)
    )
}

fn within(newer: DateTime<Utc>, older: DateTime<Utc>, window_ms: i64) -> bool {
    (newer - older).num_milliseconds().abs() < window_ms
}

/// Collapse repeated narration, newest first
///
/// Walks from newest to oldest and drops a message when its signature was
/// kept within the window. The window is measured against the last kept
/// occurrence, so an oscillation longer than the window is narrated again.
pub fn dedupe_coach_messages_for_timeline(
    messages: &[CoachMessage],
    window_ms: i64,
) -> Vec<CoachMessage> {
    let mut ordered: Vec<&CoachMessage> = messages.iter().collect();
    ordered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    let mut last_kept: HashMap<String, DateTime<Utc>> = HashMap::new();
    let mut kept = Vec::with_capacity(ordered.len());

    for message in ordered {
        let signature = message_signature(message);
        match last_kept.get(&signature) {
            Some(at) if within(*at, message.timestamp, window_ms) => continue,
            _ => {
                last_kept.insert(signature, message.timestamp);
                kept.push(message.clone());
            }
        }
    }
    kept
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineStats {
    pub checked: u64,
    pub suppressed: u64,
    pub accepted: u64,
}

/// Newest-first coach timeline that dedupes at ingestion
///
/// A duplicate inside the window supersedes the earlier entry rather than
/// being dropped, so the timeline keeps the newest occurrence.
#[derive(Debug)]
pub struct CoachTimeline {
    entries: VecDeque<(String, CoachMessage)>,
    window_ms: i64,
    capacity: usize,
    stats: TimelineStats,
}

impl CoachTimeline {
    pub fn new(window_ms: i64, capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            window_ms,
            capacity: capacity.max(1),
            stats: TimelineStats::default(),
        }
    }

    /// Returns true when the message was new, false when it matched a duplicate
    ///
    /// A duplicate at least as recent as the stored copy replaces it; an
    /// older one is dropped.
    pub fn ingest(&mut self, message: CoachMessage) -> bool {
        self.stats.checked += 1;
        let signature = message_signature(&message);

        let duplicate = self.entries.iter().position(|(sig, existing)| {
            *sig == signature && within(message.timestamp, existing.timestamp, self.window_ms)
        });

        let accepted = match duplicate {
            Some(idx) if self.entries[idx].1.timestamp > message.timestamp => {
                self.stats.suppressed += 1;
                debug!(message_id = %message.id, "Dropped coach message older than its duplicate");
                return false;
            }
            Some(idx) => {
                self.entries.remove(idx);
                self.stats.suppressed += 1;
                debug!(message_id = %message.id, "Coach message superseded a duplicate");
                false
            }
            None => {
                self.stats.accepted += 1;
                true
            }
        };

        let position = self
            .entries
            .iter()
            .position(|(_, existing)| existing.timestamp <= message.timestamp)
            .unwrap_or(self.entries.len());
        self.entries.insert(position, (signature, message));
        self.entries.truncate(self.capacity);
        accepted
    }

    pub fn messages(&self) -> impl Iterator<Item = &CoachMessage> {
        self.entries.iter().map(|(_, message)| message)
    }

    /// Messages for one setup, plus unscoped ones
    pub fn scoped<'a>(&'a self, setup_id: Option<&'a str>) -> impl Iterator<Item = &'a CoachMessage> {
        self.messages().filter(move |message| match (setup_id, message.setup_id.as_deref()) {
            (Some(scope), Some(id)) => scope == id,
            _ => true,
        })
    }

    pub fn latest(&self) -> Option<&CoachMessage> {
        self.entries.front().map(|(_, message)| message)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TimelineStats {
        self.stats
    }
}
