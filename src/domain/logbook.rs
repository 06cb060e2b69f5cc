//! Bounded, user-facing activity log.

use std::collections::VecDeque;

use chrono::{DateTime, Local, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Info,
    Success,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Strictly increasing per log.
    pub id: u64,
    pub at: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
}

impl LogEntry {
    /// Local wall time, `HH:MM:SS`.
    pub fn time_label(&self) -> String {
        self.at.with_timezone(&Local).format("%H:%M:%S").to_string()
    }
}

/// Ring buffer keeping the most recent `capacity` entries.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    next_id: u64,
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    pub fn push(&mut self, at: DateTime<Utc>, kind: LogKind, message: impl Into<String>) {
        self.next_id += 1;
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(LogEntry {
            id: self.next_id,
            at,
            kind,
            message: message.into(),
        });
    }

    pub fn newest_first(&self) -> Vec<LogEntry> {
        self.entries.iter().rev().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
