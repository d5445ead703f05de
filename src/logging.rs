use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Default maximum number of agent log lines to keep in memory
pub const DEFAULT_MAX_LOG_LINES: usize = 10000;

const DEFAULT_FILTER: &str = "syncdesk_lib=info";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

/// Installs the fmt subscriber. `RUST_LOG` wins over `filter`.
pub fn init_tracing(filter: Option<&str>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

/// One line of the agent's log stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub timestamp: Option<String>,
    pub level: String,
    pub logger: Option<String>,
    pub message: String,
}

impl LogEntry {
    /// Parses `<timestamp>\t<LEVEL>\t<logger>\t<message>` lines; anything
    /// else is kept whole as an `info` message. Colour escapes are dropped.
    pub fn parse(id: u64, raw: &str) -> Self {
        let clean = strip_ansi(raw);
        let line = clean.trim_end_matches(['\r', '\n']);
        let parts: Vec<&str> = line.splitn(4, '\t').collect();

        if parts.len() >= 3 {
            if let Some(level) = parse_level(parts[1]) {
                let (logger, message) = match parts.as_slice() {
                    [_, _, logger, message] => (Some(logger.trim().to_string()), message.trim()),
                    [_, _, message] => (None, message.trim()),
                    _ => (None, ""),
                };
                return Self {
                    id,
                    timestamp: Some(parts[0].trim().to_string()),
                    level: level.to_string(),
                    logger,
                    message: message.to_string(),
                };
            }
        }

        Self {
            id,
            timestamp: None,
            level: "info".to_string(),
            logger: None,
            message: line.to_string(),
        }
    }
}

pub fn strip_ansi(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").into_owned()
}

fn parse_level(token: &str) -> Option<&'static str> {
    match token.trim().to_ascii_lowercase().as_str() {
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" | "warning" => Some("warn"),
        "error" | "dpanic" | "panic" | "fatal" => Some("error"),
        _ => None,
    }
}

/// Bounded buffer of agent log lines, shared between the `/logs` channel and
/// its readers.
pub struct LogManager {
    lines: Mutex<VecDeque<LogEntry>>,
    next_id: AtomicU64,
    max_lines: usize,
}

impl LogManager {
    pub fn new(max_lines: usize) -> Self {
        Self {
            lines: Mutex::new(VecDeque::with_capacity(max_lines.min(1024))),
            next_id: AtomicU64::new(0),
            max_lines,
        }
    }

    fn lock_lines(&self) -> MutexGuard<'_, VecDeque<LogEntry>> {
        self.lines.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push_line(&self, raw: &str) -> LogEntry {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let entry = LogEntry::parse(id, raw);

        let mut lines = self.lock_lines();
        lines.push_back(entry.clone());
        while lines.len() > self.max_lines {
            lines.pop_front();
        }
        entry
    }

    pub fn len(&self) -> usize {
        self.lock_lines().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock_lines().clear();
    }

    pub fn get_logs(&self, logger: Option<&str>) -> Vec<LogEntry> {
        let lines = self.lock_lines();
        match logger {
            Some(name) => lines
                .iter()
                .filter(|l| l.logger.as_deref() == Some(name))
                .cloned()
                .collect(),
            None => lines.iter().cloned().collect(),
        }
    }

    /// Entries with an id greater than `after`, for incremental readers.
    pub fn get_logs_since(&self, after: u64) -> Vec<LogEntry> {
        self.lock_lines()
            .iter()
            .filter(|l| l.id > after)
            .cloned()
            .collect()
    }

    pub fn get_logs_paginated(&self, logger: Option<&str>, offset: usize, limit: usize) -> Vec<LogEntry> {
        let lines = self.lock_lines();
        lines
            .iter()
            .filter(|l| logger.is_none() || l.logger.as_deref() == logger)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect()
    }
}
