use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use log::Log;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

/// Keeps the most recent `capacity` lines, dropping the oldest
#[derive(Debug)]
pub struct ReportBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ReportBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 || line.is_empty() {
            return;
        }
        while self.lines.len() >= self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// The last `n` lines, oldest first
    pub fn tail(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Writes every record to the serial console and remembers the latest ones.
pub struct ReportLogger {
    pub buffer: Arc<Mutex<ReportBuffer>>,
    level: log::LevelFilter,
}

impl ReportLogger {
    pub fn new(capacity: usize, level: log::LevelFilter) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(ReportBuffer::new(capacity))),
            level,
        }
    }
}

impl Default for ReportLogger {
    fn default() -> Self {
        Self::new(200, log::LevelFilter::Info)
    }
}

impl Log for ReportLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        println!("[{}] {}", record.level(), record.args());

        let timestamp = OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default();
        if let Ok(mut buffer) = self.buffer.lock() {
            buffer.push(format!(
                "{} [{}:{}] {}",
                timestamp,
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}
