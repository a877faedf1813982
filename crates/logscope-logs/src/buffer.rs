use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Default number of lines kept in memory
pub const MAX_LINES: usize = 2000;

/// Bounded ring buffer of raw log lines, in arrival order.
///
/// Cloning yields another handle to the same storage: the stream driver
/// writes through one handle while the renderer reads through another.
#[derive(Clone)]
pub struct LogBuffer {
    /// Internal storage
    lines: Arc<RwLock<VecDeque<String>>>,

    /// Maximum capacity
    capacity: usize,

    /// Bumped on every mutation so readers can tell when cached views are stale
    revision: Arc<AtomicU64>,
}

impl LogBuffer {
    /// Create a new log buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            revision: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push a new line, evicting the oldest if at capacity
    pub fn append(&self, line: String) {
        let mut lines = self.lines.write();
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
        self.bump();
    }

    /// Swap the whole contents for `lines`, keeping only the newest `capacity`
    pub fn replace<I>(&self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut incoming: VecDeque<String> = lines.into_iter().collect();
        let excess = incoming.len().saturating_sub(self.capacity);
        incoming.drain(..excess);

        *self.lines.write() = incoming;
        self.bump();
    }

    /// Clear all lines
    pub fn clear(&self) {
        self.lines.write().clear();
        self.bump();
    }

    /// Snapshot of all lines (cloned for rendering)
    pub fn lines(&self) -> Vec<String> {
        self.lines.read().iter().cloned().collect()
    }

    /// Run `f` against the stored lines without copying them
    pub fn with_lines<R>(&self, f: impl FnOnce(&VecDeque<String>) -> R) -> R {
        f(&self.lines.read())
    }

    /// Total line count
    pub fn len(&self) -> usize {
        self.lines.read().len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.lines.read().is_empty()
    }

    /// Mutation counter
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Export all lines joined by newlines
    pub fn export_raw(&self) -> String {
        self.lines
            .read()
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn bump(&self) {
        self.revision.fetch_add(1, Ordering::AcqRel);
    }
}

impl Default for LogBuffer {
    fn default() -> Self {
        Self::new(MAX_LINES)
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .field("revision", &self.revision())
            .finish()
    }
}
