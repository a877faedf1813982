//! Shared types for logscope
//!
//! This crate contains data structures used across multiple logscope crates.

use ratatui::style::Color;
use serde::{Deserialize, Serialize};

// ============================================================================
// Connection Types
// ============================================================================

/// Lifecycle status of the streaming connection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

/// Where the log view gets its lines from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Mode {
    /// Live push stream over the duplex connection
    #[default]
    Streaming,
    /// Periodic full-snapshot fetches
    Polling,
}

/// Read-only projection of the stream client, published to the UI
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamState {
    pub status: ConnectionStatus,
    pub mode: Mode,
    /// Reconnect attempts since the last successful open
    pub attempts: u32,
    /// Last `error`/`info` message pushed by the server
    pub notice: Option<String>,
    /// A polling fetch is in flight
    pub loading: bool,
}

impl StreamState {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Connectivity badge shown in the header
    pub fn badge(&self) -> &'static str {
        if self.mode == Mode::Polling {
            return "Polling";
        }
        match self.status {
            ConnectionStatus::Connected => "Live",
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Disconnected | ConnectionStatus::Error => "Disconnected",
        }
    }

    /// Badge color
    pub fn badge_color(&self) -> Color {
        if self.mode == Mode::Polling {
            return Color::Yellow;
        }
        match self.status {
            ConnectionStatus::Connected => Color::Green,
            ConnectionStatus::Connecting => Color::Cyan,
            ConnectionStatus::Disconnected => Color::DarkGray,
            ConnectionStatus::Error => Color::Red,
        }
    }
}

// ============================================================================
// Wire Types
// ============================================================================

/// A frame pushed by the log stream endpoint, discriminated by its `type` field
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamMessage {
    Log {
        line: String,
    },
    Error {
        message: String,
    },
    Info {
        message: String,
    },
    /// Initial replay finished
    InitComplete {
        #[serde(default)]
        count: Option<usize>,
    },
}

impl StreamMessage {
    /// Parse a text frame
    pub fn parse(frame: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(frame)
    }
}

/// Response body of the recent-logs endpoint
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogsSnapshot {
    pub logs: Vec<String>,
    pub total: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// ============================================================================
// Log Types
// ============================================================================

/// Log line severity
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Severity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Error, Self::Warn, Self::Info, Self::Debug];

    /// Get display color for this level
    pub fn color(&self) -> Color {
        match self {
            Self::Error => Color::Red,
            Self::Warn => Color::Yellow,
            Self::Info => Color::Green,
            Self::Debug => Color::Cyan,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Error => "Error",
            Self::Warn => "Warn",
            Self::Info => "Info",
            Self::Debug => "Debug",
        }
    }
}

/// Level tab selection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum LevelFilter {
    #[default]
    All,
    Only(Severity),
}

impl LevelFilter {
    pub fn allows(&self, severity: Severity) -> bool {
        match self {
            Self::All => true,
            Self::Only(level) => *level == severity,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Only(level) => level.label(),
        }
    }

    /// Cycle to the next tab
    pub fn next(&self) -> Self {
        match self {
            Self::All => Self::Only(Severity::Error),
            Self::Only(Severity::Error) => Self::Only(Severity::Warn),
            Self::Only(Severity::Warn) => Self::Only(Severity::Info),
            Self::Only(Severity::Info) => Self::Only(Severity::Debug),
            Self::Only(Severity::Debug) => Self::All,
        }
    }

    /// Cycle to the previous tab
    pub fn prev(&self) -> Self {
        match self {
            Self::All => Self::Only(Severity::Debug),
            Self::Only(Severity::Error) => Self::All,
            Self::Only(Severity::Warn) => Self::Only(Severity::Error),
            Self::Only(Severity::Info) => Self::Only(Severity::Warn),
            Self::Only(Severity::Debug) => Self::Only(Severity::Info),
        }
    }
}
