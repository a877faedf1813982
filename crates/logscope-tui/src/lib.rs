//! TUI components for logscope
//!
//! This crate provides the terminal user interface for logscope,
//! including state management, keybindings, event handling, and the
//! log viewer screen.

pub mod app;
pub mod config;
pub mod tui;
pub mod ui;

pub use app::{Action, AppState, FilterCache, UiState};
pub use config::{KeyBinding, KeyBindings, KeyContext};
pub use tui::{Event, EventHandler, Tui};
pub use ui::components::{HelpOverlay, LevelTabs, StatusBar};
pub use ui::screens::LogViewerScreen;
pub use ui::{Layout, Theme};
