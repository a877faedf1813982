mod help_overlay;
mod level_tabs;
mod status_bar;

pub use help_overlay::HelpOverlay;
pub use level_tabs::LevelTabs;
pub use status_bar::{StatusBar, filter_input_hints, log_viewer_hints};
