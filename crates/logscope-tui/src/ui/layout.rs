use ratatui::layout::{Constraint, Direction, Layout as RatatuiLayout, Rect};

/// Areas of the log viewer screen
pub struct LogViewerAreas {
    pub header: Rect,
    pub tabs: Rect,
    pub filter: Option<Rect>,
    pub content: Rect,
    pub status: Rect,
}

/// Layout helper for consistent screen layouts
pub struct Layout;

impl Layout {
    /// Create the main layout with header, content, and status bar
    pub fn main(area: Rect) -> (Rect, Rect, Rect) {
        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3), // Header
                Constraint::Min(1),    // Content
                Constraint::Length(1), // Status bar
            ])
            .split(area);

        (chunks[0], chunks[1], chunks[2])
    }

    /// Split the log viewer body into level tabs, optional filter bar and log pane
    pub fn log_viewer(area: Rect, show_filter: bool) -> LogViewerAreas {
        let (header, body, status) = Self::main(area);

        let filter_height = if show_filter { 1 } else { 0 };
        let chunks = RatatuiLayout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),             // Level tabs
                Constraint::Length(filter_height), // Filter bar
                Constraint::Min(1),                // Logs
            ])
            .split(body);

        LogViewerAreas {
            header,
            tabs: chunks[0],
            filter: show_filter.then_some(chunks[1]),
            content: chunks[2],
            status,
        }
    }

    /// Centered popup no larger than the given size
    pub fn popup(area: Rect, width: u16, height: u16) -> Rect {
        let width = width.min(area.width.saturating_sub(4));
        let height = height.min(area.height.saturating_sub(4));
        let x = area.x + area.width.saturating_sub(width) / 2;
        let y = area.y + area.height.saturating_sub(height) / 2;
        Rect::new(x, y, width, height)
    }
}
