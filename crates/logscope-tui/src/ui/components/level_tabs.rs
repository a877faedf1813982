use ratatui::{
    buffer::Buffer,
    layout::Rect,
    text::{Line, Span},
    widgets::Widget,
};

use logscope_logs::LevelCounts;
use logscope_types::{LevelFilter, Severity};

use crate::ui::Theme;

/// Row of level tabs, each labelled with its line count
pub struct LevelTabs<'a> {
    selected: LevelFilter,
    counts: &'a LevelCounts,
}

impl<'a> LevelTabs<'a> {
    pub fn new(selected: LevelFilter, counts: &'a LevelCounts) -> Self {
        Self { selected, counts }
    }

    fn tabs() -> impl Iterator<Item = LevelFilter> {
        std::iter::once(LevelFilter::All).chain(Severity::ALL.into_iter().map(LevelFilter::Only))
    }

    fn line(&self) -> Line<'static> {
        let mut spans = Vec::new();
        for tab in Self::tabs() {
            let label = format!(" {} ({}) ", tab.label(), self.counts.for_filter(tab));
            let style = if tab == self.selected {
                Theme::tab_selected()
            } else {
                match tab {
                    LevelFilter::All => Theme::tab(),
                    LevelFilter::Only(severity) => Theme::log_line(severity),
                }
            };
            spans.push(Span::styled(label, style));
            spans.push(Span::raw(" "));
        }
        Line::from(spans)
    }
}

impl Widget for LevelTabs<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        buf.set_line(area.x + 1, area.y, &self.line(), area.width.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tabs_show_counts() {
        let counts = LevelCounts {
            error: 2,
            warn: 1,
            info: 4,
            debug: 0,
        };
        let text = LevelTabs::new(LevelFilter::All, &counts).line().to_string();
        assert!(text.contains("All (7)"));
        assert!(text.contains("Error (2)"));
        assert!(text.contains("Debug (0)"));
    }
}
