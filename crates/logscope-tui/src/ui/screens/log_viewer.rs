use std::borrow::Cow;

use ratatui::{
    Frame,
    layout::{Margin, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use logscope_logs::{LogBuffer, LogFilter, classify};

use crate::app::AppState;
use crate::ui::{
    Layout, Theme,
    components::{LevelTabs, StatusBar, filter_input_hints, log_viewer_hints},
};

/// Log viewer screen
pub struct LogViewerScreen;

/// Truncate to a display width, marking the cut with "..."
fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if s.width() <= max_width {
        return Cow::Borrowed(s);
    }

    let budget = max_width.saturating_sub(3);
    let mut width = 0;
    let mut end = 0;
    for (i, c) in s.char_indices() {
        let w = c.width().unwrap_or(0);
        if width + w > budget {
            break;
        }
        width += w;
        end = i + c.len_utf8();
    }
    Cow::Owned(format!("{}...", &s[..end]))
}

impl LogViewerScreen {
    pub fn render(frame: &mut Frame, state: &mut AppState, log_buffer: &LogBuffer) {
        let filter = state.filter();
        state.ui_state.filter_cache.refresh(log_buffer, &filter);

        let show_filter_bar =
            state.ui_state.search_active || !state.ui_state.active_query.is_empty();
        let areas = Layout::log_viewer(frame.area(), show_filter_bar);

        Self::render_header(frame, areas.header, state);

        frame.render_widget(
            LevelTabs::new(
                state.ui_state.level_filter,
                &state.ui_state.filter_cache.counts,
            ),
            areas.tabs,
        );

        if let Some(filter_area) = areas.filter {
            Self::render_filter_bar(frame, filter_area, state);
        }

        Self::render_logs(frame, areas.content, state, log_buffer, &filter);
        Self::render_status_bar(frame, areas.status, state);
    }

    fn render_header(frame: &mut Frame, area: Rect, state: &AppState) {
        let stream = &state.stream;

        let mut spans = vec![
            Span::styled("logscope", Theme::title()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(state.server.as_str(), Theme::text()),
            Span::styled(" │ ", Theme::text_dim()),
            Span::styled(
                format!("● {}", stream.badge()),
                Theme::badge(stream.badge_color()),
            ),
        ];

        if stream.attempts > 0 && !stream.is_connected() {
            spans.push(Span::styled(
                format!(" (retry {})", stream.attempts),
                Theme::text_dim(),
            ));
        }
        if stream.loading {
            spans.push(Span::styled(" ⟳", Theme::text_highlight()));
        }
        if let Some(notice) = &stream.notice {
            spans.push(Span::styled(" │ ", Theme::text_dim()));
            spans.push(Span::styled(notice.as_str(), Theme::text_dim()));
        }

        let header = Paragraph::new(Line::from(spans)).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Theme::border()),
        );

        frame.render_widget(header, area);
    }

    fn render_filter_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        let mut spans = vec![];

        if state.ui_state.search_active {
            spans.push(Span::styled(
                " /",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD),
            ));
            spans.push(Span::styled(
                state.ui_state.search_input.clone(),
                Theme::text_highlight(),
            ));
            spans.push(Span::styled(
                "█",
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::SLOW_BLINK),
            ));
        } else {
            spans.push(Span::styled(" Filter: ", Theme::text_dim()));
            spans.push(Span::styled(
                state.ui_state.active_query.clone(),
                Theme::text_highlight(),
            ));
            spans.push(Span::styled("  [n] Clear  [/] Edit", Theme::text_dim()));
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    fn render_logs(
        frame: &mut Frame,
        area: Rect,
        state: &mut AppState,
        log_buffer: &LogBuffer,
        filter: &LogFilter,
    ) {
        let total_logs = state.ui_state.filter_cache.entries.len();

        // Calculate visible area (accounting for border)
        let inner_height = area.height.saturating_sub(2) as usize;

        // Auto-scroll: if at bottom, stay at bottom
        if state.ui_state.auto_scroll && total_logs > 0 {
            state.ui_state.log_scroll = total_logs.saturating_sub(inner_height);
        }

        // Clamp scroll position
        let max_scroll = total_logs.saturating_sub(inner_height);
        if state.ui_state.log_scroll > max_scroll {
            state.ui_state.log_scroll = max_scroll;
        }

        // 2 for borders, 2 for scrollbar
        let inner_width = area.width.saturating_sub(4) as usize;

        let lines: Vec<Line> = if total_logs == 0 {
            vec![Self::placeholder(state, log_buffer)]
        } else {
            state
                .ui_state
                .filter_cache
                .entries
                .iter()
                .skip(state.ui_state.log_scroll)
                .take(inner_height)
                .map(|entry| Self::format_log_line(entry, filter, inner_width))
                .collect()
        };

        let title = if filter.is_empty() {
            format!(" Logs ({}) ", total_logs)
        } else {
            format!(" Logs ({} matching) ", total_logs)
        };

        let logs_widget = Paragraph::new(lines).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(if state.ui_state.search_active {
                    Theme::border_focused()
                } else {
                    Theme::border()
                })
                .title(Span::styled(title, Theme::title())),
        );

        frame.render_widget(logs_widget, area);

        if total_logs > inner_height {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("▲"))
                .end_symbol(Some("▼"));

            let mut scrollbar_state = ScrollbarState::default()
                .content_length(max_scroll)
                .position(state.ui_state.log_scroll.min(max_scroll));

            frame.render_stateful_widget(
                scrollbar,
                area.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar_state,
            );
        }
    }

    fn placeholder(state: &AppState, log_buffer: &LogBuffer) -> Line<'static> {
        let text = if !log_buffer.is_empty() {
            " No lines match the current filter"
        } else if state.stream.loading {
            " Fetching recent logs..."
        } else if state.stream.is_connected() {
            " Waiting for log lines..."
        } else {
            " No logs yet"
        };
        Line::from(Span::styled(text, Theme::text_dim()))
    }

    /// Color by severity, then overlay query hits
    fn format_log_line(entry: &str, filter: &LogFilter, available_width: usize) -> Line<'static> {
        let base_style = Theme::log_line(classify(entry));
        let display_msg = truncate_to_width(entry, available_width);

        let matches = filter.find_matches(&display_msg);
        if matches.is_empty() {
            return Line::from(Span::styled(display_msg.into_owned(), base_style));
        }

        let mut spans = Vec::with_capacity(matches.len() * 2 + 1);
        let mut last_end = 0;
        for (start, end) in matches {
            if start > last_end {
                spans.push(Span::styled(
                    display_msg[last_end..start].to_string(),
                    base_style,
                ));
            }
            spans.push(Span::styled(
                display_msg[start..end].to_string(),
                Theme::search_match(),
            ));
            last_end = end;
        }
        if last_end < display_msg.len() {
            spans.push(Span::styled(
                display_msg[last_end..].to_string(),
                base_style,
            ));
        }
        Line::from(spans)
    }

    fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState) {
        if let Some(error) = &state.ui_state.error_message {
            let line = Line::from(vec![
                Span::styled(format!(" {}", error), Theme::error()),
                Span::styled("  [Esc] Dismiss", Theme::text_dim()),
            ]);
            frame.render_widget(Paragraph::new(line).style(Theme::status_bar()), area);
            return;
        }

        let hints = if state.ui_state.search_active {
            filter_input_hints()
        } else {
            log_viewer_hints(state.shows_stream_controls())
        };

        let right = match &state.ui_state.status_message {
            Some(message) => message.clone(),
            None => format!(
                "{} lines {}",
                state.ui_state.filter_cache.counts.total(),
                if state.ui_state.auto_scroll { "▼" } else { " " }
            ),
        };

        frame.render_widget(StatusBar::new().hints(hints).right(right), area);
    }
}
