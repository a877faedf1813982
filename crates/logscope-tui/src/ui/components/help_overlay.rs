use ratatui::{
    Frame,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use crate::ui::Layout;

/// Help overlay showing keybindings
pub struct HelpOverlay;

impl HelpOverlay {
    pub fn render(frame: &mut Frame, streaming: bool) {
        let popup_area = Layout::popup(frame.area(), 50, 28);

        // Clear the background
        frame.render_widget(Clear, popup_area);

        let mut help_text = vec![
            Line::from(Span::styled(
                "Keybindings",
                Style::default().add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Self::section("Navigation"),
            Self::key_line("j/↓", "Scroll down"),
            Self::key_line("k/↑", "Scroll up"),
            Self::key_line("Ctrl+d", "Page down"),
            Self::key_line("Ctrl+u", "Page up"),
            Self::key_line("g", "Go to top"),
            Self::key_line("G", "Go to bottom"),
            Self::key_line("f", "Toggle follow mode"),
            Line::from(""),
            Self::section("Filtering"),
            Self::key_line("/", "Search/filter logs"),
            Self::key_line("n", "Clear filter"),
            Self::key_line("Tab", "Next level tab"),
            Self::key_line("S-Tab", "Previous level tab"),
            Self::key_line("0-4", "Jump to level tab"),
            Line::from(""),
            Self::section("Connection"),
            Self::key_line("r", "Reconnect"),
        ];
        if streaming {
            help_text.push(Self::key_line("d", "Disconnect"));
        }
        help_text.extend([
            Line::from(""),
            Self::section("Actions"),
            Self::key_line("e", "Export logs to file"),
            Self::key_line("?", "Toggle this help"),
            Self::key_line("Esc", "Go back"),
            Self::key_line("q", "Quit"),
        ]);

        let help_widget = Paragraph::new(help_text).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(Span::styled(
                    " Help ",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )),
        );

        frame.render_widget(help_widget, popup_area);
    }

    fn section(title: &str) -> Line<'_> {
        Line::from(Span::styled(title, Style::default().fg(Color::Yellow)))
    }

    fn key_line<'a>(key: &'a str, desc: &'a str) -> Line<'a> {
        Line::from(vec![
            Span::styled(format!("  {:>8}", key), Style::default().fg(Color::Green)),
            Span::styled(format!("  {}", desc), Style::default().fg(Color::White)),
        ])
    }
}
