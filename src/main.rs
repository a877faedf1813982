use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use logscope_logs::LogBuffer;
use logscope_stream::LogStreamClient;
use logscope_tui::{
    Action, AppState, Event, EventHandler, HelpOverlay, KeyBindings, KeyContext, LogViewerScreen,
    Tui,
};

mod config;

use config::{FileConfig, Overrides};

/// Lines moved by PageUp/PageDown
const PAGE_LINES: usize = 20;

/// Logscope - follow a proxy server's live admin log stream in the terminal
#[derive(Parser, Debug)]
#[command(name = "logscope")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server base URL (http, https, ws or wss)
    #[arg(short, long, env = "LOGSCOPE_SERVER")]
    server: Option<String>,

    /// Admin token
    #[arg(short, long, env = "LOGSCOPE_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Config file (defaults to ~/.config/logscope/config.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Historical lines the server replays when the stream opens
    #[arg(long)]
    initial_lines: Option<usize>,

    /// Give up on a connection handshake after this many seconds
    #[arg(long, value_name = "SECS")]
    connect_timeout: Option<u64>,

    /// Diagnostics output ("-" for stderr)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            server: self.server.clone(),
            token: self.token.clone(),
            initial_lines: self.initial_lines,
            connect_timeout_secs: self.connect_timeout,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.log_file.as_deref())?;

    // Run the application
    let result = run_app(args).await;

    // Handle any errors
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }

    result
}

/// Stdout belongs to the TUI, so diagnostics go to a file unless asked otherwise
fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = env_filter(std::env::var("RUST_LOG").ok().as_deref());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let path = match log_file {
        Some(path) => Some(path.to_path_buf()),
        None => default_log_path(),
    };

    match path {
        Some(path) if path.as_os_str() != "-" => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            let file = File::options()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        _ => builder.with_writer(std::io::stderr).init(),
    }

    Ok(())
}

/// `RUST_LOG` directives, falling back to warnings and above
fn env_filter(directives: Option<&str>) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse_lossy(directives.unwrap_or_default())
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|d| d.join("logscope").join("logscope.log"))
}

async fn run_app(args: Args) -> Result<()> {
    let stream_config = FileConfig::load(args.config.as_deref())?.resolve(args.overrides())?;
    info!(server = %stream_config.server, "starting logscope");

    // Create action channel
    let (action_tx, mut action_rx) = mpsc::unbounded_channel::<Action>();

    // Stream client owns the buffer; the view only reads it
    let mut client =
        LogStreamClient::spawn(&stream_config).context("Failed to start log stream")?;
    let mut stream_rx = client.subscribe();
    let log_buffer = client.buffer().clone();

    // Initialize state
    let mut state = AppState::new(stream_config.server.clone());
    state.stream = client.state();

    // Initialize TUI
    let mut tui = Tui::new()?;

    // Initialize event handler
    let mut events = EventHandler::new(Duration::from_millis(100));

    // Initialize keybindings
    let keybindings = KeyBindings::new();

    client.connect();

    // Initial render
    render(&mut tui, &mut state, &log_buffer)?;

    // Main event loop
    loop {
        tokio::select! {
            // Handle terminal events
            Some(event) = events.next() => {
                match event {
                    Event::Key(key) => {
                        let action = if state.ui_state.search_active {
                            keybindings.get_filter_input_action(&key)
                        } else {
                            keybindings.get_action(KeyContext::LogViewer, &key)
                        };
                        if let Some(action) = action {
                            let _ = action_tx.send(action);
                        }
                    }
                    Event::Scroll(lines) => {
                        let action = if lines < 0 {
                            Action::ScrollUp(lines.unsigned_abs())
                        } else {
                            Action::ScrollDown(lines.unsigned_abs())
                        };
                        let _ = action_tx.send(action);
                    }
                    Event::Tick => {
                        // Re-render on tick to pick up new lines
                    }
                    Event::Resize(_, _) => {
                        let _ = action_tx.send(Action::Render);
                    }
                    Event::Error(e) => {
                        let _ = action_tx.send(Action::ShowError(e));
                    }
                }
            }

            // Handle stream state changes
            Ok(()) = stream_rx.changed() => {
                state.stream = stream_rx.borrow_and_update().clone();
            }

            // Handle user actions
            Some(action) = action_rx.recv() => {
                handle_action(&mut state, &client, &log_buffer, action);
            }
        }

        if state.should_quit {
            break;
        }

        render(&mut tui, &mut state, &log_buffer)?;
    }

    // Cleanup
    client.shutdown();
    events.shutdown();
    tui.restore()?;

    Ok(())
}

fn handle_action(
    state: &mut AppState,
    client: &LogStreamClient,
    log_buffer: &LogBuffer,
    action: Action,
) {
    // Any user action replaces a stale status line
    if !matches!(action, Action::Render) {
        state.ui_state.status_message = None;
    }

    match action {
        Action::Quit => {
            state.should_quit = true;
        }
        Action::GoBack => {
            if !state.go_back() {
                state.should_quit = true;
            }
        }
        Action::ToggleHelp => {
            state.ui_state.help_visible = !state.ui_state.help_visible;
        }

        // Stream controls
        Action::Reconnect => {
            state.dismiss_error();
            client.connect();
        }
        Action::Disconnect => {
            // Polling only offers a full reconnect
            if state.shows_stream_controls() {
                client.disconnect();
            }
        }

        // Filter/Search actions
        Action::OpenSearch => {
            state.open_search();
        }
        Action::CloseSearch => {
            state.close_search();
        }
        Action::SearchInput(c) => {
            state.ui_state.search_input.push(c);
        }
        Action::SearchBackspace => {
            state.ui_state.search_input.pop();
        }
        Action::SearchClear => {
            state.ui_state.search_input.clear();
        }
        Action::ApplyFilter => {
            state.apply_search();
        }
        Action::ClearFilter => {
            state.clear_filter();
        }
        Action::NextLevel => {
            state.set_level(state.ui_state.level_filter.next());
        }
        Action::PrevLevel => {
            state.set_level(state.ui_state.level_filter.prev());
        }
        Action::SetLevel(level) => {
            state.set_level(level);
        }

        // Log viewer actions
        Action::ScrollUp(n) => {
            state.scroll_up(n);
        }
        Action::ScrollDown(n) => {
            state.scroll_down(n);
        }
        Action::PageUp => {
            state.scroll_up(PAGE_LINES);
        }
        Action::PageDown => {
            state.scroll_down(PAGE_LINES);
        }
        Action::ScrollToTop => {
            state.scroll_to_top();
        }
        Action::ScrollToBottom => {
            state.scroll_to_bottom();
        }
        Action::ToggleAutoScroll => {
            state.toggle_auto_scroll();
        }
        Action::ExportLogs => {
            let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
            let filename = PathBuf::from(format!("logscope_{}.log", timestamp));

            match export_logs_to_file(&filename, log_buffer) {
                Ok(count) => {
                    state.show_status(format!("Exported {} lines to {}", count, filename.display()));
                }
                Err(e) => {
                    state.show_error(format!("Export failed: {:#}", e));
                }
            }
        }

        Action::ShowError(msg) => {
            state.show_error(msg);
        }
        Action::Render => {}
    }
}

fn render(tui: &mut Tui, state: &mut AppState, log_buffer: &LogBuffer) -> Result<()> {
    tui.terminal().draw(|frame| {
        LogViewerScreen::render(frame, state, log_buffer);

        // Render help overlay if visible
        if state.ui_state.help_visible {
            HelpOverlay::render(frame, state.shows_stream_controls());
        }
    })?;

    Ok(())
}

/// Write the raw buffer to `filename`; returns the line count
fn export_logs_to_file(filename: &Path, log_buffer: &LogBuffer) -> Result<usize> {
    let count = log_buffer.len();
    let mut contents = log_buffer.export_raw();
    if !contents.is_empty() {
        contents.push('\n');
    }
    fs::write(filename, contents)
        .with_context(|| format!("Failed to write {}", filename.display()))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parse_flags() {
        let args = Args::try_parse_from([
            "logscope",
            "--server",
            "https://proxy.example",
            "--initial-lines",
            "25",
            "--connect-timeout",
            "5",
        ])
        .unwrap();

        let overrides = args.overrides();
        assert_eq!(overrides.server.as_deref(), Some("https://proxy.example"));
        assert_eq!(overrides.initial_lines, Some(25));
        assert_eq!(overrides.connect_timeout_secs, Some(5));
    }

    #[test]
    fn test_env_filter_defaults_to_warn() {
        assert_eq!(env_filter(None).max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(env_filter(Some("")).max_level_hint(), Some(LevelFilter::WARN));
    }

    #[test]
    fn test_env_filter_honors_rust_log() {
        assert_eq!(
            env_filter(Some("debug")).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(
            env_filter(Some("logscope_stream=trace")).max_level_hint(),
            Some(LevelFilter::TRACE)
        );
    }

    #[test]
    fn test_export_writes_buffer_lines() {
        let buffer = LogBuffer::new(10);
        buffer.append("[INFO] one".to_string());
        buffer.append("[WARN] two".to_string());

        let path = std::env::temp_dir().join(format!("logscope_export_{}.log", std::process::id()));
        let count = export_logs_to_file(&path, &buffer).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(count, 2);
        assert_eq!(written, "[INFO] one\n[WARN] two\n");
    }
}
