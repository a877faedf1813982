use logscope_logs::{LevelCounts, LogBuffer, LogFilter, filter, level_counts};
use logscope_types::{LevelFilter, Mode, StreamState};

/// Cached filtered view so the pipeline only reruns when its inputs change
#[derive(Default)]
pub struct FilterCache {
    /// Buffer revision when cache was built
    cached_revision: u64,
    /// Filter the entries were computed with
    cached_filter: LogFilter,
    /// Lines passing the filter, in buffer order
    pub entries: Vec<String>,
    /// Per-level totals over the unfiltered buffer
    pub counts: LevelCounts,
    is_valid: bool,
}

impl FilterCache {
    /// Check if the buffer or the filter changed since the last refresh
    pub fn needs_refresh(&self, filter: &LogFilter, revision: u64) -> bool {
        !self.is_valid || self.cached_revision != revision || self.cached_filter != *filter
    }

    /// Recompute the view from `buffer` if anything changed
    pub fn refresh(&mut self, buffer: &LogBuffer, log_filter: &LogFilter) {
        let revision = buffer.revision();
        if !self.needs_refresh(log_filter, revision) {
            return;
        }

        let (entries, counts) = buffer.with_lines(|lines| {
            let entries = filter(lines, log_filter.level(), log_filter.query())
                .map(str::to_string)
                .collect();
            (entries, level_counts(lines))
        });

        self.entries = entries;
        self.counts = counts;
        self.cached_filter = log_filter.clone();
        self.cached_revision = revision;
        self.is_valid = true;
    }
}

/// UI-specific transient state
pub struct UiState {
    /// Is search bar active?
    pub search_active: bool,

    /// Current search input text
    pub search_input: String,

    /// Query applied to the log pane
    pub active_query: String,

    /// Selected level tab
    pub level_filter: LevelFilter,

    /// Is help overlay visible?
    pub help_visible: bool,

    /// Error message to display (if any)
    pub error_message: Option<String>,

    /// Transient status line (e.g. export path)
    pub status_message: Option<String>,

    /// Scroll position in log pane
    pub log_scroll: usize,

    /// Auto-scroll enabled (follow mode)?
    pub auto_scroll: bool,

    /// Cache for filtered log results
    pub filter_cache: FilterCache,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            search_active: false,
            search_input: String::new(),
            active_query: String::new(),
            level_filter: LevelFilter::All,
            help_visible: false,
            error_message: None,
            status_message: None,
            log_scroll: 0,
            auto_scroll: true,
            filter_cache: FilterCache::default(),
        }
    }
}

/// Application state for the log view
pub struct AppState {
    /// Server the stream is attached to (display only)
    pub server: String,

    /// Latest stream state published by the client
    pub stream: StreamState,

    pub ui_state: UiState,

    pub should_quit: bool,
}

impl AppState {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            stream: StreamState::default(),
            ui_state: UiState::default(),
            should_quit: false,
        }
    }

    /// Filter currently shaping the log pane; previews the search input while typing
    pub fn filter(&self) -> LogFilter {
        let query = if self.ui_state.search_active {
            &self.ui_state.search_input
        } else {
            &self.ui_state.active_query
        };
        LogFilter::new(self.ui_state.level_filter, query)
    }

    /// Streaming controls are hidden while polling; only a full reconnect is offered
    pub fn shows_stream_controls(&self) -> bool {
        self.stream.mode == Mode::Streaming
    }

    pub fn show_error(&mut self, msg: impl Into<String>) {
        self.ui_state.error_message = Some(msg.into());
    }

    pub fn show_status(&mut self, msg: impl Into<String>) {
        self.ui_state.status_message = Some(msg.into());
    }

    pub fn dismiss_error(&mut self) {
        self.ui_state.error_message = None;
    }

    pub fn open_search(&mut self) {
        self.ui_state.search_active = true;
        self.ui_state.search_input = self.ui_state.active_query.clone();
    }

    /// Leave the search bar without applying the input
    pub fn close_search(&mut self) {
        self.ui_state.search_active = false;
        self.ui_state.search_input.clear();
    }

    pub fn apply_search(&mut self) {
        self.ui_state.active_query = std::mem::take(&mut self.ui_state.search_input);
        self.ui_state.search_active = false;
        self.follow();
    }

    pub fn clear_filter(&mut self) {
        self.ui_state.active_query.clear();
        self.ui_state.search_input.clear();
        self.ui_state.level_filter = LevelFilter::All;
        self.follow();
    }

    pub fn set_level(&mut self, level: LevelFilter) {
        self.ui_state.level_filter = level;
        self.follow();
    }

    /// Close the topmost overlay; returns false when nothing was open
    pub fn go_back(&mut self) -> bool {
        if self.ui_state.help_visible {
            self.ui_state.help_visible = false;
        } else if self.ui_state.search_active {
            self.close_search();
        } else if self.ui_state.error_message.is_some() {
            self.dismiss_error();
        } else {
            return false;
        }
        true
    }

    pub fn scroll_up(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_sub(n);
    }

    pub fn scroll_down(&mut self, n: usize) {
        self.ui_state.auto_scroll = false;
        // Don't cap here - the renderer clamps to the filtered count
        self.ui_state.log_scroll = self.ui_state.log_scroll.saturating_add(n);
    }

    pub fn scroll_to_top(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.ui_state.auto_scroll = false;
        self.ui_state.log_scroll = usize::MAX;
    }

    pub fn toggle_auto_scroll(&mut self) {
        self.ui_state.auto_scroll = !self.ui_state.auto_scroll;
    }

    fn follow(&mut self) {
        self.ui_state.log_scroll = 0;
        self.ui_state.auto_scroll = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logscope_types::Severity;

    fn buffer() -> LogBuffer {
        let buffer = LogBuffer::new(10);
        for line in ["[ERROR] a", "[INFO] ab", "[WARN] abc"] {
            buffer.append(line.to_string());
        }
        buffer
    }

    #[test]
    fn test_cache_counts_ignore_filter() {
        let buffer = buffer();
        let mut cache = FilterCache::default();
        let filter = LogFilter::new(LevelFilter::Only(Severity::Error), "a");
        cache.refresh(&buffer, &filter);

        assert_eq!(cache.entries, vec!["[ERROR] a"]);
        assert_eq!(cache.counts.total(), 3);
        assert_eq!(cache.counts.warn, 1);
    }

    #[test]
    fn test_cache_refreshes_on_buffer_change() {
        let buffer = buffer();
        let mut cache = FilterCache::default();
        let filter = LogFilter::default();
        cache.refresh(&buffer, &filter);
        assert!(!cache.needs_refresh(&filter, buffer.revision()));

        buffer.append("[DEBUG] d".to_string());
        assert!(cache.needs_refresh(&filter, buffer.revision()));
        cache.refresh(&buffer, &filter);
        assert_eq!(cache.entries.len(), 4);
        assert_eq!(cache.counts.debug, 1);
    }

    #[test]
    fn test_cache_refreshes_on_filter_change() {
        let buffer = buffer();
        let mut cache = FilterCache::default();
        cache.refresh(&buffer, &LogFilter::default());

        let narrowed = LogFilter::new(LevelFilter::All, "ab");
        assert!(cache.needs_refresh(&narrowed, buffer.revision()));
        cache.refresh(&buffer, &narrowed);
        assert_eq!(cache.entries, vec!["[INFO] ab", "[WARN] abc"]);
    }

    #[test]
    fn test_search_previews_then_applies() {
        let mut state = AppState::new("http://localhost");
        state.open_search();
        state.ui_state.search_input.push_str("abc");
        assert_eq!(state.filter().query(), "abc");

        state.apply_search();
        assert!(!state.ui_state.search_active);
        assert_eq!(state.ui_state.active_query, "abc");
        assert_eq!(state.filter().query(), "abc");
    }

    #[test]
    fn test_cancelled_search_keeps_previous_query() {
        let mut state = AppState::new("http://localhost");
        state.ui_state.active_query = "keep".to_string();
        state.open_search();
        state.ui_state.search_input.push_str("-me-not");
        state.close_search();
        assert_eq!(state.filter().query(), "keep");
    }

    #[test]
    fn test_go_back_closes_overlays_in_order() {
        let mut state = AppState::new("http://localhost");
        state.ui_state.help_visible = true;
        state.open_search();
        state.show_error("boom");

        assert!(state.go_back());
        assert!(!state.ui_state.help_visible);
        assert!(state.go_back());
        assert!(!state.ui_state.search_active);
        assert!(state.go_back());
        assert!(state.ui_state.error_message.is_none());
        assert!(!state.go_back());
    }

    #[test]
    fn test_stream_controls_hidden_while_polling() {
        let mut state = AppState::new("http://localhost");
        assert!(state.shows_stream_controls());
        state.stream.mode = Mode::Polling;
        assert!(!state.shows_stream_controls());
    }

    #[test]
    fn test_scrolling_disables_follow() {
        let mut state = AppState::new("http://localhost");
        state.scroll_down(5);
        assert!(!state.ui_state.auto_scroll);
        state.scroll_up(10);
        assert_eq!(state.ui_state.log_scroll, 0);
        state.set_level(LevelFilter::Only(Severity::Warn));
        assert!(state.ui_state.auto_scroll);
    }
}
