use logscope_types::LevelFilter;

/// All possible actions in the application (command pattern)
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Action {
    Quit,
    /// Close the topmost overlay
    GoBack,
    ToggleHelp,

    // Stream controls
    Reconnect,
    Disconnect,

    // Search bar
    OpenSearch,
    CloseSearch,
    SearchInput(char),
    SearchBackspace,
    SearchClear,
    ApplyFilter,
    ClearFilter,

    // Level tabs
    NextLevel,
    PrevLevel,
    SetLevel(LevelFilter),

    // Log pane
    ScrollUp(usize),
    ScrollDown(usize),
    ScrollToTop,
    ScrollToBottom,
    PageUp,
    PageDown,
    ToggleAutoScroll,
    ExportLogs,

    // Messages
    ShowError(String),

    // Render request
    Render,
}
