//! Connection state machine.
//!
//! `StreamCore` owns every piece of mutable stream state: connection phase,
//! reconnect attempts, the user-requested-close flag, the streaming/polling
//! mode and the line buffer. It performs no I/O. Each [`Input`] returns the
//! [`Effect`]s the driver must carry out, which keeps every transition
//! testable without a runtime.

use std::time::Duration;

use tracing::{debug, info, warn};

use logscope_logs::LogBuffer;
use logscope_types::{ConnectionStatus, LogsSnapshot, Mode, StreamMessage, StreamState};

use crate::policy::ReconnectPolicy;

/// Identifies one opened connection; events from older sessions are dropped
pub type SessionId = u64;

/// Internal connection phase
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Never connected
    Idle,
    Connecting,
    Connected,
    /// Transport reported a failure; a close is expected next
    Error,
    Disconnected,
}

impl Phase {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            Self::Idle | Self::Disconnected => ConnectionStatus::Disconnected,
            Self::Connecting => ConnectionStatus::Connecting,
            Self::Connected => ConnectionStatus::Connected,
            Self::Error => ConnectionStatus::Error,
        }
    }
}

/// Everything that can happen to the stream
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// User asked for a (re)connect
    Connect,
    /// User asked to stop
    Disconnect,
    Opened { session: SessionId },
    Frame { session: SessionId, text: String },
    TransportError { session: SessionId, reason: String },
    Closed { session: SessionId },
    /// A scheduled reconnect timer fired
    ReconnectDue { ticket: u64 },
    /// Polling interval elapsed
    PollTick,
    /// Result of a snapshot fetch
    Snapshot(Result<LogsSnapshot, String>),
    /// The view is going away
    Shutdown,
}

/// I/O the driver performs on behalf of the core
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    Open { session: SessionId },
    Close { session: SessionId },
    ScheduleReconnect { ticket: u64, delay: Duration },
    CancelReconnect,
    StartPolling,
    StopPolling,
    FetchSnapshot { max_lines: usize },
}

/// Connection manager, reconnect bookkeeping and fallback strategy
pub struct StreamCore {
    phase: Phase,
    mode: Mode,
    policy: ReconnectPolicy,

    /// Reconnects scheduled since the last successful open
    attempts: u32,

    /// Set by `disconnect()`, cleared by `connect()`
    user_requested_close: bool,

    /// Last session number handed out
    session: SessionId,

    /// Session whose transport is currently open or opening
    live: Option<SessionId>,

    /// Ticket of the pending reconnect timer
    pending_reconnect: Option<u64>,
    next_ticket: u64,

    polling: bool,
    fetch_in_flight: bool,
    poll_lines: usize,

    notice: Option<String>,
    torn_down: bool,

    buffer: LogBuffer,
}

impl StreamCore {
    pub fn new(buffer: LogBuffer, policy: ReconnectPolicy, poll_lines: usize) -> Self {
        Self {
            phase: Phase::Idle,
            mode: Mode::Streaming,
            policy,
            attempts: 0,
            user_requested_close: false,
            session: 0,
            live: None,
            pending_reconnect: None,
            next_ticket: 0,
            polling: false,
            fetch_in_flight: false,
            poll_lines,
            notice: None,
            torn_down: false,
            buffer,
        }
    }

    /// Apply one input and return the resulting effects
    pub fn handle(&mut self, input: Input) -> Vec<Effect> {
        if self.torn_down {
            return Vec::new();
        }

        match input {
            Input::Connect => self.connect(),
            Input::Disconnect => self.disconnect(),
            Input::Opened { session } => self.on_open(session),
            Input::Frame { session, text } => self.on_frame(session, &text),
            Input::TransportError { session, reason } => self.on_error(session, &reason),
            Input::Closed { session } => self.on_close(session),
            Input::ReconnectDue { ticket } => self.on_reconnect_due(ticket),
            Input::PollTick => self.on_poll_tick(),
            Input::Snapshot(result) => self.on_snapshot(result),
            Input::Shutdown => {
                let effects = self.disconnect();
                self.torn_down = true;
                effects
            }
        }
    }

    /// Projection published to the UI
    pub fn state(&self) -> StreamState {
        StreamState {
            status: self.phase.status(),
            mode: self.mode,
            attempts: self.attempts,
            notice: self.notice.clone(),
            loading: self.fetch_in_flight,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn user_requested_close(&self) -> bool {
        self.user_requested_close
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    fn connect(&mut self) -> Vec<Effect> {
        let mut effects = self.release();
        self.user_requested_close = false;
        self.attempts = 0;
        self.open_session(&mut effects);
        effects
    }

    fn disconnect(&mut self) -> Vec<Effect> {
        let effects = self.release();
        self.user_requested_close = true;
        self.phase = match self.phase {
            Phase::Idle => Phase::Idle,
            _ => Phase::Disconnected,
        };
        effects
    }

    /// Cancel the timer, close the live transport and leave polling mode
    fn release(&mut self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.pending_reconnect.take().is_some() {
            effects.push(Effect::CancelReconnect);
        }
        if let Some(session) = self.live.take() {
            effects.push(Effect::Close { session });
        }
        if self.polling {
            self.polling = false;
            self.fetch_in_flight = false;
            effects.push(Effect::StopPolling);
        }
        self.mode = Mode::Streaming;
        effects
    }

    fn open_session(&mut self, effects: &mut Vec<Effect>) {
        self.session += 1;
        self.live = Some(self.session);
        self.phase = Phase::Connecting;
        info!(session = self.session, attempt = self.attempts, "opening log stream");
        effects.push(Effect::Open {
            session: self.session,
        });
    }

    fn is_live(&self, session: SessionId) -> bool {
        self.live == Some(session)
    }

    fn on_open(&mut self, session: SessionId) -> Vec<Effect> {
        if !self.is_live(session) {
            return Vec::new();
        }
        info!(session, "log stream connected");
        self.phase = Phase::Connected;
        self.attempts = 0;
        self.notice = None;
        // A new session replays its own history; drop the stale view
        self.buffer.clear();
        Vec::new()
    }

    fn on_frame(&mut self, session: SessionId, text: &str) -> Vec<Effect> {
        if !self.is_live(session) {
            return Vec::new();
        }
        match StreamMessage::parse(text) {
            Ok(StreamMessage::Log { line }) => self.buffer.append(line),
            Ok(StreamMessage::Error { message }) => {
                warn!(session, %message, "server reported an error");
                self.notice = Some(message);
            }
            Ok(StreamMessage::Info { message }) => {
                info!(session, %message, "server notice");
                self.notice = Some(message);
            }
            Ok(StreamMessage::InitComplete { count }) => {
                debug!(session, ?count, "initial replay complete");
            }
            Err(e) => warn!(session, error = %e, "dropping malformed frame"),
        }
        Vec::new()
    }

    fn on_error(&mut self, session: SessionId, reason: &str) -> Vec<Effect> {
        if !self.is_live(session) {
            return Vec::new();
        }
        warn!(session, %reason, "log stream transport error");
        // Reconnect is driven by the close that follows
        self.phase = Phase::Error;
        Vec::new()
    }

    fn on_close(&mut self, session: SessionId) -> Vec<Effect> {
        if !self.is_live(session) {
            return Vec::new();
        }
        self.live = None;
        self.phase = Phase::Disconnected;
        if self.user_requested_close {
            return Vec::new();
        }

        if self.buffer.is_empty() {
            info!(session, "stream closed before any data arrived; falling back to polling");
            return self.enter_polling();
        }

        let attempt = self.attempts + 1;
        match self.policy.delay_for(attempt) {
            Some(delay) => {
                self.attempts = attempt;
                self.next_ticket += 1;
                self.pending_reconnect = Some(self.next_ticket);
                info!(session, attempt, ?delay, "log stream closed; scheduling reconnect");
                vec![Effect::ScheduleReconnect {
                    ticket: self.next_ticket,
                    delay,
                }]
            }
            None => {
                info!(session, attempts = self.attempts, "reconnect attempts exhausted; falling back to polling");
                self.enter_polling()
            }
        }
    }

    fn on_reconnect_due(&mut self, ticket: u64) -> Vec<Effect> {
        if self.pending_reconnect != Some(ticket) || self.user_requested_close {
            return Vec::new();
        }
        self.pending_reconnect = None;
        let mut effects = Vec::new();
        if let Some(session) = self.live.take() {
            effects.push(Effect::Close { session });
        }
        self.open_session(&mut effects);
        effects
    }

    fn enter_polling(&mut self) -> Vec<Effect> {
        self.mode = Mode::Polling;
        self.polling = true;
        vec![Effect::StartPolling]
    }

    fn on_poll_tick(&mut self) -> Vec<Effect> {
        if !self.polling || self.fetch_in_flight {
            return Vec::new();
        }
        self.fetch_in_flight = true;
        vec![Effect::FetchSnapshot {
            max_lines: self.poll_lines,
        }]
    }

    fn on_snapshot(&mut self, result: Result<LogsSnapshot, String>) -> Vec<Effect> {
        self.fetch_in_flight = false;
        if !self.polling {
            return Vec::new();
        }
        match result {
            Ok(snapshot) => {
                debug!(lines = snapshot.logs.len(), total = snapshot.total, "polled log snapshot");
                if snapshot.message.is_some() {
                    self.notice = snapshot.message;
                }
                self.buffer.replace(snapshot.logs);
            }
            // Keep showing the last good data
            Err(e) => warn!(error = %e, "log snapshot fetch failed"),
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> StreamCore {
        StreamCore::new(LogBuffer::new(2000), ReconnectPolicy::default(), 2000)
    }

    fn log_frame(line: &str) -> String {
        format!(r#"{{"type":"log","line":"{}"}}"#, line)
    }

    /// Connect and open, returning the live session
    fn open(core: &mut StreamCore) -> SessionId {
        let effects = core.handle(Input::Connect);
        let session = effects
            .iter()
            .find_map(|e| match e {
                Effect::Open { session } => Some(*session),
                _ => None,
            })
            .expect("connect should open a session");
        core.handle(Input::Opened { session });
        session
    }

    #[test]
    fn test_initial_state() {
        let core = core();
        assert_eq!(core.phase(), Phase::Idle);
        assert_eq!(core.state().status, ConnectionStatus::Disconnected);
        assert_eq!(core.mode(), Mode::Streaming);
    }

    #[test]
    fn test_connect_transitions() {
        let mut core = core();
        let effects = core.handle(Input::Connect);
        assert_eq!(effects, vec![Effect::Open { session: 1 }]);
        assert_eq!(core.state().status, ConnectionStatus::Connecting);

        core.handle(Input::Opened { session: 1 });
        assert!(core.state().is_connected());
    }

    #[test]
    fn test_connect_is_idempotent() {
        let mut core = core();
        let first = open(&mut core);
        let effects = core.handle(Input::Connect);
        assert_eq!(
            effects,
            vec![Effect::Close { session: first }, Effect::Open { session: first + 1 }]
        );
    }

    #[test]
    fn test_backoff_schedule_then_fallback() {
        let mut core = core();
        let mut session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: log_frame("[INFO] hello"),
        });

        let mut delays = Vec::new();
        loop {
            let effects = core.handle(Input::Closed { session });
            match effects.as_slice() {
                [Effect::ScheduleReconnect { ticket, delay }] => {
                    delays.push(delay.as_millis());
                    let effects = core.handle(Input::ReconnectDue { ticket: *ticket });
                    session = match effects.as_slice() {
                        [Effect::Open { session }] => *session,
                        other => panic!("unexpected effects {:?}", other),
                    };
                    // Handshake keeps failing; the stale buffer survives
                    core.handle(Input::TransportError {
                        session,
                        reason: "refused".to_string(),
                    });
                }
                [Effect::StartPolling] => break,
                other => panic!("unexpected effects {:?}", other),
            }
        }

        assert_eq!(delays, vec![3000, 6000, 12000, 24000, 48000]);
        assert_eq!(core.mode(), Mode::Polling);
    }

    #[test]
    fn test_attempts_reset_on_open() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: log_frame("x"),
        });
        let effects = core.handle(Input::Closed { session });
        let Effect::ScheduleReconnect { ticket, .. } = effects[0] else {
            panic!("expected reconnect");
        };
        assert_eq!(core.attempts(), 1);

        core.handle(Input::ReconnectDue { ticket });
        core.handle(Input::Opened { session: session + 1 });
        assert_eq!(core.attempts(), 0);
    }

    #[test]
    fn test_open_clears_buffer_before_new_lines() {
        let mut core = core();
        let session = open(&mut core);
        for i in 0..10 {
            core.handle(Input::Frame {
                session,
                text: log_frame(&format!("old {}", i)),
            });
        }
        assert_eq!(core.buffer().len(), 10);

        let effects = core.handle(Input::Connect);
        assert!(effects.contains(&Effect::Open { session: session + 1 }));
        // Stale view stays visible while connecting
        assert_eq!(core.buffer().len(), 10);

        core.handle(Input::Opened { session: session + 1 });
        assert!(core.buffer().is_empty());

        core.handle(Input::Frame {
            session: session + 1,
            text: log_frame("fresh"),
        });
        assert_eq!(core.buffer().lines(), vec!["fresh"]);
    }

    #[test]
    fn test_stale_session_events_ignored() {
        let mut core = core();
        let old = open(&mut core);
        core.handle(Input::Connect);

        core.handle(Input::Frame {
            session: old,
            text: log_frame("late"),
        });
        assert!(core.handle(Input::Closed { session: old }).is_empty());
        assert!(core.buffer().is_empty());
        assert_eq!(core.state().status, ConnectionStatus::Connecting);
    }

    #[test]
    fn test_manual_disconnect_cancels_pending_reconnect() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: log_frame("x"),
        });
        let effects = core.handle(Input::Closed { session });
        let Effect::ScheduleReconnect { ticket, .. } = effects[0] else {
            panic!("expected reconnect");
        };

        let effects = core.handle(Input::Disconnect);
        assert_eq!(effects, vec![Effect::CancelReconnect]);
        assert!(core.user_requested_close());

        // Timer raced the cancel and fired anyway
        assert!(core.handle(Input::ReconnectDue { ticket }).is_empty());
        assert_eq!(core.state().status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_disconnect_closes_without_reconnect() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: log_frame("x"),
        });

        assert_eq!(core.handle(Input::Disconnect), vec![Effect::Close { session }]);
        // Transport reports the close it was asked for
        assert!(core.handle(Input::Closed { session }).is_empty());
        assert_eq!(core.state().status, ConnectionStatus::Disconnected);
    }

    #[test]
    fn test_error_does_not_schedule() {
        let mut core = core();
        let session = open(&mut core);
        let effects = core.handle(Input::TransportError {
            session,
            reason: "reset".to_string(),
        });
        assert!(effects.is_empty());
        assert_eq!(core.state().status, ConnectionStatus::Error);
    }

    #[test]
    fn test_malformed_frame_is_dropped() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: "{not json".to_string(),
        });
        core.handle(Input::Frame {
            session,
            text: log_frame("ok"),
        });
        assert_eq!(core.buffer().lines(), vec!["ok"]);
        assert!(core.state().is_connected());
    }

    #[test]
    fn test_server_messages_become_notice() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: r#"{"type":"error","message":"No log files found"}"#.to_string(),
        });
        assert_eq!(core.state().notice.as_deref(), Some("No log files found"));
        assert!(core.buffer().is_empty());
    }

    #[test]
    fn test_close_without_data_falls_back_to_polling() {
        let mut core = core();
        let session = open(&mut core);

        assert_eq!(core.handle(Input::Closed { session }), vec![Effect::StartPolling]);
        assert_eq!(core.mode(), Mode::Polling);

        assert_eq!(
            core.handle(Input::PollTick),
            vec![Effect::FetchSnapshot { max_lines: 2000 }]
        );
        assert!(core.state().loading);
    }

    #[test]
    fn test_close_with_data_keeps_streaming() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Frame {
            session,
            text: log_frame("x"),
        });

        let effects = core.handle(Input::Closed { session });
        assert!(matches!(effects.as_slice(), [Effect::ScheduleReconnect { .. }]));
        assert_eq!(core.mode(), Mode::Streaming);
    }

    #[test]
    fn test_failed_handshake_falls_back_to_polling() {
        let mut core = core();
        core.handle(Input::Connect);
        core.handle(Input::TransportError {
            session: 1,
            reason: "refused".to_string(),
        });
        assert_eq!(core.handle(Input::Closed { session: 1 }), vec![Effect::StartPolling]);
    }

    #[test]
    fn test_polling_replaces_and_survives_failures() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Closed { session });

        core.handle(Input::PollTick);
        // Tick while a fetch is outstanding is skipped
        assert!(core.handle(Input::PollTick).is_empty());

        core.handle(Input::Snapshot(Ok(LogsSnapshot {
            logs: vec!["a".to_string(), "b".to_string()],
            total: 2,
            message: None,
        })));
        assert_eq!(core.buffer().lines(), vec!["a", "b"]);
        assert!(!core.state().loading);

        core.handle(Input::PollTick);
        core.handle(Input::Snapshot(Err("503".to_string())));
        assert_eq!(core.buffer().lines(), vec!["a", "b"]);
        assert!(!core.state().loading);

        core.handle(Input::PollTick);
        core.handle(Input::Snapshot(Ok(LogsSnapshot {
            logs: vec!["c".to_string()],
            total: 1,
            message: None,
        })));
        assert_eq!(core.buffer().lines(), vec!["c"]);
    }

    #[test]
    fn test_connect_from_polling_retries_streaming() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Closed { session });
        assert_eq!(core.mode(), Mode::Polling);

        let effects = core.handle(Input::Connect);
        assert_eq!(
            effects,
            vec![Effect::StopPolling, Effect::Open { session: session + 1 }]
        );
        assert_eq!(core.mode(), Mode::Streaming);
        assert!(core.handle(Input::PollTick).is_empty());
    }

    #[test]
    fn test_teardown_is_idempotent() {
        let mut core = core();
        let session = open(&mut core);

        assert_eq!(core.handle(Input::Shutdown), vec![Effect::Close { session }]);
        assert!(core.handle(Input::Shutdown).is_empty());
        assert!(core.handle(Input::Disconnect).is_empty());
        assert!(core.handle(Input::Connect).is_empty());
        assert!(core.is_torn_down());
    }

    #[test]
    fn test_teardown_while_polling_stops_interval() {
        let mut core = core();
        let session = open(&mut core);
        core.handle(Input::Closed { session });
        core.handle(Input::PollTick);
        assert_eq!(core.mode(), Mode::Polling);

        assert_eq!(core.handle(Input::Shutdown), vec![Effect::StopPolling]);
        assert!(core.handle(Input::PollTick).is_empty());
        assert!(core
            .handle(Input::Snapshot(Ok(LogsSnapshot {
                logs: vec!["late".to_string()],
                total: 1,
                message: None,
            })))
            .is_empty());
        assert!(core.buffer().is_empty());
    }

    #[test]
    fn test_disconnect_twice_is_quiet() {
        let mut core = core();
        open(&mut core);
        assert!(!core.handle(Input::Disconnect).is_empty());
        assert!(core.handle(Input::Disconnect).is_empty());
        assert_eq!(core.state().status, ConnectionStatus::Disconnected);
    }
}
