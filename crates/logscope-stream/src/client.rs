use std::pin::Pin;
use std::sync::Arc;

use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use logscope_logs::LogBuffer;
use logscope_types::{ConnectionStatus, Mode, StreamState};

use crate::config::StreamConfig;
use crate::core::{Effect, Input, SessionId, StreamCore};
use crate::error::StreamError;
use crate::transport::{Connector, HttpSnapshotSource, SessionEvents, SnapshotSource, WsConnector};

/// Commands sent from the view to the driver task
#[derive(Clone, Copy, Debug)]
enum Command {
    Connect,
    Disconnect,
}

/// Handle to a running log stream, owned by one log view.
///
/// Spawning starts a driver task that owns the [`StreamCore`]. Dropping the
/// handle (or calling [`shutdown`](Self::shutdown)) cancels the driver, its
/// timers, the live connection and any in-flight fetch.
pub struct LogStreamClient {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<StreamState>,
    buffer: LogBuffer,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LogStreamClient {
    /// Start a client talking to the real endpoints
    pub fn spawn(config: &StreamConfig) -> Result<Self, StreamError> {
        let source = HttpSnapshotSource::new(config.logs_url()?, config.token.clone());
        Self::spawn_with(config, WsConnector::new(config.connect_timeout), source)
    }

    /// Start a client with custom transports
    pub fn spawn_with<C, S>(
        config: &StreamConfig,
        connector: C,
        source: S,
    ) -> Result<Self, StreamError>
    where
        C: Connector,
        S: SnapshotSource,
    {
        let url = config.stream_url()?;
        let buffer = LogBuffer::new(config.max_lines);
        let core = StreamCore::new(buffer.clone(), config.reconnect, config.poll_lines);

        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(core.state());
        let cancel = CancellationToken::new();

        let driver = Driver {
            core,
            connector,
            source: Arc::new(source),
            url,
            poll_period: config.poll_interval,
            commands: commands_rx,
            events_tx,
            events_rx,
            state_tx,
            cancel: cancel.clone(),
            live: None,
            reconnect: None,
            poll: None,
            fetch: None,
        };
        let task = tokio::spawn(driver.run());

        Ok(Self {
            commands: commands_tx,
            state: state_rx,
            buffer,
            cancel,
            task: Some(task),
        })
    }

    /// Open a fresh streaming session, replacing any current one
    pub fn connect(&self) {
        let _ = self.commands.send(Command::Connect);
    }

    /// Close the session and stop all automatic reconnects
    pub fn disconnect(&self) {
        let _ = self.commands.send(Command::Disconnect);
    }

    /// Latest published state
    pub fn state(&self) -> StreamState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.state.borrow().status
    }

    pub fn mode(&self) -> Mode {
        self.state.borrow().mode
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected()
    }

    /// Buffer the view renders from
    pub fn buffer(&self) -> &LogBuffer {
        &self.buffer
    }

    /// Watch for state changes
    pub fn subscribe(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Tear everything down. Safe to call more than once.
    pub fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LogStreamClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Driver task: feeds inputs into the core and performs its effects
struct Driver<C, S> {
    core: StreamCore,
    connector: C,
    source: Arc<S>,
    url: Url,
    poll_period: std::time::Duration,

    commands: mpsc::UnboundedReceiver<Command>,
    events_tx: mpsc::UnboundedSender<Input>,
    events_rx: mpsc::UnboundedReceiver<Input>,
    state_tx: watch::Sender<StreamState>,
    cancel: CancellationToken,

    /// Live connection: session, its cancel token and task
    live: Option<(SessionId, CancellationToken, JoinHandle<()>)>,

    /// Pending reconnect timer with its ticket
    reconnect: Option<(u64, Pin<Box<Sleep>>)>,

    poll: Option<Interval>,
    fetch: Option<JoinHandle<()>>,
}

impl<C: Connector, S: SnapshotSource> Driver<C, S> {
    async fn run(mut self) {
        loop {
            let input = tokio::select! {
                _ = self.cancel.cancelled() => Input::Shutdown,

                command = self.commands.recv() => match command {
                    Some(Command::Connect) => Input::Connect,
                    Some(Command::Disconnect) => Input::Disconnect,
                    // Handle dropped
                    None => Input::Shutdown,
                },

                Some(event) = self.events_rx.recv() => event,

                ticket = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    Input::ReconnectDue { ticket }
                }

                _ = poll_tick(&mut self.poll) => Input::PollTick,
            };

            let shutting_down = matches!(input, Input::Shutdown);
            let effects = self.core.handle(input);
            for effect in effects {
                self.apply(effect);
            }
            self.publish();

            if shutting_down {
                break;
            }
        }

        self.release_all();
        debug!("log stream driver stopped");
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::Open { session } => {
                let cancel = self.cancel.child_token();
                let events = SessionEvents::new(session, self.events_tx.clone());
                let task = self.connector.open(self.url.clone(), events, cancel.clone());
                self.live = Some((session, cancel, task));
            }
            Effect::Close { session } => {
                if let Some((live, cancel, task)) = self.live.take() {
                    if live == session {
                        // Detached; the task sends a close frame and exits
                        cancel.cancel();
                        drop(task);
                    } else {
                        self.live = Some((live, cancel, task));
                    }
                }
            }
            Effect::ScheduleReconnect { ticket, delay } => {
                self.reconnect = Some((ticket, Box::pin(tokio::time::sleep(delay))));
            }
            Effect::CancelReconnect => {
                self.reconnect = None;
            }
            Effect::StartPolling => {
                let mut interval = tokio::time::interval(self.poll_period);
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poll = Some(interval);
            }
            Effect::StopPolling => {
                self.poll = None;
                if let Some(fetch) = self.fetch.take() {
                    fetch.abort();
                }
            }
            Effect::FetchSnapshot { max_lines } => {
                let source = Arc::clone(&self.source);
                let events = self.events_tx.clone();
                let cancel = self.cancel.child_token();
                self.fetch = Some(tokio::spawn(async move {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        result = source.fetch(max_lines) => {
                            let _ = events.send(Input::Snapshot(result.map_err(|e| e.to_string())));
                        }
                    }
                }));
            }
        }
    }

    fn publish(&self) {
        let next = self.core.state();
        self.state_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn release_all(&mut self) {
        self.reconnect = None;
        self.poll = None;
        if let Some((_, cancel, _)) = self.live.take() {
            cancel.cancel();
        }
        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
    }
}

/// Resolves with the ticket once the pending timer fires; never if none is pending
async fn reconnect_due(pending: &mut Option<(u64, Pin<Box<Sleep>>)>) -> u64 {
    match pending {
        Some((ticket, sleep)) => {
            sleep.as_mut().await;
            *ticket
        }
        None => std::future::pending().await,
    }
}

async fn poll_tick(poll: &mut Option<Interval>) {
    match poll {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use parking_lot::Mutex;

    use super::*;
    use logscope_types::LogsSnapshot;

    /// Records every open and hands the session events to the test
    #[derive(Clone, Default)]
    struct FakeConnector {
        sessions: Arc<Mutex<Vec<SessionEvents>>>,
    }

    impl FakeConnector {
        fn opens(&self) -> usize {
            self.sessions.lock().len()
        }

        fn last(&self) -> SessionEvents {
            self.sessions.lock().last().cloned().expect("no session opened")
        }
    }

    impl Connector for FakeConnector {
        fn open(
            &self,
            _url: Url,
            events: SessionEvents,
            cancel: CancellationToken,
        ) -> JoinHandle<()> {
            self.sessions.lock().push(events);
            tokio::spawn(async move { cancel.cancelled().await })
        }
    }

    #[derive(Clone, Default)]
    struct FakeSource {
        fetches: Arc<AtomicUsize>,
    }

    impl SnapshotSource for FakeSource {
        async fn fetch(&self, max_lines: usize) -> Result<LogsSnapshot, StreamError> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(LogsSnapshot {
                logs: vec![format!("[INFO] snapshot {} (max {})", n, max_lines)],
                total: 1,
                message: None,
            })
        }
    }

    fn spawn() -> (LogStreamClient, FakeConnector, FakeSource) {
        let connector = FakeConnector::default();
        let source = FakeSource::default();
        let client =
            LogStreamClient::spawn_with(&StreamConfig::default(), connector.clone(), source.clone())
                .unwrap();
        (client, connector, source)
    }

    /// Let the driver drain its queues
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    fn log_frame(line: &str) -> String {
        format!(r#"{{"type":"log","line":"{}"}}"#, line)
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_and_stream_lines() {
        let (client, connector, _) = spawn();
        client.connect();
        settle().await;
        assert_eq!(client.status(), ConnectionStatus::Connecting);

        let session = connector.last();
        session.opened();
        session.frame(log_frame("[INFO] one"));
        session.frame(log_frame("[WARN] two"));
        settle().await;

        assert!(client.is_connected());
        assert_eq!(client.buffer().lines(), vec!["[INFO] one", "[WARN] two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_backoff() {
        let (client, connector, _) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.frame(log_frame("x"));
        session.closed();
        settle().await;
        assert_eq!(connector.opens(), 1);

        tokio::time::sleep(Duration::from_millis(3000)).await;
        settle().await;
        assert_eq!(connector.opens(), 2);
        assert_eq!(client.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_wins_over_pending_reconnect() {
        let (client, connector, _) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.frame(log_frame("x"));
        session.closed();
        settle().await;

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(120)).await;

        assert_eq!(connector.opens(), 1);
        assert_eq!(client.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_close_switches_to_polling() {
        let (client, connector, source) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.closed();
        settle().await;

        assert_eq!(client.mode(), Mode::Polling);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(client.buffer().len(), 1);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        settle().await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), 2);
        // Polling never reopens the stream on its own
        assert_eq!(connector.opens(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_leaves_polling() {
        let (client, connector, source) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.closed();
        settle().await;
        assert_eq!(client.mode(), Mode::Polling);

        client.connect();
        settle().await;
        assert_eq!(client.mode(), Mode::Streaming);
        assert_eq!(connector.opens(), 2);

        let fetches = source.fetches.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(source.fetches.load(Ordering::SeqCst), fetches);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_idempotent_and_final() {
        let (mut client, connector, source) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.frame(log_frame("x"));
        session.closed();
        settle().await;

        client.shutdown();
        client.shutdown();
        client.disconnect();
        client.disconnect();
        tokio::time::sleep(Duration::from_secs(300)).await;

        assert_eq!(connector.opens(), 1);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 0);

        // Late callbacks from the dead session go nowhere
        session.frame(log_frame("late"));
        settle().await;
        assert_eq!(client.buffer().lines(), vec!["x"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_polling_stops_fetches() {
        let (mut client, connector, source) = spawn();
        client.connect();
        settle().await;
        let session = connector.last();
        session.opened();
        session.closed();
        settle().await;
        assert_eq!(client.mode(), Mode::Polling);
        let before = source.fetches.load(Ordering::SeqCst);
        assert_eq!(before, 1);

        client.shutdown();
        client.shutdown();
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;

        assert_eq!(source.fetches.load(Ordering::SeqCst), before);
        assert_eq!(connector.opens(), 1);
    }
}
