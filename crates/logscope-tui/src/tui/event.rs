use std::time::Duration;

use crossterm::event::{
    self, Event as CrosstermEvent, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind,
};
use futures::{FutureExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lines moved per mouse wheel notch
const WHEEL_LINES: isize = 3;

/// Terminal events
#[derive(Clone, Debug)]
pub enum Event {
    /// Terminal tick (for periodic updates)
    Tick,
    /// Key press event
    Key(KeyEvent),
    /// Mouse wheel; negative scrolls up
    Scroll(isize),
    /// Terminal resize
    Resize(u16, u16),
    /// Error occurred
    Error(String),
}

impl Event {
    fn from_mouse(mouse: MouseEvent) -> Option<Self> {
        match mouse.kind {
            MouseEventKind::ScrollUp => Some(Self::Scroll(-WHEEL_LINES)),
            MouseEventKind::ScrollDown => Some(Self::Scroll(WHEEL_LINES)),
            _ => None,
        }
    }
}

/// Event handler managing terminal input
pub struct EventHandler {
    /// Event receiver
    receiver: mpsc::UnboundedReceiver<Event>,
    /// Cancellation token for graceful shutdown
    cancel: CancellationToken,
}

impl EventHandler {
    /// Create a new event handler with the given tick rate
    pub fn new(tick_rate: Duration) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        {
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let mut reader = event::EventStream::new();
                let mut tick_interval = tokio::time::interval(tick_rate);

                loop {
                    let tick = tick_interval.tick();
                    let crossterm_event = reader.next().fuse();

                    let event = tokio::select! {
                        _ = cancel.cancelled() => break,

                        _ = tick => Some(Event::Tick),

                        maybe_event = crossterm_event => match maybe_event {
                            Some(Ok(CrosstermEvent::Key(key))) => {
                                // Filter out release events (important for Windows)
                                (key.kind == KeyEventKind::Press).then_some(Event::Key(key))
                            }
                            Some(Ok(CrosstermEvent::Mouse(mouse))) => Event::from_mouse(mouse),
                            Some(Ok(CrosstermEvent::Resize(w, h))) => Some(Event::Resize(w, h)),
                            Some(Ok(_)) => None,
                            Some(Err(e)) => Some(Event::Error(e.to_string())),
                            None => break,
                        },
                    };

                    if let Some(event) = event {
                        if sender.send(event).is_err() {
                            break;
                        }
                    }
                }
            });
        }

        Self { receiver, cancel }
    }

    /// Receive the next event
    pub async fn next(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    /// Shutdown the event handler
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}
