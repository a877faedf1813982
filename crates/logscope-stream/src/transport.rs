use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use logscope_types::LogsSnapshot;

use crate::core::{Input, SessionId};
use crate::error::StreamError;

/// Reports transport events for one session back to the stream driver
#[derive(Clone, Debug)]
pub struct SessionEvents {
    session: SessionId,
    tx: mpsc::UnboundedSender<Input>,
}

impl SessionEvents {
    pub(crate) fn new(session: SessionId, tx: mpsc::UnboundedSender<Input>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn opened(&self) {
        self.send(Input::Opened {
            session: self.session,
        });
    }

    pub fn frame(&self, text: String) {
        self.send(Input::Frame {
            session: self.session,
            text,
        });
    }

    pub fn error(&self, reason: String) {
        self.send(Input::TransportError {
            session: self.session,
            reason,
        });
    }

    pub fn closed(&self) {
        self.send(Input::Closed {
            session: self.session,
        });
    }

    fn send(&self, input: Input) {
        // Driver gone means the view was torn down
        let _ = self.tx.send(input);
    }
}

/// Opens duplex connections to the streaming endpoint
pub trait Connector: Send + Sync + 'static {
    /// Start a connection task for one session.
    ///
    /// The task reports `opened`, each text frame, transport errors and the
    /// final `closed` through `events`. When `cancel` fires it closes quietly
    /// without reporting anything further.
    fn open(&self, url: Url, events: SessionEvents, cancel: CancellationToken) -> JoinHandle<()>;
}

/// Fetches a point-in-time snapshot of recent lines
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch(
        &self,
        max_lines: usize,
    ) -> impl Future<Output = Result<LogsSnapshot, StreamError>> + Send;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Clone, Debug, Default)]
pub struct WsConnector {
    connect_timeout: Option<Duration>,
}

impl WsConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

impl Connector for WsConnector {
    fn open(&self, url: Url, events: SessionEvents, cancel: CancellationToken) -> JoinHandle<()> {
        let connect_timeout = self.connect_timeout;

        tokio::spawn(async move {
            let handshake = async {
                let connecting = tokio_tungstenite::connect_async(url.as_str());
                match connect_timeout {
                    Some(limit) => match tokio::time::timeout(limit, connecting).await {
                        Ok(result) => result.map_err(StreamError::from),
                        Err(_) => Err(StreamError::Timeout(limit)),
                    },
                    None => connecting.await.map_err(StreamError::from),
                }
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => return,
                result = handshake => result,
            };

            let ws_stream = match result {
                Ok((ws_stream, _response)) => ws_stream,
                Err(e) => {
                    events.error(e.to_string());
                    events.closed();
                    return;
                }
            };

            events.opened();
            let (mut write, mut read) = ws_stream.split();

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        return;
                    }

                    msg = read.next() => {
                        match msg {
                            Some(Ok(Message::Text(text))) => events.frame(text),
                            Some(Ok(Message::Close(frame))) => {
                                debug!(session = events.session(), ?frame, "server closed log stream");
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                events.error(e.to_string());
                                events.closed();
                                return;
                            }
                            None => {
                                events.closed();
                                return;
                            }
                        }
                    }
                }
            }
        })
    }
}

/// Polls the recent-logs endpoint over HTTP
#[derive(Clone, Debug)]
pub struct HttpSnapshotSource {
    client: reqwest::Client,
    url: Url,
    token: String,
}

impl HttpSnapshotSource {
    pub fn new(url: Url, token: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            token,
        }
    }
}

impl SnapshotSource for HttpSnapshotSource {
    async fn fetch(&self, max_lines: usize) -> Result<LogsSnapshot, StreamError> {
        let response = self
            .client
            .get(self.url.clone())
            .query(&[("lines", max_lines)])
            .bearer_auth(&self.token)
            .send()
            .await?
            .error_for_status()?;

        Ok(response.json::<LogsSnapshot>().await?)
    }
}
