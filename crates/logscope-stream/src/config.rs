use std::time::Duration;

use logscope_logs::MAX_LINES;
use reqwest::Url;

use crate::error::StreamError;
use crate::policy::ReconnectPolicy;

/// Settings for one log stream client
#[derive(Clone, Debug)]
pub struct StreamConfig {
    /// Server base URL (`http(s)://` or `ws(s)://`)
    pub server: String,

    /// Admin bearer token
    pub token: String,

    /// Historical lines the server replays on open
    pub initial_lines: usize,

    /// Buffer capacity
    pub max_lines: usize,

    pub reconnect: ReconnectPolicy,

    /// Period between snapshot fetches in polling mode
    pub poll_interval: Duration,

    /// Lines requested per snapshot fetch
    pub poll_lines: usize,

    /// Give up on a handshake after this long (disabled when `None`)
    pub connect_timeout: Option<Duration>,

    pub ws_path: String,
    pub logs_path: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server: "http://127.0.0.1:8484".to_string(),
            token: String::new(),
            initial_lines: 100,
            max_lines: MAX_LINES,
            reconnect: ReconnectPolicy::default(),
            poll_interval: Duration::from_millis(5000),
            poll_lines: MAX_LINES,
            connect_timeout: None,
            ws_path: "/api/ws/logs".to_string(),
            logs_path: "/api/logs".to_string(),
        }
    }
}

impl StreamConfig {
    /// Streaming endpoint with `token` and `initial_lines` in the query
    pub fn stream_url(&self) -> Result<Url, StreamError> {
        let mut url = self.endpoint(&self.ws_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => return Err(StreamError::Scheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| StreamError::Scheme(scheme.to_string()))?;
        url.query_pairs_mut()
            .append_pair("token", &self.token)
            .append_pair("initial_lines", &self.initial_lines.to_string());
        Ok(url)
    }

    /// Recent-logs endpoint (line count is added per request)
    pub fn logs_url(&self) -> Result<Url, StreamError> {
        let mut url = self.endpoint(&self.logs_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "http",
            "https" | "wss" => "https",
            other => return Err(StreamError::Scheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|_| StreamError::Scheme(scheme.to_string()))?;
        Ok(url)
    }

    /// Base URL with `path` appended to whatever prefix it already has
    fn endpoint(&self, path: &str) -> Result<Url, StreamError> {
        let mut url = Url::parse(&self.server).map_err(|e| StreamError::Url {
            url: self.server.clone(),
            reason: e.to_string(),
        })?;
        let joined = format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        url.set_path(&joined);
        url.set_query(None);
        Ok(url)
    }
}
