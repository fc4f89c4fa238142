#![warn(missing_docs)]
//! # veil-chat
//!
//! ## Purpose
//! Implements the streaming client for the local generate endpoint.
//!
//! ## Responsibilities
//! - Validate generate endpoint policy (`/api/generate`, http or https).
//! - Open completion streams through an injectable transport abstraction.
//! - Decode newline-delimited JSON fragments with cooperative cancellation.
//!
//! ## Data flow
//! App composes a [`GenerateRequest`] -> [`ChatClient::stream_generate`]
//! opens the body reader through [`StreamTransport`] -> the returned
//! [`FragmentStream`] yields [`StreamFragment`] values until EOF, a terminal
//! error, or cancellation via [`CancelToken`].
//!
//! ## Ownership and lifetimes
//! The stream owns its reader (`Box<dyn Read + Send>`) so a worker thread can
//! drive it independently of the client that opened it.
//!
//! ## Error model
//! Endpoint policy violations, non-success statuses, transport failures, and
//! malformed fragments are surfaced as [`ChatError`]. A stream yields at most
//! one terminal error and is exhausted afterwards; callers never retry.
//!
//! ## Security and privacy notes
//! Prompt and completion text stay inside request/fragment values. Callers
//! that log stream activity must restrict themselves to lengths and counts.
//!
//! ## Example
//! ```rust
//! use veil_chat::validate_generate_endpoint;
//!
//! validate_generate_endpoint("http://localhost:11434/api/generate")
//!     .expect("default endpoint should pass policy");
//! ```

use std::io::{BufRead, BufReader, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Required generate path suffix.
pub const REQUIRED_GENERATE_PATH: &str = "/api/generate";

/// Default endpoint of a locally hosted inference server.
pub const DEFAULT_GENERATE_ENDPOINT: &str = "http://localhost:11434/api/generate";

/// Default socket read timeout while waiting for the next fragment.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 120;

/// Connect timeout for opening a stream.
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Request payload for one completion stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// Model identifier from the catalog.
    pub model: String,
    /// Full prompt, instruction preamble plus user text.
    pub prompt: String,
}

/// One decoded line of the response stream.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StreamFragment {
    /// Completion text carried by this fragment, if any.
    #[serde(default)]
    pub response: Option<String>,
    /// Marks the final fragment of a response.
    #[serde(default)]
    pub done: bool,
}

impl StreamFragment {
    /// Returns the non-empty completion chunk, if this fragment carries one.
    pub fn chunk(&self) -> Option<&str> {
        match self.response.as_deref() {
            Some("") | None => None,
            Some(text) => Some(text),
        }
    }
}

/// Decodes one stream line into a fragment.
///
/// # Errors
/// Returns [`ChatError::MalformedFragment`] when the line is not a valid
/// fragment object. Unknown fields are ignored.
pub fn parse_fragment(line: &str) -> Result<StreamFragment, ChatError> {
    serde_json::from_str(line).map_err(|error| ChatError::MalformedFragment(error.to_string()))
}

/// Cooperative one-shot cancellation flag.
///
/// Clones share the flag. Cancellation is sticky; there is no un-cancel. A
/// newer submission replaces the token reachable from the cancel control
/// without cancelling the superseded stream.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// Creates an untriggered token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation of the stream holding this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Abstract transport used by the chat client.
pub trait StreamTransport: Send + Sync {
    /// Sends the generate request and returns the raw response body reader.
    ///
    /// # Errors
    /// Returns [`ChatError::Endpoint`] for non-success statuses and
    /// [`ChatError::Transport`] for connection failures.
    fn open_stream(
        &self,
        endpoint: &str,
        request: &GenerateRequest,
    ) -> Result<Box<dyn Read + Send>, ChatError>;
}

/// Blocking HTTP transport over a shared agent.
///
/// The agent carries a connect timeout and a per-read socket timeout; the
/// response body is handed back unread so the stream can be consumed line by
/// line.
pub struct HttpStreamTransport {
    agent: ureq::Agent,
}

impl HttpStreamTransport {
    /// Creates the transport with the default read timeout.
    pub fn new() -> Self {
        Self::with_read_timeout(Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS))
    }

    /// Creates the transport with a caller-chosen read timeout.
    pub fn with_read_timeout(read_timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout_read(read_timeout)
            .build();
        Self { agent }
    }
}

impl Default for HttpStreamTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamTransport for HttpStreamTransport {
    fn open_stream(
        &self,
        endpoint: &str,
        request: &GenerateRequest,
    ) -> Result<Box<dyn Read + Send>, ChatError> {
        let response = self
            .agent
            .post(endpoint)
            .set("Content-Type", "application/json")
            .send_json(request)
            .map_err(|error| match error {
                ureq::Error::Status(status, _) => ChatError::Endpoint { status },
                ureq::Error::Transport(transport) => ChatError::Transport(transport.to_string()),
            })?;

        Ok(Box::new(response.into_reader()))
    }
}

/// Chat client that validates endpoint policy and opens completion streams.
#[derive(Clone)]
pub struct ChatClient {
    endpoint: String,
    transport: Arc<dyn StreamTransport>,
}

impl ChatClient {
    /// Creates a validated chat client.
    ///
    /// # Errors
    /// Returns [`ChatError::InvalidEndpoint`] when the URL is not http/https
    /// or does not end with the required `/api/generate` path.
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn StreamTransport>,
    ) -> Result<Self, ChatError> {
        let endpoint = endpoint.into();
        validate_generate_endpoint(&endpoint)?;
        Ok(Self {
            endpoint,
            transport,
        })
    }

    /// Creates a client over the real HTTP transport.
    ///
    /// # Errors
    /// Same endpoint policy as [`ChatClient::new`].
    pub fn with_default_transport(endpoint: impl Into<String>) -> Result<Self, ChatError> {
        Self::new(endpoint, Arc::new(HttpStreamTransport::new()))
    }

    /// Opens one completion stream for `request`.
    ///
    /// # Errors
    /// Propagates transport open failures; stream-phase failures surface as
    /// items of the returned iterator.
    pub fn stream_generate(
        &self,
        request: &GenerateRequest,
        token: CancelToken,
    ) -> Result<FragmentStream, ChatError> {
        let reader = self.transport.open_stream(&self.endpoint, request)?;
        Ok(FragmentStream::new(reader, token))
    }

    /// Returns the configured generate endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Cancellable iterator over newline-delimited stream fragments.
///
/// Blank lines are skipped. The stream ends at EOF or once its token is
/// cancelled; a read failure or malformed line yields one `Err` item and
/// exhausts the iterator.
pub struct FragmentStream {
    reader: BufReader<Box<dyn Read + Send>>,
    token: CancelToken,
    line: String,
    finished: bool,
}

impl FragmentStream {
    /// Wraps a raw body reader.
    pub fn new(reader: Box<dyn Read + Send>, token: CancelToken) -> Self {
        Self {
            reader: BufReader::new(reader),
            token,
            line: String::new(),
            finished: false,
        }
    }
}

impl Iterator for FragmentStream {
    type Item = Result<StreamFragment, ChatError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.finished || self.token.is_cancelled() {
                return None;
            }

            self.line.clear();
            match self.reader.read_line(&mut self.line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(error) => {
                    self.finished = true;
                    return Some(Err(ChatError::Transport(error.to_string())));
                }
            }

            let line = self.line.trim();
            if line.is_empty() {
                continue;
            }

            return match parse_fragment(line) {
                Ok(fragment) => Some(Ok(fragment)),
                Err(error) => {
                    self.finished = true;
                    Some(Err(error))
                }
            };
        }
    }
}

/// Validates generate endpoint constraints.
///
/// # Errors
/// Returns [`ChatError::InvalidEndpoint`] for unparseable URLs, non-http(s)
/// schemes, or path mismatch.
pub fn validate_generate_endpoint(endpoint: &str) -> Result<(), ChatError> {
    let parsed = Url::parse(endpoint)
        .map_err(|error| ChatError::InvalidEndpoint(format!("invalid generate url: {error}")))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ChatError::InvalidEndpoint(
            "generate endpoint must use http or https".to_string(),
        ));
    }

    if !parsed.path().ends_with(REQUIRED_GENERATE_PATH) {
        return Err(ChatError::InvalidEndpoint(format!(
            "generate endpoint path must end with {REQUIRED_GENERATE_PATH}"
        )));
    }

    Ok(())
}

/// Errors produced by the chat client and stream decoding.
#[derive(Debug, Error)]
pub enum ChatError {
    /// Endpoint violates generate API policy.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),
    /// Endpoint answered with a non-success status.
    #[error("endpoint returned status {status}")]
    Endpoint {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },
    /// Connection or mid-stream transport failure.
    #[error("stream transport failure: {0}")]
    Transport(String),
    /// A stream line was not a valid fragment object.
    #[error("malformed stream fragment: {0}")]
    MalformedFragment(String),
}

#[cfg(test)]
mod tests {
    //! Unit tests for endpoint policy and fragment decoding.

    use super::*;

    #[test]
    fn validates_expected_endpoint_policy() {
        validate_generate_endpoint(DEFAULT_GENERATE_ENDPOINT).expect("endpoint should pass");
        validate_generate_endpoint("https://inference.test/api/generate")
            .expect("https endpoint should pass");
        assert!(validate_generate_endpoint("ftp://localhost/api/generate").is_err());
        assert!(validate_generate_endpoint("http://localhost:11434/api/chat").is_err());
        assert!(validate_generate_endpoint("not a url").is_err());
    }

    #[test]
    fn decodes_fragments_with_defaults_and_unknown_fields() {
        let fragment = parse_fragment(r#"{"response":"Hel","done":false}"#)
            .expect("fragment should decode");
        assert_eq!(fragment.chunk(), Some("Hel"));
        assert!(!fragment.done);

        let terminal = parse_fragment(r#"{"done":true,"total_duration":123}"#)
            .expect("unknown fields should be ignored");
        assert!(terminal.chunk().is_none());
        assert!(terminal.done);

        let empty = parse_fragment(r#"{"response":""}"#).expect("empty chunk should decode");
        assert!(empty.chunk().is_none());

        assert!(matches!(
            parse_fragment("{not json"),
            Err(ChatError::MalformedFragment(_))
        ));
    }

    #[test]
    fn cancel_token_is_sticky_and_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
        token.cancel();
        assert!(token.is_cancelled());
    }
}
