//! Shared fixtures for app integration tests.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use veil_app::{StreamEvent, run_chat_stream};
use veil_chat::{
    CancelToken, ChatClient, ChatError, DEFAULT_GENERATE_ENDPOINT, GenerateRequest,
    StreamTransport,
};

/// Transport that replays a fixed NDJSON body.
#[allow(dead_code)]
pub struct ScriptedTransport {
    pub body: &'static str,
}

impl StreamTransport for ScriptedTransport {
    fn open_stream(
        &self,
        _endpoint: &str,
        _request: &GenerateRequest,
    ) -> Result<Box<dyn Read + Send>, ChatError> {
        Ok(Box::new(Cursor::new(self.body.as_bytes().to_vec())))
    }
}

/// Transport that rejects every open with a fixed HTTP status.
#[allow(dead_code)]
pub struct RejectingTransport {
    pub status: u16,
}

impl StreamTransport for RejectingTransport {
    fn open_stream(
        &self,
        _endpoint: &str,
        _request: &GenerateRequest,
    ) -> Result<Box<dyn Read + Send>, ChatError> {
        Err(ChatError::Endpoint {
            status: self.status,
        })
    }
}

/// Transport that counts opens and yields an empty body.
#[derive(Default)]
#[allow(dead_code)]
pub struct CountingTransport {
    pub opened: AtomicUsize,
}

impl StreamTransport for CountingTransport {
    fn open_stream(
        &self,
        _endpoint: &str,
        _request: &GenerateRequest,
    ) -> Result<Box<dyn Read + Send>, ChatError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(Cursor::new(Vec::new())))
    }
}

/// Builds a client over `transport` with the default generate endpoint.
#[allow(dead_code)]
pub fn client_with(transport: Arc<dyn StreamTransport>) -> ChatClient {
    ChatClient::new(DEFAULT_GENERATE_ENDPOINT, transport)
        .expect("default endpoint should pass policy")
}

/// Creates deterministic request fixture.
#[allow(dead_code)]
pub fn request_fixture() -> GenerateRequest {
    GenerateRequest {
        model: "deepseek-r1:7b".to_string(),
        prompt: "User: hi".to_string(),
    }
}

/// Runs one generate stream to its end and returns the emitted events.
#[allow(dead_code)]
pub fn collect_stream_events(
    client: &ChatClient,
    request: &GenerateRequest,
    token: CancelToken,
) -> Vec<StreamEvent> {
    let mut events = Vec::new();
    run_chat_stream(client, request, token, |event| events.push(event));
    events
}
