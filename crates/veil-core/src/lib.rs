#![warn(missing_docs)]
//! # veil-core
//!
//! ## Purpose
//! Defines the pure conversation data model used across the `veil` workspace.
//!
//! ## Responsibilities
//! - Represent chat messages and the append-only transcript.
//! - Route streamed assistant chunks to the message owned by their stream.
//! - Provide the fixed model catalog offered by the overlay.
//!
//! ## Data flow
//! The overlay shell pushes user and system [`ChatMessage`] values into
//! [`Transcript`]. Streaming responses append through
//! [`Transcript::append_assistant`] keyed by [`StreamId`] and close through
//! [`Transcript::finish_stream`], which records the visual separator.
//!
//! ## Ownership and lifetimes
//! Messages own their text (`String`) so UI, worker, and test code can hold
//! transcript state without borrow coupling across threads.
//!
//! ## Error model
//! Validation failures (blank user text) return [`CoreError`] variants with
//! caller-actionable categorization.
//!
//! ## Security and privacy notes
//! This crate never logs message text. Callers that log transcript activity
//! must restrict themselves to lengths and counts.
//!
//! ## Example
//! ```rust
//! use veil_core::{StreamId, Transcript};
//!
//! let mut transcript = Transcript::new();
//! transcript.push_user("hello").expect("non-empty user text");
//! let stream = StreamId::new(1);
//! transcript.append_assistant(stream, "hi ");
//! transcript.append_assistant(stream, "there");
//! assert!(transcript.finish_stream(stream));
//! assert_eq!(transcript.entries().len(), 3);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model id preselected when the overlay starts.
pub const DEFAULT_MODEL_ID: &str = "deepseek-r1:7b";

/// Identifies who produced a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageSender {
    /// Text typed by the operator.
    User,
    /// Streamed completion text from the generate endpoint.
    Assistant,
    /// Local status lines such as stream failures.
    System,
}

/// One message in the conversation, without any label prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Message author category.
    pub sender: MessageSender,
    /// Message body.
    pub text: String,
}

impl ChatMessage {
    /// Constructs a validated user message from raw input.
    ///
    /// Leading and trailing whitespace is trimmed before storage.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyMessage`] when the input is empty after
    /// trimming.
    pub fn user(text: impl Into<String>) -> Result<Self, CoreError> {
        let text = text.into();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(CoreError::EmptyMessage);
        }

        Ok(Self {
            sender: MessageSender::User,
            text: trimmed.to_string(),
        })
    }

    /// Constructs a system status message.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            sender: MessageSender::System,
            text: text.into(),
        }
    }

    fn assistant_open() -> Self {
        Self {
            sender: MessageSender::Assistant,
            text: String::new(),
        }
    }
}

/// One entry in the append-only transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TranscriptEntry {
    /// A user, assistant, or system message.
    Message(ChatMessage),
    /// Visual break after a completed response or system line.
    Separator,
}

/// Identity of one streaming response.
///
/// Every submission allocates a fresh id. Chunk routing and slot closing key
/// off it, so two live streams never write into each other's message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(u64);

impl StreamId {
    /// Wraps a raw stream counter value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw counter value.
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Append-only conversation history with per-stream assistant slots.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    entries: Vec<TranscriptEntry>,
    live_streams: Vec<(StreamId, usize)>,
}

impl Transcript {
    /// Creates an empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a user message.
    ///
    /// # Errors
    /// Returns [`CoreError::EmptyMessage`] when `text` is blank after
    /// trimming. The transcript is left unchanged in that case.
    pub fn push_user(&mut self, text: impl Into<String>) -> Result<(), CoreError> {
        let message = ChatMessage::user(text)?;
        self.entries.push(TranscriptEntry::Message(message));
        Ok(())
    }

    /// Appends a system status line followed by a separator.
    pub fn push_system(&mut self, text: impl Into<String>) {
        self.entries
            .push(TranscriptEntry::Message(ChatMessage::system(text)));
        self.entries.push(TranscriptEntry::Separator);
    }

    /// Appends `chunk` to the assistant message owned by `stream`.
    ///
    /// The first chunk of a stream opens a new assistant message at the end
    /// of the transcript; later chunks extend that same message in place even
    /// when other entries were appended after it.
    pub fn append_assistant(&mut self, stream: StreamId, chunk: &str) {
        if let Some(&(_, index)) = self.live_streams.iter().find(|(id, _)| *id == stream) {
            if let Some(TranscriptEntry::Message(message)) = self.entries.get_mut(index) {
                message.text.push_str(chunk);
            }
            return;
        }

        let index = self.entries.len();
        let mut message = ChatMessage::assistant_open();
        message.text.push_str(chunk);
        self.entries.push(TranscriptEntry::Message(message));
        self.live_streams.push((stream, index));
    }

    /// Appends the end-of-response separator and closes the slot for
    /// `stream`.
    ///
    /// The separator is appended even when the stream never produced a chunk,
    /// so every completed response ends with exactly one visual break.
    ///
    /// # Returns
    /// `true` when a live assistant slot was closed.
    pub fn finish_stream(&mut self, stream: StreamId) -> bool {
        let closed = self.close_slot(stream);
        self.entries.push(TranscriptEntry::Separator);
        closed
    }

    /// Closes the slot for `stream` without appending a separator.
    ///
    /// Used on stream failure, where the system line that follows carries its
    /// own separator.
    pub fn abandon_stream(&mut self, stream: StreamId) -> bool {
        self.close_slot(stream)
    }

    /// Returns the transcript entries in append order.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }

    /// Returns the number of streams with an open assistant slot.
    pub fn live_stream_count(&self) -> usize {
        self.live_streams.len()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when the transcript has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn close_slot(&mut self, stream: StreamId) -> bool {
        let before = self.live_streams.len();
        self.live_streams.retain(|(id, _)| *id != stream);
        self.live_streams.len() != before
    }
}

/// One entry in the fixed model catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelInfo {
    /// Identifier sent to the generate endpoint.
    pub id: &'static str,
    /// Label shown in the model selector.
    pub display_name: &'static str,
}

const MODEL_CATALOG: &[ModelInfo] = &[
    ModelInfo {
        id: "deepseek-r1:14b",
        display_name: "DeepSeek-R1 14B",
    },
    ModelInfo {
        id: "deepseek-r1:7b",
        display_name: "DeepSeek-R1 7B",
    },
    ModelInfo {
        id: "deepseek-r1:32b",
        display_name: "DeepSeek-R1 32B",
    },
    ModelInfo {
        id: "llama4:latest",
        display_name: "Llama 4",
    },
    ModelInfo {
        id: "qwen3:0.6b",
        display_name: "Qwen3 0.6B",
    },
    ModelInfo {
        id: "granite3.3:8b",
        display_name: "Granite 3.3 8B",
    },
    ModelInfo {
        id: "granite3.3:2b",
        display_name: "Granite 3.3 2B",
    },
    ModelInfo {
        id: "granite3.2-vision:latest",
        display_name: "Granite 3.2 Vision",
    },
];

/// Returns the models offered by the overlay, in selector order.
pub fn available_models() -> &'static [ModelInfo] {
    MODEL_CATALOG
}

/// Looks up `id` in the catalog.
pub fn find_model(id: &str) -> Option<ModelInfo> {
    MODEL_CATALOG.iter().copied().find(|model| model.id == id)
}

/// Resolves `id` against the catalog, falling back to the default model for
/// unknown or blank ids.
pub fn resolve_model(id: &str) -> ModelInfo {
    find_model(id).unwrap_or_else(default_model)
}

/// Returns the catalog entry for [`DEFAULT_MODEL_ID`].
pub fn default_model() -> ModelInfo {
    // Invariant:
    // - DEFAULT_MODEL_ID is a catalog member; checked by tests.
    MODEL_CATALOG
        .iter()
        .copied()
        .find(|model| model.id == DEFAULT_MODEL_ID)
        .unwrap_or(MODEL_CATALOG[0])
}

/// Error type for conversation model validation failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// User text was empty after trimming.
    #[error("message text is empty")]
    EmptyMessage,
}
