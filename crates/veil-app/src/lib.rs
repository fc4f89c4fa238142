#![warn(missing_docs)]
//! # veil-app
//!
//! ## Purpose
//! Orchestrates the capture shield, chat streaming, and UI state for `veil`.
//!
//! ## Responsibilities
//! - Gate submissions (blank input never reaches the endpoint).
//! - Compose the fixed instruction preamble into generate prompts.
//! - Drive one completion stream per submission and translate its outcome
//!   into transcript mutations.
//! - Resolve environment overrides for the shield kill switch and the
//!   generate endpoint policy.
//! - Project overlay state into flat status strings.
//!
//! ## Data flow
//! Input text -> [`prepare_submission`] -> worker thread runs
//! [`run_chat_stream`] -> [`StreamEvent`] values cross back to the UI thread
//! -> [`apply_stream_event`] mutates the single-writer [`Transcript`].
//!
//! ## Ownership and lifetimes
//! Submissions and stream events are owned values so the shell can move them
//! between the UI thread and worker threads without borrow coupling.
//!
//! ## Error model
//! Subsystem failures are wrapped in [`AppError`]. Stream failures are data,
//! not errors: they arrive as [`StreamEvent::Failed`] and become one system
//! transcript line, never a retry and never a crash.
//!
//! ## Security and privacy notes
//! - Prompt and completion text stay inside request and event values; log
//!   callers must restrict themselves to lengths and counts.
//! - The shield kill switch can disable capture protection per run without
//!   touching the chat path.

use thiserror::Error;
use veil_chat::{
    CancelToken, ChatClient, ChatError, DEFAULT_GENERATE_ENDPOINT, GenerateRequest,
    validate_generate_endpoint,
};
use veil_core::{CoreError, StreamId, Transcript, resolve_model};
use veil_ui::OverlayUiState;

/// Build-time application version loaded from root `VERSION` file.
pub const APP_VERSION: &str = env!("VEIL_VERSION");

/// Instruction preamble prepended to every generate prompt.
pub const ASSISTANT_INSTRUCTION: &str = "You are an expert software engineering assistant. \
Answer as quickly as possible; be concise and to the point, but keep answers informative and \
technically deep. For technical questions give the direct, expert-level answer first, then a \
brief explanation. Do not use <think> or similar tags in your response. If you output code, \
format it as a single code block between triple backticks (```), and do not add extra \
commentary inside the code block.";

/// Consolidated runtime status snapshot for simple UI projection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeStatus {
    /// Whether the kill switch currently allows shield attempts.
    pub shield_enabled: bool,
    /// Shield status line text.
    pub shield: String,
    /// Stream status line text.
    pub stream: String,
    /// Model id selected for the next submission.
    pub selected_model: String,
    /// Number of live streams.
    pub live_streams: usize,
}

/// One gated submission ready for a worker thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    /// Trimmed user text shown in the transcript.
    pub display_text: String,
    /// Wire request carrying the composed prompt.
    pub request: GenerateRequest,
}

/// Outcome unit of one completion stream, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// One non-empty completion increment.
    Fragment(String),
    /// Stream ended at EOF or after cancellation.
    Completed,
    /// Stream failed; carries the terminal error detail. No retry follows.
    Failed(String),
}

/// Returns the app version sourced from root `VERSION`.
pub fn app_version() -> &'static str {
    APP_VERSION
}

/// Composes the full generate prompt for one user message.
pub fn compose_prompt(user_text: &str) -> String {
    format!("{ASSISTANT_INSTRUCTION}\n\nUser: {user_text}")
}

/// Gates and prepares one submission.
///
/// Returns `None` when `raw_input` is empty after trimming; the caller must
/// ignore the submission silently without contacting the endpoint. Unknown
/// model ids resolve to the catalog default.
pub fn prepare_submission(raw_input: &str, model_id: &str) -> Option<Submission> {
    let trimmed = raw_input.trim();
    if trimmed.is_empty() {
        return None;
    }

    let model = resolve_model(model_id);
    Some(Submission {
        display_text: trimmed.to_string(),
        request: GenerateRequest {
            model: model.id.to_string(),
            prompt: compose_prompt(trimmed),
        },
    })
}

/// Appends the submission's user message to the transcript.
///
/// # Errors
/// Returns [`AppError::Core`] when the display text is blank; prepared
/// submissions never carry blank text.
pub fn record_user_message(
    transcript: &mut Transcript,
    submission: &Submission,
) -> Result<(), AppError> {
    transcript
        .push_user(&submission.display_text)
        .map_err(AppError::Core)?;
    Ok(())
}

/// Runs one completion stream to its end, forwarding events in order.
///
/// Opens the stream through `client`; open failure produces a single
/// [`StreamEvent::Failed`]. Fragments with a non-empty chunk become
/// [`StreamEvent::Fragment`]; a stream-phase error becomes
/// [`StreamEvent::Failed`] and ends the loop. EOF and cancellation both end
/// the stream with [`StreamEvent::Completed`].
pub fn run_chat_stream<F>(
    client: &ChatClient,
    request: &GenerateRequest,
    token: CancelToken,
    mut on_event: F,
) where
    F: FnMut(StreamEvent),
{
    let stream = match client.stream_generate(request, token) {
        Ok(stream) => stream,
        Err(error) => {
            on_event(StreamEvent::Failed(error.to_string()));
            return;
        }
    };

    for fragment in stream {
        match fragment {
            Ok(fragment) => {
                if let Some(chunk) = fragment.chunk() {
                    on_event(StreamEvent::Fragment(chunk.to_string()));
                }
            }
            Err(error) => {
                on_event(StreamEvent::Failed(error.to_string()));
                return;
            }
        }
    }

    on_event(StreamEvent::Completed);
}

/// Applies one stream event to the transcript slot owned by `stream`.
///
/// `Fragment` appends in place, `Completed` closes the slot behind the
/// end-of-response separator, and `Failed` abandons the slot and records one
/// system line naming the error.
pub fn apply_stream_event(transcript: &mut Transcript, stream: StreamId, event: StreamEvent) {
    match event {
        StreamEvent::Fragment(chunk) => transcript.append_assistant(stream, &chunk),
        StreamEvent::Completed => {
            transcript.finish_stream(stream);
        }
        StreamEvent::Failed(detail) => {
            transcript.abandon_stream(stream);
            transcript.push_system(format!("[generate error: {detail}]"));
        }
    }
}

/// Checks the runtime shield kill-switch env var.
///
/// Semantics:
/// - Unset => shield enabled.
/// - `0`, `false`, `off` (case-insensitive) => shield disabled.
/// - Any other value => shield enabled.
pub fn shield_enabled_from_env() -> bool {
    match std::env::var("VEIL_SHIELD_ENABLED") {
        Ok(value) => {
            let normalized = value.trim().to_ascii_lowercase();
            !(normalized == "0" || normalized == "false" || normalized == "off")
        }
        Err(_) => true,
    }
}

/// Resolves the generate endpoint, honoring the env override.
///
/// # Errors
/// Returns [`AppError::Chat`] when `VEIL_GENERATE_ENDPOINT` is set but
/// violates endpoint policy; the default endpoint is never rejected.
pub fn generate_endpoint_from_env() -> Result<String, AppError> {
    match std::env::var("VEIL_GENERATE_ENDPOINT") {
        Ok(value) => {
            let trimmed = value.trim().to_string();
            validate_generate_endpoint(&trimmed).map_err(AppError::Chat)?;
            Ok(trimmed)
        }
        Err(_) => Ok(DEFAULT_GENERATE_ENDPOINT.to_string()),
    }
}

/// Projects overlay state into flat status snapshot.
pub fn project_runtime_status(state: &OverlayUiState) -> RuntimeStatus {
    RuntimeStatus {
        shield_enabled: shield_enabled_from_env(),
        shield: state.shield.status_text().to_string(),
        stream: state.stream.status_text().to_string(),
        selected_model: state.selected_model.clone(),
        live_streams: state.live_streams,
    }
}

/// App integration error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Conversation model error.
    #[error("core error: {0}")]
    Core(CoreError),
    /// Chat client or endpoint policy error.
    #[error("chat error: {0}")]
    Chat(ChatError),
}
