#![warn(missing_docs)]
//! # veil-ui
//!
//! ## Purpose
//! Defines the UI-facing runtime state model and transcript rendering for
//! `veil`.
//!
//! ## Responsibilities
//! - Represent shield and stream statuses shown by the overlay.
//! - Gate submissions on non-blank input.
//! - Render transcript entries into the fixed display format.
//!
//! ## Data flow
//! App orchestration events mutate [`OverlayUiState`], which drives the
//! status controls; [`render_transcript`] turns the core transcript into the
//! text shown in the conversation view.
//!
//! ## Ownership and lifetimes
//! State owns all string values to simplify event reducers and keep the
//! shell's thread-local cell free of borrows.
//!
//! ## Error model
//! This crate favors explicit state over recoverable errors. Invalid
//! combinations are prevented by guard methods.
//!
//! ## Security and privacy notes
//! UI state holds the selected model id and status labels only; transcript
//! text lives in `veil-core` and is rendered on demand.

use veil_core::{DEFAULT_MODEL_ID, MessageSender, Transcript, TranscriptEntry};

/// Horizontal rule rendered between conversation turns.
pub const SEPARATOR_LINE: &str =
    "────────────────────────────────────────────";

/// Label prefixed to user messages.
pub const USER_LABEL: &str = "You: ";

/// Label prefixed to assistant messages.
pub const ASSISTANT_LABEL: &str = "AI: ";

/// Shield status projection for the status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShieldProjection {
    /// Shield has not been applied yet.
    NotApplied,
    /// Window is excluded from capture APIs.
    CaptureExcluded,
    /// Window renders only on the physical monitor.
    MonitorOnly,
    /// Both affinity attempts failed; the window is capturable.
    Unprotected,
    /// Kill switch disabled shielding for this run.
    Disabled,
}

impl ShieldProjection {
    /// Returns display text for the shield status control.
    pub fn status_text(self) -> &'static str {
        match self {
            ShieldProjection::NotApplied => "Shield: pending",
            ShieldProjection::CaptureExcluded => "Shield: capture excluded",
            ShieldProjection::MonitorOnly => "Shield: monitor only",
            ShieldProjection::Unprotected => "Shield: unprotected",
            ShieldProjection::Disabled => "Shield: disabled",
        }
    }
}

/// Stream stage status used for the activity line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePhase {
    /// No stream has run yet.
    Idle,
    /// At least one stream is live.
    Running,
    /// Last stream completed without error.
    Settled,
    /// Last stream ended with an error line.
    Degraded,
}

impl StagePhase {
    /// Returns display text for the stream status control.
    pub fn status_text(self) -> &'static str {
        match self {
            StagePhase::Idle => "Stream: idle",
            StagePhase::Running => "Stream: receiving",
            StagePhase::Settled => "Stream: done",
            StagePhase::Degraded => "Stream: error",
        }
    }
}

/// Aggregate overlay runtime state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlayUiState {
    /// App version string sourced from root `VERSION`.
    pub version: String,
    /// Current shield projection.
    pub shield: ShieldProjection,
    /// Current stream stage.
    pub stream: StagePhase,
    /// Model id selected for the next submission.
    pub selected_model: String,
    /// Number of live streams.
    pub live_streams: usize,
}

impl OverlayUiState {
    /// Creates default overlay state with the default model preselected.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            shield: ShieldProjection::NotApplied,
            stream: StagePhase::Idle,
            selected_model: DEFAULT_MODEL_ID.to_string(),
            live_streams: 0,
        }
    }

    /// Sets the model used by the next submission.
    pub fn select_model(&mut self, model_id: impl Into<String>) {
        self.selected_model = model_id.into();
    }

    /// Returns `true` when `input` may be submitted.
    pub fn can_submit(&self, input: &str) -> bool {
        !input.trim().is_empty()
    }

    /// Records the shield outcome.
    pub fn set_shield(&mut self, shield: ShieldProjection) {
        self.shield = shield;
    }

    /// Records a newly started stream.
    pub fn on_stream_started(&mut self) {
        self.live_streams += 1;
        self.stream = StagePhase::Running;
    }

    /// Records a stream that completed normally.
    pub fn on_stream_settled(&mut self) {
        self.live_streams = self.live_streams.saturating_sub(1);
        if self.live_streams == 0 {
            self.stream = StagePhase::Settled;
        }
    }

    /// Records a stream that ended with an error line.
    pub fn on_stream_failed(&mut self) {
        self.live_streams = self.live_streams.saturating_sub(1);
        self.stream = StagePhase::Degraded;
    }
}

/// Renders one transcript entry without its joining prefix.
///
/// Joined after a message's closing line break, the separator block leaves
/// exactly one blank line above and one below the rule.
pub fn render_entry(entry: &TranscriptEntry) -> String {
    match entry {
        TranscriptEntry::Message(message) => match message.sender {
            MessageSender::User => format!("{USER_LABEL}{}", message.text),
            MessageSender::Assistant => format!("{ASSISTANT_LABEL}{}", message.text),
            MessageSender::System => message.text.clone(),
        },
        TranscriptEntry::Separator => format!("\n{SEPARATOR_LINE}\n\n"),
    }
}

/// Returns the joining prefix inserted before an entry.
///
/// A line break closes the preceding message; separators already end in
/// blank lines, so entries after them join directly.
pub fn entry_prefix(previous: Option<&TranscriptEntry>) -> &'static str {
    match previous {
        Some(TranscriptEntry::Message(_)) => "\n",
        _ => "",
    }
}

/// Renders the whole transcript into display text.
pub fn render_transcript(transcript: &Transcript) -> String {
    let mut rendered = String::new();
    let mut previous = None;
    for entry in transcript.entries() {
        rendered.push_str(entry_prefix(previous));
        rendered.push_str(&render_entry(entry));
        previous = Some(entry);
    }
    rendered
}

/// Returns the text appended since `previous` when `current` only grew.
///
/// Chunks land at the rendered tail in the common case, so the shell appends
/// just the suffix; a chunk into an earlier interleaved message rewrites the
/// middle and returns `None`, telling the shell to replace the whole view.
pub fn incremental_suffix<'a>(previous: &str, current: &'a str) -> Option<&'a str> {
    current.strip_prefix(previous)
}

#[cfg(test)]
mod tests {
    //! Unit tests for submission gating and stream stage transitions.

    use super::*;

    #[test]
    fn submit_gate_rejects_blank_input() {
        let state = OverlayUiState::new("v0.1.0");
        assert!(!state.can_submit(""));
        assert!(!state.can_submit("   \n\t"));
        assert!(state.can_submit("  question "));
    }

    #[test]
    fn stream_stage_tracks_live_count() {
        let mut state = OverlayUiState::new("v0.1.0");
        assert_eq!(state.stream, StagePhase::Idle);

        state.on_stream_started();
        state.on_stream_started();
        assert_eq!(state.stream, StagePhase::Running);
        assert_eq!(state.live_streams, 2);

        state.on_stream_settled();
        assert_eq!(state.stream, StagePhase::Running);

        state.on_stream_settled();
        assert_eq!(state.stream, StagePhase::Settled);
        assert_eq!(state.live_streams, 0);

        state.on_stream_started();
        state.on_stream_failed();
        assert_eq!(state.stream, StagePhase::Degraded);
    }
}
