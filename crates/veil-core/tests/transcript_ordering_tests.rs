//! Tests transcript append ordering and per-stream assistant slots.

use veil_core::{ChatMessage, CoreError, MessageSender, StreamId, Transcript, TranscriptEntry};

fn message_at(transcript: &Transcript, index: usize) -> &ChatMessage {
    match &transcript.entries()[index] {
        TranscriptEntry::Message(message) => message,
        TranscriptEntry::Separator => panic!("expected message at entry {index}"),
    }
}

#[test]
fn transcript_ordering_tests_appends_user_stream_and_separator_in_order() {
    let mut transcript = Transcript::new();
    transcript.push_user("hi").expect("user text should be accepted");

    let stream = StreamId::new(1);
    transcript.append_assistant(stream, "Hel");
    transcript.append_assistant(stream, "lo");
    assert!(transcript.finish_stream(stream));

    assert_eq!(transcript.len(), 3);
    assert_eq!(message_at(&transcript, 0).sender, MessageSender::User);
    assert_eq!(message_at(&transcript, 0).text, "hi");
    assert_eq!(message_at(&transcript, 1).sender, MessageSender::Assistant);
    assert_eq!(message_at(&transcript, 1).text, "Hello");
    assert!(matches!(
        transcript.entries()[2],
        TranscriptEntry::Separator
    ));
    assert_eq!(transcript.live_stream_count(), 0);
}

#[test]
fn transcript_ordering_tests_trims_user_text_before_storage() {
    let mut transcript = Transcript::new();
    transcript
        .push_user("  padded question \n")
        .expect("user text should be accepted");

    assert_eq!(message_at(&transcript, 0).text, "padded question");
}

#[test]
fn transcript_ordering_tests_rejects_blank_user_text_unchanged() {
    let mut transcript = Transcript::new();
    let result = transcript.push_user("   \n\t");

    assert!(matches!(result, Err(CoreError::EmptyMessage)));
    assert!(transcript.is_empty());
}

#[test]
fn transcript_ordering_tests_routes_chunks_to_owning_stream() {
    let mut transcript = Transcript::new();
    let first = StreamId::new(7);
    let second = StreamId::new(8);

    transcript.append_assistant(first, "alpha-");
    transcript.append_assistant(second, "beta-");
    transcript.append_assistant(first, "one");
    transcript.append_assistant(second, "two");

    assert_eq!(transcript.live_stream_count(), 2);
    assert_eq!(message_at(&transcript, 0).text, "alpha-one");
    assert_eq!(message_at(&transcript, 1).text, "beta-two");

    assert!(transcript.finish_stream(first));
    assert!(transcript.finish_stream(second));
    assert_eq!(transcript.live_stream_count(), 0);
    assert_eq!(transcript.len(), 4);
}

#[test]
fn transcript_ordering_tests_appends_in_place_across_later_entries() {
    let mut transcript = Transcript::new();
    let stream = StreamId::new(3);

    transcript.append_assistant(stream, "first ");
    transcript
        .push_user("second question")
        .expect("user text should be accepted");
    transcript.append_assistant(stream, "half");

    assert_eq!(message_at(&transcript, 0).text, "first half");
    assert_eq!(message_at(&transcript, 1).sender, MessageSender::User);
}

#[test]
fn transcript_ordering_tests_records_separator_for_chunkless_stream() {
    let mut transcript = Transcript::new();

    assert!(!transcript.finish_stream(StreamId::new(42)));
    assert_eq!(transcript.len(), 1);
    assert!(matches!(
        transcript.entries()[0],
        TranscriptEntry::Separator
    ));
}

#[test]
fn transcript_ordering_tests_abandon_closes_slot_without_separator() {
    let mut transcript = Transcript::new();
    let stream = StreamId::new(5);

    transcript.append_assistant(stream, "partial");
    assert!(transcript.abandon_stream(stream));
    assert!(!transcript.abandon_stream(stream));

    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript.live_stream_count(), 0);

    transcript.push_system("[generate error: endpoint returned status 500]");
    assert_eq!(transcript.len(), 3);
    assert_eq!(message_at(&transcript, 1).sender, MessageSender::System);
    assert!(matches!(
        transcript.entries()[2],
        TranscriptEntry::Separator
    ));
}
