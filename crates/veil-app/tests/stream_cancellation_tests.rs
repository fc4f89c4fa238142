//! Tests mid-stream cancellation and token independence across streams.

mod common;

use std::sync::Arc;

use common::{ScriptedTransport, client_with, collect_stream_events, request_fixture};
use veil_app::{StreamEvent, apply_stream_event, run_chat_stream};
use veil_chat::CancelToken;
use veil_core::{MessageSender, StreamId, Transcript, TranscriptEntry};

const FOUR_FRAGMENT_BODY: &str = "{\"response\":\"a\"}\n{\"response\":\"b\"}\n{\"response\":\"c\"}\n{\"response\":\"d\"}\n";

#[test]
fn stream_cancellation_tests_cancel_mid_stream_keeps_received_text() {
    let client = client_with(Arc::new(ScriptedTransport {
        body: FOUR_FRAGMENT_BODY,
    }));

    let token = CancelToken::new();
    let canceller = token.clone();
    let mut events = Vec::new();
    run_chat_stream(&client, &request_fixture(), token, |event| {
        if matches!(event, StreamEvent::Fragment(_)) {
            let fragments_so_far = events
                .iter()
                .filter(|seen| matches!(seen, StreamEvent::Fragment(_)))
                .count();
            if fragments_so_far == 1 {
                canceller.cancel();
            }
        }
        events.push(event);
    });

    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("a".to_string()),
            StreamEvent::Fragment("b".to_string()),
            StreamEvent::Completed,
        ]
    );

    let mut transcript = Transcript::new();
    for event in events {
        apply_stream_event(&mut transcript, StreamId::new(3), event);
    }

    // A stopped response keeps what arrived and still closes with a separator.
    assert_eq!(transcript.len(), 2);
    match &transcript.entries()[0] {
        TranscriptEntry::Message(message) => {
            assert_eq!(message.sender, MessageSender::Assistant);
            assert_eq!(message.text, "ab");
        }
        TranscriptEntry::Separator => panic!("received fragments should be kept"),
    }
    assert_eq!(transcript.entries()[1], TranscriptEntry::Separator);
    assert_eq!(transcript.live_stream_count(), 0);
}

#[test]
fn stream_cancellation_tests_pre_cancelled_token_yields_no_fragments() {
    let client = client_with(Arc::new(ScriptedTransport {
        body: FOUR_FRAGMENT_BODY,
    }));

    let token = CancelToken::new();
    token.cancel();

    let events = collect_stream_events(&client, &request_fixture(), token);
    assert_eq!(events, vec![StreamEvent::Completed]);
}

#[test]
fn stream_cancellation_tests_new_token_is_independent_of_old() {
    let client = client_with(Arc::new(ScriptedTransport {
        body: "{\"response\":\"fresh\"}\n{\"done\":true}\n",
    }));

    // Cancelling a superseded stream's token must not touch the new stream.
    let old_token = CancelToken::new();
    old_token.cancel();

    let events = collect_stream_events(&client, &request_fixture(), CancelToken::new());
    assert_eq!(
        events,
        vec![
            StreamEvent::Fragment("fresh".to_string()),
            StreamEvent::Completed,
        ]
    );
}
