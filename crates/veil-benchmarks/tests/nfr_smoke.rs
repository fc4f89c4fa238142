//! Benchmark smoke test for the streaming transcript render loop.

use std::time::Instant;

use veil_core::{StreamId, Transcript};
use veil_ui::{incremental_suffix, render_transcript};

#[test]
fn benchmark_stream_render_smoke_prints_latency() {
    let mut transcript = Transcript::new();
    let stream = StreamId::new(1);
    transcript
        .push_user("benchmark prompt")
        .expect("user line should append");

    let start = Instant::now();
    let mut appended_bytes = 0usize;
    let mut rendered_previous = String::new();

    // Re-render at the cadence of a drained worker batch, not per fragment.
    for index in 0..10_000_u64 {
        transcript.append_assistant(stream, "chunk ");
        if index % 64 == 0 {
            let rendered = render_transcript(&transcript);
            if let Some(suffix) = incremental_suffix(&rendered_previous, &rendered) {
                appended_bytes += suffix.len();
            }
            rendered_previous = rendered;
        }
    }

    transcript.finish_stream(stream);
    let rendered = render_transcript(&transcript);
    if let Some(suffix) = incremental_suffix(&rendered_previous, &rendered) {
        appended_bytes += suffix.len();
    }

    let elapsed_ms = start.elapsed().as_millis();
    println!("benchmark_stream_render_elapsed_ms={elapsed_ms}");
    println!("benchmark_appended_byte_total={appended_bytes}");

    // This is a lightweight guardrail; strict NFR checks are environment-specific.
    assert!(
        elapsed_ms < 5_000,
        "stream render smoke benchmark should stay bounded"
    );
}
