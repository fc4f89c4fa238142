//! Tests shield behavior on platforms without affinity support.

mod common;

use std::sync::Arc;

use common::fixture_window;
use veil_affinity::{
    AffinityBackend, AffinityError, AffinityMode, CaptureShield, NoopAffinityBackend,
    detect_backend,
};

#[test]
fn platform_support_tests_noop_backend_reports_unsupported() {
    let backend = NoopAffinityBackend::new();
    let window = fixture_window();

    assert!(matches!(
        backend.read_extended_style(window),
        Err(AffinityError::Unsupported)
    ));
    assert!(matches!(
        backend.write_extended_style(window, 0),
        Err(AffinityError::Unsupported)
    ));
    assert!(matches!(
        backend.set_display_affinity(window, AffinityMode::ExcludedFromCapture),
        Err(AffinityError::Unsupported)
    ));
}

#[test]
fn platform_support_tests_shield_is_inert_without_support() {
    let mut shield = CaptureShield::new(fixture_window(), Arc::new(NoopAffinityBackend::new()));

    let apply = shield.apply();
    assert_eq!(apply.mode, AffinityMode::Normal);
    assert!(!apply.is_protected());
    assert!(matches!(apply.style_error, Some(AffinityError::Unsupported)));
    assert!(matches!(
        apply.exclude_error,
        Some(AffinityError::Unsupported)
    ));

    let reset = shield.reset();
    assert!(reset.is_clean());
    assert!(!reset.style_restored);
    assert!(!reset.affinity_cleared);
    assert_eq!(shield.mode(), AffinityMode::Normal);
}

#[test]
fn platform_support_tests_detected_backend_never_panics() {
    // An invalid handle exercises the failure paths of whichever backend the
    // platform provides; both operations must stay non-raising.
    let mut shield = CaptureShield::new(veil_affinity::WindowHandle::new(0), detect_backend());

    let _ = shield.apply();
    let _ = shield.reset();
    let _ = shield.reset();
}
