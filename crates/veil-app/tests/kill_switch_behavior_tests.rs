//! Integration tests for the capture-shield kill switch.

use veil_app::shield_enabled_from_env;

#[test]
fn kill_switch_behavior_tests_disables_shield_when_env_opts_out() {
    // Safety:
    // - Integration tests mutate process env in a single-threaded test body.
    // - We reset the variable before returning.
    unsafe { std::env::set_var("VEIL_SHIELD_ENABLED", "false") };
    assert!(!shield_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::set_var("VEIL_SHIELD_ENABLED", "0") };
    assert!(!shield_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::set_var("VEIL_SHIELD_ENABLED", " OFF ") };
    assert!(!shield_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::set_var("VEIL_SHIELD_ENABLED", "true") };
    assert!(shield_enabled_from_env());

    // Unrecognized values leave the shield on.
    // Safety: see rationale above.
    unsafe { std::env::set_var("VEIL_SHIELD_ENABLED", "maybe") };
    assert!(shield_enabled_from_env());

    // Safety: see rationale above.
    unsafe { std::env::remove_var("VEIL_SHIELD_ENABLED") };
    assert!(shield_enabled_from_env());
}
