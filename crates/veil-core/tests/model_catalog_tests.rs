//! Tests the fixed model catalog and default resolution.

use veil_core::{DEFAULT_MODEL_ID, available_models, default_model, find_model, resolve_model};

#[test]
fn model_catalog_tests_keeps_selector_order_stable() {
    let ids: Vec<&str> = available_models().iter().map(|model| model.id).collect();
    assert_eq!(
        ids,
        vec![
            "deepseek-r1:14b",
            "deepseek-r1:7b",
            "deepseek-r1:32b",
            "llama4:latest",
            "qwen3:0.6b",
            "granite3.3:8b",
            "granite3.3:2b",
            "granite3.2-vision:latest",
        ]
    );
}

#[test]
fn model_catalog_tests_default_is_catalog_member() {
    assert_eq!(default_model().id, DEFAULT_MODEL_ID);
    assert!(find_model(DEFAULT_MODEL_ID).is_some());
}

#[test]
fn model_catalog_tests_resolves_unknown_ids_to_default() {
    assert_eq!(resolve_model("not-a-model").id, DEFAULT_MODEL_ID);
    assert_eq!(resolve_model("").id, DEFAULT_MODEL_ID);
    assert_eq!(resolve_model("llama4:latest").id, "llama4:latest");
}

#[test]
fn model_catalog_tests_display_names_are_nonempty() {
    for model in available_models() {
        assert!(!model.display_name.trim().is_empty(), "{}", model.id);
    }
}
