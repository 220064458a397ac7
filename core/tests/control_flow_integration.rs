use jadeite::Engine;
use serde_json::json;

fn render(src: &str, data: serde_json::Value) -> String {
    Engine::new().render_string(src, &data).expect("render failed")
}

#[test]
fn test_if_else_takes_the_matching_branch() {
    let src = "if n > 0\n  p positive\nelse\n  p non-positive";
    assert_eq!(render(src, json!({"n": 3})), "<p>positive</p>");
    assert_eq!(render(src, json!({"n": 0})), "<p>non-positive</p>");
}

#[test]
fn test_else_if_chains() {
    let src = "if n > 0\n  p pos\nelse if n < 0\n  p neg\nelse\n  p zero";
    assert_eq!(render(src, json!({"n": 2})), "<p>pos</p>");
    assert_eq!(render(src, json!({"n": -1})), "<p>neg</p>");
    assert_eq!(render(src, json!({"n": 0})), "<p>zero</p>");
}

#[test]
fn test_unless_renders_on_false() {
    let src = "unless done\n  p pending";
    assert_eq!(render(src, json!({"done": false})), "<p>pending</p>");
    assert_eq!(render(src, json!({"done": true})), "");
}

#[test]
fn test_truthiness_of_collections_and_strings() {
    let src = "if items\n  p some\nelse\n  p none";
    assert_eq!(render(src, json!({"items": [1]})), "<p>some</p>");
    assert_eq!(render(src, json!({"items": []})), "<p>none</p>");
    assert_eq!(render(src, json!({"items": ""})), "<p>none</p>");
    // A missing variable is quietly false.
    assert_eq!(render(src, json!({})), "<p>none</p>");
}

#[test]
fn test_each_over_a_list() {
    let src = "ul\n  each x in items\n    li= x";
    let html = render(src, json!({"items": ["a", "b"]}));
    assert_eq!(html, "<ul><li>a</li><li>b</li></ul>");
}

#[test]
fn test_each_with_positional_index() {
    let src = "each v, i in items\n  p #{i}:#{v}";
    let html = render(src, json!({"items": ["a", "b"]}));
    assert_eq!(html, "<p>0:a</p><p>1:b</p>");
}

#[test]
fn test_each_over_a_map_binds_keys() {
    let src = "each v, k in obj\n  p #{k}=#{v}";
    let html = render(src, json!({"obj": {"a": 1, "b": 2}}));
    assert_eq!(html, "<p>a=1</p><p>b=2</p>");
}

#[test]
fn test_each_over_a_number_counts_from_zero() {
    let html = render("each i in 3\n  span= i", json!({}));
    assert_eq!(html, "<span>0</span><span>1</span><span>2</span>");
}

#[test]
fn test_each_over_an_invalid_source_fails() {
    let err = Engine::new()
        .render_string("each x in name\n  p= x", &json!({"name": "str"}))
        .unwrap_err();
    assert!(err.to_string().contains("each"));
}

#[test]
fn test_each_scope_is_popped_after_the_loop() {
    // The loop variable must not leak into the outer scope.
    let src = "each x in items\n  p= x\np= x";
    let (html, warnings) = Engine::new()
        .render_string_with_warnings(src, &json!({"items": ["a"]}))
        .expect("render failed");
    assert_eq!(html, "<p>a</p><p></p>");
    assert!(!warnings.is_empty());
}

#[test]
fn test_case_matches_by_equality() {
    let src = "case n\n  when 1: p one\n  when 2\n    p two\n  default\n    p other";
    assert_eq!(render(src, json!({"n": 1})), "<p>one</p>");
    assert_eq!(render(src, json!({"n": 2})), "<p>two</p>");
    assert_eq!(render(src, json!({"n": 9})), "<p>other</p>");
}

#[test]
fn test_case_empty_arm_falls_through() {
    let src = "case n\n  when 1\n  when 2\n    p low\n  default\n    p high";
    assert_eq!(render(src, json!({"n": 1})), "<p>low</p>");
    assert_eq!(render(src, json!({"n": 2})), "<p>low</p>");
    assert_eq!(render(src, json!({"n": 3})), "<p>high</p>");
}

#[test]
fn test_case_without_subject_tests_arm_truth() {
    let src = "case\n  when a\n    p a\n  when b\n    p b";
    assert_eq!(render(src, json!({"a": false, "b": true})), "<p>b</p>");
}

#[test]
fn test_var_assignment_is_global_for_the_render() {
    let src = "- var city = \"Oslo\"\np= city";
    assert_eq!(render(src, json!({})), "<p>Oslo</p>");
}

#[test]
fn test_var_assigned_inside_each_survives_the_frame() {
    let src = "each x in items\n  - var last = x\np= last";
    assert_eq!(render(src, json!({"items": ["a", "b"]})), "<p>b</p>");
}
