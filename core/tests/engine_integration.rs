use std::fs;

use anyhow::Result;
use jadeite::{CachingLoader, Engine, Error};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_full_page_renders_in_document_order() {
    let src = "doctype html\nhtml\n  head\n    title= t\n  body\n    h1= t";
    let html = Engine::new()
        .render_string(src, &json!({"t": "T"}))
        .expect("render failed");
    assert_eq!(
        html,
        "<!DOCTYPE html><html><head><title>T</title></head><body><h1>T</h1></body></html>"
    );
}

#[test]
fn test_render_is_deterministic() {
    let src = "ul\n  each v, k in m\n    li #{k}=#{v}";
    let data = json!({"m": {"x": 1, "y": 2, "z": 3}});
    let engine = Engine::new();
    let first = engine.render_string(src, &data).expect("render failed");
    let second = engine.render_string(src, &data).expect("render failed");
    assert_eq!(first, second);
    assert_eq!(first, "<ul><li>x=1</li><li>y=2</li><li>z=3</li></ul>");
}

#[test]
fn test_parse_errors_abort_the_render() {
    let err = Engine::new()
        .render_string("div(", &json!({}))
        .unwrap_err();
    assert!(matches!(err, Error::Parse(_)));

    let err = Engine::new()
        .render_string("p\n  a\n\tb", &json!({}))
        .unwrap_err();
    assert!(err.to_string().contains("Cannot mix indentation"));
}

#[test]
fn test_eval_errors_carry_template_and_line() {
    let err = Engine::new()
        .render_string("p fine\np= boom()", &json!({}))
        .unwrap_err();
    let text = err.to_string();
    assert!(text.contains("<string>"), "missing template name: {}", text);
    assert!(text.contains("line 2"), "missing line number: {}", text);
}

#[test]
fn test_render_file_to_writes_bytes() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("page.jade"), "p= n")?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let mut out = Vec::new();
    engine.render_file_to(&mut out, "page", &json!({"n": 5}))?;
    assert_eq!(out, b"<p>5</p>");
    Ok(())
}

#[test]
fn test_caching_loader_serves_repeat_renders() -> Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("page.jade"), "p= n")?;
    let mut engine = Engine::new();
    engine.set_loader(Box::new(CachingLoader::new(16)));
    engine.set_view_path(dir.path());
    assert_eq!(engine.render_file("page", &json!({"n": 1}))?, "<p>1</p>");
    assert_eq!(engine.render_file("page", &json!({"n": 2}))?, "<p>2</p>");
    Ok(())
}

#[test]
fn test_warnings_are_collected_per_render() {
    let engine = Engine::new();
    let (_, warnings) = engine
        .render_string_with_warnings("p= ghost", &json!({}))
        .expect("render failed");
    assert_eq!(warnings.len(), 1);

    // A clean render starts from an empty warning list.
    let (_, warnings) = engine
        .render_string_with_warnings("p ok", &json!({}))
        .expect("render failed");
    assert!(warnings.is_empty());
}

#[test]
fn test_shared_engine_renders_with_different_data() {
    let engine = Engine::new();
    let a = engine.render_string("p= x", &json!({"x": 1})).unwrap();
    let b = engine.render_string("p= x", &json!({"x": 2})).unwrap();
    assert_eq!(a, "<p>1</p>");
    assert_eq!(b, "<p>2</p>");
}

#[test]
fn test_struct_data_context_via_serde() {
    #[derive(serde::Serialize)]
    struct Page {
        title: String,
        tags: Vec<String>,
    }
    let page = Page {
        title: "Home".to_string(),
        tags: vec!["a".to_string(), "b".to_string()],
    };
    let html = Engine::new()
        .render_string("h1= title\np= len(tags)", &page)
        .expect("render failed");
    assert_eq!(html, "<h1>Home</h1><p>2</p>");
}

#[test]
fn test_beautify_pretty_prints_nested_lists() {
    let mut engine = Engine::new();
    engine.set_beautify(true);
    let html = engine
        .render_string("div\n  p a\n  p b", &json!({}))
        .expect("render failed");
    assert_eq!(html, "<div>\n  <p>a</p>\n  <p>b</p>\n</div>\n");
}
