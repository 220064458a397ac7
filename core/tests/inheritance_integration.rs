use std::fs;

use anyhow::Result;
use jadeite::Engine;
use serde_json::json;
use tempfile::TempDir;

fn view_dir(files: &[(&str, &str)]) -> Result<TempDir> {
    let dir = TempDir::new()?;
    for (name, content) in files {
        fs::write(dir.path().join(name), content)?;
    }
    Ok(dir)
}

#[test]
fn test_child_block_overrides_parent() -> Result<()> {
    let dir = view_dir(&[
        ("layout.jade", "html\n  block body\n    p default"),
        ("index.jade", "extends layout\nblock body\n  p override"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("index", &json!({}))?;
    assert_eq!(html, "<html><p>override</p></html>");
    Ok(())
}

#[test]
fn test_parent_block_renders_when_not_overridden() -> Result<()> {
    let dir = view_dir(&[("layout.jade", "html\n  block body\n    p default")])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("layout", &json!({}))?;
    assert_eq!(html, "<html><p>default</p></html>");
    Ok(())
}

#[test]
fn test_extends_chain_applies_bottom_up() -> Result<()> {
    let dir = view_dir(&[
        ("base.jade", "main\n  block a\n    p base-a\n  block b\n    p base-b"),
        ("middle.jade", "extends base\nblock a\n  p middle-a"),
        ("leaf.jade", "extends middle\nblock b\n  p leaf-b"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("leaf", &json!({}))?;
    assert_eq!(html, "<main><p>middle-a</p><p>leaf-b</p></main>");
    Ok(())
}

#[test]
fn test_extends_cycle_is_detected() -> Result<()> {
    let dir = view_dir(&[
        ("a.jade", "extends b\nblock x\n  p a"),
        ("b.jade", "extends a\nblock y\n  p b"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let err = engine.render_file("a", &json!({})).unwrap_err();
    assert!(err.to_string().contains("loops back"));
    Ok(())
}

#[test]
fn test_include_renders_template_inline() -> Result<()> {
    let dir = view_dir(&[
        ("index.jade", "div\n  include footer"),
        ("footer.jade", "p foot"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("index", &json!({}))?;
    assert_eq!(html, "<div><p>foot</p></div>");
    Ok(())
}

#[test]
fn test_include_writes_plain_files_raw() -> Result<()> {
    let dir = view_dir(&[
        ("index.jade", "div\n  include note.txt"),
        ("note.txt", "plain & <raw>"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("index", &json!({}))?;
    assert_eq!(html, "<div>plain & <raw></div>");
    Ok(())
}

#[test]
fn test_included_template_sees_the_data_context() -> Result<()> {
    let dir = view_dir(&[
        ("index.jade", "div\n  include part"),
        ("part.jade", "p= name"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("index", &json!({"name": "x"}))?;
    assert_eq!(html, "<div><p>x</p></div>");
    Ok(())
}

#[test]
fn test_mixins_from_parent_are_callable_in_child() -> Result<()> {
    let dir = view_dir(&[
        (
            "layout.jade",
            "mixin badge(t)\n  span= t\nhtml\n  block body",
        ),
        ("index.jade", "extends layout\nblock body\n  +badge(\"new\")"),
    ])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_file("index", &json!({}))?;
    assert_eq!(html, "<html><span>new</span></html>");
    Ok(())
}

#[test]
fn test_missing_template_is_a_loader_error() {
    let mut engine = Engine::new();
    engine.set_view_path("/nonexistent-view-path");
    let err = engine.render_file("nope", &json!({})).unwrap_err();
    assert!(matches!(err, jadeite::Error::Loader(_)));
}

#[test]
fn test_render_string_can_extend_files() -> Result<()> {
    let dir = view_dir(&[("layout.jade", "html\n  block body\n    p default")])?;
    let mut engine = Engine::new();
    engine.set_view_path(dir.path());
    let html = engine.render_string("extends layout\nblock body\n  p inline", &json!({}))?;
    assert_eq!(html, "<html><p>inline</p></html>");
    Ok(())
}
