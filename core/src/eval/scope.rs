// Layered name resolution for a single render: the bottom frame is the
// template's global scope, and `each` loops and mixin calls push frames on
// top of it.

use std::collections::HashMap;

use super::value::Value;

pub struct ScopeStack {
    frames: Vec<HashMap<String, Value>>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack {
            frames: vec![HashMap::new()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(HashMap::new());
    }

    /// Drop the top frame. The global frame is never dropped.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    /// Bind a name in the top frame.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.frames.last_mut().unwrap().insert(name.into(), value);
    }

    /// Bind a name in the bottom (global) frame, as `var` assignment does.
    pub fn set_global(&mut self, name: impl Into<String>, value: Value) {
        self.frames[0].insert(name.into(), value);
    }

    /// Look a name up from the top frame down.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.frames.iter().rev().find_map(|frame| frame.get(name))
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

impl Default for ScopeStack {
    fn default() -> Self {
        ScopeStack::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_searches_top_down() {
        let mut scope = ScopeStack::new();
        scope.set("x", Value::from(1.0));
        scope.push_frame();
        scope.set("x", Value::from(2.0));
        assert!(matches!(scope.get("x"), Some(Value::Number(n)) if *n == 2.0));
        scope.pop_frame();
        assert!(matches!(scope.get("x"), Some(Value::Number(n)) if *n == 1.0));
    }

    #[test]
    fn test_set_global_writes_bottom_frame() {
        let mut scope = ScopeStack::new();
        scope.push_frame();
        scope.set_global("x", Value::from("global"));
        scope.pop_frame();
        assert!(scope.get("x").is_some());
    }

    #[test]
    fn test_global_frame_survives_extra_pops() {
        let mut scope = ScopeStack::new();
        scope.set("x", Value::from(1.0));
        scope.pop_frame();
        scope.pop_frame();
        assert_eq!(scope.depth(), 1);
        assert!(scope.get("x").is_some());
    }
}
