// AST node definitions: central representation consumed by the evaluator and
// the HTML writer.

use std::collections::HashMap;

use serde::Serialize;

use crate::error::ParseError;

// Names of the internal functions the parser synthesises into the tree.
pub(crate) const ESCAPE_HTML_FN: &str = "escapeHtml";
pub(crate) const EXPLODE_ATTRIBUTES_FN: &str = "explodeAttributes";
pub(crate) const MIXIN_CALL_FN: &str = "callMixin";
pub(crate) const BLOCK_FN: &str = "block";

// Generic AST node: a token payload plus ordered children. Parent context is
// carried by an explicit stack during parsing and by the walker during
// evaluation, never by back-pointers.
#[derive(Debug, Clone, Serialize)]
pub struct Node {
    pub token: Token,
    pub children: Vec<Node>,
    pub pos: usize,
}

impl Node {
    pub fn new(token: Token, pos: usize) -> Self {
        Node {
            token,
            children: Vec::new(),
            pos,
        }
    }
}

// All token payloads
#[derive(Debug, Clone, Serialize)]
pub enum Token {
    // Root, or a grouping node with no output of its own
    Empty,
    Number(f64),
    Text(String),
    Bool(bool),
    // Dotted member chain with optional call, index, and continuation
    Ident(Ident),
    // Binary or unary operator; operands are the node's children
    Operator(String),
    Group(GroupKind),
    // Attribute or object-literal entry; the value is the node's first child
    KeyValue(String),
    Tag(Tag),
    // Doctype keyword arguments as raw strings
    Doctype(Vec<String>),
    Comment(CommentKind),
    // Embedded parse failure
    Error(String),
}

// One segment of an identifier chain: `a.b[i].c(args)` is a linked list of
// these. `is_identifier` distinguishes a member read from a call site.
#[derive(Debug, Clone, Serialize)]
pub struct Ident {
    pub name: String,
    pub is_identifier: bool,
    pub args: Vec<Node>,
    pub index: Option<Box<Node>>,
    pub next: Option<Box<Ident>>,
}

impl Ident {
    pub fn identifier(name: impl Into<String>) -> Self {
        Ident {
            name: name.into(),
            is_identifier: true,
            args: Vec::new(),
            index: None,
            next: None,
        }
    }

    pub fn call(name: impl Into<String>) -> Self {
        Ident {
            is_identifier: false,
            ..Ident::identifier(name)
        }
    }

    /// The last segment of the chain, for appending.
    pub fn tail_mut(&mut self) -> &mut Ident {
        let mut seg = self;
        while seg.next.is_some() {
            seg = seg.next.as_deref_mut().unwrap();
        }
        seg
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GroupKind {
    // `(...)` - parenthesised expression
    Paren,
    // `[...]` - array literal
    Array,
    // `{...}` - object literal
    Object,
    // Anonymous list, e.g. accumulated class names
    Anon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CommentKind {
    // `//` - rendered as an HTML comment
    Visible,
    // `//-` - omitted from output
    Hidden,
}

// HTML element: attribute nodes are Token::KeyValue, Token::Text (bare
// attributes), or expression nodes to be spread at render time.
#[derive(Debug, Clone, Serialize)]
pub struct Tag {
    pub name: String,
    pub attributes: Vec<Node>,
    pub self_closing: bool,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Tag {
            name: name.into(),
            attributes: Vec::new(),
            self_closing: false,
        }
    }

    pub fn add_attribute(&mut self, attr: Node) {
        self.attributes.push(attr);
    }

    /// Add or replace a named attribute. `class` accumulates instead of
    /// replacing.
    pub fn add_key_value(&mut self, key: &str, value: Node) {
        if key.eq_ignore_ascii_case("class") {
            self.set_class(value);
            return;
        }
        if let Some(existing) = self.find_attribute_mut(key) {
            existing.children.clear();
            existing.children.push(value);
            return;
        }
        let mut kv = Node::new(Token::KeyValue(key.to_string()), value.pos);
        kv.children.push(value);
        self.attributes.push(kv);
    }

    /// Append a class value; all classes share one `class` attribute whose
    /// value is an anonymous group joined with spaces at render time.
    pub fn set_class(&mut self, value: Node) {
        let pos = value.pos;
        if self.find_attribute_mut("class").is_none() {
            let mut kv = Node::new(Token::KeyValue("class".to_string()), pos);
            kv.children.push(Node::new(Token::Group(GroupKind::Anon), pos));
            self.attributes.push(kv);
        }
        let kv = self.find_attribute_mut("class").unwrap();
        kv.children[0].children.push(value);
    }

    fn find_attribute_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.attributes.iter_mut().find(|node| {
            matches!(&node.token, Token::KeyValue(k) if k.eq_ignore_ascii_case(key))
        })
    }
}

// Operator precedence, tightest first. The parser consults this to build the
// expression tree; ties reuse the current level.
const OPERATOR_LEVELS: &[&[&str]] = &[
    &["*", "/", "%"],
    &["+", "-"],
    &["==", "!=", ">=", "<=", ">", "<"],
    &["&&", "and"],
    &["||", "or"],
    &[":"],
    &["?"],
    &["="],
];

/// Binding level of an operator: higher binds tighter. `None` for unknown
/// text.
pub fn operator_level(op: &str) -> Option<usize> {
    OPERATOR_LEVELS.iter().enumerate().find_map(|(i, ops)| {
        ops.contains(&op).then_some(OPERATOR_LEVELS.len() - i)
    })
}

// Outcome of parsing one template source
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub root: Node,
    pub error: Option<ParseError>,
    pub warnings: Vec<String>,
    pub mixins: HashMap<String, Node>,
    pub blocks: HashMap<String, Node>,
    pub extends: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_levels_tightest_first() {
        assert!(operator_level("*") > operator_level("+"));
        assert!(operator_level("+") > operator_level("=="));
        assert!(operator_level("==") > operator_level("&&"));
        assert!(operator_level("&&") > operator_level("||"));
        assert!(operator_level("||") > operator_level(":"));
        assert!(operator_level(":") > operator_level("?"));
        assert!(operator_level("?") > operator_level("="));
        assert_eq!(operator_level("??"), None);
    }

    #[test]
    fn test_class_values_accumulate() {
        let mut tag = Tag::new("div");
        tag.add_key_value("class", Node::new(Token::Text("a".into()), 0));
        tag.add_key_value("class", Node::new(Token::Text("b".into()), 0));
        assert_eq!(tag.attributes.len(), 1);
        assert_eq!(tag.attributes[0].children[0].children.len(), 2);
    }

    #[test]
    fn test_repeated_attribute_replaces_value() {
        let mut tag = Tag::new("div");
        tag.add_key_value("id", Node::new(Token::Text("a".into()), 0));
        tag.add_key_value("id", Node::new(Token::Text("b".into()), 0));
        assert_eq!(tag.attributes.len(), 1);
        assert!(matches!(
            &tag.attributes[0].children[0].token,
            Token::Text(t) if t == "b"
        ));
    }
}
