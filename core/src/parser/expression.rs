// Expression parser: a value-part/operator-part pump with precedence
// climbing. Lives on the same scanner as the statement parser so tag lines
// can embed expressions anywhere.

use super::ast::{operator_level, GroupKind, Ident, Node, Token};
use super::Parser;
use crate::error::ParseError;

// Operator spellings, longest first so `==` wins the prefix race against `=`.
const OPERATORS: &[&str] = &[
    "==", "!=", ">=", "<=", "&&", "||", "and", "or", "*", "/", "%", "+", "-", ">", "<", ":", "?",
    "=",
];

/// Parse an expression from a detached source fragment, as interpolation and
/// `when` arms need.
pub fn parse_expression_source(src: &str) -> Result<Option<Node>, ParseError> {
    let mut parser = Parser::new(src);
    let node = parser.parse_expression();
    match parser.take_error() {
        Some(err) => Err(err),
        None => Ok(node),
    }
}

impl<'a> Parser<'a> {
    /// Parse one expression, returning `None` when nothing expression-shaped
    /// starts at the cursor. Unknown runes are left for the statement parser.
    pub(crate) fn parse_expression(&mut self) -> Option<Node> {
        if self.has_error() {
            return None;
        }
        self.parse_binary(0)
    }

    fn parse_binary(&mut self, min_level: usize) -> Option<Node> {
        let mut lhs = self.parse_value_part()?;
        loop {
            if self.has_error() {
                break;
            }
            self.scan.skip_spaces();
            let Some((op, level)) = self.peek_operator() else {
                break;
            };
            if level < min_level {
                break;
            }
            let pos = self.scan.position();
            self.scan.prefix(op);
            self.scan.ignore();
            // A tighter level on the right folds first, so `1 + 2 * 3` hangs
            // the product under the sum and `a ? b : c` keeps the `:` pair as
            // the second child of `?`.
            let Some(rhs) = self.parse_binary(level + 1) else {
                self.error(format!("Expecting a value after operator {:?}", op));
                break;
            };
            // The same operator reuses the current node, so `1 + 2 + "a"`
            // becomes one variadic `+` over all three operands.
            if matches!(&lhs.token, Token::Operator(existing) if existing == op) {
                lhs.children.push(rhs);
            } else {
                let mut node = Node::new(Token::Operator(op.to_string()), pos);
                node.children.push(lhs);
                node.children.push(rhs);
                lhs = node;
            }
        }
        Some(lhs)
    }

    fn peek_operator(&self) -> Option<(&'static str, usize)> {
        for op in OPERATORS {
            if !self.scan.starts_with(op) {
                continue;
            }
            // Word operators must not swallow the head of an identifier or
            // attribute name.
            if op.chars().all(|c| c.is_alphabetic()) {
                let after = self.scan.rest()[op.len()..].chars().next();
                if matches!(after, Some(c) if c.is_alphanumeric() || c == '_' || c == '-') {
                    continue;
                }
            }
            return Some((op, operator_level(op).expect("listed operator has a level")));
        }
        None
    }

    fn parse_value_part(&mut self) -> Option<Node> {
        self.scan.skip_spaces();
        let pos = self.scan.position();
        if self.scan.is_eof() {
            return None;
        }
        if self.scan.scan_number() {
            let text = self.scan.commit();
            let value: f64 = match text.parse() {
                Ok(v) => v,
                Err(_) => {
                    self.error(format!("Invalid number literal {:?}", text));
                    return None;
                }
            };
            return Some(Node::new(Token::Number(value), pos));
        }
        if self.scan.scan_word() {
            return self.parse_identity();
        }
        match self.scan.next() {
            Some('"') | Some('\'') => {
                self.scan.backup();
                let text = self.parse_quoted()?;
                Some(Node::new(Token::Text(text), pos))
            }
            Some('(') => {
                self.scan.ignore();
                let inner = self.parse_binary(0);
                if self.scan.next() != Some(')') {
                    self.error("Brackets not closed.");
                    return None;
                }
                self.scan.ignore();
                let mut group = Node::new(Token::Group(GroupKind::Paren), pos);
                group.children.push(inner?);
                Some(group)
            }
            Some('[') => {
                self.scan.ignore();
                self.parse_array(pos)
            }
            Some('{') => {
                self.scan.ignore();
                self.parse_map(pos)
            }
            Some('!') => {
                // Unary not, binding tighter than any operator
                self.scan.ignore();
                let Some(value) = self.parse_value_part() else {
                    self.error("Expecting a value after '!'");
                    return None;
                };
                let mut not = Ident::call("not");
                not.args.push(value);
                Some(Node::new(Token::Ident(not), pos))
            }
            _ => {
                // Not part of an expression; hand the rune back.
                self.scan.backup();
                None
            }
        }
    }

    /// A word has just been scanned; turn it into a literal or an identifier
    /// chain with `.member`, `[index]`, and `(args)` segments.
    fn parse_identity(&mut self) -> Option<Node> {
        let pos = self.scan.start_position();
        let name = self.scan.commit().to_string();
        if name.eq_ignore_ascii_case("true") || name.eq_ignore_ascii_case("false") {
            return Some(Node::new(
                Token::Bool(name.eq_ignore_ascii_case("true")),
                pos,
            ));
        }
        let mut head = Ident::identifier(name);
        loop {
            if self.has_error() {
                break;
            }
            match self.scan.next() {
                Some('.') => {
                    self.scan.ignore();
                    if !self.scan.scan_word() {
                        self.error("Expecting a word after '.'");
                        break;
                    }
                    let seg = Ident::identifier(self.scan.commit());
                    head.tail_mut().next = Some(Box::new(seg));
                }
                Some('[') => {
                    self.scan.ignore();
                    if head.tail_mut().index.is_some() {
                        head.tail_mut().next = Some(Box::new(Ident::identifier("")));
                    }
                    let index = self.parse_binary(0);
                    if self.scan.next() != Some(']') {
                        self.error("Expecting ']' index closing bracket.");
                        break;
                    }
                    self.scan.ignore();
                    head.tail_mut().index = index.map(Box::new);
                }
                Some('(') => {
                    self.scan.ignore();
                    let mut args = Vec::new();
                    self.parse_call_args(&mut args);
                    let tail = head.tail_mut();
                    if tail.is_identifier && tail.args.is_empty() {
                        tail.is_identifier = false;
                        tail.args = args;
                    } else {
                        // A second call segment carries attribute pairs for a
                        // mixin invocation.
                        let mut seg = Ident::call("attributes");
                        seg.args = args;
                        tail.next = Some(Box::new(seg));
                    }
                }
                _ => {
                    self.scan.backup();
                    break;
                }
            }
        }
        Some(Node::new(Token::Ident(head), pos))
    }

    /// Call arguments separated by commas or spaces, up to the closing `)`.
    fn parse_call_args(&mut self, into: &mut Vec<Node>) {
        loop {
            if self.has_error() {
                return;
            }
            let before = self.scan.position();
            if let Some(expr) = self.parse_binary(0) {
                into.push(expr);
            }
            match self.scan.next() {
                Some(',') | Some(' ') => {
                    self.scan.ignore();
                }
                Some(')') => {
                    self.scan.ignore();
                    return;
                }
                None => {
                    self.error("Arguments missing end bracket. End of file reached.");
                    return;
                }
                Some(_) => {
                    self.scan.backup();
                    if self.scan.position() == before {
                        self.error("Unexpected character in arguments.");
                        return;
                    }
                }
            }
        }
    }

    /// Quoted text with no escape sequences; the string runs to the matching
    /// quote.
    fn parse_quoted(&mut self) -> Option<String> {
        let quote = self.scan.next()?;
        self.scan.ignore();
        loop {
            match self.scan.next() {
                Some(c) if c == quote => {
                    self.scan.backup();
                    let text = self.scan.commit().to_string();
                    self.scan.next();
                    self.scan.ignore();
                    return Some(text);
                }
                Some(_) => {}
                None => {
                    self.error("Missing quote at end of text.");
                    return None;
                }
            }
        }
    }

    fn parse_array(&mut self, pos: usize) -> Option<Node> {
        let mut group = Node::new(Token::Group(GroupKind::Array), pos);
        loop {
            if self.has_error() {
                break;
            }
            self.scan.skip_spaces();
            match self.scan.peek() {
                Some(',') => {
                    self.scan.next();
                    self.scan.ignore();
                }
                Some(']') => {
                    self.scan.next();
                    self.scan.ignore();
                    break;
                }
                None => {
                    self.error("Brackets not closed.");
                    break;
                }
                _ => match self.parse_binary(0) {
                    Some(expr) => group.children.push(expr),
                    None => {
                        self.error("Expecting a value inside array.");
                        break;
                    }
                },
            }
        }
        Some(group)
    }

    /// Object literal: `{name: value, ...}` where keys are identifiers,
    /// strings, or numbers.
    fn parse_map(&mut self, pos: usize) -> Option<Node> {
        let mut group = Node::new(Token::Group(GroupKind::Object), pos);
        loop {
            if self.has_error() {
                break;
            }
            self.scan.skip_spaces();
            match self.scan.peek() {
                Some(',') => {
                    self.scan.next();
                    self.scan.ignore();
                    continue;
                }
                Some('}') => {
                    self.scan.next();
                    self.scan.ignore();
                    break;
                }
                None => {
                    self.error("Brackets not closed.");
                    break;
                }
                _ => {}
            }
            let Some(entry) = self.parse_binary(0) else {
                self.error("Expecting a key:value entry inside map.");
                break;
            };
            let valid = matches!(&entry.token, Token::Operator(op) if op == ":")
                && entry.children.len() == 2;
            if !valid {
                self.error(
                    "Invalid map, expecting json syntax of the form {name:value,name:value}",
                );
                break;
            }
            let entry_pos = entry.pos;
            let mut parts = entry.children.into_iter();
            let key_node = parts.next().expect("checked length");
            let value_node = parts.next().expect("checked length");
            let key = match &key_node.token {
                Token::Ident(id) if id.is_identifier => id.name.clone(),
                Token::Text(t) => t.clone(),
                Token::Number(n) => format!("{}", n),
                _ => {
                    self.error("Invalid key in map, expecting a name, string or number.");
                    break;
                }
            };
            let mut kv = Node::new(Token::KeyValue(key), entry_pos);
            kv.children.push(value_node);
            group.children.push(kv);
        }
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(src: &str) -> Node {
        parse_expression_source(src)
            .expect("parse failed")
            .expect("empty expression")
    }

    fn op(node: &Node) -> &str {
        match &node.token {
            Token::Operator(op) => op,
            other => panic!("expected operator, got {:?}", other),
        }
    }

    #[test]
    fn smoke_test_precedence_shapes_the_tree() {
        // 1 + 2 * 3 keeps the product on the right
        let node = expr("1 + 2 * 3");
        assert_eq!(op(&node), "+");
        assert_eq!(op(&node.children[1]), "*");

        // 2 * 3 + 1 folds the product first
        let node = expr("2 * 3 + 1");
        assert_eq!(op(&node), "+");
        assert_eq!(op(&node.children[0]), "*");
    }

    #[test]
    fn smoke_test_repeated_operator_accumulates_operands() {
        let node = expr("1 + 2 + 3");
        assert_eq!(op(&node), "+");
        assert_eq!(node.children.len(), 3);

        // Different operators at the same level still nest.
        let node = expr("1 - 2 + 3");
        assert_eq!(op(&node), "+");
        assert_eq!(node.children.len(), 2);
        assert_eq!(op(&node.children[0]), "-");
    }

    #[test]
    fn smoke_test_ternary_pairs_colon_under_question() {
        let node = expr("ok ? 1 : 2");
        assert_eq!(op(&node), "?");
        assert_eq!(node.children.len(), 2);
        assert_eq!(op(&node.children[1]), ":");
    }

    #[test]
    fn smoke_test_identifier_chain() {
        let node = expr("a.b[0].c(1, 2)");
        let Token::Ident(head) = &node.token else {
            panic!("expected identifier");
        };
        assert_eq!(head.name, "a");
        assert!(head.is_identifier);
        let b = head.next.as_ref().unwrap();
        assert_eq!(b.name, "b");
        assert!(b.index.is_some());
        let c = b.next.as_ref().unwrap();
        assert_eq!(c.name, "c");
        assert!(!c.is_identifier);
        assert_eq!(c.args.len(), 2);
    }

    #[test]
    fn smoke_test_second_call_becomes_attributes_segment() {
        let node = expr("pane(1)(title=\"x\")");
        let Token::Ident(head) = &node.token else {
            panic!("expected identifier");
        };
        assert!(!head.is_identifier);
        let seg = head.next.as_ref().unwrap();
        assert_eq!(seg.name, "attributes");
        assert_eq!(seg.args.len(), 1);
    }

    #[test]
    fn smoke_test_array_and_map_literals() {
        let node = expr("[1, \"two\", x]");
        assert!(matches!(node.token, Token::Group(GroupKind::Array)));
        assert_eq!(node.children.len(), 3);

        let node = expr("{a: 1, \"b\": 2}");
        assert!(matches!(node.token, Token::Group(GroupKind::Object)));
        assert_eq!(node.children.len(), 2);
        assert!(matches!(&node.children[0].token, Token::KeyValue(k) if k == "a"));
        assert!(matches!(&node.children[1].token, Token::KeyValue(k) if k == "b"));
    }

    #[test]
    fn smoke_test_unary_not() {
        let node = expr("!done");
        let Token::Ident(f) = &node.token else {
            panic!("expected call");
        };
        assert_eq!(f.name, "not");
        assert_eq!(f.args.len(), 1);
    }

    #[test]
    fn smoke_test_word_operators_keep_identifiers_whole() {
        let node = expr("android");
        assert!(matches!(&node.token, Token::Ident(f) if f.name == "android"));

        let node = expr("a and b");
        assert_eq!(op(&node), "and");
    }

    #[test]
    fn smoke_test_unclosed_bracket_is_an_error() {
        let err = parse_expression_source("(1 + 2").unwrap_err();
        assert!(err.message.contains("Brackets not closed"));
    }

    #[test]
    fn smoke_test_booleans_are_literals() {
        let node = expr("true");
        assert!(matches!(node.token, Token::Bool(true)));
        let node = expr("False");
        assert!(matches!(node.token, Token::Bool(false)));
    }
}
