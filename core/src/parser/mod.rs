// Template parser: line-driven statement parsing over an indentation-locked
// source, producing the AST the evaluator walks.
//
// Each line opens a node placed by its indentation level on an explicit
// open-node stack; deeper lines nest, shallower lines pop-and-attach. The
// payload of the line is then decided by its leading runes: comment, piped
// text, raw text, code, mixin call, doctype, keyword, or tag shorthand.

pub mod ast;
pub mod expression;
pub mod indent;
pub mod scanner;

use std::collections::HashMap;

use ast::{CommentKind, ESCAPE_HTML_FN, EXPLODE_ATTRIBUTES_FN, MIXIN_CALL_FN};
use indent::Indent;
use scanner::Scanner;

use crate::error::ParseError;

pub use ast::{GroupKind, Ident, Node, ParseResult, Tag, Token};
pub use expression::parse_expression_source;

const KEYWORDS: &[&str] = &[
    "if", "else", "unless", "case", "when", "default", "each", "mixin", "block", "extends",
    "include",
];

const SELF_CLOSING_TAGS: &[&str] = &[
    "meta", "img", "link", "input", "source", "area", "base", "col", "br", "hr",
];

/// Parse template source into a `ParseResult`. A parse failure is recorded on
/// the result (and embedded in the tree as an error node) rather than
/// returned, so callers can inspect the partial tree.
pub fn parse(input: &str) -> ParseResult {
    log::debug!("parsing template: {} bytes", input.len());
    let mut parser = Parser::new(input);
    parser.run();
    let result = parser.finish();
    log::debug!(
        "parsed template: {} top-level nodes, {} mixins, {} blocks",
        result.root.children.len(),
        result.mixins.len(),
        result.blocks.len()
    );
    result
}

pub struct Parser<'a> {
    pub(crate) scan: Scanner<'a>,
    stack: Vec<Node>,
    indent: Indent,
    err: Option<ParseError>,
    warnings: Vec<String>,
    extends: Option<String>,
}

impl<'a> Parser<'a> {
    pub fn new(input: &'a str) -> Self {
        Parser {
            scan: Scanner::new(input),
            stack: vec![Node::new(Token::Empty, 0)],
            indent: Indent::new(),
            err: None,
            warnings: Vec::new(),
            extends: None,
        }
    }

    fn run(&mut self) {
        loop {
            if self.err.is_some() || self.scan.is_eof() {
                break;
            }
            if !self.parse_indent() {
                continue;
            }
            if self.scan.is_eof() {
                // A trailing line of pure whitespace opened nothing.
                self.stack.pop();
                break;
            }
            self.dispatch_statement();
        }
    }

    fn finish(mut self) -> ParseResult {
        while self.stack.len() > 1 {
            let node = self.stack.pop().unwrap();
            self.stack.last_mut().unwrap().children.push(node);
        }
        let root = self.stack.pop().unwrap();
        let mut mixins = HashMap::new();
        let mut blocks = HashMap::new();
        collect_definitions(&root, &mut mixins, &mut blocks);
        ParseResult {
            root,
            error: self.err,
            warnings: self.warnings,
            mixins,
            blocks,
            extends: self.extends,
        }
    }

    // ---- error and warning plumbing -------------------------------------

    pub(crate) fn has_error(&self) -> bool {
        self.err.is_some()
    }

    pub(crate) fn take_error(&mut self) -> Option<ParseError> {
        self.err.take()
    }

    /// Record the first error, embed an error node at the current position,
    /// and stop the parse.
    pub(crate) fn error(&mut self, message: impl Into<String>) {
        if self.err.is_some() {
            return;
        }
        let message = message.into();
        let mut near = self.scan.commit().to_string();
        while near.chars().count() < 10 && !self.scan.is_eof() {
            self.scan.next();
        }
        near.push_str(self.scan.commit());
        let err = ParseError {
            line: self.scan.line_number(),
            near,
            message,
        };
        let pos = self.scan.position();
        self.top().children.push(Node::new(Token::Error(err.to_string()), pos));
        self.err = Some(err);
    }

    fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        let line = self.scan.line_number();
        log::warn!("line {}: {}", line, message);
        self.warnings.push(format!("line {}: {}", line, message));
    }

    // ---- open-node stack ------------------------------------------------

    fn top(&mut self) -> &mut Node {
        self.stack.last_mut().expect("root never pops")
    }

    fn push_node(&mut self, node: Node) {
        self.stack.push(node);
    }

    /// Pop `levels` open nodes, attaching each to its parent.
    fn unstack(&mut self, levels: usize) {
        for _ in 0..levels {
            if self.stack.len() <= 1 {
                self.error("Invalid indentation, already at the root.");
                return;
            }
            let node = self.stack.pop().unwrap();
            self.top().children.push(node);
        }
    }

    fn replace_token(&mut self, token: Token) {
        let pos = self.scan.position();
        let node = self.top();
        node.token = token;
        node.pos = pos;
    }

    fn replace_node(&mut self, node: Node) {
        *self.top() = node;
    }

    fn take_tag(&mut self) -> Option<Tag> {
        match std::mem::replace(&mut self.top().token, Token::Empty) {
            Token::Tag(tag) => Some(tag),
            other => {
                self.top().token = other;
                None
            }
        }
    }

    fn put_tag(&mut self, tag: Tag) {
        self.top().token = Token::Tag(tag);
    }

    // ---- indentation ----------------------------------------------------

    /// Consume a line's indentation and open this line's node at the right
    /// depth. Returns false when the line was blank or a fatal indentation
    /// error was recorded.
    fn parse_indent(&mut self) -> bool {
        let lvl: i64 = match self.scan.peek() {
            Some(r @ (' ' | '\t')) => match self.skip_indent(r) {
                Ok(l) if l < 0 => return false,
                Ok(l) => l,
                Err(e) => {
                    self.error(e);
                    return false;
                }
            },
            _ => {
                if self.scan.accept_newline() {
                    return false;
                }
                if self.indent.indent_type() == 0 {
                    0
                } else {
                    match self.indent.set_curr(0) {
                        Ok(l) => l as i64,
                        Err(e) => {
                            self.error(e);
                            return false;
                        }
                    }
                }
            }
        };
        let lvl = lvl as usize;
        let depth = self.stack.len() - 1;
        match lvl.cmp(&depth) {
            std::cmp::Ordering::Equal => {}
            std::cmp::Ordering::Greater => {
                // Reopen the previous line's last child so this line nests
                // under it.
                if let Some(last) = self.top().children.pop() {
                    self.push_node(last);
                }
            }
            std::cmp::Ordering::Less => {
                self.unstack(depth - lvl);
                if self.err.is_some() {
                    return false;
                }
            }
        }
        let node = Node::new(Token::Tag(Tag::new("div")), self.scan.position());
        self.push_node(node);
        true
    }

    /// Statement-level indentation: locks the unit on first use, rejects
    /// mixed characters and jumps of more than one level. Returns -1 for a
    /// blank line.
    fn skip_indent(&mut self, r: char) -> Result<i64, String> {
        let cnt = match self.indent.indent_type() {
            t if t > 1 => {
                if r != ' ' {
                    return Err(format!(
                        "Invalid indent, indent set to {}, found {:?}. Cannot mix indentation",
                        self.indent.type_name(),
                        r
                    ));
                }
                self.scan.accept_run(" ")
            }
            1 => {
                if r != '\t' {
                    return Err(format!(
                        "Invalid indent, indent set to {}, found {:?}. Cannot mix indentation",
                        self.indent.type_name(),
                        r
                    ));
                }
                self.scan.accept_run("\t")
            }
            _ => match r {
                ' ' => {
                    let cnt = self.scan.accept_run(" ");
                    if cnt == 1 {
                        return Err(
                            "Space indentation requires at least 2 spaces or more.".to_string()
                        );
                    }
                    self.indent.set_type(cnt);
                    cnt
                }
                '\t' => {
                    let cnt = self.scan.accept_run("\t");
                    self.indent.set_type(1);
                    cnt
                }
                _ => return Ok(0),
            },
        };
        if self.scan.accept_newline() {
            return Ok(-1);
        }
        let lvl = self.indent.set_curr(cnt)?;
        if lvl as i64 - self.indent.prev() as i64 > 1 {
            return Err(format!(
                "Invalid indent, indented too much. Previous indentation {}",
                self.indent.prev()
            ));
        }
        // Keep the indentation out of the committed region.
        self.scan.move_start(cnt);
        Ok(lvl as i64)
    }

    /// Content-level indentation for multi-line text blocks: tolerant of
    /// arbitrary depth, still locks an undecided unit. Returns -1 for a
    /// blank line.
    fn get_indent(&mut self) -> Result<i64, String> {
        let indent_char = match self.indent.indent_type() {
            0 => match self.scan.peek() {
                Some(' ') => " ",
                Some('\t') => {
                    self.indent.set_type(1);
                    "\t"
                }
                _ => {
                    if self.scan.accept_newline() {
                        return Ok(-1);
                    }
                    return Ok(0);
                }
            },
            1 => "\t",
            _ => " ",
        };
        let cnt = self.scan.accept_run(indent_char);
        if self.indent.indent_type() == 0 {
            if cnt > 1 {
                self.indent.set_type(cnt);
            } else {
                return Err("Space indentation requires at least 2 spaces or more.".to_string());
            }
        }
        if self.scan.accept_newline() {
            return Ok(-1);
        }
        self.indent.char_count_to_level(cnt).map(|l| l as i64)
    }

    // ---- statement dispatch ---------------------------------------------

    fn dispatch_statement(&mut self) {
        if self.scan.prefix("//-") || self.scan.prefix("//") {
            self.parse_comment();
            return;
        }
        match self.scan.next() {
            Some('|') => {
                self.scan.ignore();
                let content = self.get_content();
                self.replace_node(content);
            }
            Some('<') => {
                self.scan.backup();
                let content = self.get_content();
                self.replace_node(content);
            }
            Some('-') => {
                self.scan.commit();
                self.parse_unbuffered_code();
            }
            Some('+') => {
                self.scan.commit();
                let mut call = Ident::call(MIXIN_CALL_FN);
                if let Some(expr) = self.parse_expression() {
                    call.args.push(expr);
                }
                self.replace_token(Token::Ident(call));
            }
            other => {
                if other.is_some() {
                    self.scan.backup();
                }
                // Buffered code without a tag
                if self.scan.prefix("!=") {
                    self.replace_token(Token::Empty);
                    self.parse_buffered_code(false);
                    return;
                }
                if self.scan.prefix("=") {
                    self.replace_token(Token::Empty);
                    self.parse_buffered_code(true);
                    return;
                }
                if self.scan.scan_html_word() {
                    self.parse_html_tag();
                    return;
                }
                self.after_html_tag();
            }
        }
    }

    fn parse_html_tag(&mut self) {
        let name = self.scan.commit().to_string();
        if name == "doctype" {
            self.parse_doctype();
            return;
        }
        if KEYWORDS.contains(&name.as_str()) {
            self.parse_keyword(&name);
            return;
        }
        let mut tag = Tag::new(&name);
        tag.self_closing = SELF_CLOSING_TAGS.contains(&name.as_str());
        self.replace_token(Token::Tag(tag));
        self.after_html_tag();
    }

    /// Everything that may follow a tag name: id, classes, attributes,
    /// inline content, buffered code, block expansion, self-closing marker,
    /// or a multi-line text block.
    fn after_html_tag(&mut self) {
        loop {
            if self.err.is_some() {
                return;
            }
            if self.scan.accept_newline() {
                return;
            }
            if self.scan.prefix("!=") {
                self.parse_buffered_code(false);
                return;
            }
            if self.scan.prefix("&attributes(") {
                self.parse_and_attribute();
                continue;
            }
            match self.scan.next() {
                Some('(') => {
                    self.scan.ignore();
                    self.parse_attributes();
                    self.after_attributes();
                    return;
                }
                Some('.') => {
                    self.scan.ignore();
                    if self.scan.peek() == Some(' ') {
                        self.warning("Space found after block content character '.'");
                        self.scan.skip_spaces();
                    }
                    if self.scan.accept_newline() {
                        self.parse_multiline_content();
                        return;
                    }
                    self.parse_tag_class();
                }
                Some('#') => {
                    self.scan.ignore();
                    self.parse_tag_id();
                }
                Some(' ') => {
                    self.scan.ignore();
                    self.parse_content();
                    return;
                }
                Some('=') => {
                    self.parse_buffered_code(true);
                    return;
                }
                Some(':') => {
                    self.scan.skip_spaces();
                    if self.scan.scan_word() {
                        self.parse_block_expansion();
                        return;
                    }
                    self.error("Expecting a tag after ':' block expansion.");
                    return;
                }
                Some('/') => {
                    self.mark_self_closing();
                    return;
                }
                None => return,
                Some(_) => {
                    self.error("Invalid character after tag name.");
                    return;
                }
            }
        }
    }

    /// Continuation after a parenthesised attribute block.
    fn after_attributes(&mut self) {
        loop {
            if self.err.is_some() || self.scan.is_eof() {
                return;
            }
            if self.scan.prefix(".\n") || self.scan.prefix(".\r\n") {
                self.scan.ignore();
                self.parse_multiline_content();
                return;
            }
            if self.scan.accept_newline() {
                return;
            }
            if self.scan.prefix("!=") {
                self.parse_buffered_code(false);
                return;
            }
            if self.scan.prefix("&attributes(") {
                self.parse_and_attribute();
                continue;
            }
            match self.scan.next() {
                Some(' ') => {
                    self.scan.ignore();
                    self.parse_content();
                    return;
                }
                Some('/') => {
                    self.mark_self_closing();
                    return;
                }
                Some('=') => {
                    self.parse_buffered_code(true);
                    return;
                }
                Some(':') => {
                    self.scan.skip_spaces();
                    if self.scan.scan_word() {
                        self.parse_block_expansion();
                        return;
                    }
                    self.error("Expecting a tag after ':' block expansion.");
                    return;
                }
                _ => {
                    self.error("Unexpected character after attributes.");
                    return;
                }
            }
        }
    }

    fn mark_self_closing(&mut self) {
        self.scan.ignore();
        let Some(mut tag) = self.take_tag() else {
            self.error("Expecting '/' to follow an HTML tag.");
            return;
        };
        tag.self_closing = true;
        self.put_tag(tag);
        if !(self.scan.accept_newline() || self.scan.is_eof()) {
            self.error("Self closing tag cannot have content.");
        }
    }

    /// `tag: inner` nests `inner` as the sole child of the current tag.
    fn parse_block_expansion(&mut self) {
        let node = Node::new(Token::Tag(Tag::new("div")), self.scan.position());
        self.push_node(node);
        self.parse_html_tag();
    }

    fn parse_tag_class(&mut self) {
        if !self.scan.scan_html_word() {
            self.error("Expecting a class name after '.'");
            return;
        }
        let word = self.scan.commit().to_string();
        let pos = self.scan.position();
        let Some(mut tag) = self.take_tag() else {
            self.error("Expecting an HTML tag before the '.' class shorthand.");
            return;
        };
        tag.set_class(Node::new(Token::Text(word), pos));
        self.put_tag(tag);
    }

    fn parse_tag_id(&mut self) {
        if !self.scan.scan_html_word() {
            self.error("Expecting an id after '#'");
            return;
        }
        let word = self.scan.commit().to_string();
        let pos = self.scan.position();
        let Some(mut tag) = self.take_tag() else {
            self.error("Expecting an HTML tag before the '#' id shorthand.");
            return;
        };
        tag.add_key_value("id", Node::new(Token::Text(word), pos));
        self.put_tag(tag);
    }

    /// Parenthesised attribute block: whitespace- or comma-separated
    /// entries, each a bareword, `name=expr` (escaped), `name!=expr` (raw),
    /// or a bare expression spread at render time.
    fn parse_attributes(&mut self) {
        let Some(mut tag) = self.take_tag() else {
            self.error("Expecting attributes to follow an HTML tag.");
            return;
        };
        let mut word: Option<String> = None;
        loop {
            if self.err.is_some() {
                break;
            }
            if self.scan.scan_html_word() {
                if let Some(w) = word.take() {
                    let pos = self.scan.position();
                    tag.add_attribute(Node::new(Token::Text(w), pos));
                }
                word = Some(self.scan.commit().to_string());
            }
            if self.scan.prefix("!=") {
                self.scan.ignore();
                if let Some(expr) = self.parse_expression() {
                    match word.take() {
                        Some(w) => tag.add_key_value(&w, expr),
                        None => tag.add_attribute(expr),
                    }
                }
                continue;
            }
            match self.scan.next() {
                Some(')') => {
                    self.scan.ignore();
                    if let Some(w) = word.take() {
                        let pos = self.scan.position();
                        tag.add_attribute(Node::new(Token::Text(w), pos));
                    }
                    break;
                }
                Some(' ') | Some('\n') | Some('\r') => {
                    self.scan.ignore();
                }
                Some(',') => {
                    self.scan.ignore();
                    if let Some(w) = word.take() {
                        let pos = self.scan.position();
                        tag.add_attribute(Node::new(Token::Text(w), pos));
                    }
                }
                Some('=') => {
                    self.scan.ignore();
                    let pos = self.scan.position();
                    let mut escaped = Ident::call(ESCAPE_HTML_FN);
                    if let Some(expr) = self.parse_expression() {
                        escaped.args.push(expr);
                    }
                    let value = Node::new(Token::Ident(escaped), pos);
                    match word.take() {
                        Some(w) => tag.add_key_value(&w, value),
                        None => tag.add_attribute(value),
                    }
                }
                None => {
                    self.error("Attributes missing closing ')'");
                    break;
                }
                Some(_) => {
                    self.scan.backup();
                    match self.parse_expression() {
                        Some(expr) => tag.add_attribute(expr),
                        None => {
                            self.error("Invalid characters in attributes.");
                            break;
                        }
                    }
                }
            }
        }
        self.put_tag(tag);
    }

    /// `&attributes(expr)` merges a runtime attribute map into the tag.
    fn parse_and_attribute(&mut self) {
        let marker = self.scan.commit();
        if marker != "&attributes(" {
            self.error(format!("Expecting &attributes(, found {:?}", marker));
            return;
        }
        let pos = self.scan.position();
        let expr = self.parse_expression();
        let Some(mut tag) = self.take_tag() else {
            self.error("Expecting &attributes on an HTML tag.");
            return;
        };
        if let Some(expr) = expr {
            let mut spread = Ident::call(EXPLODE_ATTRIBUTES_FN);
            spread.args.push(expr);
            tag.add_attribute(Node::new(Token::Ident(spread), pos));
        }
        self.put_tag(tag);
        loop {
            match self.scan.next() {
                Some(')') => {
                    self.scan.ignore();
                    return;
                }
                Some(' ') => {
                    self.scan.ignore();
                }
                other => {
                    self.error(format!("Unexpected character {:?} in &attributes()", other));
                    return;
                }
            }
        }
    }

    // ---- code statements ------------------------------------------------

    /// `= expr` (escaped) or `!= expr` (raw) buffered output under the
    /// current node.
    fn parse_buffered_code(&mut self, escape: bool) {
        self.scan.ignore();
        let pos = self.scan.position();
        let Some(expr) = self.parse_expression() else {
            return;
        };
        let node = if escape {
            let mut escaped = Ident::call(ESCAPE_HTML_FN);
            escaped.args.push(expr);
            Node::new(Token::Ident(escaped), pos)
        } else {
            expr
        };
        self.top().children.push(node);
    }

    /// `- stmt[; stmt...]` unbuffered code; `var name = value` becomes an
    /// assignment node.
    fn parse_unbuffered_code(&mut self) {
        let mut statements: Vec<Node> = Vec::new();
        'outer: loop {
            let Some(mut expr) = self.parse_expression() else {
                break;
            };
            let is_var = matches!(
                &expr.token,
                Token::Ident(f) if f.is_identifier && f.name == "var"
                    && f.next.is_none() && f.index.is_none()
            );
            if is_var {
                let pos = expr.pos;
                let Some(assign) = self.parse_expression() else {
                    self.error("Invalid var statement, expecting name = value.");
                    return;
                };
                let valid = matches!(&assign.token, Token::Operator(op) if op == "=")
                    && assign.children.len() == 2;
                if !valid {
                    self.error("Invalid var statement, expecting name = value.");
                    return;
                }
                let mut var = Ident::call("var");
                var.args = assign.children;
                expr = Node::new(Token::Ident(var), pos);
            }
            statements.push(expr);
            loop {
                if self.scan.is_newline() || self.scan.is_eof() {
                    self.scan.ignore();
                    break 'outer;
                }
                match self.scan.next() {
                    Some(' ') => self.scan.ignore(),
                    Some(';') => {
                        self.scan.ignore();
                        continue 'outer;
                    }
                    _ => {
                        self.scan.backup();
                        break 'outer;
                    }
                }
            }
        }
        match statements.len() {
            0 => {}
            1 => {
                let node = statements.pop().unwrap();
                let top = self.top();
                top.token = node.token;
                top.children = node.children;
                top.pos = node.pos;
            }
            _ => {
                let top = self.top();
                top.token = Token::Empty;
                top.children = statements;
            }
        }
    }

    // ---- keywords -------------------------------------------------------

    fn parse_keyword(&mut self, keyword: &str) {
        let mut kw = Ident::call(keyword);
        let mut arg: Option<Node> = None;
        let mut block_expansion = false;
        match keyword {
            "when" | "default" => {
                // The arm expression runs to a ':' (block expansion) or the
                // end of the line.
                let text = match self.scan.run_to(":\n") {
                    Some(end) => {
                        block_expansion = end == ':';
                        let text = self.scan.commit();
                        text[..text.len() - 1].to_string()
                    }
                    None => self.scan.commit().to_string(),
                };
                if !text.is_empty() {
                    arg = self.parse_expression_from(&text);
                }
            }
            "extends" | "include" => {
                let content = self.get_content();
                match &content.token {
                    Token::Text(filename) => {
                        if keyword == "extends" {
                            self.extends = Some(filename.trim().to_string());
                        }
                        arg = Some(content);
                    }
                    _ => {
                        self.error(format!(
                            "Expecting a filename after the keyword {:?}",
                            keyword
                        ));
                        return;
                    }
                }
            }
            _ => {
                arg = self.parse_expression();
                // `else if cond` parses as an else carrying the condition
                let lone_if = matches!(
                    arg.as_ref().map(|a| &a.token),
                    Some(Token::Ident(f)) if f.is_identifier && f.name == "if"
                        && f.next.is_none() && f.index.is_none()
                );
                if lone_if {
                    if keyword == "else" {
                        arg = self.parse_expression();
                    } else {
                        self.error("Expecting 'else' before 'if' in an else-if statement.");
                        return;
                    }
                }
            }
        }
        if self.err.is_some() {
            return;
        }
        if let Some(a) = arg {
            kw.args.push(a);
        }

        // Validation against siblings and parents
        match keyword {
            "when" | "default" => {
                let parent_is_case = self.stack.len() >= 2
                    && matches!(
                        &self.stack[self.stack.len() - 2].token,
                        Token::Ident(f) if !f.is_identifier && f.name == "case"
                    );
                if !parent_is_case {
                    self.error(format!(
                        "Invalid {:?}, expecting a 'case' statement before it.",
                        keyword
                    ));
                    return;
                }
            }
            "else" => {
                let parent = &self.stack[self.stack.len() - 2];
                let follows_branch = parent.children.last().is_some_and(|prev| {
                    matches!(
                        &prev.token,
                        Token::Ident(f) if !f.is_identifier
                            && matches!(f.name.as_str(), "if" | "unless" | "else")
                    )
                });
                if !follows_branch {
                    self.error(
                        "Else statement must have an if or unless statement before it. \
                         Make sure the indentation is correct.",
                    );
                    return;
                }
            }
            "each" => {
                // each value[, index] in source
                self.scan.skip_spaces();
                if self.scan.accept(',') {
                    self.scan.ignore();
                    match self.parse_expression() {
                        Some(index) => kw.args.push(index),
                        None => {
                            self.error("Expecting an index name after ',' in 'each'.");
                            return;
                        }
                    }
                } else {
                    kw.args.push(Node::new(Token::Empty, self.scan.position()));
                }
                let in_word = self.parse_expression();
                let is_in = matches!(
                    in_word.as_ref().map(|n| &n.token),
                    Some(Token::Ident(f)) if f.is_identifier && f.name == "in"
                );
                if !is_in {
                    self.error("Expecting 'in' keyword after 'each' keyword.");
                    return;
                }
                match self.parse_expression() {
                    Some(source) => kw.args.push(source),
                    None => {
                        self.error("Expecting a value after 'in' in 'each'.");
                        return;
                    }
                }
            }
            "block" => {
                if let Some(a) = kw.args.first() {
                    if !matches!(&a.token, Token::Ident(f) if f.is_identifier) {
                        self.error("Expecting a block name.");
                        return;
                    }
                }
            }
            "mixin" => {
                if kw.args.len() != 1 {
                    self.error("Mixin missing a name.");
                    return;
                }
                if !matches!(&kw.args[0].token, Token::Ident(_)) {
                    self.error("Expecting a mixin name.");
                    return;
                }
            }
            _ => {}
        }

        self.replace_token(Token::Ident(kw));

        if block_expansion {
            self.scan.skip_spaces();
            if self.scan.scan_word() {
                self.parse_block_expansion();
            }
        }
    }

    // ---- content --------------------------------------------------------

    fn parse_comment(&mut self) {
        let marker = self.scan.commit();
        let kind = if marker == "//-" {
            CommentKind::Hidden
        } else {
            CommentKind::Visible
        };
        self.replace_token(Token::Comment(kind));
        if self.scan.accept_newline() {
            self.parse_multiline_content();
        } else {
            self.parse_content();
        }
    }

    fn parse_doctype(&mut self) {
        self.replace_token(Token::Doctype(Vec::new()));
        let content = self.get_content();
        match content.token {
            Token::Text(text) => {
                if let Token::Doctype(args) = &mut self.top().token {
                    args.push(text);
                }
            }
            _ => self.error("Expecting a doctype argument."),
        }
    }

    fn parse_content(&mut self) {
        let content = self.get_content();
        self.top().children.push(content);
    }

    /// Rest-of-line content with `#{expr}` (escaped) and `!{expr}` (raw)
    /// interpolation. Returns a single text node, or a grouping node when
    /// interpolation splits the line.
    fn get_content(&mut self) -> Node {
        let mut node = Node::new(Token::Empty, self.scan.position());
        let mut buf = String::new();
        let mut code = String::new();
        let mut in_code = false;
        let mut escape = false;
        loop {
            self.scan.ignore();
            if self.scan.accept_newline() || self.scan.is_eof() {
                if in_code {
                    self.error("Missing closing '}' in interpolation.");
                }
                self.scan.ignore();
                node.children
                    .push(Node::new(Token::Text(std::mem::take(&mut buf)), self.scan.position()));
                break;
            }
            if self.scan.starts_with("#{") || self.scan.starts_with("!{") {
                if in_code {
                    self.error("Not expecting an interpolation inside a code section.");
                    break;
                }
                escape = self.scan.starts_with("#{");
                self.scan.prefix(if escape { "#{" } else { "!{" });
                self.scan.commit();
                node.children
                    .push(Node::new(Token::Text(std::mem::take(&mut buf)), self.scan.position()));
                in_code = true;
                continue;
            }
            let Some(r) = self.scan.next() else { continue };
            if in_code && r == '}' {
                let source = std::mem::take(&mut code);
                if let Some(expr) = self.interpolation_node(&source, escape) {
                    node.children.push(expr);
                }
                in_code = false;
                escape = false;
                continue;
            }
            if in_code {
                code.push(r);
            } else {
                buf.push(r);
            }
        }
        collapse(node)
    }

    fn interpolation_node(&mut self, source: &str, escape: bool) -> Option<Node> {
        let expr = self.parse_expression_from(source)?;
        if !escape {
            return Some(expr);
        }
        let pos = expr.pos;
        let mut escaped = Ident::call(ESCAPE_HTML_FN);
        escaped.args.push(expr);
        Some(Node::new(Token::Ident(escaped), pos))
    }

    fn parse_expression_from(&mut self, source: &str) -> Option<Node> {
        match expression::parse_expression_source(source) {
            Ok(node) => node,
            Err(err) => {
                self.error(format!("Expression error: {}", err));
                None
            }
        }
    }

    /// Indented text block after `tag.`: the first content line fixes the
    /// ignored indentation prefix, deeper spaces are preserved verbatim, and
    /// the block ends at the first line dedented to the tag's level.
    fn parse_multiline_content(&mut self) {
        let mut buf = String::new();
        let mut init_lvl: i64;
        loop {
            init_lvl = match self.get_indent() {
                Ok(l) => l,
                Err(e) => {
                    self.error(e);
                    return;
                }
            };
            if init_lvl != -1 {
                break;
            }
            buf.push('\n');
            if self.scan.is_eof() {
                break;
            }
        }
        let content_indent = self.indent.curr() as i64;
        let unit = self.indent.indent_type().max(1);
        // Rewind past the block indentation only, keeping deeper spaces.
        let consumed = self.scan.position();
        let desired = self.scan.start_position() + (init_lvl.max(0) as usize) * unit;
        self.scan.set_position(desired.min(consumed));
        self.scan.ignore();

        let mut node = Node::new(Token::Empty, self.scan.position());
        loop {
            if self.err.is_some() {
                return;
            }
            if self.scan.is_eof() {
                node.children
                    .push(Node::new(Token::Text(std::mem::take(&mut buf)), self.scan.position()));
                break;
            }
            if self.scan.accept_newline() {
                let line_start = self.scan.position();
                let lvl = match self.get_indent() {
                    Ok(l) => l,
                    Err(e) => {
                        self.error(e);
                        return;
                    }
                };
                if lvl > -1 && lvl <= content_indent {
                    node.children.push(Node::new(
                        Token::Text(std::mem::take(&mut buf)),
                        self.scan.position(),
                    ));
                    self.scan.set_start_position(line_start);
                    self.scan.set_position(line_start);
                    break;
                }
                buf.push('\n');
                if lvl > -1 {
                    let consumed = self.scan.position();
                    let desired = line_start + (init_lvl.max(0) as usize) * unit;
                    self.scan.set_position(desired.min(consumed));
                    self.scan.ignore();
                }
                continue;
            }
            if self.scan.starts_with("#{") || self.scan.starts_with("!{") {
                let escape = self.scan.starts_with("#{");
                self.scan.prefix(if escape { "#{" } else { "!{" });
                self.scan.commit();
                node.children
                    .push(Node::new(Token::Text(std::mem::take(&mut buf)), self.scan.position()));
                let expr = self.parse_expression();
                if let Some(expr) = expr {
                    let wrapped = if escape {
                        let pos = expr.pos;
                        let mut escaped = Ident::call(ESCAPE_HTML_FN);
                        escaped.args.push(expr);
                        Node::new(Token::Ident(escaped), pos)
                    } else {
                        expr
                    };
                    node.children.push(wrapped);
                }
                self.scan.skip_spaces();
                if self.scan.next() == Some('}') {
                    self.scan.ignore();
                    continue;
                }
                self.error("Expecting '}' to close the interpolation.");
                return;
            }
            let Some(r) = self.scan.next() else { continue };
            buf.push(r);
        }
        self.scan.ignore();
        let node = collapse(node);
        self.top().children.push(node);
    }
}

/// Unwrap single-child grouping nodes produced by content parsing.
fn collapse(mut node: Node) -> Node {
    if node.children.len() == 1 {
        node.children.pop().unwrap()
    } else {
        node
    }
}

/// Walk the finished tree registering mixin and block definitions by name.
/// The first definition of a name wins within one parse.
fn collect_definitions(
    node: &Node,
    mixins: &mut HashMap<String, Node>,
    blocks: &mut HashMap<String, Node>,
) {
    if let Token::Ident(f) = &node.token {
        if !f.is_identifier {
            match f.name.as_str() {
                "mixin" => {
                    if let Some(Token::Ident(def)) = f.args.first().map(|a| &a.token) {
                        mixins
                            .entry(def.name.clone())
                            .or_insert_with(|| node.clone());
                    }
                }
                "block" => {
                    if let Some(Token::Ident(def)) = f.args.first().map(|a| &a.token) {
                        if def.is_identifier {
                            blocks
                                .entry(def.name.clone())
                                .or_insert_with(|| node.clone());
                        }
                    }
                }
                _ => {}
            }
        }
    }
    for child in &node.children {
        collect_definitions(child, mixins, blocks);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_name(node: &Node) -> &str {
        match &node.token {
            Token::Tag(tag) => &tag.name,
            other => panic!("expected a tag, got {:?}", other),
        }
    }

    #[test]
    fn test_siblings_and_nesting_by_indentation() {
        let result = parse("ul\n  li\n  li\np");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.root.children.len(), 2);
        let ul = &result.root.children[0];
        assert_eq!(tag_name(ul), "ul");
        assert_eq!(ul.children.len(), 2);
        assert_eq!(tag_name(&ul.children[0]), "li");
        assert_eq!(tag_name(&result.root.children[1]), "p");
    }

    #[test]
    fn test_tab_indentation_locks_unit() {
        let result = parse("ul\n\tli\n\t\tspan");
        assert!(result.error.is_none(), "{:?}", result.error);
        let ul = &result.root.children[0];
        let li = &ul.children[0];
        assert_eq!(tag_name(&li.children[0]), "span");
    }

    #[test]
    fn test_single_space_indent_is_rejected() {
        let result = parse("p\n span");
        let err = result.error.expect("expected an indentation error");
        assert!(err.message.contains("at least 2 spaces"));
    }

    #[test]
    fn test_mixed_indentation_is_rejected() {
        let result = parse("p\n  span\n\tb");
        let err = result.error.expect("expected a mixed-indent error");
        assert!(err.message.contains("Cannot mix indentation"));
    }

    #[test]
    fn test_over_indentation_is_rejected() {
        let result = parse("p\n    span");
        // First indented line locks a 4-space unit at level 1, which is fine;
        // jumping two levels at once is not.
        let result2 = parse("p\n  span\n      b");
        assert!(result.error.is_none());
        let err = result2.error.expect("expected an over-indent error");
        assert!(err.message.contains("indented too much"));
    }

    #[test]
    fn test_tag_shorthand_collects_id_and_classes() {
        let result = parse("div#main.alpha.beta(title=\"t\")");
        assert!(result.error.is_none(), "{:?}", result.error);
        let Token::Tag(tag) = &result.root.children[0].token else {
            panic!("expected tag");
        };
        // id, class (accumulated), title
        assert_eq!(tag.attributes.len(), 3);
        assert!(matches!(&tag.attributes[0].token, Token::KeyValue(k) if k == "id"));
        assert!(matches!(&tag.attributes[1].token, Token::KeyValue(k) if k == "class"));
        assert_eq!(tag.attributes[1].children[0].children.len(), 2);
    }

    #[test]
    fn test_class_line_defaults_to_div() {
        let result = parse(".note hello");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(tag_name(&result.root.children[0]), "div");
    }

    #[test]
    fn test_block_expansion_nests_inline() {
        let result = parse("ul: li: span x");
        assert!(result.error.is_none(), "{:?}", result.error);
        let ul = &result.root.children[0];
        assert_eq!(tag_name(ul), "ul");
        let li = &ul.children[0];
        assert_eq!(tag_name(li), "li");
        assert_eq!(tag_name(&li.children[0]), "span");
    }

    #[test]
    fn test_else_requires_preceding_if() {
        let result = parse("p\nelse\n  p x");
        let err = result.error.expect("expected an else-placement error");
        assert!(err.message.contains("Else statement"));
    }

    #[test]
    fn test_when_requires_case_parent() {
        let result = parse("when 1");
        let err = result.error.expect("expected a when-placement error");
        assert!(err.message.contains("case"));
    }

    #[test]
    fn test_extends_records_target() {
        let result = parse("extends layout\nblock body\n  p x");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.extends.as_deref(), Some("layout"));
        assert!(result.blocks.contains_key("body"));
    }

    #[test]
    fn test_mixin_definition_is_registered() {
        let result = parse("mixin greet(who)\n  p= who");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(result.mixins.contains_key("greet"));
    }

    #[test]
    fn test_multiline_text_block_keeps_extra_indent() {
        let result = parse("pre.\n  line one\n    deeper\n  back\np");
        assert!(result.error.is_none(), "{:?}", result.error);
        let pre = &result.root.children[0];
        let Token::Text(text) = &pre.children[0].token else {
            panic!("expected text block, got {:?}", pre.children[0].token);
        };
        assert_eq!(text, "line one\n  deeper\nback");
        assert_eq!(tag_name(&result.root.children[1]), "p");
    }

    #[test]
    fn test_interpolation_splits_content() {
        let result = parse("p before #{name} after");
        assert!(result.error.is_none(), "{:?}", result.error);
        let p = &result.root.children[0];
        let content = &p.children[0];
        assert_eq!(content.children.len(), 3);
        assert!(matches!(&content.children[0].token, Token::Text(t) if t == "before "));
        assert!(
            matches!(&content.children[1].token, Token::Ident(f) if f.name == ESCAPE_HTML_FN)
        );
    }

    #[test]
    fn test_unbuffered_var_statement() {
        let result = parse("- var city = \"Oslo\"\np= city");
        assert!(result.error.is_none(), "{:?}", result.error);
        let var = &result.root.children[0];
        let Token::Ident(f) = &var.token else {
            panic!("expected var node");
        };
        assert_eq!(f.name, "var");
        assert_eq!(f.args.len(), 2);
    }

    #[test]
    fn test_piped_and_raw_text_lines() {
        let result = parse("| plain text\n<b>raw</b>");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert!(matches!(&result.root.children[0].token, Token::Text(t) if t == "plain text"));
        assert!(matches!(&result.root.children[1].token, Token::Text(t) if t == "<b>raw</b>"));
    }

    #[test]
    fn test_trailing_whitespace_line_emits_nothing() {
        let result = parse("p hi\n  ");
        assert!(result.error.is_none(), "{:?}", result.error);
        assert_eq!(result.root.children.len(), 1);
    }
}
