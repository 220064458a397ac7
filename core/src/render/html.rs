// HTML output generator: tag, attribute, doctype, and comment emission for
// the evaluator, including the beautify pretty-printer.

use crate::error::{Error, EvalErrorKind};
use crate::eval::value::Value;
use crate::eval::Evaluator;
use crate::parser::ast::{CommentKind, GroupKind, Node, Token};
use crate::parser::ast::ESCAPE_HTML_FN;

impl<'e> Evaluator<'e> {
    /// Append text to the output, tracking trailing newlines for the
    /// pretty-printer.
    pub(crate) fn write(&mut self, text: &str) {
        self.last_newline = self.options.beautify && text.ends_with('\n');
        self.out.push_str(text);
    }

    /// Route one node to its emitter. Operators, booleans, and error tokens
    /// produce no direct output.
    pub(crate) fn eval_node(&mut self, node: &Node) -> Result<(), Error> {
        match &node.token {
            Token::Empty => self.eval_content(node),
            Token::Doctype(args) => self.write_doctype(node, args),
            Token::Tag(_) => self.write_tag(node),
            Token::Number(n) => {
                let text = Value::Number(*n).to_string();
                self.write(&text);
                Ok(())
            }
            Token::Text(t) => {
                let text = t.clone();
                self.write(&text);
                Ok(())
            }
            Token::Group(_) => self.write_group(node),
            Token::KeyValue(_) => self.write_key_value(node),
            Token::Ident(_) => self.write_stdfunc(node),
            Token::Comment(kind) => self.write_comment(node, *kind),
            Token::Operator(_) | Token::Bool(_) | Token::Error(_) => Ok(()),
        }
    }

    fn write_doctype(&mut self, node: &Node, args: &[String]) -> Result<(), Error> {
        let arg = args.first().map(|s| s.trim()).unwrap_or("").to_string();
        let text = match arg.as_str() {
            "html" => "<!DOCTYPE html>",
            "xml" => r#"<?xml version="1.0" encoding="utf-8" ?>"#,
            "transitional" => {
                r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Transitional//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-transitional.dtd">"#
            }
            "strict" => {
                r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Strict//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd">"#
            }
            "frameset" => {
                r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.0 Frameset//EN" "http://www.w3.org/TR/xhtml1/DTD/xhtml1-frameset.dtd">"#
            }
            "1.1" => {
                r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML 1.1//EN" "http://www.w3.org/TR/xhtml11/DTD/xhtml11.dtd">"#
            }
            "basic" => {
                r#"<!DOCTYPE html PUBLIC "-//W3C//DTD XHTML Basic 1.1//EN" "http://www.w3.org/TR/xhtml-basic/xhtml-basic11.dtd">"#
            }
            "mobile" => {
                r#"<!DOCTYPE html PUBLIC "-//WAPFORUM//DTD XHTML Mobile 1.2//EN" "http://www.openmobilealliance.org/tech/DTD/xhtml-mobile12.dtd">"#
            }
            other => {
                return Err(self.fail(node, EvalErrorKind::UnknownDoctype(other.to_string())))
            }
        };
        self.doctype = arg;
        self.write(text);
        self.beautify_newline();
        Ok(())
    }

    fn write_tag(&mut self, node: &Node) -> Result<(), Error> {
        let Token::Tag(tag) = &node.token else {
            unreachable!("write_tag called on a non-tag node");
        };
        let name = tag.name.clone();
        let self_closing = tag.self_closing;
        let indent = self.beautify_indent();
        self.write(&indent);
        self.write("<");
        self.write(&name);
        for attr in &tag.attributes {
            self.write_attribute_item(attr)?;
        }
        if self_closing {
            if self.doctype == "html" {
                self.write(">");
            } else {
                self.write("/>");
            }
            self.beautify_newline();
            return Ok(());
        }
        self.write(">");
        let many = node.children.len() > 1;
        if many {
            self.beautify_newline();
        }
        self.depth += 1;
        let body = self.eval_content(node);
        self.depth -= 1;
        body?;
        if many {
            self.beautify_newline();
            self.write(&indent);
        }
        self.write("</");
        self.write(&name);
        self.write(">");
        self.beautify_newline();
        Ok(())
    }

    /// One attribute: a key-value pair, a bare attribute, or an expression
    /// (such as `&attributes`) whose string form is spliced in.
    fn write_attribute_item(&mut self, node: &Node) -> Result<(), Error> {
        match &node.token {
            Token::KeyValue(key) => {
                let key = key.clone();
                self.write_key_value_attribute(node, &key)
            }
            Token::Text(t) => {
                let t = t.clone();
                self.write(" ");
                if self.doctype == "html" {
                    self.write(&t);
                } else {
                    self.write(&format!("{}=\"{}\"", t, t));
                }
                Ok(())
            }
            _ => {
                self.write(" ");
                self.eval_node(node)
            }
        }
    }

    fn write_key_value_attribute(&mut self, node: &Node, key: &str) -> Result<(), Error> {
        let value_node = node.children.first().ok_or_else(|| {
            self.fail(
                node,
                EvalErrorKind::Other("attribute entry is missing its value".to_string()),
            )
        })?;
        let (inner, escape) = strip_escape(value_node);
        let value = self.get_value(inner)?;
        // Boolean attributes render by presence, honouring the doctype.
        if let Value::Bool(on) = value {
            if on {
                self.write(" ");
                if self.doctype == "html" {
                    self.write(key);
                } else {
                    self.write(&format!("{}=\"{}\"", key, key));
                }
            }
            return Ok(());
        }
        self.write(" ");
        self.write(key);
        self.write("=\"");
        match key.to_ascii_lowercase().as_str() {
            "style" => self.write_style_attribute(inner)?,
            "class" => self.eval_node(inner)?,
            _ => {
                let text = value.to_string();
                if escape {
                    self.write(&html_escape::encode_double_quoted_attribute(&text));
                } else {
                    self.write(&text);
                }
            }
        }
        self.write("\"");
        Ok(())
    }

    /// A style map renders as `key:value;key:value`.
    fn write_style_attribute(&mut self, node: &Node) -> Result<(), Error> {
        let mut del = "";
        for entry in &node.children {
            let Token::KeyValue(key) = &entry.token else {
                return Err(self.fail(
                    node,
                    EvalErrorKind::Type(
                        "expecting key:value pairs in the style attribute".to_string(),
                    ),
                ));
            };
            let key = key.clone();
            self.write(del);
            self.write(&key);
            self.write(":");
            self.eval_node(&entry.children[0])?;
            del = ";";
        }
        Ok(())
    }

    fn write_group(&mut self, node: &Node) -> Result<(), Error> {
        let Token::Group(kind) = &node.token else {
            unreachable!("write_group called on a non-group node");
        };
        let (start, end, del) = match kind {
            GroupKind::Paren => ("(", ")", " "),
            GroupKind::Array | GroupKind::Anon => ("", "", " "),
            GroupKind::Object => ("{", "}", ","),
        };
        self.write(start);
        let count = node.children.len();
        for (i, child) in node.children.iter().enumerate() {
            self.eval_node(child)?;
            if i < count - 1 {
                self.write(del);
            }
        }
        self.write(end);
        Ok(())
    }

    fn write_key_value(&mut self, node: &Node) -> Result<(), Error> {
        let Token::KeyValue(key) = &node.token else {
            unreachable!("write_key_value called on a non-entry node");
        };
        let key = key.clone();
        self.write(&key);
        self.write("=\"");
        if let Some(value) = node.children.first() {
            self.eval_node(value)?;
        }
        self.write("\"");
        Ok(())
    }

    /// Identifier chains and calls in content position write their string
    /// form.
    fn write_stdfunc(&mut self, node: &Node) -> Result<(), Error> {
        let Token::Ident(f) = &node.token else {
            unreachable!("write_stdfunc called on a non-identifier node");
        };
        let value = self.eval_func(node, f)?;
        let text = value.to_string();
        self.write(&text);
        Ok(())
    }

    fn write_comment(&mut self, node: &Node, kind: CommentKind) -> Result<(), Error> {
        if kind == CommentKind::Hidden {
            return Ok(());
        }
        let indent = self.beautify_indent();
        self.write(&indent);
        self.write("<!--");
        for child in &node.children {
            self.eval_node(child)?;
        }
        self.write("-->");
        Ok(())
    }

    pub(crate) fn beautify_newline(&mut self) {
        if self.options.beautify && !self.last_newline {
            self.write("\n");
        }
        self.last_newline = true;
    }

    fn beautify_indent(&self) -> String {
        if self.options.beautify {
            "  ".repeat(self.depth)
        } else {
            String::new()
        }
    }
}

/// Peel the escape wrapper the parser puts around `=` attribute values so
/// boolean, class, and style handling can see the raw value.
fn strip_escape(node: &Node) -> (&Node, bool) {
    if let Token::Ident(f) = &node.token {
        if !f.is_identifier && f.name == ESCAPE_HTML_FN && f.args.len() == 1 {
            return (&f.args[0], true);
        }
    }
    (node, false)
}
