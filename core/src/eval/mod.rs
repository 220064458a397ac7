// Tree-walking evaluator: resolves identifiers against the scope stack and
// data context, runs control flow, expands mixins and blocks, composes
// inheritance chains, and drives the HTML writer.

pub mod builtins;
pub mod scope;
pub mod value;

use std::collections::HashMap;
use std::rc::Rc;

use crate::error::{line_number, Error, EvalError, EvalErrorKind};
use crate::loader::TemplateLoader;
use crate::parser::ast::{GroupKind, Ident, Node, ParseResult, Token};
use crate::parser::ast::{BLOCK_FN, ESCAPE_HTML_FN, MIXIN_CALL_FN};
use crate::render::RenderOptions;

use scope::ScopeStack;
use value::{LinearMap, Value};

/// Host-registered template function. Errors surface as fatal render errors
/// naming the function.
pub type HostFn = Box<dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync>;

const MAX_INCLUDE_DEPTH: usize = 32;

/// Name and source text of a template, kept for error line numbers.
pub(crate) struct TemplateSource {
    pub name: String,
    pub text: String,
}

/// A registered mixin or block: the defining subtree plus the template it
/// came from.
#[derive(Clone)]
struct TemplatePart {
    node: Rc<Node>,
    src: Rc<TemplateSource>,
}

pub struct Evaluator<'e> {
    loader: &'e dyn TemplateLoader,
    host_fns: &'e HashMap<String, HostFn>,
    pub(crate) options: RenderOptions,
    data: Value,
    stack: ScopeStack,
    blocks: HashMap<String, TemplatePart>,
    mixins: HashMap<String, TemplatePart>,
    pub(crate) doctype: String,
    pub(crate) out: String,
    pub(crate) last_newline: bool,
    pub(crate) depth: usize,
    warnings: Vec<String>,
    curr_template: Option<Rc<TemplateSource>>,
    include_depth: usize,
}

impl<'e> Evaluator<'e> {
    pub fn new(
        loader: &'e dyn TemplateLoader,
        host_fns: &'e HashMap<String, HostFn>,
        options: RenderOptions,
        data: Value,
    ) -> Self {
        Evaluator {
            loader,
            host_fns,
            options,
            data,
            stack: ScopeStack::new(),
            blocks: HashMap::new(),
            mixins: HashMap::new(),
            doctype: String::new(),
            out: String::new(),
            last_newline: false,
            depth: 0,
            warnings: Vec::new(),
            curr_template: None,
            include_depth: 0,
        }
    }

    /// Render inline template source into the output buffer.
    pub fn render_string(&mut self, source: &str) -> Result<(), Error> {
        let parsed = crate::parser::parse(source);
        let src = Rc::new(TemplateSource {
            name: "<string>".to_string(),
            text: source.to_string(),
        });
        self.render_parsed(parsed, src)
    }

    /// Render a named template through the loader. Non-template files are
    /// written through raw.
    pub fn render_file(&mut self, name: &str) -> Result<(), Error> {
        let loaded = self.loader.load(name)?;
        if !loaded.is_template {
            self.write(&loaded.source);
            return Ok(());
        }
        let parsed = loaded
            .parsed
            .ok_or_else(|| self.fail_in(&loaded.name, EvalErrorKind::Other(
                "loader returned a template without a parse result".to_string(),
            )))?;
        let src = Rc::new(TemplateSource {
            name: loaded.name,
            text: loaded.source,
        });
        self.render_parsed(parsed, src)
    }

    /// Take the rendered output and the collected warnings.
    pub fn finish(self) -> (String, Vec<String>) {
        debug_assert_eq!(self.stack.depth(), 1, "scope frames must balance");
        (self.out, self.warnings)
    }

    /// Register this template, walk its `extends` chain registering each
    /// ancestor (child definitions win), and render the base template.
    fn render_parsed(&mut self, parsed: ParseResult, src: Rc<TemplateSource>) -> Result<(), Error> {
        if let Some(err) = parsed.error {
            return Err(err.into());
        }
        self.absorb_warnings(&parsed.warnings);
        self.register(&parsed, &src);
        let mut visited = vec![src.name.clone()];
        let mut current = parsed;
        let mut current_src = src;
        while let Some(target) = current.extends.as_ref().map(|t| t.trim().to_string()) {
            log::debug!("template {:?} extends {:?}", current_src.name, target);
            if visited.contains(&target) {
                return Err(self
                    .fail_in(&current_src.name, EvalErrorKind::ExtendsCycle(target)));
            }
            visited.push(target.clone());
            let loaded = self.loader.load(&target)?;
            if !loaded.is_template {
                self.write(&loaded.source);
                return Ok(());
            }
            let parent = loaded.parsed.ok_or_else(|| {
                self.fail_in(&loaded.name, EvalErrorKind::Other(
                    "loader returned a template without a parse result".to_string(),
                ))
            })?;
            if let Some(err) = parent.error {
                return Err(err.into());
            }
            let parent_src = Rc::new(TemplateSource {
                name: loaded.name,
                text: loaded.source,
            });
            self.absorb_warnings(&parent.warnings);
            self.register(&parent, &parent_src);
            current = parent;
            current_src = parent_src;
        }
        let saved = self.curr_template.replace(current_src);
        let result = self.eval_content(&current.root);
        self.curr_template = saved;
        result
    }

    /// Merge a parse result's mixins and blocks; earlier registrations win,
    /// which is what lets a child template override its parent.
    fn register(&mut self, parsed: &ParseResult, src: &Rc<TemplateSource>) {
        for (name, node) in &parsed.mixins {
            self.mixins.entry(name.clone()).or_insert_with(|| TemplatePart {
                node: Rc::new(node.clone()),
                src: src.clone(),
            });
        }
        for (name, node) in &parsed.blocks {
            self.blocks.entry(name.clone()).or_insert_with(|| TemplatePart {
                node: Rc::new(node.clone()),
                src: src.clone(),
            });
        }
    }

    fn absorb_warnings(&mut self, warnings: &[String]) {
        self.warnings.extend_from_slice(warnings);
    }

    // ---- error context --------------------------------------------------

    pub(crate) fn fail(&self, node: &Node, kind: EvalErrorKind) -> Error {
        let (template, line) = match &self.curr_template {
            Some(t) => (t.name.clone(), line_number(&t.text, node.pos)),
            None => ("<unknown>".to_string(), 0),
        };
        Error::Eval(EvalError {
            template,
            line,
            kind,
        })
    }

    fn fail_in(&self, template: &str, kind: EvalErrorKind) -> Error {
        Error::Eval(EvalError {
            template: template.to_string(),
            line: 0,
            kind,
        })
    }

    fn warn(&mut self, node: &Node, message: String) {
        let (template, line) = match &self.curr_template {
            Some(t) => (t.name.clone(), line_number(&t.text, node.pos)),
            None => ("<unknown>".to_string(), 0),
        };
        log::warn!("template {:?} line {}: {}", template, line, message);
        self.warnings
            .push(format!("template {:?} line {}: {}", template, line, message));
    }

    // ---- content walking ------------------------------------------------

    /// Evaluate a node's children in order, tracking if/else chains across
    /// siblings.
    pub(crate) fn eval_content(&mut self, node: &Node) -> Result<(), Error> {
        // 0 = no branch pending, 1 = branch taken, 2 = branch failed
        let mut branch_state = 0u8;
        for item in &node.children {
            if let Token::Ident(f) = &item.token {
                if !f.is_identifier && matches!(f.name.as_str(), "if" | "unless") {
                    branch_state = self.eval_branch(item, f)?;
                    continue;
                }
                if !f.is_identifier && f.name == "else" {
                    if branch_state == 2 {
                        if !f.args.is_empty() {
                            branch_state = self.eval_branch(item, f)?;
                            continue;
                        }
                        self.eval_content(item)?;
                        branch_state = 0;
                    }
                    continue;
                }
            }
            branch_state = 0;
            self.eval_node(item)?;
        }
        Ok(())
    }

    /// Evaluate an `if`/`unless`/`else if` arm: renders the body on success
    /// and reports which way it went.
    fn eval_branch(&mut self, node: &Node, f: &Ident) -> Result<u8, Error> {
        let cond = f.args.first().ok_or_else(|| {
            self.fail(
                node,
                EvalErrorKind::Arity {
                    name: f.name.clone(),
                    want: 1,
                    got: 0,
                },
            )
        })?;
        let mut truth = self.get_bool(cond)?;
        if f.name == "unless" {
            truth = !truth;
        }
        if truth {
            self.eval_content(node)?;
            Ok(1)
        } else {
            Ok(2)
        }
    }

    // ---- value computation ----------------------------------------------

    pub(crate) fn get_value(&mut self, node: &Node) -> Result<Value, Error> {
        match &node.token {
            Token::Number(n) => Ok(Value::Number(*n)),
            Token::Text(t) => Ok(Value::String(t.clone())),
            Token::Bool(b) => Ok(Value::Bool(*b)),
            Token::Group(kind) => self.get_group(node, *kind),
            Token::Operator(op) => self.eval_operator(node, op),
            Token::Ident(f) => self.eval_func(node, f),
            other => Err(self.fail(
                node,
                EvalErrorKind::Type(format!("cannot take the value of {:?}", other)),
            )),
        }
    }

    pub(crate) fn get_bool(&mut self, node: &Node) -> Result<bool, Error> {
        Ok(self.get_value(node)?.is_truthy())
    }

    pub(crate) fn get_text(&mut self, node: &Node) -> Result<String, Error> {
        Ok(self.get_value(node)?.to_string())
    }

    fn get_group(&mut self, node: &Node, kind: GroupKind) -> Result<Value, Error> {
        match kind {
            GroupKind::Object => {
                let mut map = LinearMap::new();
                for item in &node.children {
                    let Token::KeyValue(key) = &item.token else {
                        return Err(self.fail(
                            node,
                            EvalErrorKind::Type(
                                "invalid map entry, expecting key:value".to_string(),
                            ),
                        ));
                    };
                    let value = self.get_value(&item.children[0])?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            GroupKind::Array | GroupKind::Anon => {
                let mut items = Vec::with_capacity(node.children.len());
                for item in &node.children {
                    items.push(self.get_value(item)?);
                }
                Ok(Value::List(items))
            }
            GroupKind::Paren => {
                if node.children.len() != 1 {
                    return Err(self.fail(
                        node,
                        EvalErrorKind::Type(
                            "a parenthesised group holds exactly one expression".to_string(),
                        ),
                    ));
                }
                self.get_value(&node.children[0])
            }
        }
    }

    fn eval_operator(&mut self, node: &Node, op: &str) -> Result<Value, Error> {
        match op {
            "?" => self.conditional(node),
            // Boolean operators short-circuit; operands evaluate lazily.
            "&&" | "and" => {
                for child in &node.children {
                    if !self.get_bool(child)? {
                        return Ok(Value::Bool(false));
                    }
                }
                Ok(Value::Bool(true))
            }
            "||" | "or" => {
                for child in &node.children {
                    if self.get_bool(child)? {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }
            _ => {
                let mut argv = Vec::with_capacity(node.children.len());
                for child in &node.children {
                    argv.push(self.get_value(child)?);
                }
                self.call_named(node, op, &argv)
            }
        }
    }

    /// `cond ? a : b` where the second child is the `:` pair; a bare
    /// `cond ? a` yields an empty string on the false path.
    fn conditional(&mut self, node: &Node) -> Result<Value, Error> {
        if node.children.len() != 2 {
            return Err(self.fail(
                node,
                EvalErrorKind::Type(
                    "'?' requires a condition and a result, as in cond ? a : b".to_string(),
                ),
            ));
        }
        let (true_node, false_node) = match &node.children[1].token {
            Token::Operator(op) if op == ":" => (
                &node.children[1].children[0],
                Some(&node.children[1].children[1]),
            ),
            _ => (&node.children[1], None),
        };
        if self.get_bool(&node.children[0])? {
            self.get_value(true_node)
        } else {
            match false_node {
                Some(n) => self.get_value(n),
                None => Ok(Value::String(String::new())),
            }
        }
    }

    /// Evaluate an identifier chain or a named call, including the template
    /// keywords that behave like functions.
    pub(crate) fn eval_func(&mut self, node: &Node, f: &Ident) -> Result<Value, Error> {
        if f.is_identifier {
            return self.eval_identity(node, f);
        }
        match f.name.as_str() {
            // Definitions produce no output where they stand.
            "mixin" | "extends" => Ok(Value::String(String::new())),
            "if" | "unless" | "else" | "when" | "default" => Err(self.fail(
                node,
                EvalErrorKind::Other(format!("keyword {:?} used as a value", f.name)),
            )),
            "case" => {
                self.eval_case(node, f)?;
                Ok(Value::String(String::new()))
            }
            "var" => {
                if f.args.len() != 2 {
                    return Err(self.fail(
                        node,
                        EvalErrorKind::Arity {
                            name: "var".to_string(),
                            want: 2,
                            got: f.args.len(),
                        },
                    ));
                }
                self.set_variable(node, &f.args[0], &f.args[1])?;
                Ok(Value::String(String::new()))
            }
            "each" => {
                self.eval_each(node, f)?;
                Ok(Value::String(String::new()))
            }
            "include" => {
                self.eval_include(node, f)?;
                Ok(Value::String(String::new()))
            }
            ESCAPE_HTML_FN => {
                if f.args.len() != 1 {
                    return Err(self.fail(
                        node,
                        EvalErrorKind::Arity {
                            name: ESCAPE_HTML_FN.to_string(),
                            want: 1,
                            got: f.args.len(),
                        },
                    ));
                }
                let text = self.get_text(&f.args[0])?;
                Ok(Value::String(html_escape::encode_text(&text).into_owned()))
            }
            MIXIN_CALL_FN => {
                self.eval_mixin(node, f)?;
                Ok(Value::String(String::new()))
            }
            BLOCK_FN => {
                self.eval_block(node, f)?;
                Ok(Value::String(String::new()))
            }
            _ => {
                let mut argv = Vec::with_capacity(f.args.len());
                for arg in &f.args {
                    argv.push(self.get_value(arg)?);
                }
                self.call_named(node, &f.name, &argv)
            }
        }
    }

    /// Call a function by name: built-ins first, then host-registered.
    fn call_named(&mut self, node: &Node, name: &str, argv: &[Value]) -> Result<Value, Error> {
        if let Some(builtin) = builtins::lookup(name) {
            return builtin(argv).map_err(|kind| self.fail(node, kind));
        }
        if let Some(host) = self.host_fns.get(name) {
            return host(argv).map_err(|message| {
                self.fail(
                    node,
                    EvalErrorKind::Function {
                        name: name.to_string(),
                        message,
                    },
                )
            });
        }
        Err(self.fail(node, EvalErrorKind::UnknownFunction(name.to_string())))
    }

    // ---- identifier resolution ------------------------------------------

    /// Resolve `a.b[c].d(args)` against the scope stack and data context.
    /// Missing reads produce the nil sentinel and a warning; the miss turns
    /// fatal only when the chain continues past it.
    fn eval_identity(&mut self, node: &Node, head: &Ident) -> Result<Value, Error> {
        let mut pending: Option<EvalErrorKind> = None;
        let mut cur = Value::Null;
        let mut seg = Some(head);
        let mut first = true;
        while let Some(s) = seg {
            if first {
                match self.stack.get(&s.name) {
                    Some(v) => cur = v.clone(),
                    None => {
                        let (v, miss) = member_of(&self.data, &s.name);
                        cur = v;
                        pending = miss;
                    }
                }
            } else if let Some(kind) = pending.take() {
                return Err(self.fail(node, kind));
            } else if s.is_identifier {
                if !s.name.is_empty() {
                    let (v, miss) = member_of(&cur, &s.name);
                    cur = v;
                    pending = miss;
                }
            } else {
                // Method-style call: the receiver is the first argument.
                let mut argv = vec![cur];
                for arg in &s.args {
                    argv.push(self.get_value(arg)?);
                }
                cur = self.call_named(node, &s.name, &argv)?;
            }
            if let Some(idx) = &s.index {
                if let Some(kind) = pending.take() {
                    return Err(self.fail(node, kind));
                }
                let key = self.get_text(idx)?;
                let (v, miss) = member_of(&cur, &key);
                cur = v;
                match miss {
                    Some(EvalErrorKind::Type(t)) => {
                        return Err(self.fail(node, EvalErrorKind::Type(t)))
                    }
                    other => pending = other,
                }
            }
            seg = s.next.as_deref();
            first = false;
        }
        if let Some(kind) = pending {
            match kind {
                EvalErrorKind::UndefinedVariable { name, reason } => {
                    self.warn(node, format!("variable {:?} is undefined: {}", name, reason));
                }
                other => return Err(self.fail(node, other)),
            }
        }
        Ok(cur)
    }

    // ---- statements -----------------------------------------------------

    fn set_variable(&mut self, node: &Node, name: &Node, value: &Node) -> Result<(), Error> {
        let Token::Ident(id) = &name.token else {
            return Err(self.fail(
                node,
                EvalErrorKind::Type("var declaration expecting a variable name".to_string()),
            ));
        };
        if !id.is_identifier {
            return Err(self.fail(
                node,
                EvalErrorKind::Type("var declaration expecting a name, found a call".to_string()),
            ));
        }
        let v = self.get_value(value)?;
        self.stack.set_global(id.name.clone(), v);
        Ok(())
    }

    /// `each value[, index] in source` over lists, maps, and number ranges.
    fn eval_each(&mut self, node: &Node, f: &Ident) -> Result<(), Error> {
        if f.args.len() != 3 {
            return Err(self.fail(
                node,
                EvalErrorKind::Arity {
                    name: "each".to_string(),
                    want: 3,
                    got: f.args.len(),
                },
            ));
        }
        let value_name = match &f.args[0].token {
            Token::Ident(id) if id.is_identifier => id.name.clone(),
            _ => {
                return Err(self.fail(
                    node,
                    EvalErrorKind::Type(
                        "the first argument of 'each' must be a variable name".to_string(),
                    ),
                ))
            }
        };
        let index_name = match &f.args[1].token {
            Token::Empty => None,
            Token::Ident(id) if id.is_identifier => Some(id.name.clone()),
            _ => {
                return Err(self.fail(
                    node,
                    EvalErrorKind::Type(
                        "the index of 'each' must be a variable name or omitted".to_string(),
                    ),
                ))
            }
        };
        let source = self.get_value(&f.args[2])?;
        self.stack.push_frame();
        let result = self.eval_each_frame(node, &value_name, index_name.as_deref(), source);
        self.stack.pop_frame();
        result
    }

    fn eval_each_frame(
        &mut self,
        node: &Node,
        value_name: &str,
        index_name: Option<&str>,
        source: Value,
    ) -> Result<(), Error> {
        match source {
            Value::List(items) => {
                for (i, item) in items.into_iter().enumerate() {
                    if let Some(index) = index_name {
                        self.stack.set(index, Value::Number(i as f64));
                    }
                    self.stack.set(value_name, item);
                    self.eval_content(node)?;
                }
                Ok(())
            }
            Value::Map(entries) => {
                for (key, item) in entries {
                    if let Some(index) = index_name {
                        self.stack.set(index, Value::String(key));
                    }
                    self.stack.set(value_name, item);
                    self.eval_content(node)?;
                }
                Ok(())
            }
            Value::Number(n) => {
                let count = n as i64;
                for i in 0..count.max(0) {
                    self.stack.set(value_name, Value::Number(i as f64));
                    self.eval_content(node)?;
                }
                Ok(())
            }
            other => Err(self.fail(node, EvalErrorKind::EachSource(other.kind_name().to_string()))),
        }
    }

    /// `case`/`when`/`default`: arms compare against the subject (or their
    /// own truth when there is none); empty arms fall through; `default`
    /// renders only when nothing matched.
    fn eval_case(&mut self, node: &Node, f: &Ident) -> Result<(), Error> {
        let subject = match f.args.first() {
            Some(arg) => Some(self.get_value(arg)?),
            None => None,
        };
        let mut fell_through = false;
        let mut matched = false;
        let mut default_arm: Option<&Node> = None;
        for arm in &node.children {
            let Token::Ident(w) = &arm.token else {
                return Err(self.fail(
                    arm,
                    EvalErrorKind::Other("expecting a 'when' or 'default' statement".to_string()),
                ));
            };
            match w.name.as_str() {
                "when" => {
                    let arm_value = w.args.first().ok_or_else(|| {
                        self.fail(
                            arm,
                            EvalErrorKind::Other("'when' is missing its value".to_string()),
                        )
                    })?;
                    let hit = match &subject {
                        None => self.get_bool(arm_value)?,
                        Some(subject) => {
                            let candidate = self.get_value(arm_value)?;
                            subject
                                .equals(&candidate)
                                .map_err(|kind| self.fail(arm, kind))?
                        }
                    };
                    if hit || fell_through {
                        if arm.children.is_empty() {
                            fell_through = true;
                        } else {
                            self.eval_content(arm)?;
                            matched = true;
                            break;
                        }
                    }
                }
                "default" => default_arm = Some(arm),
                _ => {
                    return Err(self.fail(
                        arm,
                        EvalErrorKind::Other(
                            "expecting a 'when' or 'default' statement".to_string(),
                        ),
                    ))
                }
            }
        }
        if !matched {
            if let Some(arm) = default_arm {
                self.eval_content(arm)?;
            }
        }
        Ok(())
    }

    /// Expand a mixin call: bind parameters by position, the optional
    /// attribute segment under `attributes`, and the indented body under
    /// `block`.
    fn eval_mixin(&mut self, node: &Node, f: &Ident) -> Result<(), Error> {
        let call_node = f.args.first().ok_or_else(|| {
            self.fail(
                node,
                EvalErrorKind::Other("expecting a mixin call".to_string()),
            )
        })?;
        let Token::Ident(call) = &call_node.token else {
            return Err(self.fail(
                node,
                EvalErrorKind::Other("expecting a mixin call".to_string()),
            ));
        };
        let part = self
            .mixins
            .get(&call.name)
            .cloned()
            .ok_or_else(|| self.fail(node, EvalErrorKind::UnknownMixin(call.name.clone())))?;

        // Parameter names from the definition's call form
        let Token::Ident(def_kw) = &part.node.token else {
            return Err(self.fail(
                node,
                EvalErrorKind::Other("mixin registry holds a non-mixin node".to_string()),
            ));
        };
        let mut params: Vec<String> = Vec::new();
        if let Some(Token::Ident(form)) = def_kw.args.first().map(|a| &a.token) {
            if !form.is_identifier {
                for param in &form.args {
                    match &param.token {
                        Token::Ident(p) if p.is_identifier => params.push(p.name.clone()),
                        _ => {
                            return Err(self.fail(
                                node,
                                EvalErrorKind::Type(
                                    "mixin parameters must be identifiers".to_string(),
                                ),
                            ))
                        }
                    }
                }
            }
        }
        if call.args.len() != params.len() {
            return Err(self.fail(
                node,
                EvalErrorKind::Arity {
                    name: call.name.clone(),
                    want: params.len(),
                    got: call.args.len(),
                },
            ));
        }

        self.stack.push_frame();
        let result = self.eval_mixin_frame(node, call, &part, &params);
        self.stack.pop_frame();
        result
    }

    fn eval_mixin_frame(
        &mut self,
        node: &Node,
        call: &Ident,
        part: &TemplatePart,
        params: &[String],
    ) -> Result<(), Error> {
        for (param, arg) in params.iter().zip(&call.args) {
            let v = self.get_value(arg)?;
            self.stack.set(param.clone(), v);
        }
        if let Some(seg) = &call.next {
            if seg.name == "attributes" {
                let mut attributes = LinearMap::new();
                for pair in &seg.args {
                    let valid = matches!(&pair.token, Token::Operator(op) if op == "=")
                        && pair.children.len() == 2;
                    if !valid {
                        return Err(self.fail(
                            node,
                            EvalErrorKind::Type(
                                "expecting key=value pairs in the mixin attribute segment"
                                    .to_string(),
                            ),
                        ));
                    }
                    let key = match &pair.children[0].token {
                        Token::Ident(id) if id.is_identifier => id.name.clone(),
                        Token::Text(t) => t.clone(),
                        _ => {
                            return Err(self.fail(
                                node,
                                EvalErrorKind::Type(
                                    "expecting an attribute name before '='".to_string(),
                                ),
                            ))
                        }
                    };
                    let value = self.get_value(&pair.children[1])?;
                    attributes.insert(key, value);
                }
                self.stack.set("attributes", Value::Map(attributes));
            }
        }
        if !node.children.is_empty() {
            self.stack
                .set("block", Value::Tree(Rc::new(node.clone())));
        }
        let saved = self.curr_template.replace(part.src.clone());
        let result = self.eval_content(&part.node);
        self.curr_template = saved;
        result
    }

    /// `block name` renders the registered block; a bare `block` inside a
    /// mixin renders the body bound at the call site.
    fn eval_block(&mut self, node: &Node, f: &Ident) -> Result<(), Error> {
        let name = f
            .args
            .first()
            .and_then(|a| match &a.token {
                Token::Ident(id) => Some(id.name.clone()),
                _ => None,
            })
            .unwrap_or_default();
        if name.is_empty() {
            match self.stack.get("block").cloned() {
                Some(Value::Tree(body)) => self.eval_content(&body),
                _ => Err(self.fail(node, EvalErrorKind::UnknownBlock(String::new()))),
            }
        } else {
            let part = self
                .blocks
                .get(&name)
                .cloned()
                .ok_or_else(|| self.fail(node, EvalErrorKind::UnknownBlock(name.clone())))?;
            let saved = self.curr_template.replace(part.src.clone());
            let result = self.eval_content(&part.node);
            self.curr_template = saved;
            result
        }
    }

    /// `include file`: templates render inline with full composition,
    /// anything else is written through raw.
    fn eval_include(&mut self, node: &Node, f: &Ident) -> Result<(), Error> {
        let target = f.args.first().ok_or_else(|| {
            self.fail(
                node,
                EvalErrorKind::Other("expecting a filename after 'include'".to_string()),
            )
        })?;
        let filename = self.get_text(target)?;
        let filename = filename.trim().to_string();
        if self.include_depth >= MAX_INCLUDE_DEPTH {
            return Err(self.fail(
                node,
                EvalErrorKind::Other(format!(
                    "include nesting deeper than {} levels",
                    MAX_INCLUDE_DEPTH
                )),
            ));
        }
        self.include_depth += 1;
        let result = self.render_file(&filename);
        self.include_depth -= 1;
        result
    }
}

/// Read a member from a value. Returns the result plus an optional miss:
/// `UndefinedVariable` misses are tolerated until forced, type misuse is
/// fatal at the point of use.
fn member_of(value: &Value, name: &str) -> (Value, Option<EvalErrorKind>) {
    match value {
        Value::Map(m) => match m.get(name) {
            Some(v) => (v.clone(), None),
            None => miss(name, "not found on object"),
        },
        Value::List(items) => match name.parse::<usize>() {
            Ok(i) => match items.get(i) {
                Some(v) => (v.clone(), None),
                None => miss(name, "index out of range"),
            },
            Err(_) => (
                Value::Nil {
                    name: name.to_string(),
                    reason: "invalid index".to_string(),
                },
                Some(EvalErrorKind::Type(format!(
                    "list index {:?} is not a number",
                    name
                ))),
            ),
        },
        Value::Nil {
            name: parent,
            reason,
        } => miss(
            name,
            &format!("parent object {:?} is nil: {}", parent, reason),
        ),
        Value::Null => miss(name, "parent object is null"),
        other => (
            Value::Nil {
                name: name.to_string(),
                reason: format!("parent is a {}", other.kind_name()),
            },
            Some(EvalErrorKind::Type(format!(
                "cannot read {:?} from a {}",
                name,
                other.kind_name()
            ))),
        ),
    }
}

fn miss(name: &str, reason: &str) -> (Value, Option<EvalErrorKind>) {
    (
        Value::Nil {
            name: name.to_string(),
            reason: reason.to_string(),
        },
        Some(EvalErrorKind::UndefinedVariable {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_of_map_hit_and_miss() {
        let mut m = LinearMap::new();
        m.insert("a".into(), Value::from(1.0));
        let map = Value::Map(m);
        let (hit, miss) = member_of(&map, "a");
        assert!(miss.is_none());
        assert!(matches!(hit, Value::Number(n) if n == 1.0));
        let (v, miss) = member_of(&map, "b");
        assert!(matches!(v, Value::Nil { .. }));
        assert!(matches!(miss, Some(EvalErrorKind::UndefinedVariable { .. })));
    }

    #[test]
    fn test_member_of_list_by_numeric_name() {
        let list = Value::List(vec![Value::from("x")]);
        let (hit, miss) = member_of(&list, "0");
        assert!(miss.is_none());
        assert!(matches!(hit, Value::String(s) if s == "x"));
        let (_, miss) = member_of(&list, "zero");
        assert!(matches!(miss, Some(EvalErrorKind::Type(_))));
    }

    #[test]
    fn test_member_of_nil_keeps_diagnostics() {
        let nil = Value::Nil {
            name: "a".into(),
            reason: "not found on object".into(),
        };
        let (v, miss) = member_of(&nil, "b");
        assert!(matches!(v, Value::Nil { .. }));
        let Some(EvalErrorKind::UndefinedVariable { reason, .. }) = miss else {
            panic!("expected an undefined-variable miss");
        };
        assert!(reason.contains("\"a\""));
    }
}
