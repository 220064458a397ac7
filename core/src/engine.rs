// Public engine API: configuration (view path, host functions, output
// options) plus the render entry points. An engine is read-only while
// rendering; every render owns its evaluator, scope stack, and output
// buffer, so a shared engine can serve concurrent renders.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::error::Error;
use crate::eval::value::Value;
use crate::eval::{Evaluator, HostFn};
use crate::loader::{DirLoader, TemplateLoader};
use crate::render::RenderOptions;

pub struct Engine {
    loader: Box<dyn TemplateLoader>,
    functions: HashMap<String, HostFn>,
    options: RenderOptions,
}

impl Engine {
    pub fn new() -> Self {
        Engine {
            loader: Box::new(DirLoader::new()),
            functions: HashMap::new(),
            options: RenderOptions::default(),
        }
    }

    /// Root directory the loader resolves template names against.
    pub fn set_view_path(&mut self, path: impl AsRef<Path>) {
        self.loader.set_view_path(path.as_ref());
    }

    /// Swap in a custom template loader.
    pub fn set_loader(&mut self, loader: Box<dyn TemplateLoader>) {
        self.loader = loader;
    }

    /// Enable indented pretty-printed output.
    pub fn set_beautify(&mut self, on: bool) {
        self.options.beautify = on;
    }

    /// Register a host function callable from templates. The function
    /// receives evaluated arguments; an `Err` aborts the render naming the
    /// function.
    pub fn register_function<F>(&mut self, name: &str, function: F)
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Box::new(function));
    }

    /// Render a named template (the `.jade` extension is appended when the
    /// name has none) against `data`.
    pub fn render_file<T: Serialize>(&self, name: &str, data: &T) -> Result<String, Error> {
        Ok(self.render_file_with_warnings(name, data)?.0)
    }

    /// Like `render_file`, also returning the non-fatal warnings collected
    /// during the render (missing variables and parser advisories).
    pub fn render_file_with_warnings<T: Serialize>(
        &self,
        name: &str,
        data: &T,
    ) -> Result<(String, Vec<String>), Error> {
        log::debug!("rendering template file {:?}", name);
        let mut evaluator = self.evaluator(data)?;
        evaluator.render_file(name)?;
        Ok(evaluator.finish())
    }

    /// Render a named template straight into a writer.
    pub fn render_file_to<T: Serialize>(
        &self,
        writer: &mut dyn Write,
        name: &str,
        data: &T,
    ) -> Result<(), Error> {
        let html = self.render_file(name, data)?;
        writer.write_all(html.as_bytes())?;
        Ok(())
    }

    /// Render inline template source against `data`.
    pub fn render_string<T: Serialize>(&self, source: &str, data: &T) -> Result<String, Error> {
        Ok(self.render_string_with_warnings(source, data)?.0)
    }

    /// Like `render_string`, also returning collected warnings.
    pub fn render_string_with_warnings<T: Serialize>(
        &self,
        source: &str,
        data: &T,
    ) -> Result<(String, Vec<String>), Error> {
        let mut evaluator = self.evaluator(data)?;
        evaluator.render_string(source)?;
        Ok(evaluator.finish())
    }

    fn evaluator<T: Serialize>(&self, data: &T) -> Result<Evaluator<'_>, Error> {
        let data = Value::from_serialize(data)?;
        Ok(Evaluator::new(
            self.loader.as_ref(),
            &self.functions,
            self.options.clone(),
            data,
        ))
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}
