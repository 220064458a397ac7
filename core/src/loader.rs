// Template loading: the loader contract, the plain directory loader, and a
// moka-backed caching decorator keyed by resolved path and invalidated by
// file modification time.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use moka::sync::Cache;

use crate::error::LoaderError;
use crate::parser::{parse, ParseResult};

/// A loaded template: raw source plus, for template files, its parse result.
#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub name: String,
    pub source: String,
    pub parsed: Option<ParseResult>,
    pub is_template: bool,
}

/// Resolves template names to content. `load` must parse `.jade` sources and
/// pass anything else through raw.
pub trait TemplateLoader: Send + Sync {
    fn set_view_path(&mut self, path: &Path);
    fn load(&self, name: &str) -> Result<LoadedTemplate, LoaderError>;
}

/// Resolve a template name under the view path, appending the `.jade`
/// extension when the name carries none.
fn resolve(view_path: &Path, name: &str) -> PathBuf {
    let name = name.trim();
    let mut file = name.to_string();
    if !name.contains('.') {
        file.push_str(".jade");
    }
    view_path.join(file)
}

fn read_template(name: &str, path: &Path) -> Result<LoadedTemplate, LoaderError> {
    log::debug!("loading template {:?} from {:?}", name, path);
    let source = fs::read_to_string(path).map_err(|err| LoaderError::NotFound {
        name: name.to_string(),
        path: path.to_path_buf(),
        source: err,
    })?;
    let is_template = path.extension().is_some_and(|ext| ext == "jade");
    let parsed = if is_template { Some(parse(&source)) } else { None };
    Ok(LoadedTemplate {
        name: name.trim().to_string(),
        source,
        parsed,
        is_template,
    })
}

/// The default loader: reads templates from a view directory on every call.
#[derive(Debug, Default)]
pub struct DirLoader {
    view_path: PathBuf,
}

impl DirLoader {
    pub fn new() -> Self {
        DirLoader::default()
    }
}

impl TemplateLoader for DirLoader {
    fn set_view_path(&mut self, path: &Path) {
        self.view_path = path.to_path_buf();
    }

    fn load(&self, name: &str) -> Result<LoadedTemplate, LoaderError> {
        read_template(name, &resolve(&self.view_path, name))
    }
}

struct CachedTemplate {
    modified: Option<SystemTime>,
    template: LoadedTemplate,
}

/// A loader that keeps loaded-and-parsed templates in a bounded cache,
/// re-reading a file only when its modification time changes.
pub struct CachingLoader {
    view_path: PathBuf,
    cache: Cache<PathBuf, Arc<CachedTemplate>>,
}

impl CachingLoader {
    pub fn new(capacity: u64) -> Self {
        CachingLoader {
            view_path: PathBuf::new(),
            cache: Cache::new(capacity),
        }
    }
}

impl TemplateLoader for CachingLoader {
    fn set_view_path(&mut self, path: &Path) {
        self.view_path = path.to_path_buf();
        self.cache.invalidate_all();
    }

    fn load(&self, name: &str) -> Result<LoadedTemplate, LoaderError> {
        let path = resolve(&self.view_path, name);
        let modified = fs::metadata(&path).ok().and_then(|m| m.modified().ok());
        if let Some(hit) = self.cache.get(&path) {
            if modified.is_some() && hit.modified == modified {
                log::trace!("template cache hit for {:?}", path);
                return Ok(hit.template.clone());
            }
        }
        let template = read_template(name, &path)?;
        self.cache.insert(
            path,
            Arc::new(CachedTemplate {
                modified,
                template: template.clone(),
            }),
        );
        Ok(template)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_appends_default_extension() {
        let base = Path::new("/views");
        assert_eq!(resolve(base, "index"), Path::new("/views/index.jade"));
        assert_eq!(resolve(base, "index.jade"), Path::new("/views/index.jade"));
        assert_eq!(resolve(base, "page.html"), Path::new("/views/page.html"));
        assert_eq!(resolve(base, "  index "), Path::new("/views/index.jade"));
    }
}
