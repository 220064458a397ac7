// Error taxonomy: parsing, evaluation, loading, and output errors

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error surfaced by the engine API.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Loader(#[from] LoaderError),
    #[error("failed to convert data context: {0}")]
    Data(#[from] serde_json::Error),
    #[error("failed to write rendered output: {0}")]
    Io(#[from] io::Error),
}

/// Fatal parse failure. Carries the source line and a snippet of text near
/// the cursor at the point the parser gave up.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, near {near:?}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub near: String,
    pub message: String,
}

/// Fatal evaluation failure, annotated with the template it happened in and
/// the line computed from the offending node's source offset.
#[derive(Debug, Error)]
#[error("template {template:?} line {line}: {kind}")]
pub struct EvalError {
    pub template: String,
    pub line: usize,
    pub kind: EvalErrorKind,
}

#[derive(Debug, Error)]
pub enum EvalErrorKind {
    #[error("function {0:?} not found")]
    UnknownFunction(String),
    #[error("wrong number of arguments for {name:?}: want {want}, got {got}")]
    Arity { name: String, want: usize, got: usize },
    #[error("{0}")]
    Type(String),
    #[error("block {0:?} not found")]
    UnknownBlock(String),
    #[error("mixin {0:?} not found")]
    UnknownMixin(String),
    #[error("variable {name:?} is undefined: {reason}")]
    UndefinedVariable { name: String, reason: String },
    #[error("invalid 'each' source: expecting an array, map or number, found {0}")]
    EachSource(String),
    #[error("invalid doctype {0:?}")]
    UnknownDoctype(String),
    #[error("'extends' chain loops back to {0:?}")]
    ExtendsCycle(String),
    #[error("function {name:?} failed: {message}")]
    Function { name: String, message: String },
    #[error("{0}")]
    Other(String),
}

/// Template loading failure.
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("template {name:?} not readable at {path:?}: {source}")]
    NotFound {
        name: String,
        path: PathBuf,
        source: io::Error,
    },
}

/// 1-based line number of a byte offset within `source`.
pub(crate) fn line_number(source: &str, pos: usize) -> usize {
    let upto = pos.min(source.len());
    source.as_bytes()[..upto].iter().filter(|b| **b == b'\n').count() + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_number_counts_from_one() {
        let src = "a\nb\nc";
        assert_eq!(line_number(src, 0), 1);
        assert_eq!(line_number(src, 2), 2);
        assert_eq!(line_number(src, 4), 3);
        // Past the end clamps to the last line.
        assert_eq!(line_number(src, 100), 3);
    }
}
