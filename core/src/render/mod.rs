// HTML emission: AST → markup text

pub(crate) mod html;
pub mod options;

pub use options::RenderOptions;
