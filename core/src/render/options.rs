// Rendering options

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderOptions {
    /// Pretty-print the output: newline-separated tags indented two spaces
    /// per nesting level.
    pub beautify: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self { beautify: false }
    }
}
