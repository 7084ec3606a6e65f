use crate::error::TransformError;
use crate::task::{FileUnit, Stage};
use crate::transform::run_tool;

/// Compiles next-generation script source down to a compatible target via
/// an `esbuild` subprocess.
pub struct CompileScripts {
    target: &'static str,
}

impl Default for CompileScripts {
    fn default() -> Self {
        Self { target: "es2015" }
    }
}

impl CompileScripts {
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }
}

impl Stage for CompileScripts {
    fn name(&self) -> &'static str {
        "scripts"
    }

    fn apply(&self, file: FileUnit) -> Result<FileUnit, TransformError> {
        let target = format!("--target={}", self.target);
        let compiled = run_tool("esbuild", &["--loader=js", target.as_str()], &file.contents)?;

        Ok(FileUnit {
            path: file.path,
            contents: compiled,
        })
    }
}

/// Minify script source, used by the bundler on concatenated bundles and
/// inline blocks.
pub(crate) fn minify(source: &[u8]) -> Result<Vec<u8>, TransformError> {
    run_tool("esbuild", &["--loader=js", "--minify"], source)
}
