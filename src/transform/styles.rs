use camino::Utf8PathBuf;

use crate::error::TransformError;
use crate::task::{FileUnit, Stage};

/// Compiles sass source to CSS and renames the file to `.css`.
pub struct CompileStyles {
    style: grass::OutputStyle,
    load_paths: Vec<Utf8PathBuf>,
}

impl CompileStyles {
    /// Fully expanded output, used when compiling into the temp area
    /// during development.
    pub fn expanded(load_paths: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        Self {
            style: grass::OutputStyle::Expanded,
            load_paths: load_paths.into_iter().collect(),
        }
    }

    /// Compressed output, used by the bundler as the CSS minifier.
    pub fn compressed() -> Self {
        Self {
            style: grass::OutputStyle::Compressed,
            load_paths: Vec::new(),
        }
    }

    pub(crate) fn compile(&self, source: &str) -> Result<String, TransformError> {
        let mut opts = grass::Options::default().style(self.style);
        for path in &self.load_paths {
            opts = opts.load_path(path.as_std_path());
        }

        Ok(grass::from_string(source, &opts)?)
    }
}

impl Stage for CompileStyles {
    fn name(&self) -> &'static str {
        "styles"
    }

    fn apply(&self, file: FileUnit) -> Result<FileUnit, TransformError> {
        let source = String::from_utf8(file.contents)?;
        let css = self.compile(&source)?;

        Ok(FileUnit {
            path: file.path.with_extension("css"),
            contents: css.into_bytes(),
        })
    }
}
