//! Stage implementations for the external transform collaborators.
//!
//! Each module adapts exactly one off-the-shelf tool to the [`Stage`]
//! contract: text or bytes in, text or bytes out, failure as a
//! [`TransformError`]. None of these carry pipeline logic of their own.
//!
//! [`Stage`]: crate::task::Stage
//! [`TransformError`]: crate::error::TransformError

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::TransformError;

pub mod images;
pub mod pages;
pub mod scripts;
pub mod styles;

pub use images::OptimizeImages;
pub use pages::RenderPages;
pub use scripts::CompileScripts;
pub use styles::CompileStyles;

/// Run an external tool, feeding `input` on stdin and capturing stdout.
/// A nonzero exit reports the tool's stderr.
pub(crate) fn run_tool(
    tool: &'static str,
    args: &[&str],
    input: &[u8],
) -> Result<Vec<u8>, TransformError> {
    let mut child = Command::new(tool)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| TransformError::Spawn { tool, source })?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input)?;
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(TransformError::Tool {
            tool,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(output.stdout)
}
