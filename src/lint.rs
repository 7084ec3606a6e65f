use std::process::Command;

use camino::Utf8Path;

use crate::config::Config;
use crate::error::TransformError;

/// Run the external linters over the source tree with autofix: the
/// stylesheet linter over style sources and the script linter over script
/// sources. Either tool reporting problems fails the step.
pub fn lint(config: &Config) -> Result<(), TransformError> {
    let src = &config.build.src;

    run_linter("stylelint", &[config.build.paths.styles.as_str(), "--fix"], src)?;
    run_linter("standard", &[config.build.paths.scripts.as_str(), "--fix"], src)?;

    Ok(())
}

fn run_linter(tool: &'static str, args: &[&str], cwd: &Utf8Path) -> Result<(), TransformError> {
    let output = Command::new(tool)
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(|source| TransformError::Spawn { tool, source })?;

    if !output.status.success() {
        // Linters report findings on stdout, failures on stderr.
        let mut report = String::from_utf8_lossy(&output.stdout).into_owned();
        report.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(TransformError::Tool {
            tool,
            status: output.status,
            stderr: report,
        });
    }

    tracing::info!(tool, "no problems found");

    Ok(())
}
