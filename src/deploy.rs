use std::process::Command;
use std::time::Instant;

use camino::Utf8Path;

use crate::config::Config;
use crate::error::DeployError;
use crate::graph::as_overhead;

/// Upload the distribution directory to the configured static-hosting
/// branch.
///
/// Works the way the usual pages deployment does: a throwaway repository
/// inside the dist directory gets a single commit holding the current
/// output, which is then force-pushed to the remote branch. Network and
/// auth failures propagate; there is no retry.
pub fn upload(config: &Config) -> Result<(), DeployError> {
    let s = Instant::now();

    let dist = &config.build.dist;
    if !dist.is_dir() {
        return Err(DeployError::MissingDist(dist.clone()));
    }

    let repository = config
        .deploy
        .repository
        .as_deref()
        .ok_or(DeployError::NoRepository)?;
    let branch = &config.deploy.branch;

    if !dist.join(".git").exists() {
        git(dist, "init", &["init", "--quiet"])?;
    }
    git(dist, "add", &["add", "--all"])?;
    git(
        dist,
        "commit",
        &[
            "commit",
            "--quiet",
            "--allow-empty",
            "--message",
            &config.deploy.message,
        ],
    )?;
    git(
        dist,
        "push",
        &["push", "--force", repository, &format!("HEAD:{branch}")],
    )?;

    tracing::info!(repository, branch = %branch, "uploaded {}", as_overhead(s));

    Ok(())
}

fn git(cwd: &Utf8Path, action: &'static str, args: &[&str]) -> Result<(), DeployError> {
    let output = Command::new("git")
        .args(args)
        .current_dir(cwd)
        .output()
        .map_err(DeployError::Spawn)?;

    if !output.status.success() {
        return Err(DeployError::Git {
            action,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    Ok(())
}
