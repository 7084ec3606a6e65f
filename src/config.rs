//! Build configuration.
//!
//! A single immutable [`Config`] is resolved once per invocation by deep
//! merging the built-in defaults with the optional override files found in
//! the working directory. A missing or broken override file is expected in
//! unconfigured projects and never aborts the build.

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Override files looked up in the working directory, merged in order.
pub const OVERRIDE_FILES: [&str; 2] = ["pages.config.json", "deploy.config.json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub build: BuildConfig,
    pub serve: ServeConfig,
    pub deploy: DeployConfig,
    /// Free-form data exposed to page templates as the render context.
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub src: Utf8PathBuf,
    pub dist: Utf8PathBuf,
    pub temp: Utf8PathBuf,
    pub public: Utf8PathBuf,
    pub paths: AssetPatterns,
}

/// Glob patterns for each asset kind, relative to the source directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPatterns {
    pub styles: String,
    pub scripts: String,
    pub pages: String,
    pub images: String,
    pub fonts: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServeConfig {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Remote repository URL the distribution directory is pushed to.
    pub repository: Option<String>,
    pub branch: String,
    pub message: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: BuildConfig {
                src: "src".into(),
                dist: "dist".into(),
                temp: "temp".into(),
                public: "public".into(),
                paths: AssetPatterns {
                    styles: "assets/styles/*.scss".into(),
                    scripts: "assets/scripts/*.js".into(),
                    pages: "*.html".into(),
                    images: "assets/images/**/*".into(),
                    fonts: "assets/fonts/**/*".into(),
                },
            },
            serve: ServeConfig { port: 2080 },
            deploy: DeployConfig {
                repository: None,
                branch: "gh-pages".into(),
                message: "Update".into(),
            },
            data: Value::Object(Default::default()),
        }
    }
}

impl Config {
    /// Resolve the effective configuration for `cwd`.
    ///
    /// Starts from the defaults and folds in every override file present,
    /// in [`OVERRIDE_FILES`] order. Override values win at every nesting
    /// level; arrays are replaced wholesale. Load and parse failures are
    /// logged and skipped.
    pub fn resolve(cwd: impl AsRef<Utf8Path>) -> Self {
        let mut value =
            serde_json::to_value(Self::default()).expect("default config is serializable");

        for name in OVERRIDE_FILES {
            let path = cwd.as_ref().join(name);
            match load_override(&path) {
                Ok(Some(patch)) => {
                    tracing::debug!(config = %path, "loaded overrides");
                    merge(&mut value, patch);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(config = %path, "ignoring override file: {e}"),
            }
        }

        match serde_json::from_value(value) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("overrides don't match the expected shape, using defaults: {e}");
                Self::default()
            }
        }
    }
}

fn load_override(path: &Utf8Path) -> Result<Option<Value>, std::io::Error> {
    if !path.exists() {
        return Ok(None);
    }

    let text = fs::read_to_string(path)?;
    let value = serde_json::from_str(&text).map_err(std::io::Error::other)?;

    Ok(Some(value))
}

/// Deep merge `patch` into `base`. Objects merge key by key, everything
/// else (scalars and arrays alike) is replaced wholesale.
fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (slot, patch) => *slot = patch,
    }
}
