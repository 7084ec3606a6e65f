use camino::Utf8PathBuf;
use thiserror::Error;

/// Top level error for everything that can go wrong in the pipeline.
#[derive(Debug, Error)]
pub enum PagewrightError {
    #[error(transparent)]
    Run(#[from] RunError),

    #[error(transparent)]
    Clean(#[from] CleanError),

    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Deploy(#[from] DeployError),

    #[cfg(feature = "server")]
    #[error("Error while running the dev server:\n{0}")]
    Serve(#[from] ServeError),

    #[error("Working directory is not valid UTF-8\n{0}")]
    WorkingDir(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure of a single step in the task graph, tagged with the step name so
/// a broken build reports exactly where it stopped.
#[derive(Debug, Error)]
#[error("Step '{step}' failed:\n{source}")]
pub struct RunError {
    pub step: String,
    #[source]
    pub source: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("'{file}': {source}")]
    Transform {
        file: Utf8PathBuf,
        source: TransformError,
    },
}

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("File contents are not valid UTF-8.\n{0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("Stylesheet compilation failed.\n{0}")]
    Styles(#[from] Box<grass::Error>),

    #[error("Template rendering failed.\n{0}")]
    Template(#[from] minijinja::Error),

    #[error("Couldn't decode image.\n{0}")]
    Image(#[from] image::ImageError),

    #[error("Couldn't spawn '{tool}', is it installed?\n{source}")]
    Spawn {
        tool: &'static str,
        source: std::io::Error,
    },

    #[error("'{tool}' exited with {status}:\n{stderr}")]
    Tool {
        tool: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
#[error("Couldn't remove '{path}'.\n{source}")]
pub struct CleanError {
    pub path: Utf8PathBuf,
    #[source]
    pub source: std::io::Error,
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Couldn't compile glob pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("'{page}': asset '{href}' not found in any search path")]
    UnresolvedAsset { page: Utf8PathBuf, href: String },

    #[error("'{page}': build block '{target}' is missing an endbuild marker")]
    UnterminatedBlock { page: Utf8PathBuf, target: String },

    #[error("'{page}': malformed build block '<!-- build:{head} -->'")]
    MalformedBlock { page: Utf8PathBuf, head: String },

    #[error("'{page}': {source}")]
    Minify {
        page: Utf8PathBuf,
        source: TransformError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Distribution directory '{0}' does not exist, run a build first")]
    MissingDist(Utf8PathBuf),

    #[error("No deploy repository configured, set deploy.repository in deploy.config.json")]
    NoRepository,

    #[error("Couldn't spawn 'git', is it installed?\n{0}")]
    Spawn(std::io::Error),

    #[error("'git {action}' exited with {status}:\n{stderr}")]
    Git {
        action: &'static str,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("Couldn't bind a port for the reload channel.\n{0}")]
    Bind(std::io::Error),

    #[error("Couldn't compile watch pattern.\n{0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Couldn't register a filesystem watch.\n{0}")]
    Notify(#[from] notify::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
