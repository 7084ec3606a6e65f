use std::fs;
use std::io::ErrorKind;
use std::time::Instant;

use camino::Utf8PathBuf;

use crate::error::CleanError;
use crate::graph::as_overhead;

/// Recursively remove each directory. A directory which does not exist is
/// a no-op, so the whole operation is idempotent. Must finish before any
/// dependent task starts writing, which the build graph guarantees by
/// sequencing clean first.
pub fn clean(paths: &[Utf8PathBuf]) -> Result<(), CleanError> {
    let s = Instant::now();

    for path in paths {
        match fs::remove_dir_all(path) {
            Ok(()) => tracing::debug!(%path, "removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(source) => {
                return Err(CleanError {
                    path: path.clone(),
                    source,
                });
            }
        }
    }

    tracing::info!("cleaned output directories {}", as_overhead(s));

    Ok(())
}
