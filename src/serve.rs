//! Development server.
//!
//! Three cooperating parts:
//!
//! 1. **Static HTTP server**: an axum router on a dedicated thread whose
//!    search order for a requested path is temp, then src, then public
//!    (first match wins). Requests under `/node_modules` are served from
//!    the local dependency directory.
//! 2. **Reload channel**: the websocket broadcast from [`crate::reload`].
//! 3. **Watch bindings**: filesystem events are dispatched through an
//!    explicit table mapping glob pattern to action. Style, script and
//!    page sources re-run exactly their own task; images, fonts and
//!    public files only trigger a reload, since they are served
//!    unprocessed during development.
//!
//! Change events are debounced by the watcher but otherwise not
//! coalesced: rapid successive saves each dispatch their own task run,
//! and runs of the same task are not serialized against each other. A
//! failed re-run is logged and the server keeps going.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use axum::Router;
use camino::{Utf8Path, Utf8PathBuf};
use console::style;
use glob::Pattern;
use notify::{EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{DebounceEventResult, Debouncer, RecommendedCache, new_debouncer};
use tower_http::services::ServeDir;

use crate::config::Config;
use crate::error::ServeError;
use crate::reload::ReloadServer;
use crate::task::{ReloadTx, Task};

const DEBOUNCE: Duration = Duration::from_millis(250);

pub enum WatchAction {
    /// Re-run exactly this task; on success the task itself notifies the
    /// reload channel.
    Run(Arc<Task>),
    /// Push the changed paths straight to the reload channel.
    Reload,
}

/// One entry of the event dispatch table, created at server start and
/// alive for the whole server lifetime.
pub struct WatchBinding {
    pattern: Pattern,
    action: WatchAction,
}

impl WatchBinding {
    pub fn run(
        base: impl AsRef<Utf8Path>,
        pattern: &str,
        task: Task,
    ) -> Result<Self, ServeError> {
        Ok(Self {
            pattern: Pattern::new(base.as_ref().join(pattern).as_str())?,
            action: WatchAction::Run(Arc::new(task)),
        })
    }

    pub fn reload(base: impl AsRef<Utf8Path>, pattern: &str) -> Result<Self, ServeError> {
        Ok(Self {
            pattern: Pattern::new(base.as_ref().join(pattern).as_str())?,
            action: WatchAction::Reload,
        })
    }

    fn matches(&self, path: &Utf8Path) -> bool {
        self.pattern.matches(path.as_str())
    }
}

/// First binding whose pattern matches wins.
fn find_binding<'a>(bindings: &'a [WatchBinding], path: &Utf8Path) -> Option<&'a WatchBinding> {
    bindings.iter().find(|binding| binding.matches(path))
}

pub struct ServeHandle {
    debouncer: Option<Debouncer<RecommendedWatcher, RecommendedCache>>,
    events: Option<JoinHandle<()>>,
    http: Option<JoinHandle<anyhow::Result<()>>>,
    shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl ServeHandle {
    /// Block until the server is stopped from elsewhere. There is no
    /// automatic shutdown.
    pub fn wait(mut self) {
        if let Some(events) = self.events.take() {
            let _ = events.join();
        }
    }

    /// Tear down the watches and the HTTP server. An in-flight task run
    /// finishes on its own; it is not cancelled.
    pub fn stop(mut self) {
        self.debouncer.take();
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(events) = self.events.take() {
            let _ = events.join();
        }
        if let Some(http) = self.http.take() {
            let _ = http.join();
        }
    }
}

/// Start the static server, the reload channel and the watches.
pub fn serve(
    config: Arc<Config>,
    bindings: Vec<WatchBinding>,
    reload: ReloadServer,
) -> Result<ServeHandle, ServeError> {
    let root = std::env::current_dir()?;
    let reload_tx = reload.sender();

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let http = start_http(&config, shutdown_rx);

    let (tx, rx) = std::sync::mpsc::channel();
    let mut debouncer = new_debouncer(DEBOUNCE, None, tx)?;

    for dir in [&config.build.src, &config.build.public] {
        if dir.is_dir() {
            tracing::info!(%dir, "watching");
            debouncer.watch(dir.as_std_path(), RecursiveMode::Recursive)?;
        }
    }

    let events = thread::spawn(move || event_loop(rx, root, bindings, reload_tx));

    Ok(ServeHandle {
        debouncer: Some(debouncer),
        events: Some(events),
        http: Some(http),
        shutdown: Some(shutdown_tx),
    })
}

fn event_loop(
    rx: Receiver<DebounceEventResult>,
    root: PathBuf,
    bindings: Vec<WatchBinding>,
    reload: ReloadTx,
) {
    while let Ok(result) = rx.recv() {
        let events = match result {
            Ok(events) => events,
            Err(errors) => {
                for e in errors {
                    tracing::error!("watch error: {e}");
                }
                continue;
            }
        };

        let mut reload_only = Vec::new();

        for event in &events {
            if !matches!(
                event.event.kind,
                EventKind::Create(..) | EventKind::Modify(..) | EventKind::Remove(..)
            ) {
                continue;
            }

            for path in &event.event.paths {
                let rel = path.strip_prefix(&root).unwrap_or(path.as_path());
                let Some(rel) = Utf8Path::from_path(rel) else {
                    continue;
                };

                let Some(binding) = find_binding(&bindings, rel) else {
                    continue;
                };

                match &binding.action {
                    WatchAction::Run(task) => {
                        tracing::info!(task = task.name(), changed = %rel, "change detected");
                        if let Err(e) = task.run() {
                            // The server must survive a broken rebuild.
                            tracing::error!("rebuild of '{}' failed:\n{e}", task.name());
                        }
                    }
                    WatchAction::Reload => reload_only.push(rel.to_owned()),
                }
            }
        }

        if !reload_only.is_empty() && reload.send(reload_only).is_err() {
            break;
        }
    }
}

fn start_http(
    config: &Config,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> JoinHandle<anyhow::Result<()>> {
    let port = config.serve.port;
    let temp = config.build.temp.clone();
    let src = config.build.src.clone();
    let public = config.build.public.clone();

    let url = style(format!("http://localhost:{port}/")).yellow();
    tracing::info!(%url, "starting the dev server");

    thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(http_serve(port, temp, src, public, shutdown))
    })
}

async fn http_serve(
    port: u16,
    temp: Utf8PathBuf,
    src: Utf8PathBuf,
    public: Utf8PathBuf,
    shutdown: tokio::sync::oneshot::Receiver<()>,
) -> anyhow::Result<()> {
    let address = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(address).await?;

    // Search order is temp, then src, then public; first match wins.
    let files = ServeDir::new(temp).fallback(ServeDir::new(src).fallback(ServeDir::new(public)));

    let router = Router::new()
        .nest_service("/node_modules", ServeDir::new("node_modules"))
        .fallback_service(files);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.await;
        })
        .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_matches_only_its_own_kind() {
        let styles = WatchBinding::reload("src", "assets/styles/*.scss").unwrap();

        assert!(styles.matches(Utf8Path::new("src/assets/styles/a.scss")));
        assert!(!styles.matches(Utf8Path::new("src/assets/scripts/a.js")));
        assert!(!styles.matches(Utf8Path::new("public/a.scss")));
    }

    #[test]
    fn first_matching_binding_wins() {
        let bindings = vec![
            WatchBinding::reload("src", "assets/styles/*.scss").unwrap(),
            WatchBinding::reload("src", "assets/**/*").unwrap(),
        ];

        let hit = find_binding(&bindings, Utf8Path::new("src/assets/styles/a.scss")).unwrap();
        assert_eq!(hit.pattern.as_str(), "src/assets/styles/*.scss");

        let hit = find_binding(&bindings, Utf8Path::new("src/assets/images/a.png")).unwrap();
        assert_eq!(hit.pattern.as_str(), "src/assets/**/*");

        assert!(find_binding(&bindings, Utf8Path::new("README.md")).is_none());
    }

    #[test]
    fn public_binding_covers_nested_paths() {
        let public = WatchBinding::reload("public", "**").unwrap();

        assert!(public.matches(Utf8Path::new("public/favicon.ico")));
        assert!(public.matches(Utf8Path::new("public/fonts/pages.woff2")));
    }
}
