//! Named entry points of the build pipeline.
//!
//! [`Pipeline`] turns the resolved configuration into concrete tasks and
//! composes them into the graph nodes exposed on the command line. The
//! build ordering is the load-bearing part:
//!
//! clean → parallel(extra, image, font, sequence(compile, useref))
//!
//! Cleaning must precede everything. Styles, scripts and pages are
//! independent transforms into the shared temp area, so they run in
//! parallel; bundling scans rendered pages for compiled assets and so
//! runs only after all three have finished. Images, fonts and extras
//! write straight to dist and ride alongside the whole temp pipeline.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};

use crate::bundle::bundle;
use crate::clean::clean;
use crate::config::Config;
use crate::graph::{Node, leaf, parallel, sequence, step};
use crate::task::{ReloadTx, Task};
use crate::transform::{CompileScripts, CompileStyles, OptimizeImages, RenderPages};

/// Content-hash cache for optimized images, shared across builds.
const IMAGE_CACHE: &str = ".cache/optimized";

pub struct Pipeline {
    config: Arc<Config>,
    reload: Option<ReloadTx>,
}

impl Pipeline {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            reload: None,
        }
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    fn with_notify(&self, task: Task) -> Task {
        match &self.reload {
            Some(tx) => task.with_reload(tx.clone()),
            None => task,
        }
    }

    pub fn style_task(&self) -> Task {
        let b = &self.config.build;
        let load_path = b.src.join(static_prefix(&b.paths.styles));
        self.with_notify(
            Task::new("style", b.paths.styles.clone(), &b.src, &b.src, &b.temp)
                .with_stage(CompileStyles::expanded([load_path])),
        )
    }

    pub fn script_task(&self) -> Task {
        let b = &self.config.build;
        self.with_notify(
            Task::new("script", b.paths.scripts.clone(), &b.src, &b.src, &b.temp)
                .with_stage(CompileScripts::default()),
        )
    }

    pub fn page_task(&self) -> Task {
        let b = &self.config.build;
        let pattern = format!("**/{}", b.paths.pages);
        self.with_notify(
            Task::new("page", pattern, &b.src, &b.src, &b.temp)
                .with_stage(RenderPages::new(self.config.data.clone())),
        )
    }

    pub fn image_task(&self) -> Task {
        let b = &self.config.build;
        Task::new("image", b.paths.images.clone(), &b.src, &b.src, &b.dist)
            .with_stage(OptimizeImages::new(IMAGE_CACHE))
    }

    /// Fonts carry no lossy re-encode, they are copied as-is into dist.
    pub fn font_task(&self) -> Task {
        let b = &self.config.build;
        Task::new("font", b.paths.fonts.clone(), &b.src, &b.src, &b.dist)
    }

    pub fn extra_task(&self) -> Task {
        let b = &self.config.build;
        Task::new("extra", "**/*", &b.public, &b.public, &b.dist)
    }

    pub fn clean(&self) -> Node {
        let config = self.config.clone();
        step("clean", move || {
            clean(&[config.build.dist.clone(), config.build.temp.clone()])?;
            Ok(())
        })
    }

    pub fn lint(&self) -> Node {
        let config = self.config.clone();
        step("lint", move || {
            crate::lint::lint(&config)?;
            Ok(())
        })
    }

    pub fn compile(&self) -> Node {
        parallel([
            leaf(self.style_task()),
            leaf(self.script_task()),
            leaf(self.page_task()),
        ])
    }

    pub fn link(&self) -> Node {
        parallel([leaf(self.style_task()), leaf(self.script_task())])
    }

    pub fn useref(&self) -> Node {
        let config = self.config.clone();
        step("useref", move || {
            bundle(&config)?;
            Ok(())
        })
    }

    pub fn build(&self) -> Node {
        sequence([
            self.clean(),
            parallel([
                leaf(self.extra_task()),
                leaf(self.image_task()),
                leaf(self.font_task()),
                sequence([self.compile(), self.useref()]),
            ]),
        ])
    }

    pub fn upload(&self) -> Node {
        let config = self.config.clone();
        step("upload", move || {
            crate::deploy::upload(&config)?;
            Ok(())
        })
    }

    pub fn deploy(&self) -> Node {
        sequence([self.compile(), self.upload()])
    }

    /// Start the dev server: the reload channel comes up first so the
    /// watch tasks can notify it, then the watches and the static server.
    #[cfg(feature = "server")]
    pub fn serve(&self) -> Result<crate::serve::ServeHandle, crate::error::ServeError> {
        use crate::reload::ReloadServer;
        use crate::serve::WatchBinding;

        let reload = ReloadServer::start()?;
        let live = Self {
            config: self.config.clone(),
            reload: Some(reload.sender()),
        };

        let b = &self.config.build;
        let pages = format!("**/{}", b.paths.pages);
        let bindings = vec![
            WatchBinding::run(&b.src, &b.paths.styles, live.style_task())?,
            WatchBinding::run(&b.src, &b.paths.scripts, live.script_task())?,
            WatchBinding::run(&b.src, &pages, live.page_task())?,
            WatchBinding::reload(&b.src, &b.paths.images)?,
            WatchBinding::reload(&b.src, &b.paths.fonts)?,
            WatchBinding::reload(&b.public, "**")?,
        ];

        crate::serve::serve(self.config.clone(), bindings, reload)
    }
}

/// Leading components of a glob pattern before the first wildcard.
fn static_prefix(pattern: &str) -> Utf8PathBuf {
    Utf8Path::new(pattern)
        .components()
        .take_while(|c| !c.as_str().contains(['*', '?', '[']))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph;
    use std::fs;

    fn project() -> (tempfile::TempDir, Arc<Config>) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let mut config = Config::default();
        config.build.src = root.join("src");
        config.build.dist = root.join("dist");
        config.build.temp = root.join("temp");
        config.build.public = root.join("public");

        (dir, Arc::new(config))
    }

    #[test]
    fn static_prefix_stops_at_wildcards() {
        assert_eq!(
            static_prefix("assets/styles/*.scss"),
            Utf8PathBuf::from("assets/styles")
        );
        assert_eq!(static_prefix("**/*.html"), Utf8PathBuf::from(""));
    }

    #[test]
    fn compile_resolves_style_variables_into_temp() {
        let (_dir, config) = project();
        let src = &config.build.src;
        fs::create_dir_all(src.join("assets/styles")).unwrap();
        fs::write(
            src.join("assets/styles/a.scss"),
            "$primary: #abcdef;\nbody { color: $primary; }",
        )
        .unwrap();

        let pipeline = Pipeline::new(config.clone());
        graph::run(&parallel([leaf(pipeline.style_task())])).unwrap();

        let css = fs::read_to_string(config.build.temp.join("assets/styles/a.css")).unwrap();
        assert!(css.contains("color: #abcdef"));
    }

    #[test]
    fn build_with_no_sources_creates_empty_dist() {
        let (_dir, config) = project();
        fs::create_dir_all(&config.build.src).unwrap();

        let pipeline = Pipeline::new(config.clone());
        graph::run(&pipeline.build()).unwrap();

        assert!(config.build.dist.is_dir());
    }

    #[test]
    fn build_bundles_pages_and_copies_extras() {
        let (_dir, config) = project();
        let src = &config.build.src;
        fs::create_dir_all(src.join("assets/styles")).unwrap();
        fs::create_dir_all(&config.build.public).unwrap();
        fs::write(
            src.join("assets/styles/main.scss"),
            "$bg: #fff;\nbody { background: $bg; }",
        )
        .unwrap();
        fs::write(
            src.join("index.html"),
            concat!(
                "<html>\n  <head>\n",
                "<!-- build:css /assets/styles/site.css -->\n",
                "<link rel=\"stylesheet\" href=\"/assets/styles/main.css\">\n",
                "<!-- endbuild -->\n",
                "  </head>\n  <body>\n    <p>hello</p>\n  </body>\n</html>\n",
            ),
        )
        .unwrap();
        fs::write(config.build.public.join("favicon.ico"), "icon").unwrap();

        let pipeline = Pipeline::new(config.clone());
        graph::run(&pipeline.build()).unwrap();

        // Compiled stylesheet landed in temp, bundled+minified in dist.
        assert!(config.build.temp.join("assets/styles/main.css").is_file());
        let css = fs::read_to_string(config.build.dist.join("assets/styles/site.css")).unwrap();
        assert!(css.contains("body{background:#fff}"));

        // Page got its block collapsed and whitespace folded.
        let html = fs::read_to_string(config.build.dist.join("index.html")).unwrap();
        assert!(html.contains("<link rel=\"stylesheet\" href=\"/assets/styles/site.css\">"));
        assert!(!html.contains("\n  "));

        // Public extras arrive in dist untouched.
        assert_eq!(
            fs::read_to_string(config.build.dist.join("favicon.ico")).unwrap(),
            "icon"
        );
    }

    #[test]
    fn build_stops_at_a_broken_stylesheet() {
        let (_dir, config) = project();
        let src = &config.build.src;
        fs::create_dir_all(src.join("assets/styles")).unwrap();
        fs::create_dir_all(&config.build.public).unwrap();
        fs::write(src.join("assets/styles/broken.scss"), "body { color: ").unwrap();
        fs::write(config.build.public.join("robots.txt"), "User-agent: *").unwrap();

        let pipeline = Pipeline::new(config.clone());
        let err = graph::run(&pipeline.build()).unwrap_err();

        assert_eq!(err.step, "style");
        // Parallel siblings are not cancelled; their output still lands.
        assert!(config.build.dist.join("robots.txt").is_file());
    }
}
