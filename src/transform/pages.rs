use serde_json::Value;

use crate::error::TransformError;
use crate::task::{FileUnit, Stage};

/// Renders page templates with the configured data as context.
///
/// Every invocation renders from scratch; there is no template cache, so
/// edits picked up by the watcher always reach the output.
pub struct RenderPages {
    data: Value,
}

impl RenderPages {
    pub fn new(data: Value) -> Self {
        Self { data }
    }
}

impl Stage for RenderPages {
    fn name(&self) -> &'static str {
        "pages"
    }

    fn apply(&self, file: FileUnit) -> Result<FileUnit, TransformError> {
        let source = String::from_utf8(file.contents)?;

        let env = minijinja::Environment::new();
        let context = minijinja::Value::from_serialize(&self.data);
        let html = env.render_str(&source, context)?;

        Ok(FileUnit {
            path: file.path,
            contents: html.into_bytes(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn injects_configured_data() {
        let stage = RenderPages::new(json!({ "title": "Pages", "menus": ["Home", "About"] }));
        let unit = FileUnit {
            path: "index.html".into(),
            contents: b"<title>{{ title }}</title>{% for m in menus %}<a>{{ m }}</a>{% endfor %}"
                .to_vec(),
        };

        let out = stage.apply(unit).unwrap();
        let html = String::from_utf8(out.contents).unwrap();

        assert_eq!(html, "<title>Pages</title><a>Home</a><a>About</a>");
    }

    #[test]
    fn template_error_fails_the_stage() {
        let stage = RenderPages::new(json!({}));
        let unit = FileUnit {
            path: "broken.html".into(),
            contents: b"{% for %}".to_vec(),
        };

        assert!(matches!(
            stage.apply(unit),
            Err(TransformError::Template(_))
        ));
    }
}
