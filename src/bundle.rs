//! Reference bundling and minification for rendered pages.
//!
//! Pages in the temp area carry build blocks marking groups of asset
//! references which should ship as a single file:
//!
//! ```html
//! <!-- build:js /assets/scripts/vendor.js -->
//! <script src="/assets/scripts/jquery.js"></script>
//! <script src="/assets/scripts/plugin.js"></script>
//! <!-- endbuild -->
//! ```
//!
//! Each block's members are resolved against the search paths,
//! concatenated in reference order, minified per kind and written to the
//! distribution directory; the block collapses to a single reference. The
//! surrounding markup is then minified as well: comments stripped,
//! inter-tag whitespace collapsed, inline script and style bodies pushed
//! through the same minifiers. `<pre>` and `<textarea>` contents are left
//! alone.

use std::fs;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};

use crate::config::Config;
use crate::error::{BundleError, TransformError};
use crate::graph::as_overhead;
use crate::transform::styles::CompileStyles;

const BLOCK_OPEN: &str = "<!-- build:";
const BLOCK_CLOSE: &str = "<!-- endbuild -->";

#[derive(Debug, Clone, Copy, PartialEq)]
enum BlockKind {
    Script,
    Style,
}

#[derive(Debug, PartialEq)]
struct Block<'a> {
    kind: BlockKind,
    target: &'a str,
    refs: Vec<&'a str>,
}

#[derive(Debug, PartialEq)]
enum Segment<'a> {
    Markup(&'a str),
    Block(Block<'a>),
}

#[derive(Debug, PartialEq)]
enum ParseError {
    Unterminated { target: String },
    Malformed { head: String },
}

/// Bundle and minify every rendered page into the distribution directory.
///
/// Pages are looked up in the temp area; referenced assets are resolved
/// against the temp area first and the project root second, matching how
/// compiled and vendored assets are laid out. An unresolvable reference
/// fails the whole step.
pub fn bundle(config: &Config) -> Result<(), BundleError> {
    let s = Instant::now();

    let temp = &config.build.temp;
    let dist = &config.build.dist;
    let search = [temp.clone(), Utf8PathBuf::from(".")];

    let pattern = temp.join(format!("**/{}", config.build.paths.pages));
    let mut pages = Vec::new();
    for entry in glob::glob(pattern.as_str())? {
        let path = Utf8PathBuf::try_from(entry?)?;
        if path.is_file() {
            pages.push(path);
        }
    }
    pages.sort();

    // Two pages may reference the same bundle target, so pages are
    // processed one at a time to keep output writes disjoint.
    for page in &pages {
        let rel = page.strip_prefix(temp).unwrap_or(page.as_path());
        process_page(page, rel, &search, dist)?;
    }

    fs::create_dir_all(dist)?;

    tracing::info!(pages = pages.len(), "bundled {}", as_overhead(s));

    Ok(())
}

fn process_page(
    page: &Utf8Path,
    rel: &Utf8Path,
    search: &[Utf8PathBuf],
    dist: &Utf8Path,
) -> Result<(), BundleError> {
    let html = fs::read_to_string(page)?;

    let segments = parse_blocks(&html).map_err(|e| match e {
        ParseError::Unterminated { target } => BundleError::UnterminatedBlock {
            page: page.to_owned(),
            target,
        },
        ParseError::Malformed { head } => BundleError::MalformedBlock {
            page: page.to_owned(),
            head,
        },
    })?;

    let mut out = String::with_capacity(html.len());
    for segment in segments {
        match segment {
            Segment::Markup(markup) => out.push_str(markup),
            Segment::Block(block) => {
                write_bundle(&block, page, search, dist)?;
                match block.kind {
                    BlockKind::Script => {
                        out.push_str(&format!(r#"<script src="{}"></script>"#, block.target));
                    }
                    BlockKind::Style => {
                        out.push_str(&format!(
                            r#"<link rel="stylesheet" href="{}">"#,
                            block.target
                        ));
                    }
                }
            }
        }
    }

    let minified = minify_markup(&out).map_err(|source| BundleError::Minify {
        page: page.to_owned(),
        source,
    })?;

    let target = dist.join(rel);
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&target, minified)?;

    Ok(())
}

fn write_bundle(
    block: &Block,
    page: &Utf8Path,
    search: &[Utf8PathBuf],
    dist: &Utf8Path,
) -> Result<(), BundleError> {
    let mut parts: Vec<Vec<u8>> = Vec::with_capacity(block.refs.len());
    for href in &block.refs {
        let path = resolve(href, search).ok_or_else(|| BundleError::UnresolvedAsset {
            page: page.to_owned(),
            href: (*href).to_string(),
        })?;
        parts.push(fs::read(&path)?);
    }

    let joined = parts.join(&b"\n"[..]);
    let minified = match block.kind {
        BlockKind::Script => crate::transform::scripts::minify(&joined),
        BlockKind::Style => minify_css(&joined),
    }
    .map_err(|source| BundleError::Minify {
        page: page.to_owned(),
        source,
    })?;

    let target = dist.join(block.target.trim_start_matches('/'));
    if let Some(dir) = target.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&target, minified)?;

    Ok(())
}

/// Resolve a referenced asset against the search paths, first match wins.
fn resolve(href: &str, search: &[Utf8PathBuf]) -> Option<Utf8PathBuf> {
    let rel = href.trim_start_matches('/');
    search
        .iter()
        .map(|dir| dir.join(rel))
        .find(|path| path.is_file())
}

fn parse_blocks(html: &str) -> Result<Vec<Segment<'_>>, ParseError> {
    let mut segments = Vec::new();
    let mut rest = html;

    while let Some(i) = rest.find(BLOCK_OPEN) {
        if i > 0 {
            segments.push(Segment::Markup(&rest[..i]));
        }

        let after = &rest[i + BLOCK_OPEN.len()..];
        let head_end = after.find("-->").ok_or_else(|| ParseError::Malformed {
            head: after.chars().take(40).collect(),
        })?;
        let head = after[..head_end].trim();

        let (kind, target) = head
            .split_once(char::is_whitespace)
            .ok_or_else(|| ParseError::Malformed {
                head: head.to_string(),
            })?;
        let kind = match kind {
            "js" => BlockKind::Script,
            "css" => BlockKind::Style,
            _ => {
                return Err(ParseError::Malformed {
                    head: head.to_string(),
                });
            }
        };
        let target = target.trim();

        let body = &after[head_end + 3..];
        let end = body.find(BLOCK_CLOSE).ok_or_else(|| ParseError::Unterminated {
            target: target.to_string(),
        })?;

        segments.push(Segment::Block(Block {
            kind,
            target,
            refs: extract_refs(kind, &body[..end]),
        }));

        rest = &body[end + BLOCK_CLOSE.len()..];
    }

    if !rest.is_empty() {
        segments.push(Segment::Markup(rest));
    }

    Ok(segments)
}

/// Pull `src`/`href` attribute values out of a block body, in order.
fn extract_refs(kind: BlockKind, body: &str) -> Vec<&str> {
    let attr = match kind {
        BlockKind::Script => "src=",
        BlockKind::Style => "href=",
    };

    let mut refs = Vec::new();
    let mut rest = body;
    while let Some(i) = rest.find(attr) {
        let after = &rest[i + attr.len()..];
        let Some(quote) = after.chars().next().filter(|c| *c == '"' || *c == '\'') else {
            rest = after;
            continue;
        };
        let value = &after[1..];
        let Some(end) = value.find(quote) else { break };
        refs.push(&value[..end]);
        rest = &value[end + 1..];
    }

    refs
}

fn minify_css(source: &[u8]) -> Result<Vec<u8>, TransformError> {
    let text = String::from_utf8(source.to_vec())?;
    let css = CompileStyles::compressed().compile(&text)?;
    Ok(css.into_bytes())
}

/// Minify page markup: strip comments, collapse whitespace runs outside
/// `<pre>`/`<textarea>`, minify inline script and style bodies.
fn minify_markup(html: &str) -> Result<String, TransformError> {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;

    while let Some(i) = rest.find('<') {
        collapse_into(&mut out, &rest[..i]);
        let tag_rest = &rest[i..];

        if tag_rest.starts_with("<!--") {
            rest = match tag_rest.find("-->") {
                Some(j) => &tag_rest[j + 3..],
                None => "",
            };
            continue;
        }

        let Some(gt) = tag_rest.find('>') else {
            out.push_str(tag_rest);
            return Ok(out);
        };
        let tag = &tag_rest[..=gt];
        out.push_str(tag);
        rest = &tag_rest[gt + 1..];

        match tag_name(tag) {
            Some("script") if !tag.to_ascii_lowercase().contains("src=") => {
                rest = copy_raw_text(&mut out, rest, "</script>", |body| {
                    let min = crate::transform::scripts::minify(body.as_bytes())?;
                    Ok(String::from_utf8_lossy(&min).trim_end().to_string())
                })?;
            }
            Some("style") => {
                rest = copy_raw_text(&mut out, rest, "</style>", |body| {
                    let min = minify_css(body.as_bytes())?;
                    Ok(String::from_utf8_lossy(&min).trim_end().to_string())
                })?;
            }
            Some("pre") => rest = copy_raw_text(&mut out, rest, "</pre>", keep)?,
            Some("textarea") => rest = copy_raw_text(&mut out, rest, "</textarea>", keep)?,
            _ => {}
        }
    }

    collapse_into(&mut out, rest);
    Ok(out)
}

fn keep(body: &str) -> Result<String, TransformError> {
    Ok(body.to_string())
}

/// Copy the raw-text body of an element up to `close`, applying `f` to
/// the body. Without a closing tag the remainder is copied verbatim.
fn copy_raw_text<'a>(
    out: &mut String,
    rest: &'a str,
    close: &str,
    f: impl Fn(&str) -> Result<String, TransformError>,
) -> Result<&'a str, TransformError> {
    let Some(j) = find_ci(rest, close) else {
        out.push_str(rest);
        return Ok("");
    };

    let body = &rest[..j];
    if !body.trim().is_empty() {
        out.push_str(&f(body)?);
    }
    out.push_str(close);

    Ok(&rest[j + close.len()..])
}

/// Collapse whitespace runs in a text node to a single space; whitespace
/// only text between tags disappears entirely.
fn collapse_into(out: &mut String, text: &str) {
    if text.is_empty() {
        return;
    }
    if text.chars().all(char::is_whitespace) {
        return;
    }

    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
}

/// Name of an opening tag, lowercased by convention of this codebase's
/// inputs; `None` for closing tags, doctype and processing junk.
fn tag_name(tag: &str) -> Option<&str> {
    let inner = tag.strip_prefix('<')?;
    let end = inner
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(inner.len());
    match &inner[..end] {
        "" => None,
        name => Some(name),
    }
}

/// ASCII case-insensitive substring search. The needle is ASCII, so the
/// returned index is always a char boundary.
fn find_ci(haystack: &str, needle: &str) -> Option<usize> {
    let h = haystack.as_bytes();
    let n = needle.as_bytes();
    if n.is_empty() || h.len() < n.len() {
        return None;
    }
    (0..=h.len() - n.len()).find(|&i| h[i..i + n.len()].eq_ignore_ascii_case(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_script_and_style_blocks() {
        let html = r#"<head>
<!-- build:css /assets/styles/vendor.css -->
<link rel="stylesheet" href="/assets/styles/a.css">
<link rel="stylesheet" href="/assets/styles/b.css">
<!-- endbuild -->
</head>
<body>
<!-- build:js /assets/scripts/app.js -->
<script src="/assets/scripts/main.js"></script>
<!-- endbuild -->
</body>"#;

        let segments = parse_blocks(html).unwrap();

        assert_eq!(segments.len(), 5);
        assert_eq!(segments[0], Segment::Markup("<head>\n"));
        assert_eq!(
            segments[1],
            Segment::Block(Block {
                kind: BlockKind::Style,
                target: "/assets/styles/vendor.css",
                refs: vec!["/assets/styles/a.css", "/assets/styles/b.css"],
            })
        );
        assert_eq!(
            segments[3],
            Segment::Block(Block {
                kind: BlockKind::Script,
                target: "/assets/scripts/app.js",
                refs: vec!["/assets/scripts/main.js"],
            })
        );
    }

    #[test]
    fn page_without_blocks_is_one_markup_segment() {
        let segments = parse_blocks("<p>plain</p>").unwrap();
        assert_eq!(segments, vec![Segment::Markup("<p>plain</p>")]);
    }

    #[test]
    fn missing_endbuild_is_an_error() {
        let html = "<!-- build:js /app.js -->\n<script src=\"/a.js\"></script>";
        assert_eq!(
            parse_blocks(html),
            Err(ParseError::Unterminated {
                target: "/app.js".to_string()
            })
        );
    }

    #[test]
    fn unknown_block_kind_is_malformed() {
        let html = "<!-- build:wasm /app.wasm -->\n<!-- endbuild -->";
        assert!(matches!(
            parse_blocks(html),
            Err(ParseError::Malformed { .. })
        ));
    }

    #[test]
    fn resolve_prefers_earlier_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        fs::create_dir_all(root.join("temp")).unwrap();
        fs::create_dir_all(root.join("vendor")).unwrap();
        fs::write(root.join("temp/a.css"), "temp").unwrap();
        fs::write(root.join("vendor/a.css"), "vendor").unwrap();

        let search = [root.join("temp"), root.join("vendor")];
        let found = resolve("/a.css", &search).unwrap();

        assert_eq!(found, root.join("temp/a.css"));
    }

    #[test]
    fn collapse_drops_inter_tag_whitespace() {
        let html = "<ul>\n    <li>one</li>\n    <li>two  three</li>\n</ul>";
        let out = minify_markup(html).unwrap();

        assert_eq!(out, "<ul><li>one</li><li>two three</li></ul>");
    }

    #[test]
    fn comments_are_stripped() {
        let out = minify_markup("<p>a</p><!-- note --><p>b</p>").unwrap();
        assert_eq!(out, "<p>a</p><p>b</p>");
    }

    #[test]
    fn pre_content_is_preserved() {
        let html = "<div>\n  <pre>  two\n    spaces</pre>\n</div>";
        let out = minify_markup(html).unwrap();

        assert_eq!(out, "<div><pre>  two\n    spaces</pre></div>");
    }

    #[test]
    fn inline_style_is_minified() {
        let html = "<style>\nbody {\n  color: red;\n}\n</style>";
        let out = minify_markup(html).unwrap();

        assert_eq!(out, "<style>body{color:red}</style>");
    }

    #[test]
    fn css_block_bundles_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let temp = root.join("temp");
        fs::create_dir_all(temp.join("assets/styles")).unwrap();
        fs::write(temp.join("assets/styles/a.css"), "body { color: red; }").unwrap();
        fs::write(temp.join("assets/styles/b.css"), "a { color: blue; }").unwrap();
        fs::write(
            temp.join("index.html"),
            concat!(
                "<head>\n",
                "<!-- build:css /assets/styles/site.css -->\n",
                "<link rel=\"stylesheet\" href=\"/assets/styles/a.css\">\n",
                "<link rel=\"stylesheet\" href=\"/assets/styles/b.css\">\n",
                "<!-- endbuild -->\n",
                "</head>\n",
            ),
        )
        .unwrap();

        let mut config = Config::default();
        config.build.temp = temp.clone();
        config.build.dist = root.join("dist");

        bundle(&config).unwrap();

        let css = fs::read_to_string(root.join("dist/assets/styles/site.css")).unwrap();
        assert!(css.contains("body{color:red}"));
        assert!(css.contains("a{color:blue}"));

        let html = fs::read_to_string(root.join("dist/index.html")).unwrap();
        assert_eq!(
            html,
            "<head><link rel=\"stylesheet\" href=\"/assets/styles/site.css\"></head>"
        );
    }

    #[test]
    fn unresolved_reference_fails_the_bundle() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        let temp = root.join("temp");
        fs::create_dir_all(&temp).unwrap();
        fs::write(
            temp.join("index.html"),
            "<!-- build:css /site.css -->\n<link href=\"/missing.css\">\n<!-- endbuild -->",
        )
        .unwrap();

        let mut config = Config::default();
        config.build.temp = temp;
        config.build.dist = root.join("dist");

        assert!(matches!(
            bundle(&config),
            Err(BundleError::UnresolvedAsset { .. })
        ));
    }

    #[test]
    fn build_with_no_pages_still_creates_dist() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();

        let mut config = Config::default();
        config.build.temp = root.join("temp");
        config.build.dist = root.join("dist");

        bundle(&config).unwrap();

        assert!(root.join("dist").is_dir());
    }
}
