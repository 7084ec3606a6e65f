use std::fs;

use camino::Utf8PathBuf;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};

use crate::error::TransformError;
use crate::task::{FileUnit, Stage};

const JPEG_QUALITY: u8 = 80;

/// Re-encodes raster images with stronger compression settings, keeping
/// the original format so references in markup stay valid.
///
/// Results are cached by content hash, so rebuilding a site with
/// unchanged images skips the expensive re-encode entirely. If the
/// re-encode comes out larger than the source, the source bytes win.
pub struct OptimizeImages {
    cache: Utf8PathBuf,
}

impl OptimizeImages {
    pub fn new(cache: impl Into<Utf8PathBuf>) -> Self {
        Self {
            cache: cache.into(),
        }
    }
}

impl Stage for OptimizeImages {
    fn name(&self) -> &'static str {
        "images"
    }

    fn apply(&self, file: FileUnit) -> Result<FileUnit, TransformError> {
        let ext = file
            .path
            .extension()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();

        // Formats without a lossless win here (svg, gif, webp, fonts
        // routed through this stage) pass through untouched.
        if !matches!(ext.as_str(), "png" | "jpg" | "jpeg") {
            return Ok(file);
        }

        let hash = blake3::hash(&file.contents).to_hex();
        let cached = self.cache.join(format!("{hash}.{ext}"));

        if cached.exists() {
            let contents = fs::read(&cached)?;
            return Ok(FileUnit {
                path: file.path,
                contents,
            });
        }

        let optimized = reencode(&file.contents, &ext)?;
        let contents = if optimized.len() < file.contents.len() {
            optimized
        } else {
            file.contents
        };

        fs::create_dir_all(&self.cache)?;
        fs::write(&cached, &contents)?;

        Ok(FileUnit {
            path: file.path,
            contents,
        })
    }
}

fn reencode(bytes: &[u8], ext: &str) -> Result<Vec<u8>, TransformError> {
    let img = image::load_from_memory(bytes)?;
    let mut out = Vec::new();

    match ext {
        "png" => {
            let encoder =
                PngEncoder::new_with_quality(&mut out, CompressionType::Best, FilterType::Adaptive);
            img.write_with_encoder(encoder)?;
        }
        _ => {
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            img.write_with_encoder(encoder)?;
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_png() -> Vec<u8> {
        let img = image::RgbaImage::from_fn(32, 32, |x, y| {
            image::Rgba([(x * 8) as u8, (y * 8) as u8, 128, 255])
        });
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    fn stage() -> (tempfile::TempDir, OptimizeImages) {
        let dir = tempfile::tempdir().unwrap();
        let cache = Utf8PathBuf::try_from(dir.path().to_path_buf()).unwrap();
        (dir, OptimizeImages::new(cache))
    }

    #[test]
    fn output_is_still_a_decodable_png() {
        let (_dir, stage) = stage();
        let unit = FileUnit {
            path: "assets/images/logo.png".into(),
            contents: sample_png(),
        };

        let out = stage.apply(unit).unwrap();

        assert_eq!(out.path, Utf8PathBuf::from("assets/images/logo.png"));
        image::load_from_memory(&out.contents).unwrap();
    }

    #[test]
    fn second_run_hits_the_cache() {
        let (dir, stage) = stage();
        let unit = FileUnit {
            path: "logo.png".into(),
            contents: sample_png(),
        };

        let first = stage.apply(unit.clone()).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let second = stage.apply(unit).unwrap();
        assert_eq!(first.contents, second.contents);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn unknown_formats_pass_through() {
        let (dir, stage) = stage();
        let unit = FileUnit {
            path: "assets/fonts/pages.woff2".into(),
            contents: b"wOF2fake".to_vec(),
        };

        let out = stage.apply(unit.clone()).unwrap();

        assert_eq!(out, unit);
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn corrupt_image_fails_the_stage() {
        let (_dir, stage) = stage();
        let unit = FileUnit {
            path: "broken.png".into(),
            contents: b"not a png".to_vec(),
        };

        assert!(matches!(stage.apply(unit), Err(TransformError::Image(_))));
    }
}
