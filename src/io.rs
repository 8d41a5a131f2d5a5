// ============================================================================
// IMAGE ASSETS & CODEC: decode references to pixels, encode pixels back
// ============================================================================
//
// Every bitmap the engine produces is stored as PNG: later operations (a second
// flood fill, a crop of a filled image) depend on exact pixel values surviving
// the round-trip. JPEG is only offered for the final export.

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};

const DATA_URL_PNG: &str = "data:image/png;base64,";

/// Where an element's bitmap lives.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageAsset {
    /// Encoded image bytes (PNG for anything the engine wrote).
    Inline(Vec<u8>),
    /// URL or path resolved through an [`AssetResolver`].
    Remote(String),
}

impl std::fmt::Debug for ImageAsset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageAsset::Inline(bytes) => write!(f, "Inline({} bytes)", bytes.len()),
            ImageAsset::Remote(url) => write!(f, "Remote({})", url),
        }
    }
}

impl ImageAsset {
    /// Parse a `data:image/...;base64,` URL into an inline asset. Any other
    /// string is kept as a remote reference.
    pub fn from_reference(reference: &str) -> EngineResult<Self> {
        let Some(rest) = reference.strip_prefix("data:") else {
            return Ok(ImageAsset::Remote(reference.to_string()));
        };
        let (_, payload) = rest
            .split_once(";base64,")
            .ok_or_else(|| EngineError::DecodeFailure("data URL is not base64".into()))?;
        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| EngineError::DecodeFailure(format!("bad base64: {}", e)))?;
        Ok(ImageAsset::Inline(bytes))
    }

    /// Inverse of [`ImageAsset::from_reference`]. Inline bytes are labelled as PNG.
    pub fn to_reference(&self) -> String {
        match self {
            ImageAsset::Inline(bytes) => format!("{}{}", DATA_URL_PNG, BASE64.encode(bytes)),
            ImageAsset::Remote(url) => url.clone(),
        }
    }
}

// ============================================================================
// REMOTE RESOLUTION
// ============================================================================

/// Fetches the encoded bytes behind a remote asset reference.
pub trait AssetResolver {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// Resolves `file://` URLs and plain paths, relative ones against `base_dir`.
/// Network URLs are refused; fetching them belongs to the storage layer.
#[derive(Clone, Debug, Default)]
pub struct FileResolver {
    pub base_dir: Option<PathBuf>,
}

impl FileResolver {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }
}

impl AssetResolver for FileResolver {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            return Err(format!("network fetch not available for '{}'", url));
        }
        let raw = url.strip_prefix("file://").unwrap_or(url);
        let path = Path::new(raw);
        let path = match (&self.base_dir, path.is_relative()) {
            (Some(base), true) => base.join(path),
            _ => path.to_path_buf(),
        };
        std::fs::read(&path).map_err(|e| format!("{}: {}", path.display(), e))
    }
}

/// Resolver for contexts where only inline assets are expected.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineOnly;

impl AssetResolver for InlineOnly {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        Err(format!("remote asset '{}' cannot be resolved here", url))
    }
}

// ============================================================================
// DECODE / ENCODE
// ============================================================================

/// Decode an asset into an owned RGBA buffer.
pub fn decode_asset(asset: &ImageAsset, resolver: &dyn AssetResolver) -> EngineResult<RgbaImage> {
    let fetched;
    let bytes: &[u8] = match asset {
        ImageAsset::Inline(bytes) => bytes,
        ImageAsset::Remote(url) => {
            fetched = resolver.fetch(url).map_err(EngineError::DecodeFailure)?;
            &fetched
        }
    };
    decode_bytes(bytes)
}

pub fn decode_bytes(bytes: &[u8]) -> EngineResult<RgbaImage> {
    let img = image::load_from_memory(bytes)
        .map_err(|e| EngineError::DecodeFailure(e.to_string()))?
        .to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(EngineError::DecodeFailure("image has no pixels".into()));
    }
    Ok(img)
}

/// Lossless PNG encoding.
pub fn encode_png(image: &RgbaImage) -> EngineResult<Vec<u8>> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)
        .map_err(|e| EngineError::EncodeFailure(e.to_string()))?;
    Ok(out)
}

/// Encode as PNG and wrap as an inline asset.
pub fn encode_asset(image: &RgbaImage) -> EngineResult<ImageAsset> {
    encode_png(image).map(ImageAsset::Inline)
}

/// Load any supported image file from disk.
pub fn load_image_file(path: &Path) -> EngineResult<RgbaImage> {
    let bytes = std::fs::read(path)
        .map_err(|e| EngineError::DecodeFailure(format!("{}: {}", path.display(), e)))?;
    decode_bytes(&bytes)
}

// ============================================================================
// EXPORT ENCODING
// ============================================================================

/// Final output format for flattened pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
        }
    }

    /// Format implied by a file extension; PNG when unknown.
    pub fn from_extension(path: &Path) -> ExportFormat {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "jpg" | "jpeg" => ExportFormat::Jpeg,
            _ => ExportFormat::Png,
        }
    }
}

impl std::str::FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(ExportFormat::Png),
            "jpg" | "jpeg" => Ok(ExportFormat::Jpeg),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

/// Encode a flattened page. `quality` (1–100) only affects JPEG.
pub fn encode_export(image: &RgbaImage, format: ExportFormat, quality: u8) -> EngineResult<Vec<u8>> {
    match format {
        ExportFormat::Png => encode_png(image),
        ExportFormat::Jpeg => {
            let rgb_image = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
            let mut out = Vec::new();
            let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
            encoder
                .encode(
                    rgb_image.as_raw(),
                    rgb_image.width(),
                    rgb_image.height(),
                    ColorType::Rgb8,
                )
                .map_err(|e| EngineError::EncodeFailure(e.to_string()))?;
            Ok(out)
        }
    }
}

/// Encode and write to `path`.
pub fn write_export(
    image: &RgbaImage,
    path: &Path,
    format: ExportFormat,
    quality: u8,
) -> EngineResult<()> {
    let bytes = encode_export(image, format, quality)?;
    let io_err = |e: std::io::Error| EngineError::EncodeFailure(format!("{}: {}", path.display(), e));
    let file = File::create(path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes).map_err(io_err)?;
    writer.flush().map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn checker() -> RgbaImage {
        RgbaImage::from_fn(5, 3, |x, y| {
            if (x + y) % 2 == 0 {
                Rgba([10, 20, 30, 255])
            } else {
                Rgba([200, 100, 0, 77])
            }
        })
    }

    #[test]
    fn png_preserves_exact_pixels() {
        let img = checker();
        let asset = encode_asset(&img).unwrap();
        let back = decode_asset(&asset, &InlineOnly).unwrap();
        assert_eq!(back, img);
    }

    #[test]
    fn data_url_round_trip() {
        let asset = encode_asset(&checker()).unwrap();
        let url = asset.to_reference();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ImageAsset::from_reference(&url).unwrap(), asset);
        assert_eq!(
            ImageAsset::from_reference("https://cdn.example/a.png").unwrap(),
            ImageAsset::Remote("https://cdn.example/a.png".into())
        );
    }

    #[test]
    fn bad_inputs_are_decode_failures() {
        assert!(matches!(
            decode_asset(&ImageAsset::Inline(vec![0, 1, 2, 3]), &InlineOnly),
            Err(EngineError::DecodeFailure(_))
        ));
        assert!(matches!(
            decode_asset(&ImageAsset::Remote("https://x/y.png".into()), &FileResolver::default()),
            Err(EngineError::DecodeFailure(_))
        ));
        assert!(matches!(
            ImageAsset::from_reference("data:image/png,abc"),
            Err(EngineError::DecodeFailure(_))
        ));
    }

    #[test]
    fn file_resolver_reads_relative_paths() {
        let dir = std::env::temp_dir().join(format!("comicfe-io-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("tile.png"), encode_png(&checker()).unwrap()).unwrap();

        let resolver = FileResolver::new(Some(dir.clone()));
        let img = decode_asset(&ImageAsset::Remote("tile.png".into()), &resolver).unwrap();
        assert_eq!(img.dimensions(), (5, 3));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn jpeg_export_is_opaque_rgb() {
        let bytes = encode_export(&checker(), ExportFormat::Jpeg, 90).unwrap();
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!(back.color(), ColorType::Rgb8);
        assert_eq!(ExportFormat::from_extension(Path::new("a/b.JPEG")), ExportFormat::Jpeg);
        assert_eq!("png".parse::<ExportFormat>(), Ok(ExportFormat::Png));
    }
}
