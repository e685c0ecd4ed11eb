use crate::models::IngestConfig;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, PngEncoder};
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageFormat, ImageReader};
use std::io::Cursor;
use std::path::Path;
use uuid::Uuid;

/// Decode limits are this many times the configured maximum dimensions,
/// so a crafted file cannot force unbounded allocations before the
/// resize step runs.
const DECODE_LIMIT_MULTIPLIER: u32 = 4;

/// Error type for ingest pipeline operations
#[derive(Debug)]
pub enum PipelineError {
    /// Byte content is not an allow-listed image format
    InvalidFileType(String),
    /// Dimensions could not be determined from the decoded image
    UnreadableDimensions(String),
    Image(image::ImageError),
    Io(std::io::Error),
    Other(String),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::InvalidFileType(msg) => write!(f, "Invalid file type: {}", msg),
            PipelineError::UnreadableDimensions(msg) => {
                write!(f, "Unreadable dimensions: {}", msg)
            }
            PipelineError::Image(e) => write!(f, "Image error: {}", e),
            PipelineError::Io(e) => write!(f, "IO error: {}", e),
            PipelineError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err)
    }
}

/// Image format determined from magic bytes, never from client headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SniffedFormat {
    Jpeg,
    Png,
    WebP,
    Heic,
}

/// Format the processed image is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    /// HEIC/HEIF input is stored as WebP for broad client compatibility;
    /// everything else keeps its input format.
    pub fn for_input(input: SniffedFormat) -> Self {
        match input {
            SniffedFormat::Jpeg => OutputFormat::Jpeg,
            SniffedFormat::Png => OutputFormat::Png,
            SniffedFormat::WebP | SniffedFormat::Heic => OutputFormat::WebP,
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        }
    }
}

/// Metadata describing the stored (post-processing) image
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedPhoto {
    pub filename: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
}

/// Sniff the true image format from magic bytes
///
/// Accepts only JPEG, PNG and WebP; HEIC/HEIF is recognized as its own
/// format so callers can report it distinctly. Rejects disguised files
/// regardless of their filename or declared MIME type.
pub fn sniff_format(bytes: &[u8]) -> Result<SniffedFormat, PipelineError> {
    if is_heic(bytes) {
        return Ok(SniffedFormat::Heic);
    }

    match image::guess_format(bytes) {
        Ok(ImageFormat::Jpeg) => Ok(SniffedFormat::Jpeg),
        Ok(ImageFormat::Png) => Ok(SniffedFormat::Png),
        Ok(ImageFormat::WebP) => Ok(SniffedFormat::WebP),
        Ok(other) => Err(PipelineError::InvalidFileType(format!(
            "{:?} uploads are not accepted",
            other
        ))),
        Err(_) => Err(PipelineError::InvalidFileType(
            "Content is not a recognized image format".to_string(),
        )),
    }
}

/// ISO-BMFF `ftyp` box check for the common HEIC/HEIF brands
fn is_heic(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &bytes[8..12],
        b"heic" | b"heix" | b"heim" | b"heis" | b"hevc" | b"hevm" | b"hevs" | b"mif1" | b"msf1"
    )
}

/// Strip path components and unsafe characters from a client-supplied filename
pub fn sanitize_original_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("upload");

    let cleaned: String = base
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ' '))
        .take(128)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "upload".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Validate, normalize, compress and persist uploaded image bytes
///
/// Runs the CPU-bound work on the blocking pool so request handling is
/// not stalled by a large transcode.
pub struct IngestPipeline {
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(config: IngestConfig) -> Self {
        Self { config }
    }

    /// Absolute path of a stored photo file
    pub fn photo_path(&self, filename: &str) -> std::path::PathBuf {
        self.config.storage_path.join(filename)
    }

    pub async fn process(
        &self,
        bytes: Vec<u8>,
        original_name: String,
    ) -> Result<ProcessedPhoto, PipelineError> {
        let config = self.config.clone();

        tokio::task::spawn_blocking(move || process_blocking(&config, &bytes, &original_name))
            .await
            .map_err(|e| PipelineError::Other(format!("Task join error: {}", e)))?
    }
}

/// Synchronous pipeline: sniff, decode, orient, resize, encode, persist
///
/// The final file write is the only side effect; any failure before it
/// leaves no partial file behind.
pub fn process_blocking(
    config: &IngestConfig,
    bytes: &[u8],
    original_name: &str,
) -> Result<ProcessedPhoto, PipelineError> {
    let sniffed = sniff_format(bytes)?;
    let output = OutputFormat::for_input(sniffed);

    let img = decode_oriented(config, bytes, sniffed)?;

    let (width, height) = (img.width(), img.height());
    if width == 0 || height == 0 {
        return Err(PipelineError::UnreadableDimensions(
            "Decoded image has no dimensions".to_string(),
        ));
    }

    // Resize only when a dimension exceeds the configured maximum;
    // aspect ratio is preserved and images are never upscaled.
    let img = if width > config.max_width || height > config.max_height {
        log::debug!(
            "Resizing {}x{} to fit {}x{}",
            width,
            height,
            config.max_width,
            config.max_height
        );
        img.resize(config.max_width, config.max_height, FilterType::Lanczos3)
    } else {
        img
    };

    let encoded = encode(&img, output, config.quality)?;

    let filename = format!("{}.{}", Uuid::new_v4(), output.extension());
    std::fs::create_dir_all(&config.storage_path)?;
    std::fs::write(config.storage_path.join(&filename), &encoded)?;

    log::debug!(
        "Stored {} ({} bytes, {}x{})",
        filename,
        encoded.len(),
        img.width(),
        img.height()
    );

    Ok(ProcessedPhoto {
        filename,
        original_name: sanitize_original_name(original_name),
        mime_type: output.mime_type().to_string(),
        file_size: encoded.len() as i64,
        width: img.width(),
        height: img.height(),
    })
}

/// Decode with allocation limits and apply the embedded EXIF orientation
///
/// Re-encoding later drops all metadata, so applying the orientation to
/// the pixels here is what keeps the stored image visually upright.
fn decode_oriented(
    config: &IngestConfig,
    bytes: &[u8],
    sniffed: SniffedFormat,
) -> Result<DynamicImage, PipelineError> {
    let format = match sniffed {
        SniffedFormat::Jpeg => ImageFormat::Jpeg,
        SniffedFormat::Png => ImageFormat::Png,
        SniffedFormat::WebP => ImageFormat::WebP,
        SniffedFormat::Heic => {
            return Err(PipelineError::InvalidFileType(
                "HEIC/HEIF is recognized but cannot be decoded by this server; \
                 please re-export as JPEG"
                    .to_string(),
            ));
        }
    };

    let mut limits = image::Limits::default();
    limits.max_image_width = Some(
        config
            .max_width
            .saturating_mul(DECODE_LIMIT_MULTIPLIER),
    );
    limits.max_image_height = Some(
        config
            .max_height
            .saturating_mul(DECODE_LIMIT_MULTIPLIER),
    );

    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);

    let mut decoder = reader.into_decoder().map_err(decode_error)?;
    let orientation = decoder.orientation().unwrap_or(Orientation::NoTransforms);

    let mut img = DynamicImage::from_decoder(decoder).map_err(decode_error)?;
    img.apply_orientation(orientation);

    Ok(img)
}

fn decode_error(err: image::ImageError) -> PipelineError {
    match err {
        image::ImageError::Limits(e) => PipelineError::UnreadableDimensions(format!(
            "Image exceeds the decode limit: {}",
            e
        )),
        other => PipelineError::InvalidFileType(format!("Image data could not be decoded: {}", other)),
    }
}

/// Re-encode at the configured quality with format-specific tuning
fn encode(img: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>, PipelineError> {
    let mut buf = Cursor::new(Vec::new());

    match format {
        OutputFormat::Jpeg => {
            // JPEG carries no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
            rgb.write_with_encoder(encoder)
                .map_err(PipelineError::Image)?;
        }
        OutputFormat::Png => {
            let encoder = PngEncoder::new_with_quality(
                &mut buf,
                CompressionType::Best,
                image::codecs::png::FilterType::Adaptive,
            );
            img.write_with_encoder(encoder)
                .map_err(PipelineError::Image)?;
        }
        OutputFormat::WebP => {
            // The webp encoder is lossless; quality does not apply
            img.write_to(&mut buf, ImageFormat::WebP)
                .map_err(PipelineError::Image)?;
        }
    }

    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn test_config(max: u32) -> (IngestConfig, PathBuf) {
        let dir = std::env::temp_dir().join(format!("photo-ingest-test-{}", Uuid::new_v4()));
        let config = IngestConfig {
            storage_path: dir.clone(),
            max_width: max,
            max_height: max,
            quality: 82,
        };
        (config, dir)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([40, 90, 160]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            width,
            height,
            image::Rgb([200, 60, 20]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_sniff_accepts_allow_listed_formats() {
        assert_eq!(
            sniff_format(&png_bytes(4, 4)).unwrap(),
            SniffedFormat::Png
        );
        assert_eq!(
            sniff_format(&jpeg_bytes(4, 4)).unwrap(),
            SniffedFormat::Jpeg
        );
        assert_eq!(
            sniff_format(b"RIFF\x00\x00\x00\x00WEBPVP8 ").unwrap(),
            SniffedFormat::WebP
        );
    }

    #[test]
    fn test_sniff_rejects_non_image_content() {
        let err = sniff_format(b"this is definitely not an image").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFileType(_)));
    }

    #[test]
    fn test_sniff_rejects_formats_outside_allow_list() {
        let err = sniff_format(b"GIF89a\x01\x00\x01\x00\x00\x00\x00").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFileType(_)));
    }

    #[test]
    fn test_sniff_recognizes_heic_brands() {
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0; 16]);
        assert_eq!(sniff_format(&bytes).unwrap(), SniffedFormat::Heic);
    }

    #[test]
    fn test_output_format_forces_webp_for_heic() {
        assert_eq!(
            OutputFormat::for_input(SniffedFormat::Heic),
            OutputFormat::WebP
        );
        assert_eq!(
            OutputFormat::for_input(SniffedFormat::Jpeg),
            OutputFormat::Jpeg
        );
        assert_eq!(
            OutputFormat::for_input(SniffedFormat::Png),
            OutputFormat::Png
        );
        assert_eq!(OutputFormat::for_input(SniffedFormat::Heic).mime_type(), "image/webp");
    }

    #[test]
    fn test_process_keeps_small_image_dimensions() {
        let (config, dir) = test_config(4096);
        let result = process_blocking(&config, &png_bytes(120, 80), "party.png").unwrap();

        assert_eq!(result.width, 120);
        assert_eq!(result.height, 80);
        assert_eq!(result.mime_type, "image/png");
        assert_eq!(result.original_name, "party.png");
        assert!(result.file_size > 0);

        let stored = dir.join(&result.filename);
        assert_eq!(
            std::fs::metadata(&stored).unwrap().len() as i64,
            result.file_size
        );

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_process_resizes_oversized_image_preserving_aspect() {
        let (config, dir) = test_config(100);
        let result = process_blocking(&config, &jpeg_bytes(600, 400), "big.jpg").unwrap();

        assert!(result.width <= 100);
        assert!(result.height <= 100);
        assert_eq!(result.mime_type, "image/jpeg");

        let ratio = result.width as f64 / result.height as f64;
        assert!((ratio - 1.5).abs() < 0.05, "aspect ratio drifted: {}", ratio);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_process_same_bytes_twice_yields_distinct_filenames() {
        let (config, dir) = test_config(4096);
        let bytes = png_bytes(10, 10);

        let first = process_blocking(&config, &bytes, "a.png").unwrap();
        let second = process_blocking(&config, &bytes, "a.png").unwrap();
        assert_ne!(first.filename, second.filename);

        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_process_rejects_renamed_text_file() {
        let (config, dir) = test_config(4096);
        let err = process_blocking(&config, b"hello, not a photo", "vacation.jpg").unwrap_err();
        assert!(matches!(err, PipelineError::InvalidFileType(_)));

        // Nothing was written
        assert!(!dir.exists());
    }

    #[test]
    fn test_process_rejects_heic_with_distinct_message() {
        let (config, dir) = test_config(4096);
        let mut bytes = vec![0, 0, 0, 24];
        bytes.extend_from_slice(b"ftypheic");
        bytes.extend_from_slice(&[0; 64]);

        let err = process_blocking(&config, &bytes, "img.heic").unwrap_err();
        match err {
            PipelineError::InvalidFileType(msg) => assert!(msg.contains("HEIC")),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!dir.exists());
    }

    #[test]
    fn test_sanitize_original_name() {
        assert_eq!(sanitize_original_name("holiday.jpg"), "holiday.jpg");
        assert_eq!(sanitize_original_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_original_name("we<>ird?.png"), "weird.png");
        assert_eq!(sanitize_original_name(""), "upload");
        assert_eq!(sanitize_original_name("   "), "upload");
    }
}
