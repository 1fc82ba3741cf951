//! Image codec service
//!
//! Decoding of batch inputs and background images, encoding of outputs. Keeps
//! file and byte handling out of the pipeline logic.

use crate::{
    compositor::blend_over,
    config::OutputFormat,
    error::{BgStudioError, Result},
    types::{AssetOrigin, ImageAsset, ImageSource},
};
use image::{codecs::jpeg::JpegEncoder, DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// Service for image decoding and encoding
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension does not match the data.
    ///
    /// ```rust,no_run
    /// use bgremove_studio::services::ImageIOService;
    ///
    /// let asset = ImageIOService::load_image("input.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Data is not a supported image
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<ImageAsset> {
        let path_ref = path.as_ref();

        if !path_ref.is_file() {
            return Err(BgStudioError::codec_stage_error(
                "image loading",
                "file does not exist",
                Some(&path_ref.display().to_string()),
            ));
        }

        let image = match image::open(path_ref) {
            Ok(img) => img,
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    BgStudioError::codec_stage_error(
                        "image loading",
                        &io_err.to_string(),
                        Some(&path_ref.display().to_string()),
                    )
                })?;
                image::load_from_memory(&data).map_err(|content_err| {
                    BgStudioError::codec_stage_error(
                        "image loading",
                        &content_err.to_string(),
                        Some(&format!(
                            "path: {}, size: {} bytes",
                            path_ref.display(),
                            data.len()
                        )),
                    )
                })?
            },
        };

        Ok(ImageAsset::new(
            image,
            AssetOrigin::Path(path_ref.to_path_buf()),
        ))
    }

    /// Decode an image from bytes
    ///
    /// # Errors
    /// - Bytes are not a supported image
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        image::load_from_memory(bytes)
            .map_err(|e| BgStudioError::codec(format!("Failed to decode image from bytes: {}", e)))
    }

    /// Decode any batch input
    ///
    /// # Errors
    /// - Source unreadable or not a supported image
    pub fn load_source(source: &ImageSource) -> Result<ImageAsset> {
        match source {
            ImageSource::Path(path) => Self::load_image(path),
            ImageSource::Bytes { name, data } => {
                let image = Self::load_from_bytes(data).map_err(|e| {
                    BgStudioError::codec(format!("{} ({})", e, source.display_name()))
                })?;
                Ok(ImageAsset::new(image, AssetOrigin::Upload { name: name.clone() }))
            },
            ImageSource::Asset(asset) => Ok(asset.clone()),
        }
    }

    /// Encode an image in the output format
    ///
    /// PNG keeps alpha. JPEG has no alpha channel, so translucent pixels are
    /// flattened over white first.
    ///
    /// # Errors
    /// - Encoder failure
    pub fn encode(image: &DynamicImage, format: OutputFormat, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        match format {
            OutputFormat::Png => {
                image
                    .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                    .map_err(|e| {
                        BgStudioError::codec_stage_error("image encode", &e.to_string(), Some("PNG"))
                    })?;
            },
            OutputFormat::Jpeg => {
                let rgb = if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    let white = RgbaImage::from_pixel(rgba.width(), rgba.height(), Rgba([255; 4]));
                    DynamicImage::ImageRgba8(blend_over(&rgba, &white)?).to_rgb8()
                } else {
                    image.to_rgb8()
                };
                JpegEncoder::new_with_quality(&mut buffer, quality.min(100))
                    .encode_image(&rgb)
                    .map_err(|e| {
                        BgStudioError::codec_stage_error("image encode", &e.to_string(), Some("JPEG"))
                    })?;
            },
        }
        Ok(buffer)
    }

    /// Encode and write an image, creating parent directories
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    /// - Encoder failure or the file cannot be written
    pub fn save_image<P: AsRef<Path>>(
        image: &DynamicImage,
        path: P,
        format: OutputFormat,
        quality: u8,
    ) -> Result<u64> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                BgStudioError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let bytes = Self::encode(image, format, quality)?;
        std::fs::write(path_ref, &bytes)
            .map_err(|e| BgStudioError::file_io_error("write image", path_ref, &e))?;
        Ok(bytes.len() as u64)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_format<P: AsRef<Path>>(path: P) -> bool {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                let ext_lower = ext.to_lowercase();
                matches!(ext_lower.as_str(), "jpg" | "jpeg" | "png")
                    || (cfg!(feature = "webp-support") && ext_lower == "webp")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};
    use tempfile::tempdir;

    fn rgb_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb([200, 50, 25])))
    }

    #[test]
    fn test_is_supported_format() {
        assert!(ImageIOService::is_supported_format("test.jpg"));
        assert!(ImageIOService::is_supported_format("TEST.JPEG"));
        assert!(ImageIOService::is_supported_format("test.PNG"));

        assert!(!ImageIOService::is_supported_format("test.txt"));
        assert!(!ImageIOService::is_supported_format("test.gif"));
        assert!(!ImageIOService::is_supported_format("test"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let err = ImageIOService::load_image("/nonexistent/path/image.jpg").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Codec);
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_load_from_bytes_invalid() {
        assert!(ImageIOService::load_from_bytes(b"invalid image data").is_err());
        assert!(ImageIOService::load_from_bytes(&[]).is_err());
    }

    #[test]
    fn test_save_and_reload_png_keeps_alpha() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/out.png");
        let mut rgba = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 0]));

        let written = ImageIOService::save_image(
            &DynamicImage::ImageRgba8(rgba.clone()),
            &path,
            OutputFormat::Png,
            90,
        )
        .unwrap();
        assert!(written > 0);

        let loaded = ImageIOService::load_image(&path).unwrap();
        assert!(loaded.has_alpha());
        assert_eq!(loaded.to_rgba8(), rgba);
        assert_eq!(loaded.name().as_deref(), Some("out.png"));
    }

    #[test]
    fn test_jpeg_encoding_flattens_alpha_over_white() {
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 0])));
        let bytes = ImageIOService::encode(&transparent, OutputFormat::Jpeg, 95).unwrap();

        let decoded = ImageIOService::load_from_bytes(&bytes).unwrap().to_rgb8();
        assert!(decoded.pixels().all(|p| p[0] > 245 && p[1] > 245 && p[2] > 245));
    }

    #[test]
    fn test_load_source_variants() {
        let png = ImageIOService::encode(&rgb_image(3, 2), OutputFormat::Png, 90).unwrap();

        let upload = ImageSource::from_bytes("uploads/cat.png", png);
        let asset = ImageIOService::load_source(&upload).unwrap();
        assert_eq!(asset.dimensions(), (3, 2));
        assert_eq!(asset.stem(), "cat");

        let broken = ImageSource::from_bytes("dog.png", b"garbage".to_vec());
        let err = ImageIOService::load_source(&broken).unwrap_err();
        assert!(err.to_string().contains("dog.png"));
    }

    #[test]
    fn test_content_sniffing_with_wrong_extension() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("actually_png.jpg");
        let png = ImageIOService::encode(&rgb_image(5, 5), OutputFormat::Png, 90).unwrap();
        std::fs::write(&path, png).unwrap();

        let asset = ImageIOService::load_image(&path).unwrap();
        assert_eq!(asset.dimensions(), (5, 5));
    }
}
