use crate::utils::{KycError, Result};
use image::imageops::FilterType;
use image::{GrayImage, ImageFormat};
use imageproc::contrast::equalize_histogram;
use sha2::{Digest, Sha256};
use std::path::Path;
use tempfile::NamedTempFile;

const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// A validated input image together with its digest.
#[derive(Debug, Clone)]
pub struct InputImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub source: String,
    digest: [u8; 32],
}

impl InputImage {
    pub fn sha256_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// Leading eight digest bytes, used to pick demo profiles per input.
    pub fn seed(&self) -> u64 {
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&self.digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

pub struct ImageProcessor;

impl ImageProcessor {
    pub fn is_supported_path(path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            .unwrap_or(false)
    }

    pub fn load_path(path: &Path) -> Result<InputImage> {
        let bytes = std::fs::read(path).map_err(|e| {
            KycError::ImageUnreadable(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::load_bytes(bytes, path.display().to_string())
    }

    /// Checks that `bytes` decode as one of the accepted formats.
    pub fn load_bytes(bytes: Vec<u8>, source: String) -> Result<InputImage> {
        let format = image::guess_format(&bytes)
            .map_err(|e| KycError::ImageUnreadable(format!("Unknown image format in {}: {}", source, e)))?;
        if !matches!(
            format,
            ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Bmp | ImageFormat::Tiff
        ) {
            return Err(KycError::ImageUnreadable(format!(
                "Unsupported image format {:?} in {}",
                format, source
            )));
        }
        let decoded = image::load_from_memory_with_format(&bytes, format)
            .map_err(|e| KycError::ImageUnreadable(format!("Failed to decode {}: {}", source, e)))?;
        let digest: [u8; 32] = Sha256::digest(&bytes).into();

        Ok(InputImage {
            width: decoded.width(),
            height: decoded.height(),
            bytes,
            format,
            source,
            digest,
        })
    }

    /// Grayscale, bounded in size and histogram-equalized for the OCR engine.
    pub fn prepare_for_ocr(image: &InputImage, max_size: u32) -> Result<GrayImage> {
        let mut decoded = image::load_from_memory_with_format(&image.bytes, image.format)
            .map_err(|e| KycError::ImageUnreadable(format!("Failed to decode {}: {}", image.source, e)))?;
        if decoded.width().max(decoded.height()) > max_size {
            decoded = decoded.resize(max_size, max_size, FilterType::Triangle);
        }
        Ok(equalize_histogram(&decoded.to_luma8()))
    }

    pub fn save_to_temp_file(image: &GrayImage) -> Result<NamedTempFile> {
        let temp_file = tempfile::Builder::new()
            .prefix("kyc-ocr-")
            .suffix(".png")
            .tempfile()?;
        image
            .save_with_format(temp_file.path(), ImageFormat::Png)
            .map_err(|e| KycError::ImageUnreadable(format!("Failed to write OCR input: {}", e)))?;
        Ok(temp_file)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([250, 250, 250])
            } else {
                Rgb([10, 10, 10])
            }
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageOutputFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[test]
    fn test_load_png() {
        let image = ImageProcessor::load_bytes(png_bytes(8, 4), "memory".into()).unwrap();
        assert_eq!(image.format, ImageFormat::Png);
        assert_eq!((image.width, image.height), (8, 4));
        assert_eq!(image.sha256_hex().len(), 64);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = ImageProcessor::load_bytes(png_bytes(4, 4), "a".into()).unwrap();
        let b = ImageProcessor::load_bytes(png_bytes(4, 4), "b".into()).unwrap();
        assert_eq!(a.seed(), b.seed());
        assert_eq!(a.sha256_hex(), b.sha256_hex());
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let err = ImageProcessor::load_bytes(b"not an image".to_vec(), "memory".into()).unwrap_err();
        assert_eq!(err.kind(), "image_unreadable");
    }

    #[test]
    fn test_truncated_png_is_unreadable() {
        let mut bytes = png_bytes(16, 16);
        bytes.truncate(40);
        assert!(matches!(
            ImageProcessor::load_bytes(bytes, "memory".into()),
            Err(KycError::ImageUnreadable(_))
        ));
    }

    #[test]
    fn test_prepare_for_ocr_bounds_size() {
        let image = ImageProcessor::load_bytes(png_bytes(64, 32), "memory".into()).unwrap();
        let gray = ImageProcessor::prepare_for_ocr(&image, 16).unwrap();
        assert_eq!(gray.dimensions(), (16, 8));

        let file = ImageProcessor::save_to_temp_file(&gray).unwrap();
        let reloaded = ImageProcessor::load_path(file.path()).unwrap();
        assert_eq!((reloaded.width, reloaded.height), (16, 8));
    }

    #[test]
    fn test_supported_extensions() {
        assert!(ImageProcessor::is_supported_path(Path::new("scan.JPG")));
        assert!(ImageProcessor::is_supported_path(Path::new("scan.tiff")));
        assert!(!ImageProcessor::is_supported_path(Path::new("scan.pdf")));
        assert!(!ImageProcessor::is_supported_path(Path::new("README")));
    }
}
