//! Detection sources: the OCR engine and its stand-ins.

use crate::models::{Detection, Region};
use crate::processing::image::InputImage;
use crate::utils::{KycError, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Anything that turns one image into ordered text detections.
pub trait DetectionSource: Send + Sync {
    fn name(&self) -> &str;

    fn detect(&self, image: &InputImage) -> Result<Vec<Detection>>;
}

/// Runs `source` on a worker thread and gives up after `timeout`. A timed-out
/// worker is left to finish on its own; its result is discarded.
pub fn detect_with_timeout(
    source: Arc<dyn DetectionSource>,
    image: Arc<InputImage>,
    timeout: Duration,
) -> Result<Vec<Detection>> {
    let (tx, rx) = mpsc::channel();
    let name = source.name().to_string();
    thread::Builder::new()
        .name(format!("ocr-{}", name))
        .spawn(move || {
            // The receiver is gone if we already timed out.
            let _ = tx.send(source.detect(&image));
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!("Detection source {} exceeded {:?}", name, timeout);
            Err(KycError::OcrTimeout(timeout))
        }
        Err(RecvTimeoutError::Disconnected) => Err(KycError::Ocr(format!(
            "Detection source {} stopped without a result",
            name
        ))),
    }
}

/// Detections produced ahead of time, stored as a JSON array of
/// `{"text": ..., "confidence": ...}` objects.
pub struct DetectionFile {
    path: PathBuf,
}

impl DetectionFile {
    pub fn new(path: PathBuf) -> Self {
        DetectionFile { path }
    }
}

impl DetectionSource for DetectionFile {
    fn name(&self) -> &str {
        "detection-file"
    }

    fn detect(&self, _image: &InputImage) -> Result<Vec<Detection>> {
        let raw = std::fs::read_to_string(&self.path)
            .map_err(|e| KycError::Ocr(format!("Failed to read {}: {}", self.path.display(), e)))?;
        let detections: Vec<Detection> = serde_json::from_str(&raw)
            .map_err(|e| KycError::Ocr(format!("Invalid detections in {}: {}", self.path.display(), e)))?;
        Ok(detections
            .into_iter()
            .map(|d| Detection {
                confidence: d.confidence.clamp(0.0, 1.0),
                ..d
            })
            .collect())
    }
}

/// Stand-in used when the binary was built without an OCR engine.
pub struct UnavailableDetector;

impl DetectionSource for UnavailableDetector {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn detect(&self, _image: &InputImage) -> Result<Vec<Detection>> {
        Err(KycError::Ocr(
            "no OCR engine available; build with the `tesseract` feature or pass --detections".to_string(),
        ))
    }
}

#[cfg(feature = "tesseract")]
pub use engine::TesseractDetector;

#[cfg(feature = "tesseract")]
mod engine {
    use super::{parse_tsv, DetectionSource};
    use crate::models::Detection;
    use crate::processing::image::{ImageProcessor, InputImage};
    use crate::utils::{KycError, Result};
    use tesseract::Tesseract;

    pub struct TesseractDetector {
        language: String,
        max_image_size: u32,
    }

    impl TesseractDetector {
        pub fn new(language: &str, max_image_size: u32) -> Self {
            TesseractDetector {
                language: language.to_string(),
                max_image_size,
            }
        }
    }

    impl DetectionSource for TesseractDetector {
        fn name(&self) -> &str {
            "tesseract"
        }

        fn detect(&self, image: &InputImage) -> Result<Vec<Detection>> {
            let prepared = ImageProcessor::prepare_for_ocr(image, self.max_image_size)?;
            // Tesseract reads from disk; the file lives until the end of this call.
            let temp_file = ImageProcessor::save_to_temp_file(&prepared)?;
            let path = temp_file
                .path()
                .to_str()
                .ok_or_else(|| KycError::Ocr("Temporary path is not valid UTF-8".to_string()))?;

            let mut tess = Tesseract::new(None, Some(&self.language))
                .map_err(|e| KycError::Ocr(format!("Failed to initialize Tesseract: {}", e)))?
                .set_image(path)
                .map_err(|e| KycError::Ocr(format!("Failed to set image: {}", e)))?
                .recognize()
                .map_err(|e| KycError::Ocr(format!("Recognition failed: {}", e)))?;
            let tsv = tess
                .get_tsv_text(0)
                .map_err(|e| KycError::Ocr(format!("Failed to read TSV output: {}", e)))?;

            Ok(parse_tsv(&tsv))
        }
    }
}

/// Groups word rows of Tesseract TSV output into one detection per text line.
/// Confidence is the mean word confidence scaled to [0, 1].
pub fn parse_tsv(tsv: &str) -> Vec<Detection> {
    struct Line {
        words: Vec<String>,
        confidence_sum: f32,
        left: u32,
        top: u32,
        right: u32,
        bottom: u32,
    }

    let mut order: Vec<(u32, u32, u32, u32)> = Vec::new();
    let mut lines: HashMap<(u32, u32, u32, u32), Line> = HashMap::new();

    for row in tsv.lines() {
        let cols: Vec<&str> = row.split('\t').collect();
        if cols.len() < 12 || cols[0] != "5" {
            continue;
        }
        let nums = match cols[1..10]
            .iter()
            .map(|c| c.parse::<u32>())
            .collect::<std::result::Result<Vec<u32>, _>>()
        {
            Ok(nums) => nums,
            Err(_) => {
                debug!("Skipping malformed TSV row: {:?}", row);
                continue;
            }
        };
        let confidence = match cols[10].parse::<f32>() {
            Ok(conf) if conf >= 0.0 => conf,
            _ => continue,
        };
        let text = cols[11].trim();
        if text.is_empty() {
            continue;
        }

        // page, block, paragraph, line
        let key = (nums[0], nums[1], nums[2], nums[3]);
        let (left, top, width, height) = (nums[5], nums[6], nums[7], nums[8]);
        let line = lines.entry(key).or_insert_with(|| {
            order.push(key);
            Line {
                words: Vec::new(),
                confidence_sum: 0.0,
                left,
                top,
                right: left + width,
                bottom: top + height,
            }
        });
        line.words.push(text.to_string());
        line.confidence_sum += confidence;
        line.left = line.left.min(left);
        line.top = line.top.min(top);
        line.right = line.right.max(left + width);
        line.bottom = line.bottom.max(top + height);
    }

    order
        .into_iter()
        .filter_map(|key| lines.remove(&key))
        .map(|line| Detection {
            confidence: (line.confidence_sum / line.words.len() as f32 / 100.0).clamp(0.0, 1.0),
            text: line.words.join(" "),
            region: Some(Region {
                left: line.left,
                top: line.top,
                width: line.right - line.left,
                height: line.bottom - line.top,
            }),
        })
        .collect()
}
