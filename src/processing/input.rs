use crate::models::DatasetInfo;
use crate::processing::image::{ImageProcessor, InputImage};
use crate::processing::protected_data::{DatasetFile, ProtectedDataSource, PRIMARY_IMAGE_KEY};
use crate::utils::{KycError, Result};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};

/// Where the job looks for its single input image.
#[derive(Debug, Clone)]
pub struct InputLocator {
    /// Explicit image path; wins over everything else.
    pub image: Option<PathBuf>,
    pub input_dir: PathBuf,
    /// Protected-data file name inside `input_dir`.
    pub dataset_filename: Option<String>,
    pub image_key: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub image: InputImage,
    pub dataset: Option<DatasetInfo>,
}

impl InputLocator {
    pub fn new(input_dir: impl Into<PathBuf>) -> Self {
        InputLocator {
            image: None,
            input_dir: input_dir.into(),
            dataset_filename: None,
            image_key: PRIMARY_IMAGE_KEY.to_string(),
        }
    }

    /// The input directory, or the working directory when it does not exist.
    pub fn effective_dir(&self) -> PathBuf {
        if self.input_dir.is_dir() {
            self.input_dir.clone()
        } else {
            PathBuf::from(".")
        }
    }

    /// Tries the explicit path, then the protected dataset, then the first
    /// supported image file in the input directory.
    pub fn resolve(&self) -> Result<ResolvedInput> {
        if let Some(path) = &self.image {
            info!("Using image {}", path.display());
            return Ok(ResolvedInput {
                image: ImageProcessor::load_path(path)?,
                dataset: None,
            });
        }

        let dir = self.effective_dir();
        let mut dataset_error = None;
        if let Some(name) = &self.dataset_filename {
            match self.from_dataset(&dir.join(name)) {
                Ok(resolved) => return Ok(resolved),
                Err(e) => {
                    warn!("Protected data {} unusable: {}", name, e);
                    dataset_error = Some(e);
                }
            }
        }

        match Self::first_image_in(&dir)? {
            Some(path) => {
                info!("Found image file {}", path.display());
                Ok(ResolvedInput {
                    image: ImageProcessor::load_path(&path)?,
                    dataset: None,
                })
            }
            None => Err(dataset_error.unwrap_or(KycError::NoInputFound(dir))),
        }
    }

    /// File names present in the input directory, for diagnostics.
    pub fn files_seen(&self) -> Vec<String> {
        let dir = self.effective_dir();
        let mut names: Vec<String> = std::fs::read_dir(&dir)
            .map(|entries| {
                entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    fn from_dataset(&self, path: &Path) -> Result<ResolvedInput> {
        let dataset = DatasetFile::open(path)?;
        let bytes = dataset.fetch(&self.image_key)?;
        let source = format!("{}#{}", path.display(), self.image_key);
        info!("Loaded {} bytes from protected data {}", bytes.len(), source);
        Ok(ResolvedInput {
            image: ImageProcessor::load_bytes(bytes, source)?,
            dataset: dataset.dataset_info(),
        })
    }

    // Sorted so the same directory always yields the same image.
    fn first_image_in(dir: &Path) -> Result<Option<PathBuf>> {
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && ImageProcessor::is_supported_path(path))
            .collect();
        candidates.sort();
        debug!("{} image candidates in {}", candidates.len(), dir.display());
        Ok(candidates.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::image::tests::png_bytes;
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;

    #[test]
    fn test_first_sorted_image_wins() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("b.png"), png_bytes(3, 3)).unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(2, 2)).unwrap();

        let resolved = InputLocator::new(dir.path()).resolve().unwrap();
        assert_eq!((resolved.image.width, resolved.image.height), (2, 2));
        assert!(resolved.image.source.ends_with("a.png"));
    }

    #[test]
    fn test_empty_dir_is_no_input() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let locator = InputLocator::new(dir.path());
        assert_eq!(locator.resolve().unwrap_err().kind(), "no_input_found");
        assert_eq!(locator.files_seen(), vec!["notes.txt".to_string()]);
    }

    #[test]
    fn test_dataset_preferred_over_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), png_bytes(2, 2)).unwrap();
        let payload = format!(
            r#"{{"passport_image_1": "{}", "datasetType": "passport-images"}}"#,
            STANDARD.encode(png_bytes(5, 5))
        );
        std::fs::write(dir.path().join("protected.json"), payload).unwrap();

        let mut locator = InputLocator::new(dir.path());
        locator.dataset_filename = Some("protected.json".to_string());
        let resolved = locator.resolve().unwrap();
        assert_eq!(resolved.image.width, 5);
        assert_eq!(
            resolved.dataset.and_then(|d| d.dataset_type).as_deref(),
            Some("passport-images")
        );
    }

    #[test]
    fn test_broken_dataset_falls_back_to_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("protected.json"), "{broken").unwrap();

        let mut locator = InputLocator::new(dir.path());
        locator.dataset_filename = Some("protected.json".to_string());
        assert_eq!(locator.resolve().unwrap_err().kind(), "deserialization_error");

        std::fs::write(dir.path().join("scan.png"), png_bytes(2, 2)).unwrap();
        assert!(locator.resolve().is_ok());
    }

    #[test]
    fn test_explicit_unreadable_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.jpg");
        std::fs::write(&path, b"not a jpeg").unwrap();
        let mut locator = InputLocator::new(dir.path());
        locator.image = Some(path);
        assert_eq!(locator.resolve().unwrap_err().kind(), "image_unreadable");
    }
}
