pub mod extractors;
pub mod image;
pub mod input;
pub mod ocr;
pub mod patterns;
pub mod protected_data;

pub use extractors::{ExtractionReport, Extractor};
pub use image::{ImageProcessor, InputImage};
pub use input::{InputLocator, ResolvedInput};
pub use ocr::{detect_with_timeout, DetectionFile, DetectionSource, UnavailableDetector};
pub use patterns::PatternLibrary;
pub use protected_data::{DatasetFile, ProtectedDataSource};
