pub mod config;
pub mod data;
pub mod rules;

pub use config::{DemoSelection, ExtractionConfig, FallbackConfig, KycConfig, OcrConfig, OutputConfig};
pub use data::*;
pub use rules::{Exclusion, FieldRule};
