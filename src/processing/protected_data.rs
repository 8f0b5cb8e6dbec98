use crate::models::DatasetInfo;
use crate::utils::{KycError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Key under which the uploader stores the primary document image.
pub const PRIMARY_IMAGE_KEY: &str = "passport_image_1";

/// Access to the decrypted "protected data" handed to the job.
pub trait ProtectedDataSource {
    fn fetch(&self, key: &str) -> Result<Vec<u8>>;

    fn dataset_info(&self) -> Option<DatasetInfo> {
        None
    }
}

/// A decrypted dataset stored as a JSON object of string entries, with
/// images base64-encoded.
#[derive(Debug)]
pub struct DatasetFile {
    path: PathBuf,
    entries: Map<String, Value>,
}

impl DatasetFile {
    pub fn open(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KycError::NotFound(path.display().to_string()))
            }
            Err(e) => return Err(KycError::Io(e)),
        };
        match serde_json::from_str::<Value>(&raw)? {
            Value::Object(entries) => Ok(DatasetFile {
                path: path.to_path_buf(),
                entries,
            }),
            other => Err(KycError::Deserialization(format!(
                "Expected a JSON object in {}, found {}",
                path.display(),
                json_kind(&other)
            ))),
        }
    }
}

impl ProtectedDataSource for DatasetFile {
    fn fetch(&self, key: &str) -> Result<Vec<u8>> {
        let entry = self
            .entries
            .get(key)
            .ok_or_else(|| KycError::NotFound(format!("{} in {}", key, self.path.display())))?;
        let encoded = entry
            .as_str()
            .ok_or_else(|| KycError::Deserialization(format!("{} is not a string", key)))?;
        decode_image_payload(encoded)
    }

    fn dataset_info(&self) -> Option<DatasetInfo> {
        serde_json::from_value(Value::Object(self.entries.clone())).ok()
    }
}

/// Decodes a base64 image, accepting an optional `data:<mime>;base64,` prefix.
pub fn decode_image_payload(encoded: &str) -> Result<Vec<u8>> {
    let payload = match encoded.split_once(',') {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| KycError::Deserialization(format!("Invalid base64 image payload: {}", e)))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
