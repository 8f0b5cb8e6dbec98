// Passport KYC job: reads one document image, writes result.json and
// computed.json to the output directory, and always exits successfully.

use clap::error::ErrorKind;
use clap::Parser;
use log::{error, info};
use passport_kyc::{
    models::KycConfig,
    output::{write_result, CompletionMarker},
    processing::{DetectionFile, DetectionSource, InputLocator},
    KycError, KycProcessor,
};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

/// Extract document number, country and holder name from a passport image
#[derive(Parser, Debug)]
#[command(name = "passport-kyc")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Image to process instead of searching the input directory
    #[arg(long)]
    image: Option<PathBuf>,

    /// Precomputed detections (JSON array) used instead of the OCR engine
    #[arg(long)]
    detections: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, env = "IEXEC_IN", default_value = "input")]
    input_dir: PathBuf,

    #[arg(long, env = "IEXEC_OUT", default_value = "output")]
    output_dir: PathBuf,

    /// Protected-data file inside the input directory
    #[arg(long, env = "IEXEC_DATASET_FILENAME")]
    dataset_filename: Option<String>,

    /// Arguments forwarded by the host, recorded in the output
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

impl Cli {
    /// Settings taken from the environment alone, used when the command line
    /// cannot be parsed. Every argument is kept for the record.
    fn from_environment() -> Self {
        let var = |name: &str| std::env::var_os(name).filter(|value| !value.is_empty());
        Cli {
            image: None,
            detections: None,
            config: None,
            input_dir: var("IEXEC_IN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("input")),
            output_dir: var("IEXEC_OUT").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("output")),
            dataset_filename: var("IEXEC_DATASET_FILENAME").map(|name| name.to_string_lossy().into_owned()),
            args: std::env::args_os()
                .skip(1)
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
        }
    }
}

fn detection_source(cli: &Cli, config: &KycConfig) -> Arc<dyn DetectionSource> {
    if let Some(path) = &cli.detections {
        info!("Reading detections from {}", path.display());
        return Arc::new(DetectionFile::new(path.clone()));
    }
    engine(config)
}

#[cfg(feature = "tesseract")]
fn engine(config: &KycConfig) -> Arc<dyn DetectionSource> {
    Arc::new(passport_kyc::processing::ocr::TesseractDetector::new(
        &config.ocr.language,
        config.ocr.max_image_size,
    ))
}

#[cfg(not(feature = "tesseract"))]
fn engine(_config: &KycConfig) -> Arc<dyn DetectionSource> {
    log::warn!("Built without an OCR engine; every run will use the demo fallback");
    Arc::new(passport_kyc::processing::UnavailableDetector)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let (cli, argument_error) = match Cli::try_parse() {
        Ok(cli) => (cli, None),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return;
        }
        Err(e) => {
            let message = e.to_string();
            let summary = message.lines().next().unwrap_or("invalid arguments").trim_start_matches("error: ");
            error!("Ignoring command line: {}", summary);
            (
                Cli::from_environment(),
                Some(KycError::Config(format!("Invalid arguments: {}", summary))),
            )
        }
    };

    if let Err(e) = std::fs::create_dir_all(&cli.output_dir) {
        error!("Failed to create {}: {}", cli.output_dir.display(), e);
    }
    let mut marker = CompletionMarker::new(&cli.output_dir);

    let (config, config_error) = match &cli.config {
        Some(path) => match KycConfig::from_file(path) {
            Ok(config) => (config, None),
            Err(e) => {
                error!("Falling back to default configuration: {}", e);
                (KycConfig::default(), Some(e))
            }
        },
        None => (KycConfig::default(), None),
    };

    let processor = KycProcessor::new(config.clone(), detection_source(&cli, &config));
    let locator = InputLocator {
        image: cli.image.clone(),
        dataset_filename: cli.dataset_filename.clone(),
        ..InputLocator::new(&cli.input_dir)
    };

    let record = match argument_error.or(config_error) {
        Some(e) => processor.error_record(e, cli.args.clone()),
        None => match panic::catch_unwind(AssertUnwindSafe(|| processor.process(&locator, cli.args.clone()))) {
            Ok(record) => record,
            Err(payload) => {
                let message = panic_message(&*payload);
                error!("Processing panicked: {}", message);
                processor.panic_record(message, cli.args.clone())
            }
        },
    };

    if let Some(message) = &record.error {
        marker.fail(message.clone());
    }
    if let Err(e) = write_result(&cli.output_dir, &record) {
        error!("Failed to write result: {}", e);
        marker.fail(e.to_string());
    }
}
