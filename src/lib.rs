pub mod kyc_processor;
pub mod models;
pub mod output;
pub mod processing;
pub mod utils;
pub mod validation;

pub use kyc_processor::KycProcessor;
pub use utils::{KycError, Result};
