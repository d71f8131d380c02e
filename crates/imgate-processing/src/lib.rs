//! Image processing pipeline
//!
//! Decode, optional text watermark, format decision, thumbnail and unique naming, composed by
//! [`ImageService::process_image`].

pub mod codec;
pub mod error;
pub mod naming;
pub mod pipeline;
pub mod thumbnail;
pub mod transcoder;
pub mod validator;
pub mod watermark;

pub use codec::{decode, decode_config, is_special};
pub use error::{ProcessingError, ProcessingResult};
pub use naming::unique_file_name;
pub use pipeline::{ImageService, ProcessedImage};
pub use validator::{ImageValidator, ValidationError};
pub use watermark::{FontLoader, WatermarkConfig, WatermarkPosition, WatermarkRenderer};
