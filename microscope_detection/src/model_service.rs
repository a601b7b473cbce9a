use crate::detection::{ColorLabel, Detection};
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to load model: {0}")]
    Load(String),
    #[error("Failed to load labels: {0}")]
    Labels(#[from] std::io::Error),
    #[error("Image transformation error: {0}")]
    Transform(String),
    #[error("Inference failed: {0}")]
    Inference(String),
    #[error("Invalid model output: {0}")]
    Output(String),
    #[error("Inference task failed: {0}")]
    Task(String),
    #[error("Inference exceeded {0} ms")]
    Timeout(u64),
}

/// A loaded detector. Implementations are immutable after construction and
/// are shared read-only between every caller.
pub trait ModelService: Send + Sync + 'static {
    fn predict(&self, frame: &RgbImage) -> Result<Vec<Detection>, ModelError>;

    fn labels(&self) -> &[ColorLabel];
}
