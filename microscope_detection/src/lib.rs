mod detection;
mod inference_service;
mod labels;
mod model_service;
mod ort_service;
mod render;

pub mod config;

pub use detection::{BoundingBox, ColorLabel, Detection};
pub use inference_service::{DetectionResult, InferenceService};
pub use labels::{load_color_labels, parse_color_labels};
pub use model_service::{ModelError, ModelService};
pub use ort_service::{decode_output, OrtModelService, INPUT_SIZE};
pub use render::{RenderError, Renderer};
