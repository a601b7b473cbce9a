use crate::{
    detection::Detection,
    model_service::{ModelError, ModelService},
    render::Renderer,
};
use image::RgbImage;
use std::sync::Arc;

/// Annotated output of one inference pass.
pub struct DetectionResult {
    pub detections: Vec<Detection>,
    pub annotated: RgbImage,
}

/// Process-wide handle to the loaded model. Cloning is cheap; every clone
/// shares the same read-only model and renderer.
#[derive(Clone)]
pub struct InferenceService {
    model_service: Arc<dyn ModelService>,
    renderer: Arc<Renderer>,
}

impl InferenceService {
    pub fn new(model_service: Arc<dyn ModelService>, renderer: Renderer) -> Self {
        Self {
            model_service,
            renderer: Arc::new(renderer),
        }
    }

    /// Runs the model and draws its detections on a copy of `frame`.
    ///
    /// This blocks for the whole inference pass. Async callers move it onto
    /// the blocking pool together with the decode and encode around it, and
    /// own the resulting task handle.
    pub fn detect_and_render(&self, frame: &RgbImage) -> Result<DetectionResult, ModelError> {
        let detections = self.model_service.predict(frame)?;

        tracing::debug!("Returning {} detections", detections.len());
        for (i, detection) in detections.iter().enumerate() {
            tracing::debug!(
                "Detection {}: class={}, confidence={:.3}, bbox=({:.1}, {:.1}, {:.1}, {:.1})",
                i,
                detection.class_label,
                detection.confidence,
                detection.x1,
                detection.y1,
                detection.x2,
                detection.y2
            );
        }

        let annotated = self.renderer.render(frame, &detections);
        Ok(DetectionResult {
            detections,
            annotated,
        })
    }

    pub fn class_count(&self) -> usize {
        self.model_service.labels().len()
    }
}
