use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    pub model_dir: PathBuf,
    pub onnx_file: String,
    #[serde(default = "default_model_instances")]
    pub num_instances: usize,
    #[serde(default = "default_min_probability")]
    pub min_probability: f32,
    #[serde(default = "default_iou_threshold")]
    pub iou_threshold: f32,
    pub labels_dir: PathBuf,
    pub labels_file: String,
    #[serde(default)]
    pub font_file: Option<PathBuf>,
}

fn default_model_instances() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

fn default_min_probability() -> f32 {
    0.5
}

fn default_iou_threshold() -> f32 {
    0.7
}

impl ModelConfig {
    pub fn get_path(&self) -> PathBuf {
        self.model_dir.join(&self.onnx_file)
    }

    pub fn get_labels_path(&self) -> PathBuf {
        self.labels_dir.join(&self.labels_file)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.get_path().exists() {
            return Err(format!("Model file not found: {:?}", self.get_path()));
        }
        if !self.get_labels_path().exists() {
            return Err(format!(
                "Labels file not found: {:?}",
                self.get_labels_path()
            ));
        }
        if let Some(font) = &self.font_file {
            if !font.exists() {
                return Err(format!("Font file not found: {:?}", font));
            }
        }
        if self.num_instances == 0 {
            return Err("num_instances must be at least 1".to_string());
        }
        if !(0.0..=1.0).contains(&self.min_probability) {
            return Err(format!(
                "min_probability must be within [0, 1], got {}",
                self.min_probability
            ));
        }
        Ok(())
    }
}
